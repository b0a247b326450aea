//! Type definitions for the payloads the editor and backend API produce.
//!
//! The editor stores its canvas as a React Flow graph (nodes + edges) and the
//! backend API stores policies and scenarios as flat records with
//! `tipo_origen`/`origen` style endpoints. Both are accepted here and
//! converted into a core [`Snapshot`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use securenet_core::{
    Action, Endpoint, Link, Node, NodeType, Policy, Protocol, Scenario, ScenarioResult, Snapshot,
    TopologySnapshot, Zone,
};

use super::loader::LoadError;

// ============================================================================
// Graph Structure (matches editor's React Flow format)
// ============================================================================

/// The complete document saved by the editor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorDocument {
    pub nodes: Vec<EditorNode>,
    pub edges: Vec<EditorEdge>,
    #[serde(default, alias = "politicas")]
    pub policies: Vec<PolicyRecord>,
    #[serde(default, alias = "escenarios")]
    pub scenarios: Vec<ScenarioRecord>,
}

/// A single node on the canvas.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorNode {
    pub id: String,
    /// React Flow renderer type, usually `default`
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub position: Option<NodePosition>,
    #[serde(default)]
    pub data: EditorNodeData,
}

/// Node position for layout (preserved for editor reload).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// Device metadata the editor keeps in `node.data`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EditorNodeData {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "tipo", alias = "type")]
    pub kind: Option<String>,
    #[serde(default, alias = "zona", alias = "zona_seguridad")]
    pub zone: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    /// Number or numeric string; anything else is ignored
    #[serde(default)]
    pub vlan: Option<serde_json::Value>,
    #[serde(default)]
    pub firewall: Option<bool>,
}

/// An edge connecting two nodes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EditorEdge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

// ============================================================================
// Label parsing
// ============================================================================

/// What an editor label such as `R1 (Router - Interna)` says about a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelParts {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub zone: Option<String>,
}

fn label_regex() -> Option<&'static Regex> {
    static LABEL: OnceLock<Option<Regex>> = OnceLock::new();
    LABEL
        .get_or_init(|| Regex::new(r"^\s*(?P<head>[^()]*?)\s*\(\s*(?P<meta>[^()]*?)\s*\)\s*$").ok())
        .as_ref()
}

/// Split a label into name, type and zone.
///
/// The editor writes `NAME (Type - Zone)` for named devices and `Type (Zone)`
/// for freshly dropped ones. Anything else is taken as a bare name.
pub fn parse_label(label: &str) -> LabelParts {
    let label = label.trim();
    if label.is_empty() {
        return LabelParts::default();
    }

    let Some(caps) = label_regex().and_then(|re| re.captures(label)) else {
        return LabelParts {
            name: Some(label.to_string()),
            ..Default::default()
        };
    };

    let head = caps.name("head").map_or("", |m| m.as_str());
    let meta = caps.name("meta").map_or("", |m| m.as_str());
    let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());

    match meta.split_once(" - ") {
        Some((kind, zone)) => LabelParts {
            name: non_empty(head),
            kind: non_empty(kind),
            zone: non_empty(zone),
        },
        None => LabelParts {
            name: None,
            kind: non_empty(head),
            zone: non_empty(meta),
        },
    }
}

// ============================================================================
// Backend API records
// ============================================================================

/// A policy in either the native shape or the backend API's flat shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PolicyRecord {
    Native(Policy),
    Api(ApiPolicy),
}

/// A scenario in either the native shape or the backend API's flat shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScenarioRecord {
    Native(Scenario),
    Api(ApiScenario),
}

/// Policy row as returned by `GET /topologias/<id>/politicas`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiPolicy {
    #[serde(default)]
    pub id_politica: Option<serde_json::Value>,
    #[serde(default = "default_endpoint_kind")]
    pub tipo_origen: String,
    pub origen: String,
    #[serde(default = "default_endpoint_kind")]
    pub tipo_destino: String,
    pub destino: String,
    #[serde(default)]
    pub servicio: Option<String>,
    #[serde(default)]
    pub protocolo: Option<String>,
    #[serde(default)]
    pub puerto: Option<serde_json::Value>,
    pub accion: String,
    #[serde(default)]
    pub descripcion: Option<String>,
}

/// Scenario row as returned by `GET /topologias/<id>/escenarios`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiScenario {
    #[serde(default)]
    pub id_escenario: Option<serde_json::Value>,
    #[serde(default = "default_endpoint_kind")]
    pub tipo_origen: String,
    pub origen: String,
    #[serde(default = "default_endpoint_kind")]
    pub tipo_destino: String,
    pub destino: String,
    #[serde(default)]
    pub servicio: Option<String>,
    #[serde(default)]
    pub protocolo: Option<String>,
    #[serde(default)]
    pub puerto: Option<serde_json::Value>,
    #[serde(default)]
    pub resultado: Option<String>,
    #[serde(default)]
    pub detalle: Option<String>,
}

fn default_endpoint_kind() -> String {
    "zona".to_string()
}

fn endpoint(kind: &str, value: &str) -> Result<Endpoint, LoadError> {
    match kind.trim().to_lowercase().as_str() {
        "zona" | "zone" => Ok(Endpoint::zone(value)),
        "nodo" | "node" => Ok(Endpoint::node(value.trim())),
        other => Err(LoadError::InvalidRecord(format!(
            "unknown endpoint kind '{}' for '{}'",
            other, value
        ))),
    }
}

fn json_id(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn json_u16(value: &Option<serde_json::Value>) -> Option<u16> {
    let n = match value.as_ref()? {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u16::try_from(n).ok()
}

fn protocol(value: &Option<String>) -> Option<Protocol> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Protocol::from)
}

impl ApiPolicy {
    pub fn into_policy(self) -> Result<Policy, LoadError> {
        let action = match self.accion.trim().to_lowercase().as_str() {
            "permitir" | "permit" | "allow" => Action::Permit,
            "denegar" | "deny" | "block" => Action::Deny,
            other => {
                return Err(LoadError::InvalidRecord(format!(
                    "unknown policy action '{}'",
                    other
                )))
            }
        };
        Ok(Policy {
            id: json_id(&self.id_politica),
            source: endpoint(&self.tipo_origen, &self.origen)?,
            dest: endpoint(&self.tipo_destino, &self.destino)?,
            service: self.servicio.unwrap_or_default(),
            protocol: protocol(&self.protocolo),
            port: json_u16(&self.puerto),
            action,
            description: self.descripcion.unwrap_or_default(),
        })
    }
}

impl ApiScenario {
    pub fn into_scenario(self) -> Result<Scenario, LoadError> {
        let result = match self.resultado.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(r) if r == "permitido" || r == "permitted" => ScenarioResult::Permitted,
            Some(r) if r == "bloqueado" || r == "denegado" || r == "denied" => ScenarioResult::Denied,
            _ => ScenarioResult::Pending,
        };
        Ok(Scenario {
            id: json_id(&self.id_escenario),
            source: endpoint(&self.tipo_origen, &self.origen)?,
            dest: endpoint(&self.tipo_destino, &self.destino)?,
            service: self.servicio.unwrap_or_default(),
            protocol: protocol(&self.protocolo),
            port: json_u16(&self.puerto),
            result,
            detail: self.detalle,
        })
    }
}

impl PolicyRecord {
    pub fn into_policy(self) -> Result<Policy, LoadError> {
        match self {
            PolicyRecord::Native(policy) => Ok(policy),
            PolicyRecord::Api(api) => api.into_policy(),
        }
    }
}

impl ScenarioRecord {
    pub fn into_scenario(self) -> Result<Scenario, LoadError> {
        match self {
            ScenarioRecord::Native(scenario) => Ok(scenario),
            ScenarioRecord::Api(api) => api.into_scenario(),
        }
    }
}

// ============================================================================
// Conversion
// ============================================================================

impl EditorNode {
    /// Convert to a core node. Explicit `data` fields win over the label.
    pub fn to_node(&self) -> Node {
        let parts = self
            .data
            .label
            .as_deref()
            .map(parse_label)
            .unwrap_or_default();

        let kind = self
            .data
            .kind
            .clone()
            .or(parts.kind)
            .unwrap_or_else(|| "host".to_string());
        let zone = self
            .data
            .zone
            .clone()
            .or(parts.zone)
            .unwrap_or_else(|| Zone::INTERNAL.to_string());

        let mut node = Node::new(self.id.clone(), NodeType::from(kind), Zone::new(zone));
        if let Some(name) = parts.name {
            node = node.with_name(name);
        }
        if let Some(subnet) = self.data.subnet.as_deref().filter(|s| !s.trim().is_empty()) {
            node = node.with_subnet(subnet);
        }
        if let Some(vlan) = json_u16(&self.data.vlan) {
            node = node.with_vlan(vlan);
        }
        if self.data.firewall == Some(true) {
            node = node.with_firewall();
        }
        node
    }
}

impl EditorDocument {
    /// Convert the whole document into an engine snapshot.
    pub fn into_snapshot(self) -> Result<Snapshot, LoadError> {
        let topology = TopologySnapshot {
            nodes: self.nodes.iter().map(EditorNode::to_node).collect(),
            links: self
                .edges
                .iter()
                .map(|e| Link::new(e.source.clone(), e.target.clone()))
                .collect(),
        };
        let policies = self
            .policies
            .into_iter()
            .map(PolicyRecord::into_policy)
            .collect::<Result<Vec<_>, _>>()?;
        let scenarios = self
            .scenarios
            .into_iter()
            .map(ScenarioRecord::into_scenario)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Snapshot {
            topology,
            policies,
            scenarios,
        })
    }
}
