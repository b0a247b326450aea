//! Value types shared by every engine component.
//!
//! These types accept the editor's vocabulary as well as the canonical one,
//! so a snapshot exported by the designer can be evaluated without conversion.

use std::fmt;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

// ============================================================================
// Zones and node types
// ============================================================================

/// A named security segment. Open set: any name is a valid zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Zone(String);

impl Zone {
    pub const INTERNAL: &'static str = "internal";
    pub const DMZ: &'static str = "dmz";
    pub const EXTERNAL: &'static str = "external";

    /// Normalize a zone name (case, surrounding whitespace, editor aliases).
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim().to_lowercase();
        let canonical = match name.as_str() {
            "interna" | "inside" => Self::INTERNAL.to_string(),
            "externa" | "outside" => Self::EXTERNAL.to_string(),
            _ => name,
        };
        Zone(canonical)
    }

    pub fn internal() -> Self {
        Zone(Self::INTERNAL.to_string())
    }

    pub fn dmz() -> Self {
        Zone(Self::DMZ.to_string())
    }

    pub fn external() -> Self {
        Zone(Self::EXTERNAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_internal(&self) -> bool {
        self.0 == Self::INTERNAL
    }

    pub fn is_dmz(&self) -> bool {
        self.0 == Self::DMZ
    }

    pub fn is_external(&self) -> bool {
        self.0 == Self::EXTERNAL
    }
}

impl From<String> for Zone {
    fn from(s: String) -> Self {
        Zone::new(s)
    }
}

impl From<&str> for Zone {
    fn from(s: &str) -> Self {
        Zone::new(s)
    }
}

impl From<Zone> for String {
    fn from(z: Zone) -> Self {
        z.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device role as drawn in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Router,
    Firewall,
    Server,
    Switch,
    Host,
    /// Anything the editor produced that is not a known role
    Other(String),
}

impl NodeType {
    pub fn all_standard() -> &'static [NodeType] {
        &[
            NodeType::Router,
            NodeType::Firewall,
            NodeType::Server,
            NodeType::Switch,
            NodeType::Host,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Router => "router",
            NodeType::Firewall => "firewall",
            NodeType::Server => "server",
            NodeType::Switch => "switch",
            NodeType::Host => "host",
            NodeType::Other(s) => s,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            NodeType::Router => "Router",
            NodeType::Firewall => "Firewall",
            NodeType::Server => "Server",
            NodeType::Switch => "Switch",
            NodeType::Host => "Host",
            NodeType::Other(s) => s,
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "router" => NodeType::Router,
            "firewall" | "fw" => NodeType::Firewall,
            "server" | "servidor" => NodeType::Server,
            "switch" => NodeType::Switch,
            "host" | "pc" | "cliente" => NodeType::Host,
            other => NodeType::Other(other.to_string()),
        }
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        NodeType::from(s.to_string())
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

// ============================================================================
// Topology records
// ============================================================================

/// A device in the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, alias = "nombre", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", alias = "tipo")]
    pub node_type: NodeType,
    #[serde(alias = "zona", alias = "zona_seguridad")]
    pub zone: Zone,
    /// CIDR string as entered; parsed on demand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, deserialize_with = "lenient_vlan", skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    /// Marks a non-firewall device (e.g. a router) as able to enforce policy
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub firewall: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, zone: impl Into<Zone>) -> Self {
        Node {
            id: id.into(),
            name: None,
            node_type,
            zone: zone.into(),
            subnet: None,
            vlan: None,
            firewall: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    pub fn with_vlan(mut self, vlan: u16) -> Self {
        self.vlan = valid_vlan(i64::from(vlan));
        self
    }

    pub fn with_firewall(mut self) -> Self {
        self.firewall = true;
        self
    }

    pub fn is_firewall_capable(&self) -> bool {
        self.firewall || self.node_type == NodeType::Firewall
    }

    /// Parsed subnet; anything that is not a CIDR counts as absent.
    pub fn network(&self) -> Option<IpNet> {
        self.subnet
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<IpNet>().ok())
    }

    pub fn has_segmentation_metadata(&self) -> bool {
        self.network().is_some() && self.vlan.is_some()
    }

    pub fn has_no_segmentation_metadata(&self) -> bool {
        self.network().is_none() && self.vlan.is_none()
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn valid_vlan(v: i64) -> Option<u16> {
    u16::try_from(v).ok().filter(|v| (1..=4094).contains(v))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVlan {
    Int(i64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Accepts integers or numeric strings; anything else becomes `None`.
fn lenient_vlan<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawVlan>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| match r {
        RawVlan::Int(v) => valid_vlan(v),
        RawVlan::Text(s) => s.trim().parse::<i64>().ok().and_then(valid_vlan),
        RawVlan::Other(_) => None,
    }))
}

/// Undirected adjacency between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(alias = "source", alias = "id_nodo_origen")]
    pub a: String,
    #[serde(alias = "target", alias = "id_nodo_destino")]
    pub b: String,
}

impl Link {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Link { a: a.into(), b: b.into() }
    }
}

// ============================================================================
// Policies and scenarios
// ============================================================================

/// What a policy or scenario endpoint addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Endpoint {
    #[serde(alias = "zona")]
    Zone(Zone),
    #[serde(alias = "nodo")]
    Node(String),
}

impl Endpoint {
    pub fn zone(name: impl Into<Zone>) -> Self {
        Endpoint::Zone(name.into())
    }

    pub fn node(id: impl Into<String>) -> Self {
        Endpoint::Node(id.into())
    }

    /// Specificity contribution: a single device outranks a whole zone.
    pub fn weight(&self) -> u8 {
        match self {
            Endpoint::Node(_) => 2,
            Endpoint::Zone(_) => 1,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Zone(z) => write!(f, "zone {}", z),
            Endpoint::Node(n) => write!(f, "node {}", n),
        }
    }
}

/// Transport protocol. `Any` is the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Any,
    Tcp,
    Udp,
    Icmp,
    Other(String),
}

impl Protocol {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Protocol::Any)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Any => "any",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Other(s) => s,
        }
    }
}

impl From<String> for Protocol {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "any" | "*" | "ip" => Protocol::Any,
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "icmp" => Protocol::Icmp,
            other => Protocol::Other(other.to_string()),
        }
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        Protocol::from(s.to_string())
    }
}

impl From<Protocol> for String {
    fn from(p: Protocol) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[serde(alias = "permitir", alias = "allow")]
    Permit,
    #[serde(alias = "denegar", alias = "block")]
    Deny,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Permit => write!(f, "permit"),
            Action::Deny => write!(f, "deny"),
        }
    }
}

/// A directional firewall rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Assigned from declaration position when empty
    #[serde(default)]
    pub id: String,
    #[serde(alias = "origen")]
    pub source: Endpoint,
    #[serde(alias = "destino")]
    pub dest: Endpoint,
    /// Informational label (http, ssh, ...); not used for matching
    #[serde(default, alias = "servicio")]
    pub service: String,
    #[serde(default, alias = "protocolo", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, alias = "puerto", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(alias = "accion")]
    pub action: Action,
    #[serde(default, alias = "descripcion")]
    pub description: String,
}

impl Policy {
    pub fn new(source: Endpoint, dest: Endpoint, action: Action) -> Self {
        Policy {
            id: String::new(),
            source,
            dest,
            service: String::new(),
            protocol: None,
            port: None,
            action,
            description: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<Protocol>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Protocol if set to something other than the wildcard.
    pub fn explicit_protocol(&self) -> Option<&Protocol> {
        self.protocol.as_ref().filter(|p| !p.is_wildcard())
    }

    /// Human-readable reference used in verdict details.
    pub fn summary(&self) -> String {
        if self.description.trim().is_empty() {
            format!("policy #{} ({} -> {}, {})", self.id, self.source, self.dest, self.action)
        } else {
            format!("policy #{}: {}", self.id, self.description.trim())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioResult {
    #[default]
    #[serde(alias = "pendiente")]
    Pending,
    #[serde(alias = "permitido")]
    Permitted,
    #[serde(alias = "bloqueado", alias = "denegado")]
    Denied,
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioResult::Pending => write!(f, "pending"),
            ScenarioResult::Permitted => write!(f, "permitted"),
            ScenarioResult::Denied => write!(f, "denied"),
        }
    }
}

/// A hypothetical flow submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "origen")]
    pub source: Endpoint,
    #[serde(alias = "destino")]
    pub dest: Endpoint,
    #[serde(default, alias = "servicio")]
    pub service: String,
    #[serde(default, alias = "protocolo", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, alias = "puerto", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, alias = "resultado")]
    pub result: ScenarioResult,
    #[serde(default, alias = "detalle", skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, source: Endpoint, dest: Endpoint) -> Self {
        Scenario {
            id: id.into(),
            source,
            dest,
            service: String::new(),
            protocol: None,
            port: None,
            result: ScenarioResult::Pending,
            detail: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<Protocol>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

// ============================================================================
// Segmentation findings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Info => write!(f, "INFO"),
            Level::Warning => write!(f, "WARNING"),
            Level::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A structural weakness found in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub level: Level,
    /// Stable name of the check that produced this finding
    pub check: String,
    pub message: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    #[serde(default, alias = "nodos")]
    pub nodes: Vec<Node>,
    #[serde(default, alias = "enlaces", alias = "edges")]
    pub links: Vec<Link>,
}

/// Everything one evaluation request needs, as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(alias = "topologia")]
    pub topology: TopologySnapshot,
    #[serde(default, alias = "politicas")]
    pub policies: Vec<Policy>,
    #[serde(default, alias = "escenarios")]
    pub scenarios: Vec<Scenario>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_ron(s: &str) -> Result<Self, EngineError> {
        Ok(ron::from_str(s)?)
    }

    pub fn to_ron(&self) -> Result<String, EngineError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}
