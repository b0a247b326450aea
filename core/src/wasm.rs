//! WASM bindings for securenet-core.
//!
//! Exposes snapshot editing, flow simulation and segmentation analysis to the
//! topology editor. Everything runs on the calling thread.

use wasm_bindgen::prelude::*;
use serde::Serialize;
use crate::{
    analyze, find_path, Action, EngineError, Finding, Link, Node, NodeType, Policy, Protocol,
    Scenario, ScenarioOutcome, SimulationOptions, Parallelism, Snapshot, TopologyGraph, Zone,
    FlowSimulator, ENGINE_NAME, VERSION,
};

fn js_err(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Snapshot API
// ═══════════════════════════════════════════════════════════════════════════

/// A wrapper around Snapshot for WASM.
#[wasm_bindgen]
pub struct WasmSnapshot {
    inner: Snapshot,
}

impl Default for WasmSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmSnapshot {
    /// Create an empty snapshot.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmSnapshot {
        WasmSnapshot {
            inner: Snapshot::default(),
        }
    }

    /// Load a snapshot from JSON.
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str) -> Result<WasmSnapshot, JsError> {
        let inner = Snapshot::from_json(json).map_err(js_err)?;
        Ok(WasmSnapshot { inner })
    }

    /// Load a snapshot from RON format.
    #[wasm_bindgen(js_name = fromRon)]
    pub fn from_ron(ron: &str) -> Result<WasmSnapshot, JsError> {
        let inner = Snapshot::from_ron(ron).map_err(js_err)?;
        Ok(WasmSnapshot { inner })
    }

    /// Serialize the snapshot to JSON.
    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self) -> Result<String, JsError> {
        self.inner.to_json().map_err(js_err)
    }

    /// Serialize the snapshot to RON format.
    #[wasm_bindgen(js_name = toRon)]
    pub fn to_ron(&self) -> Result<String, JsError> {
        self.inner.to_ron().map_err(js_err)
    }

    #[wasm_bindgen(getter, js_name = nodeCount)]
    pub fn node_count(&self) -> usize {
        self.inner.topology.nodes.len()
    }

    #[wasm_bindgen(getter, js_name = linkCount)]
    pub fn link_count(&self) -> usize {
        self.inner.topology.links.len()
    }

    #[wasm_bindgen(getter, js_name = policyCount)]
    pub fn policy_count(&self) -> usize {
        self.inner.policies.len()
    }

    #[wasm_bindgen(getter, js_name = scenarioCount)]
    pub fn scenario_count(&self) -> usize {
        self.inner.scenarios.len()
    }

    /// Add a node. The node should be a JSON object matching the Node structure.
    #[wasm_bindgen(js_name = addNode)]
    pub fn add_node(&mut self, node_json: &str) -> Result<(), JsError> {
        let node: Node = serde_json::from_str(node_json)
            .map_err(|e| JsError::new(&format!("Invalid node JSON: {}", e)))?;
        self.inner.topology.nodes.push(node);
        Ok(())
    }

    /// Remove a node and every link touching it.
    #[wasm_bindgen(js_name = removeNode)]
    pub fn remove_node(&mut self, node_id: &str) -> bool {
        let topology = &mut self.inner.topology;
        let before = topology.nodes.len();
        topology.nodes.retain(|n| n.id != node_id);
        topology.links.retain(|l| l.a != node_id && l.b != node_id);
        topology.nodes.len() != before
    }

    /// Connect two nodes.
    #[wasm_bindgen]
    pub fn connect(&mut self, a: &str, b: &str) {
        self.inner.topology.links.push(Link::new(a, b));
    }

    /// Remove every link between two nodes, in either direction.
    #[wasm_bindgen]
    pub fn disconnect(&mut self, a: &str, b: &str) {
        self.inner
            .topology
            .links
            .retain(|l| !((l.a == a && l.b == b) || (l.a == b && l.b == a)));
    }

    /// Append a policy given as JSON.
    #[wasm_bindgen(js_name = addPolicy)]
    pub fn add_policy(&mut self, policy_json: &str) -> Result<(), JsError> {
        let policy: Policy = serde_json::from_str(policy_json)
            .map_err(|e| JsError::new(&format!("Invalid policy JSON: {}", e)))?;
        self.inner.policies.push(policy);
        Ok(())
    }

    /// Append a scenario given as JSON.
    #[wasm_bindgen(js_name = addScenario)]
    pub fn add_scenario(&mut self, scenario_json: &str) -> Result<(), JsError> {
        let scenario: Scenario = serde_json::from_str(scenario_json)
            .map_err(|e| JsError::new(&format!("Invalid scenario JSON: {}", e)))?;
        self.inner.scenarios.push(scenario);
        Ok(())
    }

    /// Get all nodes as JSON array.
    #[wasm_bindgen(js_name = getNodes)]
    pub fn get_nodes(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.inner.topology.nodes).map_err(js_err)
    }

    /// Get all scenarios, including their last results, as JSON array.
    #[wasm_bindgen(js_name = getScenarios)]
    pub fn get_scenarios(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.inner.scenarios).map_err(js_err)
    }

    /// Check the topology for duplicate ids and dangling or self links.
    /// Returns `null` when valid, otherwise the problem.
    #[wasm_bindgen]
    pub fn validate(&self) -> Option<String> {
        TopologyGraph::from_snapshot(&self.inner.topology)
            .err()
            .map(|e| e.to_string())
    }

    /// Simulate every scenario, store the verdicts on the scenarios and
    /// return the outcomes as JSON.
    #[wasm_bindgen]
    pub fn simulate(&mut self) -> Result<String, JsError> {
        let outcomes = simulate_in_place(&mut self.inner).map_err(js_err)?;
        serde_json::to_string(&outcomes).map_err(js_err)
    }

    /// Run the segmentation checks and return the findings as JSON.
    #[wasm_bindgen]
    pub fn analyze(&self) -> Result<String, JsError> {
        let findings = analyze_snapshot(&self.inner).map_err(js_err)?;
        serde_json::to_string(&findings).map_err(js_err)
    }

    /// Run the segmentation checks and return the findings as a JS array.
    #[wasm_bindgen(js_name = analyzeToValue)]
    pub fn analyze_to_value(&self) -> Result<JsValue, JsError> {
        let findings = analyze_snapshot(&self.inner).map_err(js_err)?;
        serde_wasm_bindgen::to_value(&findings).map_err(js_err)
    }

    /// Shortest path between two nodes as a JSON array of ids, or `null`.
    #[wasm_bindgen(js_name = findPath)]
    pub fn find_path(&self, source: &str, dest: &str) -> Result<Option<String>, JsError> {
        let ids = path_ids(&self.inner, source, dest).map_err(js_err)?;
        ids.map(|ids| serde_json::to_string(&ids).map_err(js_err))
            .transpose()
    }
}

fn simulate_in_place(snapshot: &mut Snapshot) -> Result<Vec<ScenarioOutcome>, EngineError> {
    let graph = TopologyGraph::from_snapshot(&snapshot.topology)?;
    let options = SimulationOptions {
        parallelism: Parallelism::Sequential,
        ..Default::default()
    };
    let outcomes = FlowSimulator::new(&graph, &snapshot.policies).simulate(&snapshot.scenarios, &options)?;
    for (scenario, outcome) in snapshot.scenarios.iter_mut().zip(&outcomes) {
        scenario.result = outcome.result;
        scenario.detail = Some(outcome.detail.clone());
    }
    Ok(outcomes)
}

fn analyze_snapshot(snapshot: &Snapshot) -> Result<Vec<Finding>, EngineError> {
    let graph = TopologyGraph::from_snapshot(&snapshot.topology)?;
    Ok(analyze(&graph))
}

fn path_ids(snapshot: &Snapshot, source: &str, dest: &str) -> Result<Option<Vec<String>>, EngineError> {
    let graph = TopologyGraph::from_snapshot(&snapshot.topology)?;
    Ok(find_path(source, dest, &graph).map(|path| path.iter().map(|n| n.id.clone()).collect()))
}

// ═══════════════════════════════════════════════════════════════════════════
// Schema/Metadata API (for UI building)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct Choice<'a> {
    value: &'a str,
    display_name: &'a str,
}

fn choices_json(choices: &[Choice<'_>]) -> Result<String, JsError> {
    serde_json::to_string(choices).map_err(js_err)
}

/// Get all standard node types as JSON array.
#[wasm_bindgen(js_name = getNodeTypes)]
pub fn get_node_types() -> Result<String, JsError> {
    let types: Vec<_> = NodeType::all_standard()
        .iter()
        .map(|t| Choice {
            value: t.as_str(),
            display_name: t.display_name(),
        })
        .collect();
    choices_json(&types)
}

/// Get the well-known zones as JSON array.
#[wasm_bindgen(js_name = getZones)]
pub fn get_zones() -> Result<String, JsError> {
    let zones = [Zone::internal(), Zone::dmz(), Zone::external()];
    let choices: Vec<_> = zones
        .iter()
        .map(|z| Choice {
            value: z.as_str(),
            display_name: z.as_str(),
        })
        .collect();
    choices_json(&choices)
}

/// Get the protocols the matcher distinguishes as JSON array.
#[wasm_bindgen(js_name = getProtocols)]
pub fn get_protocols() -> Result<String, JsError> {
    let protocols = [Protocol::Any, Protocol::Tcp, Protocol::Udp, Protocol::Icmp];
    let choices: Vec<_> = protocols
        .iter()
        .map(|p| Choice {
            value: p.as_str(),
            display_name: p.as_str(),
        })
        .collect();
    choices_json(&choices)
}

/// Get policy actions as JSON array.
#[wasm_bindgen(js_name = getActions)]
pub fn get_actions() -> Result<String, JsError> {
    let actions = [(Action::Permit, "Permit"), (Action::Deny, "Deny")];
    let values: Vec<String> = actions.iter().map(|(a, _)| a.to_string()).collect();
    let choices: Vec<_> = actions
        .iter()
        .zip(&values)
        .map(|((_, display_name), value)| Choice {
            value: value.as_str(),
            display_name,
        })
        .collect();
    choices_json(&choices)
}

/// Engine name and version, for the editor's about box.
#[wasm_bindgen(js_name = getEngineInfo)]
pub fn get_engine_info() -> Result<String, JsError> {
    serde_json::to_string(&serde_json::json!({
        "engine": ENGINE_NAME,
        "version": VERSION,
    }))
    .map_err(js_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScenarioResult;

    const SNAPSHOT: &str = r#"{
        "topology": {
            "nodes": [
                {"id": "R1", "type": "router", "zone": "internal"},
                {"id": "FW1", "type": "firewall", "zone": "dmz"},
                {"id": "SRV", "type": "server", "zone": "dmz"}
            ],
            "links": [{"a": "R1", "b": "FW1"}, {"a": "FW1", "b": "SRV"}]
        },
        "policies": [
            {
                "source": {"kind": "zone", "value": "internal"},
                "dest": {"kind": "zone", "value": "dmz"},
                "protocol": "tcp",
                "port": 80,
                "action": "deny",
                "description": "No web from inside"
            }
        ],
        "scenarios": [
            {
                "id": "s1",
                "source": {"kind": "node", "value": "R1"},
                "dest": {"kind": "node", "value": "SRV"},
                "protocol": "tcp",
                "port": 80
            }
        ]
    }"#;

    #[test]
    fn test_simulate_in_place_stores_results() {
        let mut snapshot = Snapshot::from_json(SNAPSHOT).unwrap();
        let outcomes = simulate_in_place(&mut snapshot).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(snapshot.scenarios[0].result, ScenarioResult::Denied);
        assert!(snapshot.scenarios[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("No web from inside"));
    }

    #[test]
    fn test_path_ids() {
        let snapshot = Snapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(
            path_ids(&snapshot, "R1", "SRV").unwrap(),
            Some(vec!["R1".to_string(), "FW1".to_string(), "SRV".to_string()])
        );
    }

    #[test]
    fn test_wasm_snapshot_editing() {
        let mut wasm = WasmSnapshot {
            inner: Snapshot::from_json(SNAPSHOT).unwrap(),
        };
        assert_eq!(wasm.node_count(), 3);
        assert!(wasm.remove_node("FW1"));
        assert_eq!(wasm.link_count(), 0);
        assert!(wasm.validate().is_none());

        wasm.connect("R1", "SRV");
        assert_eq!(wasm.link_count(), 1);
        wasm.disconnect("SRV", "R1");
        assert_eq!(wasm.link_count(), 0);

        wasm.connect("R1", "R1");
        assert!(wasm.validate().is_some());
    }

    #[test]
    fn test_analyze_snapshot_clean_topology() {
        let snapshot = Snapshot::from_json(SNAPSHOT).unwrap();
        assert!(analyze_snapshot(&snapshot).unwrap().is_empty());
    }
}
