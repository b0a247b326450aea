//! Flow simulation.
//!
//! Evaluates scenarios against a topology and policy set. Each scenario is
//! expanded into (source, destination) node pairs; each pair is routed over
//! the shortest path and checked at every firewall-capable hop. Scenarios are
//! independent and run on the rayon pool; results keep input order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::endpoint::resolve;
use crate::error::EngineError;
use crate::model::{Node, Policy, Scenario, ScenarioResult, Snapshot};
use crate::path::{find_path, hops};
use crate::policy::{Flow, PolicySet};
use crate::topology::TopologyGraph;

pub const DETAIL_UNKNOWN_ENDPOINT: &str = "unknown endpoint";
pub const DETAIL_NO_PATH: &str = "no network path";
pub const DETAIL_EMPTY_ENDPOINT: &str = "endpoint resolves to no nodes";
pub const DETAIL_SAME_NODE: &str = "source and destination are the same node";

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag with an optional deadline.
///
/// Checked before each scenario starts. The deadline is only read when one
/// was set, so a token without a deadline never touches the clock.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallelism {
    Sequential,
    #[default]
    Parallel,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    pub parallelism: Parallelism,
    pub cancel: CancelToken,
}

// ============================================================================
// Results
// ============================================================================

/// How one (source, destination) pair was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairTrace {
    pub source: String,
    pub dest: String,
    /// Node ids from source to destination; empty when unreachable
    pub path: Vec<String>,
    pub result: ScenarioResult,
    /// Firewall that denied the pair, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
    /// Deciding policy id at that firewall, if a policy (not the default) decided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    pub detail: String,
}

impl PairTrace {
    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Verdict for one scenario, in the shape the editor stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub id: String,
    pub result: ScenarioResult,
    pub detail: String,
    #[serde(default)]
    pub pairs: Vec<PairTrace>,
}

impl ScenarioOutcome {
    fn denied(id: &str, detail: &str) -> Self {
        ScenarioOutcome {
            id: id.to_string(),
            result: ScenarioResult::Denied,
            detail: detail.to_string(),
            pairs: Vec::new(),
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.result == ScenarioResult::Permitted
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Evaluates scenarios over one read-only topology and policy snapshot.
#[derive(Debug)]
pub struct FlowSimulator<'g> {
    graph: &'g TopologyGraph,
    policies: PolicySet,
}

impl<'g> FlowSimulator<'g> {
    pub fn new(graph: &'g TopologyGraph, policies: &[Policy]) -> Self {
        FlowSimulator {
            graph,
            policies: PolicySet::compile(policies, graph),
        }
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Evaluate a batch. Output order always equals input order.
    pub fn simulate(
        &self,
        scenarios: &[Scenario],
        options: &SimulationOptions,
    ) -> Result<Vec<ScenarioOutcome>, EngineError> {
        let run = |(index, scenario): (usize, &Scenario)| {
            if options.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            Ok(self.evaluate_indexed(index, scenario))
        };

        let outcomes = match options.parallelism {
            Parallelism::Parallel => scenarios
                .par_iter()
                .enumerate()
                .map(run)
                .collect::<Result<Vec<_>, _>>(),
            Parallelism::Sequential => scenarios
                .iter()
                .enumerate()
                .map(run)
                .collect::<Result<Vec<_>, _>>(),
        };

        match &outcomes {
            Ok(results) => {
                let permitted = results.iter().filter(|o| o.is_permitted()).count();
                info!(
                    scenarios = results.len(),
                    permitted,
                    denied = results.len() - permitted,
                    "simulation complete"
                );
            }
            Err(e) => warn!(error = %e, "simulation aborted"),
        }
        outcomes
    }

    /// Evaluate a single scenario.
    pub fn evaluate(&self, scenario: &Scenario) -> ScenarioOutcome {
        self.evaluate_indexed(0, scenario)
    }

    fn evaluate_indexed(&self, index: usize, scenario: &Scenario) -> ScenarioOutcome {
        let id = if scenario.id.trim().is_empty() {
            (index + 1).to_string()
        } else {
            scenario.id.clone()
        };

        let (sources, dests) = match (
            resolve(&scenario.source, self.graph),
            resolve(&scenario.dest, self.graph),
        ) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(e), _) | (_, Err(e)) => {
                debug!(scenario = %id, error = %e, "scenario endpoint did not resolve");
                return ScenarioOutcome::denied(&id, DETAIL_UNKNOWN_ENDPOINT);
            }
        };

        if sources.is_empty() || dests.is_empty() {
            return ScenarioOutcome::denied(&id, DETAIL_EMPTY_ENDPOINT);
        }

        let pairs: Vec<PairTrace> = sources
            .iter()
            .flat_map(|src| dests.iter().map(move |dst| (*src, *dst)))
            .map(|(src, dst)| self.evaluate_pair(src, dst, scenario))
            .collect();

        let outcome = aggregate(id, pairs);
        debug!(scenario = %outcome.id, result = %outcome.result, detail = %outcome.detail, "scenario evaluated");
        outcome
    }

    fn evaluate_pair(&self, source: &Node, dest: &Node, scenario: &Scenario) -> PairTrace {
        let mut trace = PairTrace {
            source: source.id.clone(),
            dest: dest.id.clone(),
            path: Vec::new(),
            result: ScenarioResult::Denied,
            decided_at: None,
            policy: None,
            detail: String::new(),
        };

        if source.id == dest.id {
            trace.path = vec![source.id.clone()];
            trace.result = ScenarioResult::Permitted;
            trace.detail = DETAIL_SAME_NODE.to_string();
            return trace;
        }

        let path = match find_path(&source.id, &dest.id, self.graph) {
            Some(path) => path,
            None => {
                trace.detail = DETAIL_NO_PATH.to_string();
                return trace;
            }
        };
        trace.path = path.iter().map(|n| n.id.clone()).collect();

        let flow = Flow {
            source,
            dest,
            protocol: scenario.protocol.as_ref(),
            port: scenario.port,
        };

        let mut permits = Vec::new();
        for hop in path.iter().filter(|n| n.is_firewall_capable()) {
            let decision = self.policies.decide_at(hop, &flow);
            if !decision.is_permit() {
                trace.decided_at = Some(hop.id.clone());
                trace.policy = decision.policy.map(|p| p.policy.id.clone());
                trace.detail = match decision.policy {
                    Some(p) => p.policy.summary(),
                    None => format!("default deny at {} (no matching policy)", hop.label()),
                };
                return trace;
            }
            if let Some(p) = decision.policy {
                permits.push(format!("{} at {}", p.policy.summary(), hop.label()));
            }
        }

        trace.result = ScenarioResult::Permitted;
        trace.detail = if permits.is_empty() {
            format!("no firewall on path ({} hops)", hops(&path))
        } else {
            format!("permitted by {}", permits.join("; "))
        };
        trace
    }
}

/// Any denied pair denies the scenario; the first one in pair order explains it.
fn aggregate(id: String, pairs: Vec<PairTrace>) -> ScenarioOutcome {
    let multi = pairs.len() > 1;
    let (result, detail) = match pairs.iter().find(|p| p.result == ScenarioResult::Denied) {
        Some(denied) if multi => (
            ScenarioResult::Denied,
            format!("{} -> {}: {}", denied.source, denied.dest, denied.detail),
        ),
        Some(denied) => (ScenarioResult::Denied, denied.detail.clone()),
        None if multi => (
            ScenarioResult::Permitted,
            format!("all {} endpoint pairs permitted", pairs.len()),
        ),
        None => (
            ScenarioResult::Permitted,
            pairs.first().map(|p| p.detail.clone()).unwrap_or_default(),
        ),
    };

    ScenarioOutcome {
        id,
        result,
        detail,
        pairs,
    }
}

/// Build the graph from a snapshot and simulate all its scenarios.
///
/// A malformed topology fails the whole request before any scenario runs.
pub fn simulate_snapshot(
    snapshot: &Snapshot,
    options: &SimulationOptions,
) -> Result<Vec<ScenarioOutcome>, EngineError> {
    let graph = TopologyGraph::from_snapshot(&snapshot.topology)?;
    FlowSimulator::new(&graph, &snapshot.policies).simulate(&snapshot.scenarios, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Endpoint, Link, NodeType, TopologySnapshot};

    /// R1(internal) - FW1(firewall, dmz) - SRV(dmz)
    fn dmz_topology() -> TopologySnapshot {
        TopologySnapshot {
            nodes: vec![
                Node::new("R1", NodeType::Router, "internal"),
                Node::new("FW1", NodeType::Firewall, "dmz"),
                Node::new("SRV", NodeType::Server, "dmz"),
            ],
            links: vec![Link::new("R1", "FW1"), Link::new("FW1", "SRV")],
        }
    }

    fn web_scenario(id: &str) -> Scenario {
        Scenario::new(id, Endpoint::node("R1"), Endpoint::node("SRV"))
            .with_service("http")
            .with_protocol("tcp")
            .with_port(80)
    }

    fn deny_web_policy() -> Policy {
        Policy::new(Endpoint::zone("internal"), Endpoint::zone("dmz"), Action::Deny)
            .with_id("10")
            .with_service("http")
            .with_protocol("tcp")
            .with_port(80)
            .with_description("Block internal web access to DMZ")
    }

    fn sequential() -> SimulationOptions {
        SimulationOptions {
            parallelism: Parallelism::Sequential,
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_denied_by_zone_policy() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: vec![deny_web_policy()],
            scenarios: vec![web_scenario("s1")],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert!(outcomes[0].detail.contains("Block internal web access to DMZ"));
        assert!(outcomes[0].detail.contains("#10"));
        assert_eq!(outcomes[0].pairs[0].decided_at.as_deref(), Some("FW1"));
        assert_eq!(outcomes[0].pairs[0].policy.as_deref(), Some("10"));
        assert_eq!(outcomes[0].pairs[0].path, vec!["R1", "FW1", "SRV"]);
    }

    // Without the deny the flow needs an explicit permit at FW1; with no
    // policies at all it hits default deny (test_empty_policy_list_denies_across_firewall).
    #[test]
    fn test_end_to_end_permitted_once_deny_is_replaced() {
        let allow = Policy::new(Endpoint::zone("internal"), Endpoint::zone("dmz"), Action::Permit)
            .with_description("Inside may reach DMZ");
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: vec![allow],
            scenarios: vec![web_scenario("s1")],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Permitted);
        assert!(outcomes[0].detail.contains("Inside may reach DMZ"));
    }

    #[test]
    fn test_empty_policy_list_denies_across_firewall() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: Vec::new(),
            scenarios: vec![web_scenario("s1")],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert_eq!(outcomes[0].detail, "default deny at FW1 (no matching policy)");
        assert_eq!(outcomes[0].pairs[0].policy, None);
    }

    #[test]
    fn test_any_protocol_scenario_not_admitted_by_tcp_permit() {
        let permit_web = Policy::new(Endpoint::zone("internal"), Endpoint::zone("dmz"), Action::Permit)
            .with_protocol("tcp")
            .with_port(80);
        let scenario = Scenario::new("s1", Endpoint::node("R1"), Endpoint::node("SRV"))
            .with_protocol("any")
            .with_port(80);
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: vec![permit_web],
            scenarios: vec![scenario],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert_eq!(outcomes[0].detail, "default deny at FW1 (no matching policy)");
    }

    #[test]
    fn test_no_firewall_on_path_is_permitted() {
        let snapshot = Snapshot {
            topology: TopologySnapshot {
                nodes: vec![
                    Node::new("h1", NodeType::Host, "internal"),
                    Node::new("sw", NodeType::Switch, "internal"),
                    Node::new("h2", NodeType::Host, "internal"),
                ],
                links: vec![Link::new("h1", "sw"), Link::new("sw", "h2")],
            },
            policies: Vec::new(),
            scenarios: vec![Scenario::new("s1", Endpoint::node("h1"), Endpoint::node("h2"))],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Permitted);
        assert_eq!(outcomes[0].detail, "no firewall on path (2 hops)");
    }

    #[test]
    fn test_same_node_is_permitted_with_zero_hops() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: vec![Policy::new(Endpoint::zone("dmz"), Endpoint::zone("dmz"), Action::Deny)],
            scenarios: vec![Scenario::new("s1", Endpoint::node("FW1"), Endpoint::node("FW1"))],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Permitted);
        assert_eq!(outcomes[0].pairs[0].hops(), 0);
        assert_eq!(outcomes[0].pairs[0].decided_at, None);
        assert_eq!(outcomes[0].detail, DETAIL_SAME_NODE);
    }

    #[test]
    fn test_node_policy_masks_zone_policy_end_to_end() {
        // hostA, hostB (internal) - FW (internal) - WEB (external)
        let topology = TopologySnapshot {
            nodes: vec![
                Node::new("hostA", NodeType::Host, "internal"),
                Node::new("hostB", NodeType::Host, "internal"),
                Node::new("FW", NodeType::Firewall, "internal"),
                Node::new("WEB", NodeType::Server, "external"),
            ],
            links: vec![
                Link::new("hostA", "FW"),
                Link::new("hostB", "FW"),
                Link::new("FW", "WEB"),
            ],
        };
        let snapshot = Snapshot {
            topology,
            policies: vec![
                Policy::new(Endpoint::zone("internal"), Endpoint::zone("external"), Action::Deny),
                Policy::new(Endpoint::node("hostA"), Endpoint::zone("external"), Action::Permit),
            ],
            scenarios: vec![
                Scenario::new("a", Endpoint::node("hostA"), Endpoint::zone("external")),
                Scenario::new("b", Endpoint::node("hostB"), Endpoint::zone("external")),
            ],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Permitted);
        assert_eq!(outcomes[1].result, ScenarioResult::Denied);
    }

    #[test]
    fn test_unknown_endpoint_is_scoped_to_its_scenario() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: Vec::new(),
            scenarios: vec![
                Scenario::new("bad", Endpoint::node("ghost"), Endpoint::node("SRV")),
                Scenario::new("good", Endpoint::node("FW1"), Endpoint::node("FW1")),
            ],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert_eq!(outcomes[0].detail, DETAIL_UNKNOWN_ENDPOINT);
        assert_eq!(outcomes[1].result, ScenarioResult::Permitted);
    }

    #[test]
    fn test_unreachable_pair_is_denied() {
        let mut topology = dmz_topology();
        topology.nodes.push(Node::new("ISLAND", NodeType::Host, "external"));
        let snapshot = Snapshot {
            topology,
            policies: Vec::new(),
            scenarios: vec![Scenario::new("s", Endpoint::node("R1"), Endpoint::node("ISLAND"))],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert_eq!(outcomes[0].detail, DETAIL_NO_PATH);
        assert!(outcomes[0].pairs[0].path.is_empty());
    }

    #[test]
    fn test_any_denied_pair_denies_zone_scenario() {
        // R1 reaches SRV through FW1; a second internal host hangs off nothing
        let mut topology = dmz_topology();
        topology.nodes.push(Node::new("H9", NodeType::Host, "internal"));
        let snapshot = Snapshot {
            topology,
            policies: vec![Policy::new(Endpoint::zone("internal"), Endpoint::zone("dmz"), Action::Permit)],
            scenarios: vec![Scenario::new("s", Endpoint::zone("internal"), Endpoint::node("SRV"))],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        let outcome = &outcomes[0];
        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[0].source, "H9");
        assert_eq!(outcome.pairs[0].result, ScenarioResult::Denied);
        assert_eq!(outcome.pairs[1].result, ScenarioResult::Permitted);
        assert_eq!(outcome.result, ScenarioResult::Denied);
        assert_eq!(outcome.detail, "H9 -> SRV: no network path");
    }

    #[test]
    fn test_empty_zone_endpoint_is_denied() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: Vec::new(),
            scenarios: vec![Scenario::new("s", Endpoint::node("R1"), Endpoint::zone("external"))],
        };

        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].result, ScenarioResult::Denied);
        assert_eq!(outcomes[0].detail, DETAIL_EMPTY_ENDPOINT);
    }

    #[test]
    fn test_malformed_topology_aborts_request() {
        let mut topology = dmz_topology();
        topology.links.push(Link::new("SRV", "NOPE"));
        let snapshot = Snapshot {
            topology,
            policies: Vec::new(),
            scenarios: vec![web_scenario("s1")],
        };

        let err = simulate_snapshot(&snapshot, &sequential()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedTopology(_)));
    }

    #[test]
    fn test_parallel_matches_sequential_order_and_results() {
        let mut scenarios = Vec::new();
        for i in 0..64 {
            let scenario = match i % 4 {
                0 => web_scenario(&format!("s{}", i)),
                1 => Scenario::new(format!("s{}", i), Endpoint::node("SRV"), Endpoint::node("R1")),
                2 => Scenario::new(format!("s{}", i), Endpoint::zone("dmz"), Endpoint::zone("internal")),
                _ => Scenario::new(format!("s{}", i), Endpoint::node("ghost"), Endpoint::node("R1")),
            };
            scenarios.push(scenario);
        }
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: vec![
                deny_web_policy(),
                Policy::new(Endpoint::zone("dmz"), Endpoint::zone("internal"), Action::Permit),
            ],
            scenarios,
        };

        let sequential_results = simulate_snapshot(&snapshot, &sequential()).unwrap();
        let parallel_results = simulate_snapshot(&snapshot, &SimulationOptions::default()).unwrap();
        assert_eq!(sequential_results, parallel_results);

        let ids: Vec<String> = parallel_results.iter().map(|o| o.id.clone()).collect();
        let expected: Vec<String> = (0..64).map(|i| format!("s{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_cancelled_token_aborts_batch() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: Vec::new(),
            scenarios: vec![web_scenario("s1"), web_scenario("s2")],
        };
        let options = SimulationOptions::default();
        options.cancel.cancel();

        let err = simulate_snapshot(&snapshot, &options).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let token = CancelToken::new().with_deadline(Instant::now());
        assert!(token.is_cancelled());

        let token = CancelToken::new().with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_scenario_without_id_gets_positional_id() {
        let snapshot = Snapshot {
            topology: dmz_topology(),
            policies: Vec::new(),
            scenarios: vec![
                Scenario::new("", Endpoint::node("R1"), Endpoint::node("R1")),
                Scenario::new("", Endpoint::node("SRV"), Endpoint::node("SRV")),
            ],
        };
        let outcomes = simulate_snapshot(&snapshot, &sequential()).unwrap();
        assert_eq!(outcomes[0].id, "1");
        assert_eq!(outcomes[1].id, "2");
    }
}
