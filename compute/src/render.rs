//! Terminal rendering and the `inspect` summary.

use serde::Serialize;

use securenet_core::{
    Finding, PolicySet, ScenarioOutcome, ScenarioResult, TopologyGraph, ENGINE_NAME, VERSION,
};

use crate::snapshot::{snapshot_hash, Encoding, LoadedSnapshot};

/// Summary printed by `securenet inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub engine: &'static str,
    pub version: &'static str,
    pub format: String,
    pub snapshot_hash: String,
    pub nodes_count: usize,
    pub links_count: usize,
    pub policies_count: usize,
    pub scenarios_count: usize,
    pub zones: Vec<String>,
    /// Policies that name a node the topology does not have
    pub inert_policies: Vec<String>,
    /// Why the topology cannot be evaluated, if it cannot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_error: Option<String>,
}

impl Inspection {
    pub fn new(loaded: &LoadedSnapshot) -> Self {
        let snapshot = &loaded.snapshot;
        let format = match loaded.encoding {
            Encoding::Json => "json",
            Encoding::Ron => "ron",
            Encoding::Packed => "packed",
        };

        let mut inspection = Inspection {
            engine: ENGINE_NAME,
            version: VERSION,
            format: format.to_string(),
            snapshot_hash: snapshot_hash(&loaded.raw),
            nodes_count: snapshot.topology.nodes.len(),
            links_count: snapshot.topology.links.len(),
            policies_count: snapshot.policies.len(),
            scenarios_count: snapshot.scenarios.len(),
            zones: Vec::new(),
            inert_policies: Vec::new(),
            topology_error: None,
        };

        match TopologyGraph::from_snapshot(&snapshot.topology) {
            Ok(graph) => {
                inspection.zones = graph.zones().map(|z| z.to_string()).collect();
                inspection.inert_policies = PolicySet::compile(&snapshot.policies, &graph)
                    .unresolved()
                    .iter()
                    .map(|u| format!("#{} (unknown node {})", u.policy_id, u.node))
                    .collect();
            }
            Err(e) => inspection.topology_error = Some(e.to_string()),
        }
        inspection
    }
}

pub fn render_inspection(inspection: &Inspection) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(&format!("{} {}\n", inspection.engine, inspection.version));
    out.push_str(&"=".repeat(40));
    out.push('\n');
    out.push_str(&format!("  format:    {}\n", inspection.format));
    out.push_str(&format!("  hash:      {}\n", inspection.snapshot_hash));
    out.push_str(&format!("  nodes:     {}\n", inspection.nodes_count));
    out.push_str(&format!("  links:     {}\n", inspection.links_count));
    out.push_str(&format!("  policies:  {}\n", inspection.policies_count));
    out.push_str(&format!("  scenarios: {}\n", inspection.scenarios_count));
    if !inspection.zones.is_empty() {
        out.push_str(&format!("  zones:     {}\n", inspection.zones.join(", ")));
    }
    for inert in &inspection.inert_policies {
        out.push_str(&format!("  inert policy {}\n", inert));
    }
    if let Some(err) = &inspection.topology_error {
        out.push_str(&format!("  topology error: {}\n", err));
    }
    out
}

/// Render simulation outcomes, one block per scenario.
pub fn render_outcomes(outcomes: &[ScenarioOutcome]) -> String {
    let mut out = String::with_capacity(256 * outcomes.len().max(1));
    let permitted = outcomes.iter().filter(|o| o.is_permitted()).count();

    out.push_str(&format!(
        "Scenarios ({}: {} permitted, {} denied)\n",
        outcomes.len(),
        permitted,
        outcomes.len() - permitted
    ));
    out.push_str(&"-".repeat(30));
    out.push('\n');

    for outcome in outcomes {
        let verdict = match outcome.result {
            ScenarioResult::Permitted => "PERMITTED",
            ScenarioResult::Denied => "DENIED",
            ScenarioResult::Pending => "PENDING",
        };
        out.push_str(&format!("  [{}] {}: {}\n", outcome.id, verdict, outcome.detail));
        for pair in &outcome.pairs {
            let path = if pair.path.is_empty() {
                "(no path)".to_string()
            } else {
                pair.path.join(" -> ")
            };
            let at = pair
                .decided_at
                .as_deref()
                .map(|n| format!(" @ {}", n))
                .unwrap_or_default();
            out.push_str(&format!("      {} => {}{}\n", path, pair.result, at));
        }
    }
    out
}

/// Render findings the way a linter would.
pub fn render_findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "No segmentation findings.\n".to_string();
    }
    let mut out = String::new();
    for f in findings {
        out.push_str(&format!("[{}] {}: {}\n", f.level, f.check, f.message));
    }
    out
}
