//! Structural segmentation checks over a topology.
//!
//! Every check is independent of policies and scenarios. Findings come out in
//! check order, then node id order, so the same topology always produces the
//! same list.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::model::{Finding, Level, Node, Zone};
use crate::topology::TopologyGraph;

pub const CHECK_VLAN_COLLISION: &str = "vlan-collision";
pub const CHECK_MISSING_METADATA: &str = "missing-metadata";
pub const CHECK_UNPROTECTED_DMZ: &str = "unprotected-dmz";
pub const CHECK_INTERNAL_EXPOSED: &str = "internal-exposed";
pub const CHECK_SUBNET_OVERLAP: &str = "subnet-overlap";
pub const CHECK_ORPHAN_SUBNET: &str = "orphan-subnet";

// ============================================================================
// Analysis
// ============================================================================

/// Run the full battery of checks.
pub fn analyze(graph: &TopologyGraph) -> Vec<Finding> {
    let mut findings = Vec::new();

    check_vlan_collision(graph, &mut findings);
    check_missing_metadata(graph, &mut findings);
    check_unprotected_dmz(graph, &mut findings);
    check_internal_exposed(graph, &mut findings);
    check_subnet_overlap(graph, &mut findings);
    check_orphan_subnet(graph, &mut findings);

    debug!(
        findings = findings.len(),
        critical = findings.iter().filter(|f| f.level == Level::Critical).count(),
        "segmentation analysis complete"
    );
    findings
}

/// Highest level present, if any.
pub fn worst_level(findings: &[Finding]) -> Option<Level> {
    findings.iter().map(|f| f.level).max()
}

fn finding(level: Level, check: &str, message: String, nodes: Vec<String>) -> Finding {
    Finding {
        level,
        check: check.to_string(),
        message,
        nodes,
    }
}

/// The same VLAN id carried into more than one zone.
fn check_vlan_collision(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    let mut by_vlan: BTreeMap<u16, (BTreeSet<&Zone>, Vec<String>)> = BTreeMap::new();
    for node in graph.nodes() {
        if let Some(vlan) = node.vlan {
            let entry = by_vlan.entry(vlan).or_default();
            entry.0.insert(&node.zone);
            entry.1.push(node.id.clone());
        }
    }

    for (vlan, (zones, nodes)) in by_vlan {
        if zones.len() < 2 {
            continue;
        }
        let zones: Vec<&str> = zones.iter().map(|z| z.as_str()).collect();
        findings.push(finding(
            Level::Warning,
            CHECK_VLAN_COLLISION,
            format!("VLAN {} is used in multiple zones: {}", vlan, zones.join(", ")),
            nodes,
        ));
    }
}

/// Nodes with no subnet and no VLAN in a zone where peers carry both.
fn check_missing_metadata(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    let zones_with_metadata: BTreeSet<&Zone> = graph
        .nodes()
        .filter(|n| n.has_segmentation_metadata())
        .map(|n| &n.zone)
        .collect();

    for node in graph.nodes() {
        if node.has_no_segmentation_metadata() && zones_with_metadata.contains(&node.zone) {
            findings.push(finding(
                Level::Info,
                CHECK_MISSING_METADATA,
                format!(
                    "Node '{}' has no subnet or VLAN while other nodes in zone '{}' do",
                    node.label(),
                    node.zone
                ),
                vec![node.id.clone()],
            ));
        }
    }
}

fn external_neighbors<'g>(graph: &'g TopologyGraph, node: &Node) -> impl Iterator<Item = &'g Node> {
    graph
        .neighbors(&node.id)
        .into_iter()
        .filter(|n| n.zone.is_external())
}

/// DMZ nodes wired straight to the outside with nothing enforcing policy.
fn check_unprotected_dmz(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    for node in graph.nodes().filter(|n| n.zone.is_dmz()) {
        for outside in external_neighbors(graph, node) {
            if node.is_firewall_capable() || outside.is_firewall_capable() {
                continue;
            }
            findings.push(finding(
                Level::Critical,
                CHECK_UNPROTECTED_DMZ,
                format!(
                    "DMZ node '{}' links directly to external node '{}' without a firewall",
                    node.label(),
                    outside.label()
                ),
                vec![node.id.clone(), outside.id.clone()],
            ));
        }
    }
}

/// Internal nodes adjacent to the outside with zero intermediaries.
/// Firewalls are not exempt.
fn check_internal_exposed(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    for node in graph.nodes().filter(|n| n.zone.is_internal()) {
        for outside in external_neighbors(graph, node) {
            findings.push(finding(
                Level::Critical,
                CHECK_INTERNAL_EXPOSED,
                format!(
                    "Internal node '{}' is directly adjacent to external node '{}'",
                    node.label(),
                    outside.label()
                ),
                vec![node.id.clone(), outside.id.clone()],
            ));
        }
    }
}

/// Address space shared across zone boundaries.
fn check_subnet_overlap(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    let networks: Vec<(&Node, ipnet::IpNet)> = graph
        .nodes()
        .filter_map(|n| n.network().map(|net| (n, net)))
        .collect();

    for (i, (a, net_a)) in networks.iter().enumerate() {
        for (b, net_b) in &networks[i + 1..] {
            if a.zone == b.zone {
                continue;
            }
            if net_a.contains(net_b) || net_b.contains(net_a) {
                findings.push(finding(
                    Level::Warning,
                    CHECK_SUBNET_OVERLAP,
                    format!(
                        "Subnet {} of '{}' ({}) overlaps {} of '{}' ({})",
                        net_a,
                        a.label(),
                        a.zone,
                        net_b,
                        b.label(),
                        b.zone
                    ),
                    vec![a.id.clone(), b.id.clone()],
                ));
            }
        }
    }
}

/// Nodes that own a subnet but connect to nothing.
fn check_orphan_subnet(graph: &TopologyGraph, findings: &mut Vec<Finding>) {
    for node in graph.nodes() {
        if let Some(net) = node.network() {
            if graph.degree(&node.id) == 0 {
                findings.push(finding(
                    Level::Info,
                    CHECK_ORPHAN_SUBNET,
                    format!("Subnet {} on node '{}' is not linked to anything", net, node.label()),
                    vec![node.id.clone()],
                ));
            }
        }
    }
}
