//! Endpoint resolution: turns a zone or node reference into concrete nodes.

use std::collections::BTreeSet;

use crate::error::EngineError;
use crate::model::{Endpoint, Node, Zone};
use crate::topology::TopologyGraph;

/// Expand an endpoint into the nodes it denotes, ascending by id.
///
/// A node reference must name exactly one node, by id or else by a unique
/// display name. A zone reference may legitimately match nothing.
pub fn resolve<'g>(endpoint: &Endpoint, graph: &'g TopologyGraph) -> Result<Vec<&'g Node>, EngineError> {
    match endpoint {
        Endpoint::Node(id) => graph
            .node_by_id(id)
            .or_else(|| graph.node_by_name(id))
            .map(|node| vec![node])
            .ok_or_else(|| EngineError::UnknownNode(id.clone())),
        Endpoint::Zone(zone) => Ok(graph.nodes_in_zone(zone)),
    }
}

/// Membership view of a resolved endpoint, used for policy matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    members: BTreeSet<String>,
    zones: BTreeSet<Zone>,
}

impl ResolvedEndpoint {
    pub fn resolve(endpoint: &Endpoint, graph: &TopologyGraph) -> Result<Self, EngineError> {
        let nodes = resolve(endpoint, graph)?;
        let mut resolved = ResolvedEndpoint::default();
        for node in nodes {
            resolved.members.insert(node.id.clone());
            resolved.zones.insert(node.zone.clone());
        }
        // An empty zone still anchors policies at firewalls in that zone
        if let Endpoint::Zone(zone) = endpoint {
            resolved.zones.insert(zone.clone());
        }
        Ok(resolved)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.members.contains(node_id)
    }

    /// True when any member lives in `zone`, or the endpoint names `zone`.
    pub fn touches_zone(&self, zone: &Zone) -> bool {
        self.zones.contains(zone)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
