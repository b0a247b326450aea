//! In-memory topology graph.
//!
//! Built once per evaluation request from a caller-supplied snapshot and
//! treated as read-only afterwards. All id-keyed collections are ordered so
//! traversal order (and therefore every derived result) is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TopologyError;
use crate::model::{Link, Node, TopologySnapshot, Zone};

/// Undirected graph of nodes and links, indexed by id and zone.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: BTreeMap<String, Node>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
    zones: BTreeMap<Zone, BTreeSet<String>>,
    links: Vec<Link>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a snapshot, rejecting duplicate ids, self-links and
    /// links to unknown nodes.
    pub fn from_snapshot(snapshot: &TopologySnapshot) -> Result<Self, TopologyError> {
        let mut graph = Self::new();
        for node in &snapshot.nodes {
            graph.add_node(node.clone())?;
        }
        for link in &snapshot.links {
            graph.add_link(link.clone())?;
        }
        tracing::debug!(
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            zones = graph.zones.len(),
            "built topology graph"
        );
        Ok(graph)
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), TopologyError> {
        if self.nodes.contains_key(&node.id) {
            return Err(TopologyError::DuplicateNode(node.id));
        }
        self.zones
            .entry(node.zone.clone())
            .or_default()
            .insert(node.id.clone());
        self.adjacency.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Connect two existing nodes. Parallel links collapse into one adjacency.
    pub fn add_link(&mut self, link: Link) -> Result<(), TopologyError> {
        if link.a == link.b {
            return Err(TopologyError::SelfLink(link.a));
        }
        for end in [&link.a, &link.b] {
            if !self.nodes.contains_key(end) {
                return Err(TopologyError::UnknownLinkEndpoint {
                    a: link.a.clone(),
                    b: link.b.clone(),
                    node: end.clone(),
                });
            }
        }
        self.adjacency
            .entry(link.a.clone())
            .or_default()
            .insert(link.b.clone());
        self.adjacency
            .entry(link.b.clone())
            .or_default()
            .insert(link.a.clone());
        self.links.push(link);
        Ok(())
    }

    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The node carrying this display name, if exactly one does.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        let mut matches = self
            .nodes
            .values()
            .filter(|n| n.name.as_deref() == Some(name));
        match (matches.next(), matches.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// Nodes in a zone, ascending by id. Unknown zones yield nothing.
    pub fn nodes_in_zone(&self, zone: &Zone) -> Vec<&Node> {
        self.zones
            .get(zone)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Adjacent nodes, ascending by id.
    pub fn neighbors(&self, id: &str) -> Vec<&Node> {
        self.neighbor_ids(id)
            .filter_map(|n| self.nodes.get(n))
            .collect()
    }

    pub(crate) fn neighbor_ids<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a String> + 'a {
        self.adjacency.get(id).into_iter().flatten()
    }

    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    /// All nodes, ascending by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;

    fn snapshot() -> TopologySnapshot {
        TopologySnapshot {
            nodes: vec![
                Node::new("r1", NodeType::Router, "internal").with_name("R1"),
                Node::new("fw1", NodeType::Firewall, "dmz").with_name("FW1"),
                Node::new("srv", NodeType::Server, "dmz").with_name("SRV_WEB"),
                Node::new("h1", NodeType::Host, "internal"),
            ],
            links: vec![
                Link::new("r1", "fw1"),
                Link::new("fw1", "srv"),
                Link::new("h1", "r1"),
            ],
        }
    }

    #[test]
    fn test_build_indexes_nodes_and_zones() {
        let graph = TopologyGraph::from_snapshot(&snapshot()).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.links().len(), 3);

        let dmz: Vec<&str> = graph
            .nodes_in_zone(&Zone::dmz())
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(dmz, vec!["fw1", "srv"]);
        assert!(graph.nodes_in_zone(&Zone::external()).is_empty());
    }

    #[test]
    fn test_neighbors_are_undirected_and_sorted() {
        let graph = TopologyGraph::from_snapshot(&snapshot()).unwrap();
        let ids: Vec<&str> = graph.neighbors("r1").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["fw1", "h1"]);

        let ids: Vec<&str> = graph.neighbors("srv").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["fw1"]);
        assert!(graph.neighbors("missing").is_empty());
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut snap = snapshot();
        snap.nodes.push(Node::new("r1", NodeType::Host, "external"));
        let err = TopologyGraph::from_snapshot(&snap).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateNode("r1".to_string()));
    }

    #[test]
    fn test_link_to_unknown_node_rejected() {
        let mut snap = snapshot();
        snap.links.push(Link::new("srv", "ghost"));
        let err = TopologyGraph::from_snapshot(&snap).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::UnknownLinkEndpoint { ref node, .. } if node == "ghost"
        ));
    }

    #[test]
    fn test_self_link_rejected() {
        let mut snap = snapshot();
        snap.links.push(Link::new("srv", "srv"));
        let err = TopologyGraph::from_snapshot(&snap).unwrap_err();
        assert_eq!(err, TopologyError::SelfLink("srv".to_string()));
    }

    #[test]
    fn test_node_by_name_requires_unique_match() {
        let mut snap = snapshot();
        let graph = TopologyGraph::from_snapshot(&snap).unwrap();
        assert_eq!(graph.node_by_name("SRV_WEB").map(|n| n.id.as_str()), Some("srv"));

        snap.nodes.push(Node::new("srv2", NodeType::Server, "dmz").with_name("SRV_WEB"));
        let graph = TopologyGraph::from_snapshot(&snap).unwrap();
        assert!(graph.node_by_name("SRV_WEB").is_none());
    }

    #[test]
    fn test_parallel_links_collapse() {
        let mut snap = snapshot();
        snap.links.push(Link::new("fw1", "r1"));
        let graph = TopologyGraph::from_snapshot(&snap).unwrap();
        assert_eq!(graph.degree("r1"), 2);
    }
}
