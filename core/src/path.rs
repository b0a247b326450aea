//! Shortest-path search over the undirected topology.

use std::collections::{BTreeMap, VecDeque};

use crate::model::Node;
use crate::topology::TopologyGraph;

/// Fewest-hop path from `source` to `dest`, endpoints included.
///
/// Neighbors are expanded in ascending id order and the first predecessor to
/// reach a node is kept, so among equally short paths the result is always
/// the same one. Returns `None` when the nodes are disconnected or unknown.
pub fn find_path<'g>(source: &str, dest: &str, graph: &'g TopologyGraph) -> Option<Vec<&'g Node>> {
    let start = graph.node_by_id(source)?;
    graph.node_by_id(dest)?;

    if source == dest {
        return Some(vec![start]);
    }

    let mut predecessor: BTreeMap<&'g str, &'g str> = BTreeMap::new();
    let mut queue: VecDeque<&'g str> = VecDeque::new();
    predecessor.insert(start.id.as_str(), start.id.as_str());
    queue.push_back(start.id.as_str());

    while let Some(current) = queue.pop_front() {
        for next in graph.neighbor_ids(current) {
            let next = next.as_str();
            if predecessor.contains_key(next) {
                continue;
            }
            predecessor.insert(next, current);
            if next == dest {
                return Some(unwind(&predecessor, start.id.as_str(), next, graph));
            }
            queue.push_back(next);
        }
    }

    None
}

fn unwind<'g>(
    predecessor: &BTreeMap<&'g str, &'g str>,
    start: &str,
    end: &'g str,
    graph: &'g TopologyGraph,
) -> Vec<&'g Node> {
    let mut ids = vec![end];
    let mut cursor = end;
    while cursor != start {
        match predecessor.get(cursor) {
            Some(prev) => {
                cursor = *prev;
                ids.push(cursor);
            }
            None => break,
        }
    }
    ids.reverse();
    ids.into_iter().filter_map(|id| graph.node_by_id(id)).collect()
}

/// Number of links traversed by a path.
pub fn hops(path: &[&Node]) -> usize {
    path.len().saturating_sub(1)
}
