//! Policy matching with specificity-based precedence.
//!
//! A flow is matched against every policy; the most specific matching policy
//! decides it and ties go to the earliest declaration. When nothing matches the
//! flow is denied.

use tracing::{debug, warn};

use crate::endpoint::ResolvedEndpoint;
use crate::error::EngineError;
use crate::model::{Action, Node, Policy, Protocol};
use crate::topology::TopologyGraph;

/// A concrete flow between two resolved nodes.
#[derive(Debug, Clone, Copy)]
pub struct Flow<'a> {
    pub source: &'a Node,
    pub dest: &'a Node,
    /// `None` (or `Any`) matches every policy protocol
    pub protocol: Option<&'a Protocol>,
    /// `None` matches every policy port
    pub port: Option<u16>,
}

/// Outcome of matching one flow.
#[derive(Debug, Clone, Copy)]
pub struct Decision<'p> {
    pub action: Action,
    /// The deciding policy; `None` means the fail-closed default applied
    pub policy: Option<&'p CompiledPolicy>,
}

impl Decision<'_> {
    pub fn is_permit(&self) -> bool {
        self.action == Action::Permit
    }
}

/// Specificity score: +2 per node endpoint, +1 per zone endpoint, +1 for an
/// explicit port, +1 for an explicit non-wildcard protocol.
pub fn specificity(policy: &Policy) -> u8 {
    policy.source.weight()
        + policy.dest.weight()
        + u8::from(policy.port.is_some())
        + u8::from(policy.explicit_protocol().is_some())
}

/// A policy with its endpoints resolved against one topology.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub index: usize,
    pub policy: Policy,
    source: ResolvedEndpoint,
    dest: ResolvedEndpoint,
    score: u8,
}

impl CompiledPolicy {
    pub fn compile(index: usize, policy: &Policy, graph: &TopologyGraph) -> Result<Self, EngineError> {
        let mut policy = policy.clone();
        if policy.id.trim().is_empty() {
            policy.id = (index + 1).to_string();
        }
        Ok(CompiledPolicy {
            index,
            source: ResolvedEndpoint::resolve(&policy.source, graph)?,
            dest: ResolvedEndpoint::resolve(&policy.dest, graph)?,
            score: specificity(&policy),
            policy,
        })
    }

    pub fn specificity(&self) -> u8 {
        self.score
    }

    pub fn matches(&self, flow: &Flow<'_>) -> bool {
        self.source.contains(&flow.source.id)
            && self.dest.contains(&flow.dest.id)
            && protocol_matches(self.policy.protocol.as_ref(), flow.protocol)
            && port_matches(self.policy.port, flow.port)
    }

    /// Whether a firewall at `node` enforces this policy: either endpoint
    /// includes the node itself or anything in the node's zone.
    pub fn applies_at(&self, node: &Node) -> bool {
        self.source.contains(&node.id)
            || self.dest.contains(&node.id)
            || self.source.touches_zone(&node.zone)
            || self.dest.touches_zone(&node.zone)
    }
}

fn protocol_matches(policy: Option<&Protocol>, flow: Option<&Protocol>) -> bool {
    match (policy, flow) {
        // Absent matches either way; `any` widens only on the policy side
        (None, _) | (_, None) => true,
        (Some(p), Some(f)) => p.is_wildcard() || p == f,
    }
}

fn port_matches(policy: Option<u16>, flow: Option<u16>) -> bool {
    match (policy, flow) {
        (Some(p), Some(f)) => p == f,
        _ => true,
    }
}

/// Pick the deciding policy among `candidates` (in declaration order).
pub fn decide<'p, I>(flow: &Flow<'_>, candidates: I) -> Decision<'p>
where
    I: IntoIterator<Item = &'p CompiledPolicy>,
{
    let mut best: Option<&'p CompiledPolicy> = None;
    for candidate in candidates {
        if !candidate.matches(flow) {
            continue;
        }
        match best {
            Some(current) if current.score >= candidate.score => {}
            _ => best = Some(candidate),
        }
    }

    match best {
        Some(policy) => Decision {
            action: policy.policy.action,
            policy: Some(policy),
        },
        None => Decision {
            action: Action::Deny,
            policy: None,
        },
    }
}

/// A policy whose node endpoint does not exist in the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPolicy {
    pub policy_id: String,
    pub node: String,
}

/// Ordered policy list compiled against one topology snapshot.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    compiled: Vec<CompiledPolicy>,
    unresolved: Vec<UnresolvedPolicy>,
}

impl PolicySet {
    /// Resolve every policy. A policy naming an unknown node is set aside and
    /// never matches; the rest of the set is unaffected.
    pub fn compile(policies: &[Policy], graph: &TopologyGraph) -> Self {
        let mut set = PolicySet::default();
        for (index, policy) in policies.iter().enumerate() {
            match CompiledPolicy::compile(index, policy, graph) {
                Ok(compiled) => set.compiled.push(compiled),
                Err(EngineError::UnknownNode(node)) => {
                    let policy_id = if policy.id.trim().is_empty() {
                        (index + 1).to_string()
                    } else {
                        policy.id.clone()
                    };
                    warn!(policy = %policy_id, node = %node, "policy references unknown node; ignoring it");
                    set.unresolved.push(UnresolvedPolicy { policy_id, node });
                }
                Err(e) => {
                    warn!(index, error = %e, "failed to compile policy; ignoring it");
                }
            }
        }
        set
    }

    /// Decide a flow against the whole set.
    pub fn decide(&self, flow: &Flow<'_>) -> Decision<'_> {
        decide(flow, &self.compiled)
    }

    /// Decide a flow at a firewall, considering only policies it enforces.
    pub fn decide_at(&self, firewall: &Node, flow: &Flow<'_>) -> Decision<'_> {
        let decision = decide(flow, self.compiled.iter().filter(|p| p.applies_at(firewall)));
        debug!(
            firewall = %firewall.id,
            source = %flow.source.id,
            dest = %flow.dest.id,
            action = %decision.action,
            policy = decision.policy.map(|p| p.policy.id.as_str()).unwrap_or("default"),
            "firewall decision"
        );
        decision
    }

    pub fn applicable_at<'s, 'n>(&'s self, node: &'n Node) -> impl Iterator<Item = &'s CompiledPolicy> + 'n
    where
        's: 'n,
    {
        self.compiled.iter().filter(move |p| p.applies_at(node))
    }

    pub fn unresolved(&self) -> &[UnresolvedPolicy] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}
