//! Error types for topology construction and evaluation.

use thiserror::Error;

/// Structural problems in a caller-supplied topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("link references unknown node '{node}' ({a} <-> {b})")]
    UnknownLinkEndpoint { a: String, b: String, node: String },

    #[error("self-link on node '{0}'")]
    SelfLink(String),
}

/// Errors surfaced by the engine.
///
/// `MalformedTopology` aborts a whole request. `UnknownNode` is scoped to the
/// single policy or scenario whose endpoint failed to resolve.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed topology: {0}")]
    MalformedTopology(#[from] TopologyError),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("simulation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),
}
