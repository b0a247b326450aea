//! Snapshot input module.
//!
//! Loads evaluation snapshots in the formats the editor and backend produce
//! and records what each evaluation saw.

mod loader;
mod logging;
mod types;

pub use loader::{
    decompress_payload, load_snapshot, parse, parse_json, parse_packed, DeployPayload, Encoding,
    LoadError, LoadedSnapshot,
};
pub use logging::{snapshot_hash, EvaluationLog, Tally};
pub use types::{
    parse_label, ApiPolicy, ApiScenario, EditorDocument, EditorEdge, EditorNode, EditorNodeData,
    LabelParts, NodePosition, PolicyRecord, ScenarioRecord,
};
