//! Structured audit record for one evaluation.
//!
//! Serialized as a single JSON line and appended to the audit log, so every
//! simulate or analyze run can be traced back to the exact snapshot it saw.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

use securenet_core::{Finding, Level, ScenarioOutcome, Snapshot, ENGINE_NAME, VERSION};

/// First 16 hex chars of the SHA-256 of the raw snapshot text.
pub fn snapshot_hash(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..8])
}

/// Verdict and finding tallies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tally {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permitted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationLog {
    pub evaluation_id: String,
    pub timestamp: DateTime<Utc>,
    pub engine: &'static str,
    pub version: &'static str,
    pub command: String,
    pub snapshot_hash: String,
    pub nodes: usize,
    pub links: usize,
    pub policies: usize,
    pub scenarios: usize,
    pub tally: Tally,
    /// `ok`, or the error that ended the run
    pub outcome: String,
    pub duration_ms: u64,

    #[serde(skip)]
    start: Option<Instant>,
}

impl EvaluationLog {
    pub fn new(command: &str, raw: &str, snapshot: &Snapshot, start: Instant) -> Self {
        EvaluationLog {
            evaluation_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            engine: ENGINE_NAME,
            version: VERSION,
            command: command.to_string(),
            snapshot_hash: snapshot_hash(raw),
            nodes: snapshot.topology.nodes.len(),
            links: snapshot.topology.links.len(),
            policies: snapshot.policies.len(),
            scenarios: snapshot.scenarios.len(),
            tally: Tally::default(),
            outcome: "ok".to_string(),
            duration_ms: 0,
            start: Some(start),
        }
    }

    pub fn record_outcomes(&mut self, outcomes: &[ScenarioOutcome]) {
        let permitted = outcomes.iter().filter(|o| o.is_permitted()).count();
        self.tally.permitted = Some(permitted);
        self.tally.denied = Some(outcomes.len() - permitted);
    }

    pub fn record_findings(&mut self, findings: &[Finding]) {
        let count = |level: Level| findings.iter().filter(|f| f.level == level).count();
        self.tally.info = Some(count(Level::Info));
        self.tally.warning = Some(count(Level::Warning));
        self.tally.critical = Some(count(Level::Critical));
    }

    pub fn set_outcome(&mut self, outcome: &str) {
        self.outcome = outcome.to_string();
    }

    /// Stamp the duration. Safe to call more than once.
    pub fn finalize(&mut self) {
        if let Some(start) = self.start {
            self.duration_ms = start.elapsed().as_millis() as u64;
        }
    }

    /// Append this record as one JSON line.
    pub fn append_to(&self, path: &Path) -> std::io::Result<()> {
        let line = serde_json::to_string(self)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)
    }
}
