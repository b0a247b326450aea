//! Snapshot loader with compression support.
//!
//! Accepts the engine's own snapshot format (JSON or RON), the editor's
//! document format (nodes + edges + policies + scenarios) and packed payloads
//! as exported by the editor's deploy step.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use securenet_core::Snapshot;

use super::types::EditorDocument;

/// Envelope written by the editor's deploy step.
#[derive(Debug, Deserialize)]
pub struct DeployPayload {
    pub version: String,
    #[serde(rename = "deployedAt")]
    pub deployed_at: String,
    pub snapshot_packed: String,
}

/// Errors that can occur during snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Gzip decompression error: {0}")]
    DecompressError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("RON parse error: {0}")]
    RonError(#[from] ron::error::SpannedError),

    #[error("Invalid snapshot format: expected topology, or nodes and edges")]
    InvalidFormat,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Empty snapshot payload")]
    EmptyPayload,
}

/// Input encodings the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Ron,
    /// `base64(gzip(json))` or `raw:` + `base64(json)`
    Packed,
}

impl Encoding {
    /// Pick an encoding from the file extension, falling back to the content.
    pub fn detect(path: &Path, content: &str) -> Encoding {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Encoding::Json,
            Some("ron") => Encoding::Ron,
            _ => match content.trim_start().chars().next() {
                Some('{') => Encoding::Json,
                Some('(') => Encoding::Ron,
                _ => Encoding::Packed,
            },
        }
    }
}

/// A parsed snapshot together with the exact text it came from.
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    /// Raw input, hashed for the audit log
    pub raw: String,
    pub encoding: Encoding,
}

/// Decompresses a packed payload into its JSON text.
///
/// Expected encoding: base64(gzip(JSON)) or "raw:" + base64(JSON)
pub fn decompress_payload(packed: &str) -> Result<String, LoadError> {
    let packed = packed.trim();
    if packed.is_empty() {
        return Err(LoadError::EmptyPayload);
    }

    let json = if let Some(b64) = packed.strip_prefix("raw:") {
        // Uncompressed fallback format
        let bytes = BASE64.decode(b64)?;
        String::from_utf8(bytes)?
    } else {
        // Compressed format: base64(gzip(json))
        let compressed = BASE64.decode(packed)?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut json = String::new();
        decoder.read_to_string(&mut json)?;
        json
    };
    Ok(json)
}

/// Parse JSON in any supported shape: engine snapshot, editor document, or
/// a deploy envelope around a packed payload.
pub fn parse_json(json: &str) -> Result<Snapshot, LoadError> {
    let value: serde_json::Value = serde_json::from_str(json)?;

    if value.get("topology").is_some() || value.get("topologia").is_some() {
        return Ok(serde_json::from_value(value)?);
    }

    if value.get("nodes").is_some() && value.get("edges").is_some() {
        let doc: EditorDocument = serde_json::from_value(value)?;
        debug!(nodes = doc.nodes.len(), edges = doc.edges.len(), "parsed editor document");
        return doc.into_snapshot();
    }

    if value.get("snapshot_packed").is_some() {
        let payload: DeployPayload = serde_json::from_value(value)?;
        info!(version = %payload.version, deployed_at = %payload.deployed_at, "unpacking deployed snapshot");
        return parse_packed(&payload.snapshot_packed);
    }

    Err(LoadError::InvalidFormat)
}

/// Decompress then parse a packed payload.
pub fn parse_packed(packed: &str) -> Result<Snapshot, LoadError> {
    let json = decompress_payload(packed)?;
    // A packed payload never wraps another envelope
    let value: serde_json::Value = serde_json::from_str(&json)?;
    if value.get("snapshot_packed").is_some() {
        return Err(LoadError::InvalidFormat);
    }
    parse_json(&json)
}

pub fn parse(content: &str, encoding: Encoding) -> Result<Snapshot, LoadError> {
    match encoding {
        Encoding::Json => parse_json(content),
        Encoding::Ron => Ok(ron::from_str(content)?),
        Encoding::Packed => parse_packed(content),
    }
}

/// Load a snapshot from a file.
pub fn load_snapshot(path: &Path) -> Result<LoadedSnapshot, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Err(LoadError::EmptyPayload);
    }

    let encoding = Encoding::detect(path, &raw);
    let snapshot = parse(&raw, encoding)?;
    info!(
        path = %path.display(),
        encoding = ?encoding,
        nodes = snapshot.topology.nodes.len(),
        links = snapshot.topology.links.len(),
        policies = snapshot.policies.len(),
        scenarios = snapshot.scenarios.len(),
        "loaded snapshot"
    );

    Ok(LoadedSnapshot {
        snapshot,
        raw,
        encoding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const EDITOR_JSON: &str = r#"{"nodes":[{"id":"1","type":"default","position":{"x":0,"y":0},"data":{"label":"R1 (Router - Interna)","tipo":"router","zona":"interna"}},{"id":"2","type":"default","position":{"x":0,"y":150},"data":{"label":"FW1 (Firewall - DMZ)","tipo":"firewall","zona":"dmz"}}],"edges":[{"id":"e1-2","source":"1","target":"2"}]}"#;

    const SNAPSHOT_JSON: &str = r#"{
        "topology": {
            "nodes": [
                {"id": "a", "type": "host", "zone": "internal"},
                {"id": "b", "type": "server", "zone": "dmz"}
            ],
            "links": [{"a": "a", "b": "b"}]
        },
        "scenarios": [
            {"id": "s1", "source": {"kind": "node", "value": "a"}, "dest": {"kind": "zone", "value": "dmz"}}
        ]
    }"#;

    fn gzip_b64(json: &str) -> String {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        BASE64.encode(encoder.finish().unwrap())
    }

    #[test]
    fn test_decompress_raw_format() {
        let encoded = format!("raw:{}", BASE64.encode(EDITOR_JSON));
        let snapshot = parse_packed(&encoded).unwrap();
        assert_eq!(snapshot.topology.nodes.len(), 2);
        assert_eq!(snapshot.topology.links.len(), 1);
        assert_eq!(snapshot.topology.nodes[0].name.as_deref(), Some("R1"));
    }

    #[test]
    fn test_decompress_gzip_format() {
        let snapshot = parse_packed(&gzip_b64(SNAPSHOT_JSON)).unwrap();
        assert_eq!(snapshot.topology.nodes.len(), 2);
        assert_eq!(snapshot.scenarios.len(), 1);
    }

    #[test]
    fn test_invalid_format_rejected() {
        let json = r#"{"v":"1.0","r":["rule1"],"d":{}}"#;
        let encoded = format!("raw:{}", BASE64.encode(json));
        assert!(matches!(parse_packed(&encoded), Err(LoadError::InvalidFormat)));
    }

    #[test]
    fn test_bad_base64_rejected() {
        assert!(matches!(parse_packed("raw:!!!"), Err(LoadError::Base64Error(_))));
        assert!(matches!(parse_packed("   "), Err(LoadError::EmptyPayload)));
    }

    #[test]
    fn test_raw_payload_must_be_utf8() {
        let encoded = format!("raw:{}", BASE64.encode([0xff, 0xfe, 0x7b]));
        let err = parse_packed(&encoded).unwrap_err();
        assert!(matches!(err, LoadError::InvalidUtf8(_)));
        assert!(err.to_string().starts_with("Payload is not valid UTF-8"));
    }

    #[test]
    fn test_deploy_envelope() {
        let envelope = serde_json::json!({
            "version": "3",
            "deployedAt": "2025-01-01T00:00:00Z",
            "snapshot_packed": gzip_b64(EDITOR_JSON),
        });
        let snapshot = parse_json(&envelope.to_string()).unwrap();
        assert_eq!(snapshot.topology.nodes.len(), 2);
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.json");
        std::fs::write(&path, SNAPSHOT_JSON).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.encoding, Encoding::Json);
        assert_eq!(loaded.snapshot.topology.nodes.len(), 2);
        assert_eq!(loaded.raw, SNAPSHOT_JSON);
    }

    #[test]
    fn test_load_ron_file() {
        let snapshot = parse_json(SNAPSHOT_JSON).unwrap();
        let ron_text = Snapshot {
            scenarios: Vec::new(),
            ..snapshot
        }
        .to_ron()
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.ron");
        std::fs::write(&path, ron_text).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.encoding, Encoding::Ron);
        assert_eq!(loaded.snapshot.topology.nodes.len(), 2);
    }

    #[test]
    fn test_load_packed_file_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.pkg");
        std::fs::write(&path, format!("{}\n", gzip_b64(SNAPSHOT_JSON))).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.encoding, Encoding::Packed);
        assert_eq!(loaded.snapshot.scenarios.len(), 1);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_snapshot(Path::new("/nonexistent/securenet.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/securenet.json"));
    }
}
