//! Same-host handoff document
//!
//! When an observer registers from the daemon's own host, streaming the
//! graph one datagram at a time is both slower and lossier than necessary.
//! Instead the daemon writes the complete state to a shared file and sends
//! only the file's location (`fast_temp_file_running`). JSON keeps the
//! observer's implementation language out of the contract.
//!
//! The document is written once per registration and deleted by whichever
//! side touches it last: the observer after loading it, or the daemon when
//! the observer goes away without attaching.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors reading or writing a snapshot document.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed snapshot document: {0}")]
    Json(#[from] serde_json::Error),
}

/// One port record, mirroring the `port_added` wire arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPort {
    pub name: String,
    pub alias_1: String,
    pub alias_2: String,
    #[serde(rename = "type")]
    pub type_code: i32,
    pub flags: i32,
    pub metadata: String,
}

/// One connection record, mirroring the `connection_added` wire arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConnection {
    pub port_out_name: String,
    pub port_in_name: String,
}

/// The complete handoff document: all ports, then all connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub ports: Vec<SnapshotPort>,
    pub connections: Vec<SnapshotConnection>,
}

impl SnapshotDocument {
    /// Write the document to `path` as JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a document from `path`.
    pub fn read_from(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> SnapshotDocument {
        SnapshotDocument {
            ports: vec![
                SnapshotPort {
                    name: "system:capture_1".into(),
                    alias_1: "mic".into(),
                    alias_2: String::new(),
                    type_code: 0,
                    flags: 0x6,
                    metadata: String::new(),
                },
                SnapshotPort {
                    name: "synth:out_l".into(),
                    alias_1: String::new(),
                    alias_2: String::new(),
                    type_code: 0,
                    flags: 0x2,
                    metadata: String::new(),
                },
            ],
            connections: vec![SnapshotConnection {
                port_out_name: "synth:out_l".into(),
                port_in_name: "system:playback_1".into(),
            }],
        }
    }

    #[test]
    fn file_roundtrip() {
        let doc = sample();
        let file = tempfile::NamedTempFile::new().unwrap();

        doc.write_to(file.path()).unwrap();
        let loaded = SnapshotDocument::read_from(file.path()).unwrap();

        assert_eq!(loaded, doc);
    }

    #[test]
    fn json_field_names_are_stable() {
        // Observers in other languages key on these exact names.
        let json = serde_json::to_value(sample()).unwrap();
        let port = &json["ports"][0];
        assert!(port.get("name").is_some());
        assert!(port.get("alias_1").is_some());
        assert!(port.get("alias_2").is_some());
        assert!(port.get("type").is_some());
        assert!(port.get("flags").is_some());
        assert!(port.get("metadata").is_some());

        let conn = &json["connections"][0];
        assert!(conn.get("port_out_name").is_some());
        assert!(conn.get("port_in_name").is_some());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SnapshotDocument::read_from(Path::new("/nonexistent/snapshot.json"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Io(_)));
    }
}
