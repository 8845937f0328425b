//! Typed JSON file read/write built on the io primitives.

use crate::error::{Error, Result};
use crate::utils::io;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Read and deserialize a JSON file into a typed value.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = io::read_file(path, &format!("read {}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Serialize a value as pretty JSON and write it atomically.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize json".to_string())))?;
    io::write_file_atomic(path, &content, &format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn round_trips_typed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Doc {
            name: "demo".to_string(),
            count: 3,
        };
        write_json_file(&path, &doc).unwrap();
        let loaded: Doc = read_json_file(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn malformed_json_reports_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let result: Result<Doc> = read_json_file(&path);
        assert_eq!(result.unwrap_err().code.as_str(), "config.invalid_json");
    }
}
