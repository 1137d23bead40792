//! Cookie and storage-state persistence
//!
//! Serializes a session's cookie jar and per-origin local storage to a JSON
//! document on disk, and seeds new sessions from it. Writes are atomic: the
//! snapshot lands in a sibling temp file first and is renamed over the
//! target, so a crash mid-write never corrupts existing state.

use crate::backend::ContextHandle;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A cookie record as captured from the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix timestamp in seconds; session cookie when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// One local-storage key/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalStorageEntry {
    pub name: String,
    pub value: String,
}

/// Local storage captured for one origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<LocalStorageEntry>,
}

/// Serialized browsing state: cookie jar plus per-origin local storage
///
/// Loading a snapshot into a new session reproduces the captured state,
/// modulo cookie expiry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl StorageSnapshot {
    /// Whether the snapshot carries any state at all
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }
}

/// Capture a snapshot from a live context
///
/// Pure read; the context is not mutated.
pub async fn snapshot(ctx: &dyn ContextHandle) -> Result<StorageSnapshot> {
    ctx.storage_state().await
}

/// Write a snapshot to `path` atomically
pub fn save(snapshot: &StorageSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;

    let tmp_path = temp_sibling(path);
    std::fs::write(&tmp_path, json.as_bytes())?;

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        // Leave no temp file behind on a failed rename.
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    tracing::debug!(
        "Saved storage snapshot to {} ({} cookies, {} origins)",
        path.display(),
        snapshot.cookies.len(),
        snapshot.origins.len()
    );

    Ok(())
}

/// Read a snapshot back from `path`
///
/// Fails with `Error::CorruptSnapshot` when the file exists but is not valid
/// serialized state; the caller decides whether to continue with an empty
/// snapshot or abort.
pub fn load(path: &Path) -> Result<StorageSnapshot> {
    let content = std::fs::read_to_string(path)?;

    serde_json::from_str(&content).map_err(|e| {
        Error::CorruptSnapshot(format!("{}: {}", path.display(), e))
    })
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> StorageSnapshot {
        StorageSnapshot {
            cookies: vec![
                Cookie {
                    name: "sid".to_string(),
                    value: "abc123".to_string(),
                    domain: ".example.com".to_string(),
                    path: "/".to_string(),
                    expires: Some(1_900_000_000.0),
                    http_only: true,
                    secure: true,
                    same_site: Some("Lax".to_string()),
                },
                Cookie {
                    name: "theme".to_string(),
                    value: "dark".to_string(),
                    domain: "example.com".to_string(),
                    path: "/".to_string(),
                    expires: None,
                    http_only: false,
                    secure: false,
                    same_site: None,
                },
            ],
            origins: vec![OriginState {
                origin: "https://example.com".to_string(),
                local_storage: vec![LocalStorageEntry {
                    name: "token".to_string(),
                    value: "xyz".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn round_trip_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let empty = StorageSnapshot::default();
        save(&empty, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, empty);
        assert!(loaded.is_empty());
    }

    #[test]
    fn round_trip_populated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let original = sample_snapshot();
        save(&original, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let original = sample_snapshot();
        save(&original, &path).unwrap();
        save(&original, &path).unwrap();

        assert_eq!(load(&path).unwrap(), original);
        // No temp file left behind.
        assert!(!path.with_file_name("state.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json at all").unwrap();

        let result = load(&path);
        assert!(matches!(result, Err(Error::CorruptSnapshot(_))));
    }

    #[test]
    fn missing_file_is_io_not_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let result = load(&path);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn wire_format_matches_contract() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();
        assert!(json.get("cookies").unwrap().is_array());
        let origin = &json.get("origins").unwrap()[0];
        assert_eq!(origin.get("origin").unwrap(), "https://example.com");
        assert_eq!(
            origin.get("local_storage").unwrap()[0].get("name").unwrap(),
            "token"
        );
    }
}
