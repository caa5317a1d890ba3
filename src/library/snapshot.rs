//! Snapshot-file libraries: catalogs and standard-library snapshots.
//!
//! Both are a JSON file holding a set of pre-scanned blobs; they differ
//! only in provenance. Loaded lazily under the zone lock; a corrupt file
//! logs a warning and behaves as empty.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Library, TopLevelName, toplevel_names_of};
use crate::tree::Blob;

/// Serialized form of a catalog or stdlib snapshot file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Language id the blobs belong to
    pub language: String,
    pub blobs: Vec<Blob>,
}

/// A library served from one snapshot JSON file.
pub struct SnapshotLibrary {
    label: String,
    path: PathBuf,
    blobs: Mutex<Option<HashMap<String, Arc<Blob>>>>,
}

impl SnapshotLibrary {
    /// A selected catalog file.
    pub fn catalog(path: &Path) -> Self {
        Self {
            label: format!("catalog '{}'", path.display()),
            path: path.to_path_buf(),
            blobs: Mutex::new(None),
        }
    }

    /// A standard-library snapshot for one language.
    pub fn stdlib(language: &str, path: &Path) -> Self {
        Self {
            label: format!("{language} stdlib '{}'", path.display()),
            path: path.to_path_buf(),
            blobs: Mutex::new(None),
        }
    }

    fn with_blobs<R>(&self, f: impl FnOnce(&HashMap<String, Arc<Blob>>) -> R) -> R {
        let mut guard = self.blobs.lock();
        let blobs = guard.get_or_insert_with(|| match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<SnapshotFile>(&raw) {
                Ok(file) => {
                    debug!(library = %self.label, blobs = file.blobs.len(), "loaded snapshot");
                    file.blobs
                        .into_iter()
                        .map(|b| (b.name.clone(), Arc::new(b)))
                        .collect()
                }
                Err(e) => {
                    warn!(library = %self.label, error = %e, "snapshot is corrupted, treating as empty");
                    HashMap::new()
                }
            },
            Err(e) => {
                warn!(library = %self.label, error = %e, "snapshot unreadable, treating as empty");
                HashMap::new()
            }
        });
        f(blobs)
    }

    /// Write a snapshot file from a set of blobs (used by tooling/tests).
    pub fn write_snapshot(path: &Path, language: &str, blobs: Vec<Blob>) -> std::io::Result<()> {
        let file = SnapshotFile {
            language: language.to_string(),
            blobs,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(path, json)
    }
}

impl Library for SnapshotLibrary {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn has_blob(&self, blob_name: &str) -> bool {
        self.with_blobs(|blobs| blobs.contains_key(blob_name))
    }

    fn get_blob(&self, blob_name: &str) -> Option<Arc<Blob>> {
        self.with_blobs(|blobs| blobs.get(blob_name).cloned())
    }

    fn blobs_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.with_blobs(|blobs| {
            let mut names: Vec<String> = blobs
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect();
            names.sort();
            names
        })
    }

    fn toplevel_names(&self, prefix: &str, ilk: Option<&str>) -> Vec<TopLevelName> {
        self.with_blobs(|blobs| {
            let mut names = Vec::new();
            for blob in blobs.values() {
                names.extend(toplevel_names_of(blob, prefix, ilk));
            }
            names.sort();
            names.dedup();
            names
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{BlobBuilder, NodeId, ScopeKind};
    use crate::types::LineSpan;

    fn os_blob() -> Blob {
        let mut b = BlobBuilder::new("python", "os");
        b.add_variable(NodeId::ROOT, "sep", 1, Some("str"), None);
        let join = b.add_scope(
            NodeId::ROOT,
            "getcwd",
            ScopeKind::Function,
            LineSpan::new(3, Some(4)),
        );
        b.set_returns(join, "str");
        b.finish()
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("python-stdlib.json");
        SnapshotLibrary::write_snapshot(&path, "python", vec![os_blob()]).unwrap();

        let lib = SnapshotLibrary::stdlib("python", &path);
        assert!(lib.has_blob("os"));
        assert!(!lib.has_blob("sys"));
        let blob = lib.get_blob("os").unwrap();
        assert!(blob.child_named(blob.root(), "sep").is_some());
        assert_eq!(lib.blobs_with_prefix("o"), vec!["os"]);
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "]]] nope").unwrap();
        let lib = SnapshotLibrary::catalog(&path);
        assert!(!lib.has_blob("anything"));
        assert!(lib.blobs_with_prefix("").is_empty());
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let lib = SnapshotLibrary::catalog(Path::new("/nonexistent/catalog.json"));
        assert!(!lib.has_blob("os"));
    }
}
