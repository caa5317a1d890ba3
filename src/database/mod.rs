//! Persisted zone indices.
//!
//! Each library zone persists its lazily built index as pretty JSON, keyed
//! by (language, zone kind). A corrupted or unreadable index is logged and
//! replaced by the empty default; the zone rebuilds from scratch rather
//! than crashing the process. Invalidation elsewhere is mtime-based, so an
//! empty index only costs re-importing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DatabaseError, DatabaseResult};

/// On-disk home for zone indices.
pub struct Database {
    base_dir: PathBuf,
}

impl Database {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self, language: &str, kind: &str) -> PathBuf {
        self.base_dir.join(language).join(format!("{kind}.json"))
    }

    /// Load a zone index, falling back to the default structure if the file
    /// is missing, unreadable, or corrupt.
    pub fn load_index<T>(&self, language: &str, kind: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.index_path(language, kind);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no zone index on disk, starting empty");
                return T::default();
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read zone index, resetting to empty"
                );
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "zone index is corrupted, resetting to empty"
                );
                T::default()
            }
        }
    }

    /// Save a zone index atomically (write to a temp file, then rename).
    pub fn save_index<T>(&self, language: &str, kind: &str, value: &T) -> DatabaseResult<()>
    where
        T: Serialize,
    {
        let path = self.index_path(language, kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Write {
                path: path.clone(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(value).map_err(|source| {
            DatabaseError::Serialize {
                path: path.clone(),
                source,
            }
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| DatabaseError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| DatabaseError::Write { path, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct TestIndex {
        entries: HashMap<String, u64>,
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path());
        let mut index = TestIndex::default();
        index.entries.insert("a.py".to_string(), 123);

        db.save_index("python", "dirs", &index).unwrap();
        let loaded: TestIndex = db.load_index("python", "dirs");
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_missing_index_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path());
        let loaded: TestIndex = db.load_index("python", "dirs");
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn test_corrupt_index_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path());
        let path = dir.path().join("python").join("dirs.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json at all").unwrap();

        let loaded: TestIndex = db.load_index("python", "dirs");
        assert!(loaded.entries.is_empty());
    }

    #[test]
    fn test_save_replaces_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path());
        let mut index = TestIndex::default();
        index.entries.insert("a.py".to_string(), 1);
        db.save_index("python", "dirs", &index).unwrap();

        index.entries.insert("b.py".to_string(), 2);
        db.save_index("python", "dirs", &index).unwrap();

        let loaded: TestIndex = db.load_index("python", "dirs");
        assert_eq!(loaded.entries.len(), 2);
    }
}
