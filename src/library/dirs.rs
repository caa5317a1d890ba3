//! Directory-backed library with a persisted, mtime-invalidated index.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Library, TopLevelName, toplevel_names_of};
use crate::database::Database;
use crate::scan::ScanSource;
use crate::tree::Blob;

/// Persisted per-directory index: blob name -> scanned entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DirIndex {
    files: HashMap<String, FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    path: PathBuf,
    /// File mtime (seconds since the epoch) at scan time. A resource is
    /// re-imported only when this differs from the on-disk value.
    mtime: u64,
    blob: Blob,
}

struct DirState {
    loaded: bool,
    index: DirIndex,
}

/// Searches one filesystem directory for importable blobs.
///
/// Scanning is lazy: the first lookup walks the directory, scans files
/// whose recorded mtime differs, and persists the refreshed index.
pub struct DirLibrary {
    language: String,
    dir: PathBuf,
    extensions: Vec<String>,
    driver: Arc<dyn ScanSource>,
    database: Arc<Database>,
    /// One lock per zone: covers lazy load-from-disk and the refresh walk.
    state: Mutex<DirState>,
}

impl DirLibrary {
    pub fn new(
        dir: &Path,
        extensions: &[String],
        driver: Arc<dyn ScanSource>,
        database: Arc<Database>,
    ) -> Self {
        Self {
            language: driver.language().to_string(),
            dir: dir.to_path_buf(),
            extensions: extensions.to_vec(),
            driver,
            database,
            state: Mutex::new(DirState {
                loaded: false,
                index: DirIndex::default(),
            }),
        }
    }

    /// Zone-kind key for this directory's persisted index.
    fn zone_kind(&self) -> String {
        let sanitized: String = self
            .dir
            .to_string_lossy()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("dir{sanitized}")
    }

    /// Make sure the directory has been walked and stale entries rescanned.
    /// Also the target of background preload requests.
    pub fn ensure_scanned(&self) {
        let mut state = self.state.lock();
        if !state.loaded {
            state.index = self.database.load_index(&self.language, &self.zone_kind());
            state.loaded = true;
        }

        let mut seen: Vec<String> = Vec::new();
        let mut dirty = false;
        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = match path.extension().and_then(|e| e.to_str()) {
                Some(ext) => ext,
                None => continue,
            };
            if !self.extensions.iter().any(|e| e == ext) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let mtime = file_mtime(path);
            seen.push(stem.to_string());

            let fresh = state
                .index
                .files
                .get(stem)
                .is_some_and(|e| e.mtime == mtime);
            if fresh {
                continue;
            }
            debug!(path = %path.display(), "importing blob for dir library");
            match self.driver.scan_file(path) {
                Ok(blob) => {
                    state.index.files.insert(
                        stem.to_string(),
                        FileEntry {
                            path: path.to_path_buf(),
                            mtime,
                            blob,
                        },
                    );
                    dirty = true;
                }
                Err(e) => {
                    // One bad file must not poison the zone.
                    warn!(path = %path.display(), error = %e, "skipping unscannable file");
                }
            }
        }

        let before = state.index.files.len();
        state.index.files.retain(|name, _| seen.contains(name));
        dirty |= state.index.files.len() != before;

        if dirty {
            if let Err(e) = self
                .database
                .save_index(&self.language, &self.zone_kind(), &state.index)
            {
                warn!(dir = %self.dir.display(), error = %e, "failed to persist dir index");
            }
        }
    }
}

fn file_mtime(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Library for DirLibrary {
    fn name(&self) -> String {
        format!("{} dir '{}'", self.language, self.dir.display())
    }

    fn has_blob(&self, blob_name: &str) -> bool {
        self.ensure_scanned();
        self.state.lock().index.files.contains_key(blob_name)
    }

    fn get_blob(&self, blob_name: &str) -> Option<Arc<Blob>> {
        self.ensure_scanned();
        self.state
            .lock()
            .index
            .files
            .get(blob_name)
            .map(|e| Arc::new(e.blob.clone()))
    }

    fn blobs_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.ensure_scanned();
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .index
            .files
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn toplevel_names(&self, prefix: &str, ilk: Option<&str>) -> Vec<TopLevelName> {
        self.ensure_scanned();
        let state = self.state.lock();
        let mut names = Vec::new();
        for entry in state.index.files.values() {
            names.extend(toplevel_names_of(&entry.blob, prefix, ilk));
        }
        names.sort();
        names.dedup();
        names
    }

    fn preload(&self) {
        self.ensure_scanned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::python::PythonScanSource;

    fn dir_library(dir: &Path, db_dir: &Path) -> DirLibrary {
        DirLibrary::new(
            dir,
            &["py".to_string()],
            Arc::new(PythonScanSource::new()),
            Arc::new(Database::new(db_dir)),
        )
    }

    #[test]
    fn test_scans_and_serves_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.py"), "def bar():\n    pass\nbaz = 1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not code").unwrap();

        let lib = dir_library(dir.path(), db.path());
        assert!(lib.has_blob("foo"));
        assert!(!lib.has_blob("notes"));
        let blob = lib.get_blob("foo").unwrap();
        assert!(blob.child_named(blob.root(), "bar").is_some());
    }

    #[test]
    fn test_prefix_and_toplevel_queries() {
        let dir = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.py"), "def bar():\n    pass\nbaz = 1\n").unwrap();
        std::fs::write(dir.path().join("food.py"), "x = 1\n").unwrap();

        let lib = dir_library(dir.path(), db.path());
        assert_eq!(lib.blobs_with_prefix("foo"), vec!["foo", "food"]);
        assert_eq!(lib.blobs_with_prefix("food"), vec!["food"]);

        let names = lib.toplevel_names("ba", None);
        assert!(names.contains(&("function".to_string(), "bar".to_string())));
        assert!(names.contains(&("variable".to_string(), "baz".to_string())));

        let functions = lib.toplevel_names("", Some("function"));
        assert_eq!(functions, vec![("function".to_string(), "bar".to_string())]);
    }

    #[test]
    fn test_persisted_index_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo.py"), "x = 1\n").unwrap();

        let lib = dir_library(dir.path(), db.path());
        lib.ensure_scanned();
        drop(lib);

        // A fresh zone over the same dir loads the persisted index and
        // serves the blob without rescanning an unchanged file.
        let lib = dir_library(dir.path(), db.path());
        assert!(lib.has_blob("foo"));
    }

    #[test]
    fn test_removed_file_drops_from_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let lib = dir_library(dir.path(), db.path());
        assert!(lib.has_blob("gone"));

        std::fs::remove_file(&file).unwrap();
        assert!(!lib.has_blob("gone"));
    }
}
