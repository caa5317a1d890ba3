//! Per-buffer scan-result cache.
//!
//! `Citadel` owns, for every open buffer, the most recent successful parse:
//! the blob map, the scan time, and the error string of a failed scan. A
//! failed scan is a cached, non-fatal result, not an exception propagated to
//! callers. Reads that find no cached data trigger a synchronous scan first.

mod buffer;

pub use buffer::Buffer;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::scan::ScanSource;
use crate::tree::{Blob, ScopeRef};
use crate::types::BufferId;

/// Cached state of one buffer's last scan.
#[derive(Default)]
struct BufferState {
    /// Time of the last accepted scan, in caller-defined ticks
    /// (milliseconds since the epoch in practice)
    scan_time: Option<u64>,
    /// Why the last scan failed, if it did
    scan_error: Option<String>,
    /// Blobs by language; empty until a scan succeeds
    blobs: HashMap<String, Arc<Blob>>,
}

/// The scan-result cache. One lock per buffer; no cross-buffer lock.
pub struct Citadel {
    buffers: DashMap<BufferId, Arc<Mutex<BufferState>>>,
    drivers: RwLock<HashMap<String, Arc<dyn ScanSource>>>,
}

impl Citadel {
    pub fn new() -> Self {
        Self {
            buffers: DashMap::new(),
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Register the scope-tree source for a language.
    pub fn register_driver(&self, driver: Arc<dyn ScanSource>) {
        self.drivers
            .write()
            .insert(driver.language().to_string(), driver);
    }

    pub fn driver_for(&self, language: &str) -> Option<Arc<dyn ScanSource>> {
        self.drivers.read().get(language).cloned()
    }

    fn state(&self, id: &BufferId) -> Arc<Mutex<BufferState>> {
        self.buffers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BufferState::default())))
            .clone()
    }

    /// Scan the buffer through its language driver and cache the result.
    ///
    /// Atomic per buffer: the {scan_time, blobs, error} triple is updated
    /// under the buffer's lock. A result older than what is cached is
    /// rejected unless `skip_scan_time_check` is set.
    pub fn scan(&self, buffer: &Buffer, mtime: u64, skip_scan_time_check: bool) {
        let scanned = match self.driver_for(&buffer.language) {
            Some(driver) => driver.scan_single_language(buffer),
            None => Err(crate::ScanError::NoDriver {
                language: buffer.language.clone(),
            }),
        };

        let state = self.state(&buffer.id);
        let mut state = state.lock();

        if !skip_scan_time_check {
            if let Some(cached) = state.scan_time {
                if cached > mtime {
                    debug!(
                        buffer = %buffer.id,
                        cached, mtime, "rejecting stale scan result"
                    );
                    return;
                }
            }
        }

        state.scan_time = Some(mtime);
        match scanned {
            Ok(blob) => {
                state.scan_error = None;
                state.blobs.insert(buffer.language.clone(), Arc::new(blob));
            }
            Err(err) => {
                warn!(buffer = %buffer.id, error = %err, "scan failed");
                state.scan_error = Some(err.to_string());
            }
        }
    }

    /// Time of the last accepted scan for a buffer, if any.
    pub fn scan_time(&self, id: &BufferId) -> Option<u64> {
        self.buffers.get(id).and_then(|s| s.lock().scan_time)
    }

    /// The cached error string of the last scan, if it failed.
    pub fn scan_error(&self, id: &BufferId) -> Option<String> {
        self.buffers
            .get(id)
            .and_then(|s| s.lock().scan_error.clone())
    }

    /// Cached blob for (buffer, language), scanning synchronously first if
    /// nothing is cached yet.
    pub fn blob_for(&self, buffer: &Buffer, language: &str) -> Option<Arc<Blob>> {
        if let Some(blob) = self.cached_blob(&buffer.id, language) {
            return Some(blob);
        }
        debug!(buffer = %buffer.id, language, "no cached scan data, scanning now");
        self.scan(buffer, crate::indexer::now_millis(), false);
        self.cached_blob(&buffer.id, language)
    }

    /// Cached blob without triggering a scan.
    pub fn cached_blob(&self, id: &BufferId, language: &str) -> Option<Arc<Blob>> {
        self.buffers
            .get(id)
            .and_then(|s| s.lock().blobs.get(language).cloned())
    }

    /// Reload-safe reference to the innermost scope enclosing `line`.
    ///
    /// None if the buffer has no scan data for the language (e.g. the
    /// position is in a markup region of a multi-language document).
    pub fn scope_ref_at(&self, buffer: &Buffer, language: &str, line: u32) -> Option<ScopeRef> {
        let blob = self.blob_for(buffer, language)?;
        let scope = blob.scope_at_line(line);
        let lpath = blob.lpath(scope);
        Some(ScopeRef::new(blob, lpath))
    }

    /// Drop all cached state for a buffer (e.g. when it is closed).
    pub fn evict(&self, id: &BufferId) {
        self.buffers.remove(id);
    }
}

impl Default for Citadel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::python::PythonScanSource;

    fn citadel_with_python() -> Citadel {
        let citadel = Citadel::new();
        citadel.register_driver(Arc::new(PythonScanSource::new()));
        citadel
    }

    #[test]
    fn test_scan_caches_blob() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 100, false);
        assert_eq!(citadel.scan_time(&buf.id), Some(100));
        assert!(citadel.scan_error(&buf.id).is_none());
        let blob = citadel.cached_blob(&buf.id, "python").unwrap();
        assert!(blob.child_named(blob.root(), "x").is_some());
    }

    #[test]
    fn test_stale_write_rejected() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 100, false);

        let newer = Buffer::unsaved("python", "t.py", "y = 2\n");
        citadel.scan(&newer, 50, false);
        assert_eq!(citadel.scan_time(&buf.id), Some(100), "no downgrade");
        let blob = citadel.cached_blob(&buf.id, "python").unwrap();
        assert!(blob.child_named(blob.root(), "x").is_some());
        assert!(blob.child_named(blob.root(), "y").is_none());

        citadel.scan(&newer, 150, false);
        assert_eq!(citadel.scan_time(&buf.id), Some(150));
        let blob = citadel.cached_blob(&buf.id, "python").unwrap();
        assert!(blob.child_named(blob.root(), "y").is_some());
    }

    #[test]
    fn test_stale_write_allowed_with_skip_flag() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 100, false);
        let older = Buffer::unsaved("python", "t.py", "y = 2\n");
        citadel.scan(&older, 50, true);
        assert_eq!(citadel.scan_time(&buf.id), Some(50));
    }

    #[test]
    fn test_missing_driver_caches_error() {
        let citadel = Citadel::new();
        let buf = Buffer::unsaved("tcl", "t.tcl", "puts hello\n");
        citadel.scan(&buf, 10, false);
        let err = citadel.scan_error(&buf.id).unwrap();
        assert!(err.contains("no driver"), "got: {err}");
        assert!(citadel.cached_blob(&buf.id, "tcl").is_none());
    }

    #[test]
    fn test_blob_for_scans_lazily() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved("python", "t.py", "def f():\n    pass\n");
        // Never scanned explicitly; first access scans synchronously.
        let blob = citadel.blob_for(&buf, "python").unwrap();
        assert!(blob.child_named(blob.root(), "f").is_some());
    }

    #[test]
    fn test_scope_ref_at_nested() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved(
            "python",
            "t.py",
            "class C:\n    def m(self):\n        pass\n",
        );
        let sref = citadel.scope_ref_at(&buf, "python", 3).unwrap();
        assert_eq!(sref.lpath, vec!["C".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_evict_drops_state() {
        let citadel = citadel_with_python();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 100, false);
        citadel.evict(&buf.id);
        assert!(citadel.scan_time(&buf.id).is_none());
    }
}
