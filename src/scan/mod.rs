//! Scope-tree source (CILE driver) contract.
//!
//! A `ScanSource` turns raw buffer text into a blob. The engine only
//! consumes the output shape; the real lexer/parser stack lives outside
//! this crate. A minimal line-based Python driver is included so the cache
//! and resolver can be exercised end to end from raw text.

pub mod python;

use std::path::Path;

use crate::citadel::Buffer;
use crate::error::{ScanError, ScanSourceResult};
use crate::tree::Blob;

/// One language's scope-tree source.
///
/// Must be safely callable from the single indexer worker thread. A scan
/// failure is an error result here; the scan-result cache turns it into the
/// buffer's cached error string rather than propagating it.
pub trait ScanSource: Send + Sync {
    /// Language id this driver handles, e.g. "python".
    fn language(&self) -> &'static str;

    /// Scan a single-language buffer into a blob.
    fn scan_single_language(&self, buffer: &Buffer) -> ScanSourceResult<Blob>;

    /// Scan a multi-language (template) buffer, handing embedded
    /// client-side regions to `secondary`. One blob per language found.
    fn scan_multi_language(
        &self,
        buffer: &Buffer,
        _secondary: &dyn ScanSource,
    ) -> ScanSourceResult<Vec<Blob>> {
        Err(ScanError::Driver {
            buffer: buffer.id.clone(),
            message: format!("{} driver does not support multi-language scans", self.language()),
        })
    }

    /// Scan a compiled/binary module into a blob.
    fn scan_binary(&self, buffer: &Buffer) -> ScanSourceResult<Blob> {
        Err(ScanError::Driver {
            buffer: buffer.id.clone(),
            message: format!("{} driver does not support binary scans", self.language()),
        })
    }

    /// Scan a file on disk. Used by directory libraries to import blobs
    /// that are not open in the editor.
    fn scan_file(&self, path: &Path) -> ScanSourceResult<Blob> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::Driver {
            buffer: crate::types::BufferId::from_path(path),
            message: format!("failed to read file: {e}"),
        })?;
        let buffer = Buffer::new(self.language(), path, &text);
        self.scan_single_language(&buffer)
    }
}
