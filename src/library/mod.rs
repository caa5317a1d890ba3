//! Library search targets for import resolution.
//!
//! A library is an ordered search target: it can say whether it holds a
//! blob, fetch it, list blobs by import-path prefix, and list top-level
//! symbols. Variants differ only in how blobs are located (filesystem
//! directory, catalog file, stdlib snapshot); the resolver sees one
//! uniform contract through `LibraryStack`.

mod dirs;
mod snapshot;
mod stack;

pub use dirs::DirLibrary;
pub use snapshot::SnapshotLibrary;
pub use stack::LibraryStack;

use std::sync::Arc;

use crate::tree::Blob;

/// A named completion candidate: (ilk, name), e.g. ("function", "join").
pub type TopLevelName = (String, String);

/// One search target for importable blobs.
pub trait Library: Send + Sync {
    /// Short description for logs, e.g. "python dir '/proj/lib'".
    fn name(&self) -> String;

    /// Does this library contain a blob with the given import name?
    fn has_blob(&self, blob_name: &str) -> bool;

    /// Fetch a blob by import name.
    fn get_blob(&self, blob_name: &str) -> Option<Arc<Blob>>;

    /// Import names available here that start with `prefix`.
    fn blobs_with_prefix(&self, prefix: &str) -> Vec<String>;

    /// Top-level symbols across this library's blobs whose names start with
    /// `prefix`, optionally restricted to one ilk ("function", "class", ...).
    fn toplevel_names(&self, prefix: &str, ilk: Option<&str>) -> Vec<TopLevelName>;

    /// Warm any lazily built state. Directory libraries walk and scan here;
    /// the default is a no-op. Called from background preload requests.
    fn preload(&self) {}
}

/// Collect top-level (ilk, name) pairs from one blob.
pub(crate) fn toplevel_names_of(blob: &Blob, prefix: &str, ilk: Option<&str>) -> Vec<TopLevelName> {
    let mut names = Vec::new();
    for child in blob.children(blob.root()) {
        let node = blob.node(child);
        if node.is_import() {
            continue;
        }
        if !node.name.starts_with(prefix) {
            continue;
        }
        if let Some(want) = ilk {
            if node.ilk() != want {
                continue;
            }
        }
        names.push((node.ilk().to_string(), node.name.clone()));
    }
    names
}
