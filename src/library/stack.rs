//! The ordered list of libraries consulted for one (language, buffer).

use std::sync::Arc;
use tracing::debug;

use super::{Library, TopLevelName};
use crate::tree::Blob;

/// Ordered library search: current directory, project dirs, env paths,
/// catalogs, stdlib. First library holding a blob wins, so more local
/// definitions shadow more global ones.
#[derive(Clone)]
pub struct LibraryStack {
    libs: Vec<Arc<dyn Library>>,
}

impl LibraryStack {
    pub fn new(libs: Vec<Arc<dyn Library>>) -> Self {
        Self { libs }
    }

    pub fn empty() -> Self {
        Self { libs: Vec::new() }
    }

    pub fn libs(&self) -> &[Arc<dyn Library>] {
        &self.libs
    }

    /// Resolve an import name, reporting which library answered.
    pub fn import_blob(&self, blob_name: &str) -> Option<(Arc<Blob>, String)> {
        for lib in &self.libs {
            if let Some(blob) = lib.get_blob(blob_name) {
                debug!(blob = blob_name, library = %lib.name(), "import resolved");
                return Some((blob, lib.name()));
            }
        }
        None
    }
}

impl Library for LibraryStack {
    fn name(&self) -> String {
        format!("stack of {} libraries", self.libs.len())
    }

    fn has_blob(&self, blob_name: &str) -> bool {
        self.libs.iter().any(|lib| lib.has_blob(blob_name))
    }

    fn get_blob(&self, blob_name: &str) -> Option<Arc<Blob>> {
        self.libs.iter().find_map(|lib| lib.get_blob(blob_name))
    }

    fn blobs_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .libs
            .iter()
            .flat_map(|lib| lib.blobs_with_prefix(prefix))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn toplevel_names(&self, prefix: &str, ilk: Option<&str>) -> Vec<TopLevelName> {
        let mut names: Vec<TopLevelName> = self
            .libs
            .iter()
            .flat_map(|lib| lib.toplevel_names(prefix, ilk))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
