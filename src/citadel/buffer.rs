//! Open-buffer handles passed into scans and evaluations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{BufferId, Pos};

/// A snapshot of an open buffer: identity, language, and content.
///
/// Cheap to clone; the text is shared. The editor layer creates a fresh
/// `Buffer` per edit and the cache keys everything off `id`.
#[derive(Clone)]
pub struct Buffer {
    pub id: BufferId,
    /// Language id, e.g. "python"
    pub language: String,
    /// On-disk path; None for unsaved buffers
    pub path: Option<PathBuf>,
    text: Arc<str>,
}

impl Buffer {
    pub fn new(language: &str, path: &Path, text: &str) -> Self {
        Self {
            id: BufferId::from_path(path),
            language: language.to_string(),
            path: Some(path.to_path_buf()),
            text: text.into(),
        }
    }

    /// Buffer with no on-disk path yet.
    pub fn unsaved(language: &str, name: &str, text: &str) -> Self {
        Self {
            id: BufferId::unsaved(name),
            language: language.to_string(),
            path: None,
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Directory used as the first library search target.
    pub fn dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    /// Module/blob name for this buffer (file stem, or the unsaved name).
    pub fn blob_name(&self) -> String {
        match &self.path {
            Some(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.id.as_str().to_string()),
            None => {
                let raw = self.id.as_str();
                let name = raw.rsplit('/').next().unwrap_or(raw);
                name.rsplit_once('.')
                    .map(|(stem, _)| stem.to_string())
                    .unwrap_or_else(|| name.to_string())
            }
        }
    }

    /// Position record for a byte offset into this buffer.
    pub fn pos_at(&self, byte: usize) -> Pos {
        Pos::from_byte(&self.text, byte)
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} buffer '{}'>", self.language, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_name_from_path() {
        let buf = Buffer::new("python", Path::new("/proj/pkg/util.py"), "");
        assert_eq!(buf.blob_name(), "util");
        assert_eq!(buf.dir(), Some(Path::new("/proj/pkg")));
    }

    #[test]
    fn test_blob_name_unsaved() {
        let buf = Buffer::unsaved("python", "scratch.py", "");
        assert_eq!(buf.blob_name(), "scratch");
        assert!(buf.dir().is_none());
        assert!(buf.id.is_unsaved());
    }
}
