//! Small shared types used across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identity of a buffer known to the engine.
///
/// Buffers are keyed by path, never by content hash. Unsaved buffers get a
/// synthetic path under the `<Unsaved>` prefix so they still have a stable,
/// printable identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId(Box<str>);

/// Prefix used for buffers that have no on-disk path yet.
pub const UNSAVED_PREFIX: &str = "<Unsaved>";

impl BufferId {
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into())
    }

    /// Identity for a buffer that is not saved to disk.
    pub fn unsaved(name: &str) -> Self {
        Self(format!("{UNSAVED_PREFIX}/{name}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unsaved(&self) -> bool {
        self.0.starts_with(UNSAVED_PREFIX)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priorities at which indexer requests can be scheduled.
///
/// Lower is more urgent. `Control` is a scheduler sentinel carrying
/// stop/pause instructions, never actual scan work.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    /// Sentinel priority to control the scheduler itself
    Control,
    /// UI is requesting info on this file now
    Immediate,
    /// UI requires info on this file soon
    Current,
    /// UI will likely require info on this file soon
    Open,
    /// Info may be needed sometime
    Background,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Control => "control",
            Priority::Immediate => "immediate",
            Priority::Current => "current",
            Priority::Open => "open",
            Priority::Background => "background",
        };
        write!(f, "{s}")
    }
}

/// A 1-based line range, end-inclusive. Scope nodes without a recorded end
/// line extend to the end of their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: Option<u32>,
}

impl LineSpan {
    pub fn new(start: u32, end: Option<u32>) -> Self {
        Self { start, end }
    }

    /// Single-line span, e.g. for a variable or import declaration.
    pub fn at(line: u32) -> Self {
        Self {
            start: line,
            end: Some(line),
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        if line < self.start {
            return false;
        }
        match self.end {
            Some(end) => line <= end,
            None => true,
        }
    }
}

/// A position in a buffer: byte offset plus the (1-based) line it falls on.
///
/// Triggers carry the byte position for text inspection and the line for
/// locating the enclosing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub byte: usize,
    pub line: u32,
}

impl Pos {
    pub fn new(byte: usize, line: u32) -> Self {
        Self { byte, line }
    }

    /// Compute the position for a byte offset in `text`.
    pub fn from_byte(text: &str, byte: usize) -> Self {
        let line = text[..byte.min(text.len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count() as u32
            + 1;
        Self { byte, line }
    }
}
