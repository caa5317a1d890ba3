//! Pointers into blobs that survive blob reload.

use std::fmt;
use std::sync::Arc;

use super::{Blob, NodeId};

/// A pointer *into* a blob: the blob plus the ordered scope-name path down
/// to one scope. Never a raw node index across reloads; the path is
/// re-resolved against whatever arena the blob currently holds.
#[derive(Clone)]
pub struct ScopeRef {
    pub blob: Arc<Blob>,
    pub lpath: Vec<String>,
}

impl ScopeRef {
    pub fn new(blob: Arc<Blob>, lpath: Vec<String>) -> Self {
        Self { blob, lpath }
    }

    /// Root scope of a blob.
    pub fn root(blob: Arc<Blob>) -> Self {
        Self {
            blob,
            lpath: Vec::new(),
        }
    }

    /// Resolve the path to a node in the current arena.
    pub fn node(&self) -> Option<NodeId> {
        self.blob.node_at_lpath(&self.lpath)
    }

    /// The enclosing scope, or None at the blob root.
    pub fn parent(&self) -> Option<ScopeRef> {
        if self.lpath.is_empty() {
            return None;
        }
        let mut lpath = self.lpath.clone();
        lpath.pop();
        Some(ScopeRef {
            blob: Arc::clone(&self.blob),
            lpath,
        })
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lpath.is_empty() {
            write!(f, "<blob {}>", self.blob.name)
        } else {
            write!(f, "<blob {}: {}>", self.blob.name, self.lpath.join("."))
        }
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A resolved symbol: the blob it lives in plus its node index.
#[derive(Clone)]
pub struct Hit {
    pub blob: Arc<Blob>,
    pub node: NodeId,
}

impl Hit {
    pub fn new(blob: Arc<Blob>, node: NodeId) -> Self {
        Self { blob, node }
    }

    /// The scope containing this hit, as a reload-safe reference.
    pub fn containing_scope(&self) -> ScopeRef {
        let node = self.blob.node(self.node);
        let scope = match node.parent {
            Some(parent) => parent,
            None => self.node,
        };
        ScopeRef::new(Arc::clone(&self.blob), self.blob.lpath(scope))
    }

    pub fn describe(&self) -> String {
        self.blob.describe(self.node)
    }
}

impl fmt::Debug for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} on blob {}>", self.describe(), self.blob.name)
    }
}
