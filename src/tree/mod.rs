//! Scope trees produced by scanning a buffer.
//!
//! A `Blob` is the root of one (path, language) scan result: an arena of
//! scope, variable and import nodes. Nodes are addressed by `NodeId` (an
//! index into the arena) and store their parent's index explicitly, so there
//! are no reference cycles and the whole tree serializes as-is.
//!
//! All line numbers are 1-based.

mod builder;
mod scope_ref;

pub use builder::BlobBuilder;
pub use scope_ref::{Hit, ScopeRef};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::LineSpan;

/// Index of a node within its blob's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The root scope of every blob.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kinds of scope nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// Module-level scope; the root of a blob is always one of these
    Module,
    Function,
    Class,
    Namespace,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Module => "module",
            ScopeKind::Function => "function",
            ScopeKind::Class => "class",
            ScopeKind::Namespace => "namespace",
        }
    }
}

/// Node payload: what kind of symbol this node declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Scope {
        kind: ScopeKind,
        /// Declared signature text, e.g. "join(a, *p) -> str"
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        /// CITDL expression for the value of calling this scope
        #[serde(skip_serializing_if = "Option::is_none")]
        returns: Option<String>,
        /// Attached documentation
        #[serde(skip_serializing_if = "Option::is_none")]
        doc: Option<String>,
        /// Base classes / mixins, as CITDL expressions
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        bases: Vec<String>,
    },
    Variable {
        /// CITDL expression for the inferred/declared type, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        citdl: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        doc: Option<String>,
    },
    Import {
        /// `import <module>` / `from <module> import ...`
        module: String,
        /// Imported symbol; `*` for star imports
        #[serde(skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        /// Local alias, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

/// One node in a blob's arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// None only for the root scope
    pub parent: Option<NodeId>,
    pub span: LineSpan,
    pub payload: Payload,
    /// Children in declaration order
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub fn is_scope(&self) -> bool {
        matches!(self.payload, Payload::Scope { .. })
    }

    pub fn is_import(&self) -> bool {
        matches!(self.payload, Payload::Import { .. })
    }

    pub fn scope_kind(&self) -> Option<ScopeKind> {
        match self.payload {
            Payload::Scope { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// The "ilk" string used in completions and definitions.
    pub fn ilk(&self) -> &'static str {
        match &self.payload {
            Payload::Scope { kind, .. } => kind.as_str(),
            Payload::Variable { .. } => "variable",
            Payload::Import { .. } => "import",
        }
    }

    /// Variable type expression, if this node is a typed variable.
    pub fn citdl(&self) -> Option<&str> {
        match &self.payload {
            Payload::Variable { citdl, .. } => citdl.as_deref(),
            _ => None,
        }
    }

    pub fn doc(&self) -> Option<&str> {
        match &self.payload {
            Payload::Scope { doc, .. } | Payload::Variable { doc, .. } => doc.as_deref(),
            Payload::Import { .. } => None,
        }
    }
}

/// The root of one (path, language) scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    /// Language id, e.g. "python"
    pub language: String,
    /// Blob (module) name, e.g. "os"
    pub name: String,
    /// Source path, if the blob came from a file
    pub src: Option<PathBuf>,
    nodes: Vec<Node>,
}

impl Blob {
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a node, in declaration order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.index()].children.iter().copied()
    }

    /// Find a direct child by name. The *last* declaration wins, matching
    /// "last definition in file wins" lookup semantics.
    pub fn child_named(&self, scope: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[scope.index()]
            .children
            .iter()
            .rev()
            .copied()
            .find(|&child| self.node(child).name == name)
    }

    /// Import nodes declared directly in a scope.
    pub fn imports_in(&self, scope: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(scope).filter(|&c| self.node(c).is_import())
    }

    /// The lexically innermost scope enclosing `line`.
    ///
    /// Child scopes are ordered by start line, so each nesting level is a
    /// binary search by line range. Returns the root for lines outside any
    /// declared scope (the root spans the whole blob).
    pub fn scope_at_line(&self, line: u32) -> NodeId {
        let mut current = NodeId::ROOT;
        loop {
            let scopes: Vec<NodeId> = self
                .children(current)
                .filter(|&c| self.node(c).is_scope())
                .collect();
            // Last child scope starting at or before `line`.
            let idx = scopes.partition_point(|&s| self.node(s).span.start <= line);
            if idx == 0 {
                return current;
            }
            let candidate = scopes[idx - 1];
            if self.node(candidate).span.contains_line(line) {
                current = candidate;
            } else {
                return current;
            }
        }
    }

    /// Path of scope names from the root (exclusive) down to `scope`.
    pub fn lpath(&self, mut scope: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        while let Some(parent) = self.node(scope).parent {
            path.push(self.node(scope).name.clone());
            scope = parent;
        }
        path.reverse();
        path
    }

    /// Resolve a scope-name path back to a node, if it still exists.
    pub fn node_at_lpath(&self, lpath: &[String]) -> Option<NodeId> {
        let mut current = NodeId::ROOT;
        for name in lpath {
            current = self
                .children(current)
                .filter(|&c| self.node(c).is_scope())
                .find(|&c| &self.node(c).name == name)?;
        }
        Some(current)
    }

    /// Human-readable description of a node, for session logs.
    pub fn describe(&self, id: NodeId) -> String {
        let node = self.node(id);
        match &node.payload {
            Payload::Import {
                module,
                symbol,
                alias,
            } => match (symbol, alias) {
                (Some(s), Some(a)) => format!("from {module} import {s} as {a}"),
                (Some(s), None) => format!("from {module} import {s}"),
                (None, Some(a)) => format!("import {module} as {a}"),
                (None, None) => format!("import {module}"),
            },
            _ => format!("{} {}", node.ilk(), node.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blob() -> Blob {
        // module test
        //   class Outer (2..10)
        //     def method (3..5)
        //   def standalone (12..15)
        let mut b = BlobBuilder::new("python", "test");
        let outer = b.add_scope(NodeId::ROOT, "Outer", ScopeKind::Class, LineSpan::new(2, Some(10)));
        b.add_scope(outer, "method", ScopeKind::Function, LineSpan::new(3, Some(5)));
        b.add_scope(
            NodeId::ROOT,
            "standalone",
            ScopeKind::Function,
            LineSpan::new(12, Some(15)),
        );
        b.finish()
    }

    #[test]
    fn test_scope_at_line_innermost() {
        let blob = sample_blob();
        let at = blob.scope_at_line(4);
        assert_eq!(blob.lpath(at), vec!["Outer".to_string(), "method".to_string()]);
    }

    #[test]
    fn test_scope_at_line_between_scopes() {
        let blob = sample_blob();
        // Line 11 is between Outer and standalone: root scope.
        assert_eq!(blob.scope_at_line(11), NodeId::ROOT);
        // Line 1 precedes all scopes.
        assert_eq!(blob.scope_at_line(1), NodeId::ROOT);
    }

    #[test]
    fn test_scope_at_line_class_body() {
        let blob = sample_blob();
        let at = blob.scope_at_line(8);
        assert_eq!(blob.lpath(at), vec!["Outer".to_string()]);
    }

    #[test]
    fn test_node_at_lpath_round_trip() {
        let blob = sample_blob();
        let at = blob.scope_at_line(4);
        let lpath = blob.lpath(at);
        assert_eq!(blob.node_at_lpath(&lpath), Some(at));
        assert_eq!(blob.node_at_lpath(&["missing".to_string()]), None);
    }

    #[test]
    fn test_child_named_last_definition_wins() {
        let mut b = BlobBuilder::new("python", "test");
        let first = b.add_variable(NodeId::ROOT, "x", 1, Some("int"), None);
        let second = b.add_variable(NodeId::ROOT, "x", 5, Some("str"), None);
        let blob = b.finish();
        let found = blob.child_named(NodeId::ROOT, "x").unwrap();
        assert_eq!(found, second);
        assert_ne!(found, first);
    }

    #[test]
    fn test_blob_serializes_round_trip() {
        let blob = sample_blob();
        let json = serde_json::to_string(&blob).unwrap();
        let back: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), blob.len());
        assert_eq!(back.node_at_lpath(&["Outer".to_string()]).is_some(), true);
    }

    #[test]
    fn test_describe_import_forms() {
        let mut b = BlobBuilder::new("python", "test");
        let plain = b.add_import(NodeId::ROOT, "os", None, None, 1);
        let named = b.add_import(NodeId::ROOT, "os.path", Some("join"), None, 2);
        let aliased = b.add_import(NodeId::ROOT, "numpy", None, Some("np"), 3);
        let blob = b.finish();
        assert_eq!(blob.describe(plain), "import os");
        assert_eq!(blob.describe(named), "from os.path import join");
        assert_eq!(blob.describe(aliased), "import numpy as np");
    }
}
