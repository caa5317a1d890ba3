//! Incremental construction of blob arenas.

use std::path::PathBuf;

use super::{Blob, Node, NodeId, Payload, ScopeKind};
use crate::types::LineSpan;

/// Builds a `Blob` node by node. The root module scope is created up front;
/// every other node names its parent explicitly.
pub struct BlobBuilder {
    language: String,
    name: String,
    src: Option<PathBuf>,
    nodes: Vec<Node>,
}

impl BlobBuilder {
    pub fn new(language: &str, name: &str) -> Self {
        let root = Node {
            name: name.to_string(),
            parent: None,
            span: LineSpan::new(1, None),
            payload: Payload::Scope {
                kind: ScopeKind::Module,
                signature: None,
                returns: None,
                doc: None,
                bases: Vec::new(),
            },
            children: Vec::new(),
        };
        Self {
            language: language.to_string(),
            name: name.to_string(),
            src: None,
            nodes: vec![root],
        }
    }

    pub fn src(mut self, path: PathBuf) -> Self {
        self.src = Some(path);
        self
    }

    fn push(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn add_scope(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: ScopeKind,
        span: LineSpan,
    ) -> NodeId {
        self.push(
            parent,
            Node {
                name: name.to_string(),
                parent: Some(parent),
                span,
                payload: Payload::Scope {
                    kind,
                    signature: None,
                    returns: None,
                    doc: None,
                    bases: Vec::new(),
                },
                children: Vec::new(),
            },
        )
    }

    pub fn add_variable(
        &mut self,
        parent: NodeId,
        name: &str,
        line: u32,
        citdl: Option<&str>,
        doc: Option<&str>,
    ) -> NodeId {
        self.push(
            parent,
            Node {
                name: name.to_string(),
                parent: Some(parent),
                span: LineSpan::at(line),
                payload: Payload::Variable {
                    citdl: citdl.map(str::to_string),
                    doc: doc.map(str::to_string),
                },
                children: Vec::new(),
            },
        )
    }

    pub fn add_import(
        &mut self,
        parent: NodeId,
        module: &str,
        symbol: Option<&str>,
        alias: Option<&str>,
        line: u32,
    ) -> NodeId {
        // Display name follows what the import binds locally.
        let name = alias
            .or(symbol)
            .unwrap_or(module.split('.').next_back().unwrap_or(module));
        self.push(
            parent,
            Node {
                name: name.to_string(),
                parent: Some(parent),
                span: LineSpan::at(line),
                payload: Payload::Import {
                    module: module.to_string(),
                    symbol: symbol.map(str::to_string),
                    alias: alias.map(str::to_string),
                },
                children: Vec::new(),
            },
        )
    }

    pub fn set_signature(&mut self, id: NodeId, sig: &str) {
        if let Payload::Scope { signature, .. } = &mut self.nodes[id.index()].payload {
            *signature = Some(sig.to_string());
        }
    }

    pub fn set_returns(&mut self, id: NodeId, citdl: &str) {
        if let Payload::Scope { returns, .. } = &mut self.nodes[id.index()].payload {
            *returns = Some(citdl.to_string());
        }
    }

    /// Record a return type only if none is declared yet (e.g. inferred
    /// from a `return` literal after an explicit annotation was seen).
    pub fn set_returns_if_unset(&mut self, id: NodeId, citdl: &str) {
        if let Payload::Scope { returns, .. } = &mut self.nodes[id.index()].payload {
            if returns.is_none() {
                *returns = Some(citdl.to_string());
            }
        }
    }

    pub fn set_doc(&mut self, id: NodeId, text: &str) {
        match &mut self.nodes[id.index()].payload {
            Payload::Scope { doc, .. } | Payload::Variable { doc, .. } => {
                *doc = Some(text.to_string())
            }
            Payload::Import { .. } => {}
        }
    }

    pub fn add_base(&mut self, id: NodeId, base: &str) {
        if let Payload::Scope { bases, .. } = &mut self.nodes[id.index()].payload {
            bases.push(base.to_string());
        }
    }

    /// Close off a scope's line range once its extent is known.
    pub fn set_line_end(&mut self, id: NodeId, end: u32) {
        self.nodes[id.index()].span.end = Some(end);
    }

    pub fn finish(self) -> Blob {
        Blob {
            language: self.language,
            name: self.name,
            src: self.src,
            nodes: self.nodes,
        }
    }
}
