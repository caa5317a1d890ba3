//! Minimal line-based Python scope-tree source.
//!
//! Recognizes imports, `def`, `class`, simple assignments and returns with
//! literal type inference. Indentation drives scope nesting. This is not a
//! parser; it exists so the cache and CITDL walker can be fed from raw text
//! without the external driver stack.

use crate::citadel::Buffer;
use crate::error::ScanSourceResult;
use crate::scan::ScanSource;
use crate::tree::{Blob, BlobBuilder, NodeId, ScopeKind};
use crate::types::LineSpan;

pub struct PythonScanSource;

impl PythonScanSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonScanSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSource for PythonScanSource {
    fn language(&self) -> &'static str {
        "python"
    }

    fn scan_single_language(&self, buffer: &Buffer) -> ScanSourceResult<Blob> {
        let mut builder = BlobBuilder::new("python", &buffer.blob_name());
        if let Some(path) = &buffer.path {
            builder = builder.src(path.clone());
        }
        let mut scanner = Scanner::new(builder);
        for (i, line) in buffer.text().lines().enumerate() {
            scanner.feed(i as u32 + 1, line);
        }
        Ok(scanner.finish())
    }
}

/// Indent-tracking line scanner.
struct Scanner {
    builder: BlobBuilder,
    /// (indent of the def/class line, scope node); root is implicit
    stack: Vec<(usize, NodeId)>,
    /// Scope whose docstring may start on the next statement
    doc_pending: Option<NodeId>,
    /// Open triple-quoted string delimiter, if inside one
    in_string: Option<&'static str>,
    last_line: u32,
}

impl Scanner {
    fn new(builder: BlobBuilder) -> Self {
        Self {
            builder,
            stack: Vec::new(),
            doc_pending: None,
            in_string: None,
            last_line: 1,
        }
    }

    fn current_scope(&self) -> NodeId {
        self.stack.last().map(|&(_, id)| id).unwrap_or(NodeId::ROOT)
    }

    fn feed(&mut self, line_no: u32, line: &str) {
        self.last_line = line_no;

        if let Some(delim) = self.in_string {
            if line.contains(delim) {
                self.in_string = None;
            }
            return;
        }

        let indent = indent_width(line);
        let stmt = line.trim();
        if stmt.is_empty() || stmt.starts_with('#') || stmt.starts_with('@') {
            return;
        }

        // Close scopes this line has dedented out of.
        while let Some(&(scope_indent, scope)) = self.stack.last() {
            if indent <= scope_indent {
                self.builder.set_line_end(scope, line_no.saturating_sub(1));
                self.stack.pop();
            } else {
                break;
            }
        }

        if let Some(scope) = self.doc_pending.take() {
            if let Some(doc) = docstring_of(stmt) {
                self.builder.set_doc(scope, &doc);
                for delim in ["\"\"\"", "'''"] {
                    if stmt.starts_with(delim) && !stmt[delim.len()..].contains(delim) {
                        self.in_string = Some(if delim == "\"\"\"" { "\"\"\"" } else { "'''" });
                    }
                }
                return;
            }
        }

        if let Some(rest) = stmt.strip_prefix("def ") {
            self.open_function(line_no, indent, rest);
        } else if let Some(rest) = stmt.strip_prefix("class ") {
            self.open_class(line_no, indent, rest);
        } else if let Some(rest) = stmt.strip_prefix("from ") {
            self.from_import(line_no, rest);
        } else if let Some(rest) = stmt.strip_prefix("import ") {
            self.plain_import(line_no, rest);
        } else if let Some(rest) = stmt.strip_prefix("return ") {
            self.infer_return(rest);
        } else {
            self.maybe_assignment(line_no, stmt);
        }
    }

    fn open_function(&mut self, line_no: u32, indent: usize, rest: &str) {
        let name_end = rest.find('(').unwrap_or(rest.len());
        let name = rest[..name_end].trim().trim_end_matches(':');
        if name.is_empty() {
            return;
        }
        let parent = self.current_scope();
        let scope = self.builder.add_scope(
            parent,
            name,
            ScopeKind::Function,
            LineSpan::new(line_no, None),
        );
        let args = rest
            .get(name_end..)
            .and_then(|s| s.strip_prefix('('))
            .and_then(|s| s.split(')').next())
            .unwrap_or("");
        self.builder.set_signature(scope, &format!("{name}({args})"));
        if let Some(annot) = rest.split("->").nth(1) {
            let citdl = clean_type_expr(annot.trim_end_matches(':').trim());
            if !citdl.is_empty() {
                self.builder.set_returns(scope, &citdl);
            }
        }
        self.stack.push((indent, scope));
        self.doc_pending = Some(scope);
    }

    fn open_class(&mut self, line_no: u32, indent: usize, rest: &str) {
        let rest = rest.trim_end_matches(':');
        let (name, bases_text) = match rest.split_once('(') {
            Some((name, bases)) => (name.trim(), bases.trim_end_matches(')')),
            None => (rest.trim(), ""),
        };
        if name.is_empty() {
            return;
        }
        let parent = self.current_scope();
        let scope = self.builder.add_scope(
            parent,
            name,
            ScopeKind::Class,
            LineSpan::new(line_no, None),
        );
        for base in bases_text.split(',') {
            let base = base.trim();
            if base.is_empty() || base.contains('=') || base == "object" {
                continue;
            }
            self.builder.add_base(scope, base);
        }
        self.stack.push((indent, scope));
        self.doc_pending = Some(scope);
    }

    fn plain_import(&mut self, line_no: u32, rest: &str) {
        let parent = self.current_scope();
        for part in rest.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once(" as ") {
                Some((module, alias)) => {
                    self.builder
                        .add_import(parent, module.trim(), None, Some(alias.trim()), line_no);
                }
                None => {
                    self.builder.add_import(parent, part, None, None, line_no);
                }
            }
        }
    }

    fn from_import(&mut self, line_no: u32, rest: &str) {
        let Some((module, symbols)) = rest.split_once(" import ") else {
            return;
        };
        let module = module.trim();
        let parent = self.current_scope();
        for part in symbols.split(',') {
            let part = part.trim().trim_start_matches('(').trim_end_matches(')');
            if part.is_empty() {
                continue;
            }
            match part.split_once(" as ") {
                Some((symbol, alias)) => {
                    self.builder.add_import(
                        parent,
                        module,
                        Some(symbol.trim()),
                        Some(alias.trim()),
                        line_no,
                    );
                }
                None => {
                    self.builder.add_import(parent, module, Some(part), None, line_no);
                }
            }
        }
    }

    fn infer_return(&mut self, expr: &str) {
        let Some(&(_, scope)) = self.stack.last() else {
            return;
        };
        if let Some(citdl) = citdl_from_expr(expr.trim()) {
            // First return wins; an explicit annotation already beat us here.
            self.builder.set_returns_if_unset(scope, &citdl);
        }
    }

    fn maybe_assignment(&mut self, line_no: u32, stmt: &str) {
        // `name = expr`, `name: T = expr`, `name: T`; skip ==, +=, etc.
        let (target, annot, value) = match split_assignment(stmt) {
            Some(parts) => parts,
            None => return,
        };
        if !is_identifier(target) {
            return;
        }
        let citdl = annot
            .map(clean_type_expr)
            .filter(|s| !s.is_empty())
            .or_else(|| value.and_then(citdl_from_expr));
        let parent = self.current_scope();
        self.builder
            .add_variable(parent, target, line_no, citdl.as_deref(), None);
    }

    fn finish(mut self) -> Blob {
        for &(_, scope) in &self.stack {
            self.builder.set_line_end(scope, self.last_line);
        }
        self.builder.finish()
    }
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += 8 - width % 8,
            _ => break,
        }
    }
    width
}

fn docstring_of(stmt: &str) -> Option<String> {
    for delim in ["\"\"\"", "'''"] {
        if let Some(rest) = stmt.strip_prefix(delim) {
            let content = rest.split(delim).next().unwrap_or(rest);
            return Some(content.trim().to_string());
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_dotted_name(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

/// Strip quoting/whitespace from an annotation, keeping dotted names only.
fn clean_type_expr(annot: &str) -> String {
    let cleaned = annot.trim().trim_matches('"').trim_matches('\'').trim();
    if is_dotted_name(cleaned) {
        cleaned.to_string()
    } else {
        String::new()
    }
}

/// Split `target [: annotation] = value` or a bare annotated declaration.
fn split_assignment(stmt: &str) -> Option<(&str, Option<&str>, Option<&str>)> {
    let eq = stmt.find('=');
    if let Some(i) = eq {
        // Reject ==, <=, >=, !=, += and friends.
        let before = stmt.as_bytes().get(i.wrapping_sub(1)).copied();
        let after = stmt.as_bytes().get(i + 1).copied();
        if after == Some(b'=')
            || matches!(before, Some(b'<') | Some(b'>') | Some(b'!') | Some(b'='))
            || matches!(
                before,
                Some(b'+') | Some(b'-') | Some(b'*') | Some(b'/') | Some(b'%') | Some(b'|') | Some(b'&')
            )
        {
            return None;
        }
    }
    let (lhs, value) = match eq {
        Some(i) => (&stmt[..i], Some(stmt[i + 1..].trim())),
        None => (stmt, None),
    };
    let (target, annot) = match lhs.split_once(':') {
        Some((t, a)) => (t.trim(), Some(a.trim())),
        None => (lhs.trim(), None),
    };
    if annot.is_none() && value.is_none() {
        return None;
    }
    Some((target, annot, value))
}

/// Literal/call type inference for the right-hand side of an assignment.
fn citdl_from_expr(expr: &str) -> Option<String> {
    let expr = expr.trim();
    if expr.is_empty() || expr == "None" {
        return None;
    }
    let first = expr.chars().next()?;
    match first {
        '"' | '\'' => return Some("str".to_string()),
        '[' => return Some("list".to_string()),
        '{' => return Some("dict".to_string()),
        '(' => return Some("tuple".to_string()),
        _ => {}
    }
    if expr.starts_with("f\"") || expr.starts_with("f'") {
        return Some("str".to_string());
    }
    if expr == "True" || expr == "False" {
        return Some("bool".to_string());
    }
    if expr.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return Some("int".to_string());
    }
    if expr
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == '_')
        && expr.contains('.')
    {
        return Some("float".to_string());
    }
    // Constructor call: `pkg.Type(...)` evaluates to `pkg.Type()`, a bare
    // dotted name evaluates to itself.
    if let Some(callee) = expr.split('(').next() {
        let callee = callee.trim();
        if is_dotted_name(callee) {
            if expr.contains('(') {
                return Some(format!("{callee}()"));
            }
            return Some(callee.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Payload;

    fn scan(text: &str) -> Blob {
        let source = PythonScanSource::new();
        let buf = Buffer::unsaved("python", "mod.py", text);
        source.scan_single_language(&buf).unwrap()
    }

    #[test]
    fn test_imports() {
        let blob = scan("import os\nimport numpy as np\nfrom os.path import join, sep as s\nfrom os import *\n");
        let imports: Vec<String> = blob
            .imports_in(blob.root())
            .map(|id| blob.describe(id))
            .collect();
        assert_eq!(
            imports,
            vec![
                "import os",
                "import numpy as np",
                "from os.path import join",
                "from os.path import sep as s",
                "from os import *",
            ]
        );
    }

    #[test]
    fn test_nested_scopes_and_spans() {
        let blob = scan(
            "class C(Base):\n    def m(self, x):\n        y = 1\n        return 'done'\n\nz = 2\n",
        );
        let c = blob.child_named(blob.root(), "C").unwrap();
        let m = blob.child_named(c, "m").unwrap();
        assert_eq!(blob.node(c).span.start, 1);
        assert_eq!(blob.node(m).span.start, 2);
        assert!(blob.node(m).span.end.unwrap() >= 4);
        // y is local to m, z is module-level
        assert!(blob.child_named(m, "y").is_some());
        assert!(blob.child_named(blob.root(), "z").is_some());
        match &blob.node(c).payload {
            Payload::Scope { bases, .. } => assert_eq!(bases, &vec!["Base".to_string()]),
            _ => panic!("expected class scope"),
        }
    }

    #[test]
    fn test_literal_inference() {
        let blob = scan("a = 'hi'\nb = 42\nc = 3.14\nd = []\ne = True\nf = Foo()\ng = os.sep\n");
        let citdl_of = |name: &str| {
            let id = blob.child_named(blob.root(), name).unwrap();
            blob.node(id).citdl().map(str::to_string)
        };
        assert_eq!(citdl_of("a").as_deref(), Some("str"));
        assert_eq!(citdl_of("b").as_deref(), Some("int"));
        assert_eq!(citdl_of("c").as_deref(), Some("float"));
        assert_eq!(citdl_of("d").as_deref(), Some("list"));
        assert_eq!(citdl_of("e").as_deref(), Some("bool"));
        assert_eq!(citdl_of("f").as_deref(), Some("Foo()"));
        assert_eq!(citdl_of("g").as_deref(), Some("os.sep"));
    }

    #[test]
    fn test_annotation_beats_literal() {
        let blob = scan("x: MyType = make()\n");
        let x = blob.child_named(blob.root(), "x").unwrap();
        assert_eq!(blob.node(x).citdl(), Some("MyType"));
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        let blob = scan("if a == 1:\n    pass\nb = 2\n");
        assert!(blob.child_named(blob.root(), "a").is_none());
        assert!(blob.child_named(blob.root(), "b").is_some());
    }

    #[test]
    fn test_signature_returns_and_doc() {
        let blob = scan("def join(a, *p) -> str:\n    \"\"\"Join path parts.\"\"\"\n    return a\n");
        let f = blob.child_named(blob.root(), "join").unwrap();
        match &blob.node(f).payload {
            Payload::Scope {
                signature,
                returns,
                doc,
                ..
            } => {
                assert_eq!(signature.as_deref(), Some("join(a, *p)"));
                assert_eq!(returns.as_deref(), Some("str"));
                assert_eq!(doc.as_deref(), Some("Join path parts."));
            }
            _ => panic!("expected function scope"),
        }
    }

    #[test]
    fn test_return_literal_inference() {
        let blob = scan("def f():\n    return 'text'\n");
        let f = blob.child_named(blob.root(), "f").unwrap();
        match &blob.node(f).payload {
            Payload::Scope { returns, .. } => assert_eq!(returns.as_deref(), Some("str")),
            _ => panic!("expected function scope"),
        }
    }
}
