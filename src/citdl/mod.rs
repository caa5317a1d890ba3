//! CITDL expression resolution.
//!
//! CITDL (Code Intelligence Type Declaration Language) expressions are
//! dotted names with optional call markers, e.g. `os.path.join` or
//! `Foo().bar`. The walker resolves one expression against the lexical
//! scope stack of a trigger position, following variable types, imports
//! (through the buffer's library stack) and class bases, and produces the
//! completions, calltips or definitions an evaluation session asked for.
//!
//! Resolution is bounded: each distinct sub-expression may be evaluated at
//! most [`MAX_EXPR_EVALS`] times per session, so mutually recursive type
//! annotations terminate with an error instead of hanging the eval thread.

mod javascript;
mod python;
mod registry;

pub use javascript::JavaScriptPlugin;
pub use python::PythonPlugin;
pub use registry::{LanguageId, LanguagePlugin, PluginRegistry, RegistryError};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::citadel::{Buffer, Citadel};
use crate::error::{ResolutionError, ResolutionResult};
use crate::eval::{Calltip, Completion, Definition, EvalController, TrgForm, Trigger};
use crate::library::LibraryStack;
use crate::tree::{Blob, Hit, NodeId, Payload, ScopeKind, ScopeRef};

/// How many times one sub-expression may be evaluated in a session before
/// resolution is declared cyclic.
pub const MAX_EXPR_EVALS: u32 = 10;

/// Run one evaluation session to completion.
///
/// Drives the controller through its whole lifecycle: `start`, result
/// delivery, `done`. Never panics out and never leaves the session open;
/// any resolution failure ends it with an "error: ..." reason.
pub fn evaluate(
    ctlr: &EvalController,
    trg: &Trigger,
    buffer: &Buffer,
    citadel: &Citadel,
    libs: &LibraryStack,
    plugin: &dyn LanguagePlugin,
) {
    ctlr.start(trg);
    match evaluate_inner(ctlr, trg, buffer, citadel, libs, plugin) {
        Ok(()) => ctlr.done("success"),
        Err(ResolutionError::Aborted) => ctlr.done("aborted"),
        Err(err) => {
            ctlr.log_info(&err.to_string());
            ctlr.done("error");
        }
    }
}

fn evaluate_inner(
    ctlr: &EvalController,
    trg: &Trigger,
    buffer: &Buffer,
    citadel: &Citadel,
    libs: &LibraryStack,
    plugin: &dyn LanguagePlugin,
) -> ResolutionResult<()> {
    let scope = citadel
        .scope_ref_at(buffer, &trg.language, trg.pos.line)
        .ok_or_else(|| ResolutionError::NoScanData {
            language: trg.language.clone(),
            buffer: buffer.id.clone(),
        })?;
    let expr = plugin.citdl_expr_at(buffer.text(), trg);
    if expr.is_empty() {
        return Err(ResolutionError::TokenNotFound {
            token: String::new(),
            scope: scope.to_string(),
        });
    }
    ctlr.set_desc(&format!("{} '{expr}'", trg.name()));
    ctlr.log_debug(&format!("eval '{expr}' at {scope}"));

    let mut walker = TreeWalker::new(ctlr, libs, plugin);
    match trg.form {
        TrgForm::Completion => {
            let hit = walker.resolve_expr(&expr, &scope)?;
            let cplns = walker.members_of(&hit)?;
            ctlr.set_cplns(cplns);
        }
        TrgForm::Calltip => {
            let hit = walker.resolve_expr(&expr, &scope)?;
            let calltip = walker.calltip_of(&hit)?;
            ctlr.set_calltips(vec![calltip]);
        }
        TrgForm::Definition => {
            let hit = walker.resolve_expr(&expr, &scope)?;
            ctlr.set_defns(vec![definition_of(&hit)]);
        }
    }
    Ok(())
}

/// Build a definition record from a resolved hit.
pub fn definition_of(hit: &Hit) -> Definition {
    let node = hit.blob.node(hit.node);
    let (signature, citdl) = match &node.payload {
        Payload::Scope { signature, .. } => (signature.clone(), None),
        Payload::Variable { citdl, .. } => (None, citdl.clone()),
        Payload::Import { .. } => (None, None),
    };
    let lpath = match node.parent {
        Some(parent) => hit.blob.lpath(parent),
        None => Vec::new(),
    };
    Definition {
        language: hit.blob.language.clone(),
        path: hit.blob.src.clone(),
        blob_name: hit.blob.name.clone(),
        lpath,
        name: node.name.clone(),
        line: node.span.start,
        ilk: node.ilk().to_string(),
        citdl,
        signature,
        doc: node.doc().map(str::to_string),
    }
}

/// One session's resolution state: the abort hook, the library stack and
/// the per-expression evaluation counts behind the cycle sentinel.
pub struct TreeWalker<'a> {
    ctlr: &'a EvalController,
    libs: &'a LibraryStack,
    plugin: &'a dyn LanguagePlugin,
    eval_counts: HashMap<String, u32>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        ctlr: &'a EvalController,
        libs: &'a LibraryStack,
        plugin: &'a dyn LanguagePlugin,
    ) -> Self {
        Self {
            ctlr,
            libs,
            plugin,
            eval_counts: HashMap::new(),
        }
    }

    fn check_abort(&self) -> ResolutionResult<()> {
        if self.ctlr.is_aborted() {
            return Err(ResolutionError::Aborted);
        }
        Ok(())
    }

    fn check_eval_count(&mut self, expr: &str) -> ResolutionResult<()> {
        let count = self.eval_counts.entry(expr.to_string()).or_insert(0);
        *count += 1;
        if *count >= MAX_EXPR_EVALS {
            return Err(ResolutionError::CyclicType {
                expr: expr.to_string(),
                count: *count,
            });
        }
        Ok(())
    }

    /// Resolve a CITDL expression in a scope to the symbol it denotes.
    pub fn resolve_expr(&mut self, expr: &str, scope: &ScopeRef) -> ResolutionResult<Hit> {
        self.check_abort()?;
        self.check_eval_count(expr)?;

        let mut tokens = parse_expr(expr).into_iter();
        let Some(first) = tokens.next() else {
            return Err(ResolutionError::TokenNotFound {
                token: expr.to_string(),
                scope: scope.to_string(),
            });
        };
        let mut hit = self.resolve_first_token(&first.name, scope)?;
        if first.call {
            hit = self.resolve_call(hit)?;
        }
        for token in tokens {
            hit = self.getattr(hit, &token.name)?;
            if token.call {
                hit = self.resolve_call(hit)?;
            }
        }
        Ok(hit)
    }

    /// Resolve the leading token of an expression by walking the scope
    /// stack outward: direct children (last definition wins), star imports,
    /// the scope's own name, then enclosing scopes, then built-ins.
    fn resolve_first_token(&mut self, token: &str, start: &ScopeRef) -> ResolutionResult<Hit> {
        self.check_abort()?;
        let mut current = Some(start.clone());
        while let Some(scope) = current {
            let Some(scope_node) = scope.node() else {
                break;
            };
            if let Some(child) = scope.blob.child_named(scope_node, token) {
                return self.hit_through_import(Hit::new(Arc::clone(&scope.blob), child));
            }
            if let Some(hit) = self.hit_from_star_imports(&scope.blob, scope_node, token)? {
                return Ok(hit);
            }
            if !scope.lpath.is_empty() && scope.blob.node(scope_node).name == token {
                return Ok(Hit::new(Arc::clone(&scope.blob), scope_node));
            }
            current = scope.parent();
        }
        if let Some(builtins) = self.plugin.builtins() {
            if let Some(child) = builtins.child_named(builtins.root(), token) {
                return Ok(Hit::new(builtins, child));
            }
        }
        Err(ResolutionError::TokenNotFound {
            token: token.to_string(),
            scope: start.to_string(),
        })
    }

    /// Search a scope's star imports for a top-level name. An unresolvable
    /// starred module contributes nothing.
    fn hit_from_star_imports(
        &mut self,
        blob: &Arc<Blob>,
        scope: NodeId,
        token: &str,
    ) -> ResolutionResult<Option<Hit>> {
        for import in blob.imports_in(scope) {
            let Payload::Import { module, symbol, .. } = &blob.node(import).payload else {
                continue;
            };
            if symbol.as_deref() != Some("*") {
                continue;
            }
            match self.libs.import_blob(module) {
                Some((imported, _)) => {
                    if let Some(child) = imported.child_named(imported.root(), token) {
                        return Ok(Some(Hit::new(imported, child)));
                    }
                }
                None => {
                    debug!(module, "starred module not found in any library, skipping");
                }
            }
        }
        Ok(None)
    }

    /// If a hit landed on an import node, follow it into the imported blob.
    fn hit_through_import(&mut self, hit: Hit) -> ResolutionResult<Hit> {
        let node = hit.blob.node(hit.node);
        let Payload::Import { module, symbol, .. } = &node.payload else {
            return Ok(hit);
        };
        match symbol.as_deref() {
            // `import mod` / `import mod as alias`: the whole blob.
            None | Some("*") => {
                let (blob, _) = self.import_module(module)?;
                Ok(Hit::new(blob, NodeId::ROOT))
            }
            // `from mod import sym [as alias]`: a top-level symbol, or the
            // submodule `mod.sym` when the symbol is not in the blob.
            Some(sym) => {
                if let Some((blob, _)) = self.libs.import_blob(module) {
                    if let Some(child) = blob.child_named(blob.root(), sym) {
                        return self.hit_through_import(Hit::new(blob, child));
                    }
                }
                let submodule = format!("{module}.{sym}");
                match self.libs.import_blob(&submodule) {
                    Some((blob, _)) => Ok(Hit::new(blob, NodeId::ROOT)),
                    None => Err(ResolutionError::ImportNotFound { module: submodule }),
                }
            }
        }
    }

    fn import_module(&mut self, module: &str) -> ResolutionResult<(Arc<Blob>, String)> {
        if let Some(found) = self.libs.import_blob(module) {
            return Ok(found);
        }
        // Dotted modules fall back to the final segment, since directory
        // libraries key blobs by file stem.
        if let Some(last) = module.rsplit('.').next() {
            if last != module {
                if let Some(found) = self.libs.import_blob(last) {
                    return Ok(found);
                }
            }
        }
        Err(ResolutionError::ImportNotFound {
            module: module.to_string(),
        })
    }

    /// Resolve a member access on a hit.
    pub fn getattr(&mut self, hit: Hit, member: &str) -> ResolutionResult<Hit> {
        self.check_abort()?;
        let node = hit.blob.node(hit.node);
        match &node.payload {
            Payload::Scope { kind, bases, .. } => {
                if let Some(child) = hit.blob.child_named(hit.node, member) {
                    return self.hit_through_import(Hit::new(Arc::clone(&hit.blob), child));
                }
                if *kind == ScopeKind::Class {
                    for base in bases {
                        if self.base_denied(base) {
                            continue;
                        }
                        match self.resolve_in_base(&hit, base, member) {
                            Ok(Some(found)) => return Ok(found),
                            Ok(None) => {}
                            Err(err) => return Err(err),
                        }
                    }
                }
                Err(ResolutionError::MemberNotFound {
                    member: member.to_string(),
                    on: hit.describe(),
                })
            }
            Payload::Variable { citdl, .. } => {
                let citdl = citdl.clone().ok_or_else(|| ResolutionError::UnknownType {
                    name: node.name.clone(),
                })?;
                let scope = hit.containing_scope();
                let target = self.resolve_expr(&citdl, &scope)?;
                self.getattr(target, member)
            }
            Payload::Import { .. } => {
                let through = self.hit_through_import(hit)?;
                self.getattr(through, member)
            }
        }
    }

    fn base_denied(&self, base: &str) -> bool {
        self.plugin.base_denylist().contains(&base)
    }

    /// Look up a member on one base class. A base whose own resolution
    /// fails for branch-local reasons contributes nothing.
    fn resolve_in_base(
        &mut self,
        class_hit: &Hit,
        base: &str,
        member: &str,
    ) -> ResolutionResult<Option<Hit>> {
        let scope = class_hit.containing_scope();
        let base_hit = match self.resolve_expr(base, &scope) {
            Ok(hit) => hit,
            Err(err @ (ResolutionError::Aborted | ResolutionError::CyclicType { .. })) => {
                return Err(err);
            }
            Err(err) => {
                self.ctlr
                    .log_debug(&format!("base '{base}' not resolvable: {err}"));
                return Ok(None);
            }
        };
        match self.getattr(base_hit, member) {
            Ok(found) => Ok(Some(found)),
            Err(err @ (ResolutionError::Aborted | ResolutionError::CyclicType { .. })) => Err(err),
            Err(_) => Ok(None),
        }
    }

    /// Resolve a call marker: functions yield their declared or inferred
    /// return type, calling a class yields the class (the instance offers
    /// the same members).
    pub fn resolve_call(&mut self, hit: Hit) -> ResolutionResult<Hit> {
        self.check_abort()?;
        let node = hit.blob.node(hit.node);
        match &node.payload {
            Payload::Scope {
                kind: ScopeKind::Function,
                returns,
                ..
            } => {
                let returns = returns.clone().ok_or_else(|| ResolutionError::NoReturnType {
                    name: node.name.clone(),
                })?;
                let scope = ScopeRef::new(Arc::clone(&hit.blob), hit.blob.lpath(hit.node));
                self.resolve_expr(&returns, &scope)
            }
            Payload::Scope {
                kind: ScopeKind::Class,
                ..
            } => Ok(hit),
            Payload::Variable { citdl, .. } => {
                let citdl = citdl.clone().ok_or_else(|| ResolutionError::UnknownType {
                    name: node.name.clone(),
                })?;
                let scope = hit.containing_scope();
                let target = self.resolve_expr(&citdl, &scope)?;
                self.resolve_call(target)
            }
            _ => Err(ResolutionError::NoReturnType {
                name: node.name.clone(),
            }),
        }
    }

    /// Member completions for a resolved hit: direct members, inherited
    /// members through bases, and star-import expansion for modules.
    pub fn members_of(&mut self, hit: &Hit) -> ResolutionResult<Vec<Completion>> {
        let mut cplns = Vec::new();
        let mut handled = Vec::new();
        self.collect_members(hit, &mut cplns, &mut handled)?;
        cplns.sort();
        cplns.dedup();
        Ok(cplns)
    }

    fn collect_members(
        &mut self,
        hit: &Hit,
        out: &mut Vec<Completion>,
        handled: &mut Vec<String>,
    ) -> ResolutionResult<()> {
        self.check_abort()?;
        let node = hit.blob.node(hit.node);
        match &node.payload {
            Payload::Scope { kind, bases, .. } => {
                let key = format!("{}:{}", hit.blob.name, hit.blob.lpath(hit.node).join("."));
                if handled.contains(&key) {
                    return Ok(());
                }
                handled.push(key);

                for child in hit.blob.children(hit.node) {
                    let child_node = hit.blob.node(child);
                    match &child_node.payload {
                        Payload::Import { module, symbol, .. } => {
                            // Star imports re-export the starred module's
                            // top level; named imports are not members.
                            if *kind == ScopeKind::Module && symbol.as_deref() == Some("*") {
                                if let Some((starred, _)) = self.libs.import_blob(module) {
                                    self.collect_members(
                                        &Hit::new(starred, NodeId::ROOT),
                                        out,
                                        handled,
                                    )?;
                                } else {
                                    debug!(module, "starred module not importable, skipping");
                                }
                            }
                        }
                        _ => out.push(Completion::new(child_node.ilk(), &child_node.name)),
                    }
                }

                if *kind == ScopeKind::Class {
                    for base in bases {
                        if self.base_denied(base) {
                            continue;
                        }
                        let scope = hit.containing_scope();
                        match self.resolve_expr(base, &scope) {
                            Ok(base_hit) => self.collect_members(&base_hit, out, handled)?,
                            Err(err @ (ResolutionError::Aborted
                            | ResolutionError::CyclicType { .. })) => return Err(err),
                            Err(err) => {
                                self.ctlr
                                    .log_debug(&format!("skipping base '{base}': {err}"));
                            }
                        }
                    }
                }
                Ok(())
            }
            Payload::Variable { citdl, .. } => {
                let citdl = citdl.clone().ok_or_else(|| ResolutionError::UnknownType {
                    name: node.name.clone(),
                })?;
                let scope = hit.containing_scope();
                let target = self.resolve_expr(&citdl, &scope)?;
                self.collect_members(&target, out, handled)
            }
            Payload::Import { .. } => {
                let through = self.hit_through_import(hit.clone())?;
                self.collect_members(&through, out, handled)
            }
        }
    }

    /// Build the calltip for a callable hit.
    pub fn calltip_of(&mut self, hit: &Hit) -> ResolutionResult<Calltip> {
        self.check_abort()?;
        let node = hit.blob.node(hit.node);
        match &node.payload {
            Payload::Scope {
                kind: ScopeKind::Function,
                signature,
                doc,
                ..
            } => Ok(Calltip {
                signature: signature
                    .clone()
                    .unwrap_or_else(|| format!("{}()", node.name)),
                doc: doc.clone(),
            }),
            Payload::Scope {
                kind: ScopeKind::Class,
                doc: class_doc,
                ..
            } => {
                // Calling a class: show the constructor under the class name.
                if let Some(ctor) = self.plugin.constructor_name() {
                    if let Some(init) = hit.blob.child_named(hit.node, ctor) {
                        if let Payload::Scope { signature, doc, .. } = &hit.blob.node(init).payload
                        {
                            let sig = signature
                                .clone()
                                .unwrap_or_else(|| format!("{ctor}()"))
                                .replacen(ctor, &node.name, 1);
                            return Ok(Calltip {
                                signature: sig,
                                doc: doc.clone().or_else(|| class_doc.clone()),
                            });
                        }
                    }
                }
                Ok(Calltip {
                    signature: format!("{}()", node.name),
                    doc: class_doc.clone(),
                })
            }
            Payload::Variable { citdl, .. } => {
                let citdl = citdl.clone().ok_or_else(|| ResolutionError::UnknownType {
                    name: node.name.clone(),
                })?;
                let scope = hit.containing_scope();
                let target = self.resolve_expr(&citdl, &scope)?;
                self.calltip_of(&target)
            }
            _ => Err(ResolutionError::NoReturnType {
                name: node.name.clone(),
            }),
        }
    }
}

struct ExprToken {
    name: String,
    call: bool,
}

/// Split a CITDL expression into dotted tokens with call markers.
fn parse_expr(expr: &str) -> Vec<ExprToken> {
    expr.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (name, call) = match part.strip_suffix("()") {
                Some(name) => (name, true),
                None => (part, false),
            };
            ExprToken {
                name: name.trim().to_string(),
                call,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Library, TopLevelName};
    use crate::scan::ScanSource;
    use crate::scan::python::PythonScanSource;

    struct FixedLibrary {
        blobs: Vec<Arc<Blob>>,
    }

    impl FixedLibrary {
        fn new(blobs: Vec<Blob>) -> Self {
            Self {
                blobs: blobs.into_iter().map(Arc::new).collect(),
            }
        }
    }

    impl Library for FixedLibrary {
        fn name(&self) -> String {
            "fixed".to_string()
        }
        fn has_blob(&self, blob_name: &str) -> bool {
            self.blobs.iter().any(|b| b.name == blob_name)
        }
        fn get_blob(&self, blob_name: &str) -> Option<Arc<Blob>> {
            self.blobs.iter().find(|b| b.name == blob_name).map(Arc::clone)
        }
        fn blobs_with_prefix(&self, prefix: &str) -> Vec<String> {
            self.blobs
                .iter()
                .filter(|b| b.name.starts_with(prefix))
                .map(|b| b.name.clone())
                .collect()
        }
        fn toplevel_names(&self, _prefix: &str, _ilk: Option<&str>) -> Vec<TopLevelName> {
            Vec::new()
        }
    }

    fn scan(text: &str) -> Arc<Blob> {
        let source = PythonScanSource::new();
        let buf = Buffer::unsaved("python", "mod.py", text);
        Arc::new(source.scan_single_language(&buf).unwrap())
    }

    fn os_library() -> LibraryStack {
        let os = scan(
            "sep = '/'\ncurdir = '.'\ndef getcwd():\n    return 'cwd'\n",
        );
        let mut os = (*os).clone();
        os.name = "os".to_string();
        LibraryStack::new(vec![Arc::new(FixedLibrary::new(vec![os]))])
    }

    fn walker_env() -> (Arc<EvalController>, LibraryStack, PythonPlugin) {
        (EvalController::new(), os_library(), PythonPlugin::new())
    }

    fn scope_at(blob: &Arc<Blob>, line: u32) -> ScopeRef {
        let scope = blob.scope_at_line(line);
        ScopeRef::new(Arc::clone(blob), blob.lpath(scope))
    }

    #[test]
    fn test_resolve_local_variable_members() {
        let blob = scan("class Foo:\n    def bar(self):\n        pass\n\nf = Foo()\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let hit = walker.resolve_expr("f", &scope_at(&blob, 5)).unwrap();
        let members = walker.members_of(&hit).unwrap();
        assert!(members.contains(&Completion::new("function", "bar")));
    }

    #[test]
    fn test_resolve_through_import() {
        let blob = scan("import os\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let hit = walker.resolve_expr("os.sep", &scope_at(&blob, 1)).unwrap();
        let defn = definition_of(&hit);
        assert_eq!(defn.name, "sep");
        assert_eq!(defn.blob_name, "os");
        assert_eq!(defn.citdl.as_deref(), Some("str"));
    }

    #[test]
    fn test_inner_import_shadows_outer_variable() {
        let blob = scan("os = 1\ndef f():\n    import os\n    x = os.sep\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        // Inside f, the import is found before the module-level variable.
        let hit = walker.resolve_expr("os", &scope_at(&blob, 4)).unwrap();
        assert_eq!(hit.blob.name, "os");

        // At module level, the variable wins.
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);
        let hit = walker.resolve_expr("os", &scope_at(&blob, 1)).unwrap();
        assert_eq!(hit.blob.node(hit.node).ilk(), "variable");
    }

    #[test]
    fn test_cyclic_types_hit_sentinel() {
        let blob = scan("a = b\nb = a\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let scope = scope_at(&blob, 2);
        let hit = walker.resolve_expr("a", &scope).unwrap();
        let err = walker.getattr(hit, "x").unwrap_err();
        assert!(
            matches!(err, ResolutionError::CyclicType { .. }),
            "got: {err}"
        );
    }

    #[test]
    fn test_call_resolves_return_type() {
        let blob = scan(
            "class A:\n    def m(self):\n        pass\ndef make():\n    return A()\n",
        );
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let hit = walker.resolve_expr("make()", &scope_at(&blob, 5)).unwrap();
        let members = walker.members_of(&hit).unwrap();
        assert!(members.contains(&Completion::new("function", "m")));
    }

    #[test]
    fn test_function_without_return_type() {
        let blob = scan("def f():\n    pass\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let err = walker.resolve_expr("f()", &scope_at(&blob, 1)).unwrap_err();
        assert!(matches!(err, ResolutionError::NoReturnType { .. }));
    }

    #[test]
    fn test_inherited_members() {
        let blob = scan(
            "class Base(object):\n    def from_base(self):\n        pass\nclass Child(Base):\n    def own(self):\n        pass\n",
        );
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let hit = walker.resolve_expr("Child", &scope_at(&blob, 6)).unwrap();
        let members = walker.members_of(&hit).unwrap();
        assert!(members.contains(&Completion::new("function", "own")));
        assert!(members.contains(&Completion::new("function", "from_base")));

        let inherited = walker.getattr(hit, "from_base").unwrap();
        assert_eq!(inherited.blob.node(inherited.node).name, "from_base");
    }

    #[test]
    fn test_star_import_resolution() {
        let blob = scan("from os import *\nx = sep\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let hit = walker.resolve_expr("sep", &scope_at(&blob, 2)).unwrap();
        assert_eq!(hit.blob.name, "os");
    }

    #[test]
    fn test_unresolvable_star_import_contributes_nothing() {
        let blob = scan("from vapor import *\n");
        let (ctlr, libs, plugin) = walker_env();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);

        let err = walker
            .resolve_expr("ghost", &scope_at(&blob, 1))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::TokenNotFound { .. }));
    }

    #[test]
    fn test_abort_ends_resolution() {
        let blob = scan("x = 1\n");
        let (ctlr, libs, plugin) = walker_env();
        ctlr.abort();
        let mut walker = TreeWalker::new(&ctlr, &libs, &plugin);
        let err = walker.resolve_expr("x", &scope_at(&blob, 1)).unwrap_err();
        assert!(matches!(err, ResolutionError::Aborted));
    }

    #[test]
    fn test_evaluate_end_to_end() {
        let citadel = Citadel::new();
        citadel.register_driver(Arc::new(PythonScanSource::new()));
        let foo = scan("def bar():\n    pass\nbaz = 1\n");
        let mut foo = (*foo).clone();
        foo.name = "foo".to_string();
        let libs = LibraryStack::new(vec![Arc::new(FixedLibrary::new(vec![foo]))]);
        let plugin = PythonPlugin::new();

        let text = "import foo\nfoo.";
        let buf = Buffer::unsaved("python", "t.py", text);
        let trg = Trigger::new(
            "python",
            TrgForm::Completion,
            "object-members",
            crate::types::Pos::from_byte(text, text.len()),
            true,
            1,
        );
        let ctlr = EvalController::new();
        evaluate(&ctlr, &trg, &buf, &citadel, &libs, &plugin);

        assert_eq!(ctlr.done_reason().as_deref(), Some("success"));
        let cplns = ctlr.cplns().unwrap();
        assert_eq!(
            cplns,
            vec![
                Completion::new("function", "bar"),
                Completion::new("variable", "baz"),
            ]
        );
    }

    #[test]
    fn test_no_scan_data_reports_error() {
        let citadel = Citadel::new(); // no drivers
        let libs = LibraryStack::empty();
        let plugin = PythonPlugin::new();
        let buf = Buffer::unsaved("python", "t.py", "x.");
        let trg = Trigger::new(
            "python",
            TrgForm::Completion,
            "object-members",
            crate::types::Pos::from_byte("x.", 2),
            true,
            1,
        );
        let ctlr = EvalController::new();
        evaluate(&ctlr, &trg, &buf, &citadel, &libs, &plugin);
        assert_eq!(ctlr.done_reason().as_deref(), Some("error"));
        assert!(ctlr.cplns().is_none());
    }
}
