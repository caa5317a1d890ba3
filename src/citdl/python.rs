//! Python trigger detection and expression extraction.

use std::sync::Arc;
use std::sync::OnceLock;

use super::registry::{LanguageId, LanguagePlugin};
use crate::eval::{TrgForm, Trigger};
use crate::tree::{Blob, BlobBuilder, NodeId, ScopeKind};
use crate::types::{LineSpan, Pos};

const PYTHON: LanguageId = LanguageId::new("python");

pub(crate) const PY_QUOTES: &[u8] = &[b'\'', b'"'];

#[derive(Debug)]
pub struct PythonPlugin;

impl PythonPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguagePlugin for PythonPlugin {
    fn id(&self) -> LanguageId {
        PYTHON
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyw"]
    }

    fn trg_from_pos(&self, text: &str, pos: usize, implicit: bool) -> Option<Trigger> {
        if implicit && in_string_or_comment(text, pos.saturating_sub(1), PY_QUOTES, "#") {
            return None;
        }
        trg_from_pos("python", text, pos, implicit)
    }

    fn citdl_expr_at(&self, text: &str, trg: &Trigger) -> String {
        citdl_expr_for_trigger(text, trg)
    }

    fn in_string_or_comment(&self, text: &str, pos: usize) -> bool {
        in_string_or_comment(text, pos, PY_QUOTES, "#")
    }

    fn base_denylist(&self) -> &'static [&'static str] {
        &["object"]
    }

    fn builtins(&self) -> Option<Arc<Blob>> {
        static BUILTINS: OnceLock<Arc<Blob>> = OnceLock::new();
        Some(Arc::clone(BUILTINS.get_or_init(python_builtins)))
    }

    fn constructor_name(&self) -> Option<&'static str> {
        Some("__init__")
    }
}

/// Shared trigger classification for the dot-and-paren languages.
pub(crate) fn trg_from_pos(
    language: &str,
    text: &str,
    pos: usize,
    implicit: bool,
) -> Option<Trigger> {
    if pos == 0 || pos > text.len() || !text.is_char_boundary(pos) {
        return None;
    }
    let typed = text.as_bytes()[pos - 1];
    let before = if pos >= 2 {
        Some(text.as_bytes()[pos - 2])
    } else {
        None
    };
    match typed {
        b'.' => {
            // Only an expression tail triggers; "3." or a lone "." does not.
            if before.is_some_and(|b| is_expr_byte(b) || b == b')') {
                Some(Trigger::new(
                    language,
                    TrgForm::Completion,
                    "object-members",
                    Pos::from_byte(text, pos),
                    implicit,
                    1,
                ))
            } else {
                None
            }
        }
        b'(' => {
            if before.is_some_and(is_expr_byte) {
                Some(Trigger::new(
                    language,
                    TrgForm::Calltip,
                    "call-signature",
                    Pos::from_byte(text, pos),
                    implicit,
                    1,
                ))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_expr_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Line-local lexical check: whether `pos` falls inside a string literal or
/// after a line-comment marker. Only the current line is scanned, so a
/// triple-quoted string spanning lines is out of reach here; the dominant
/// editing cases (typing inside `'...'`, `"..."` or a trailing comment) are
/// what this gates.
pub(crate) fn in_string_or_comment(
    text: &str,
    pos: usize,
    quotes: &[u8],
    line_comment: &str,
) -> bool {
    let pos = pos.min(text.len());
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let bytes = text.as_bytes();
    let marker = line_comment.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = line_start;
    while i < pos {
        match quote {
            Some(q) => {
                if bytes[i] == b'\\' {
                    i += 1;
                } else if bytes[i] == q {
                    quote = None;
                }
            }
            None => {
                if quotes.contains(&bytes[i]) {
                    quote = Some(bytes[i]);
                } else if bytes[i..].starts_with(marker) {
                    return true;
                }
            }
        }
        i += 1;
    }
    quote.is_some()
}

/// The CITDL expression a trigger asks about.
///
/// Completion and calltip triggers evaluate the expression ending right
/// before the trigger character; definition triggers evaluate the full
/// dotted expression containing the position.
pub(crate) fn citdl_expr_for_trigger(text: &str, trg: &Trigger) -> String {
    match trg.form {
        TrgForm::Completion | TrgForm::Calltip => {
            let end = trg.pos.byte.saturating_sub(trg.length);
            citdl_expr_before(text, end)
        }
        TrgForm::Definition => {
            let mut end = trg.pos.byte.min(text.len());
            while end < text.len() && is_expr_byte(text.as_bytes()[end]) {
                end += 1;
            }
            citdl_expr_before(text, end)
        }
    }
}

/// Scan backwards from `end` over identifier characters, dots and empty
/// call parens, yielding the dotted expression that ends there.
pub(crate) fn citdl_expr_before(text: &str, end: usize) -> String {
    let bytes = text.as_bytes();
    let end = end.min(bytes.len());
    let mut start = end;
    while start > 0 {
        let b = bytes[start - 1];
        if is_expr_byte(b) || b == b'.' {
            start -= 1;
        } else if b == b')' && start >= 2 && bytes[start - 2] == b'(' {
            // Empty call marker "()" stays part of the expression.
            start -= 2;
        } else {
            break;
        }
    }
    text[start..end].trim_matches('.').to_string()
}

/// Synthesized blob of Python built-in names, consulted after the scope
/// stack. Covers the literal types the scanner infers plus a few constants.
fn python_builtins() -> Arc<Blob> {
    let mut b = BlobBuilder::new("python", "*");
    let r = NodeId::ROOT;

    let str_cls = add_class(&mut b, r, "str");
    for (method, returns) in [
        ("upper", "str"),
        ("lower", "str"),
        ("strip", "str"),
        ("split", "list"),
        ("join", "str"),
        ("startswith", "bool"),
        ("endswith", "bool"),
        ("replace", "str"),
    ] {
        add_method(&mut b, str_cls, method, returns);
    }

    let int_cls = add_class(&mut b, r, "int");
    add_method(&mut b, int_cls, "bit_length", "int");

    let float_cls = add_class(&mut b, r, "float");
    add_method(&mut b, float_cls, "is_integer", "bool");

    add_class(&mut b, r, "bool");

    let list_cls = add_class(&mut b, r, "list");
    for (method, returns) in [("append", ""), ("pop", ""), ("sort", ""), ("count", "int")] {
        add_method(&mut b, list_cls, method, returns);
    }

    let dict_cls = add_class(&mut b, r, "dict");
    for (method, returns) in [("get", ""), ("keys", "list"), ("values", "list"), ("items", "list")]
    {
        add_method(&mut b, dict_cls, method, returns);
    }

    add_class(&mut b, r, "tuple");

    b.add_variable(r, "True", 1, Some("bool"), None);
    b.add_variable(r, "False", 1, Some("bool"), None);
    b.add_variable(r, "__name__", 1, Some("str"), None);
    let len_fn = b.add_scope(r, "len", ScopeKind::Function, LineSpan::at(1));
    b.set_signature(len_fn, "len(obj)");
    b.set_returns(len_fn, "int");

    Arc::new(b.finish())
}

fn add_class(b: &mut BlobBuilder, parent: NodeId, name: &str) -> NodeId {
    b.add_scope(parent, name, ScopeKind::Class, LineSpan::at(1))
}

fn add_method(b: &mut BlobBuilder, class: NodeId, name: &str, returns: &str) -> NodeId {
    let m = b.add_scope(class, name, ScopeKind::Function, LineSpan::at(1));
    b.set_signature(m, &format!("{name}(...)"));
    if !returns.is_empty() {
        b.set_returns(m, returns);
    }
    m
}
