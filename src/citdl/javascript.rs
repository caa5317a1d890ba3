//! JavaScript trigger detection and expression extraction.
//!
//! Shares the dot/paren trigger rules with Python; the comment marker,
//! quote set and denylist differ. There is no synthesized builtins blob, so
//! resolution stops at what the buffer and libraries declare.

use super::registry::{LanguageId, LanguagePlugin};
use crate::eval::Trigger;

const JAVASCRIPT: LanguageId = LanguageId::new("javascript");

const JS_QUOTES: &[u8] = &[b'\'', b'"', b'`'];

#[derive(Debug)]
pub struct JavaScriptPlugin;

impl JavaScriptPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JavaScriptPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguagePlugin for JavaScriptPlugin {
    fn id(&self) -> LanguageId {
        JAVASCRIPT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "mjs", "cjs"]
    }

    fn trg_from_pos(&self, text: &str, pos: usize, implicit: bool) -> Option<Trigger> {
        if implicit
            && super::python::in_string_or_comment(text, pos.saturating_sub(1), JS_QUOTES, "//")
        {
            return None;
        }
        super::python::trg_from_pos("javascript", text, pos, implicit)
    }

    fn citdl_expr_at(&self, text: &str, trg: &Trigger) -> String {
        super::python::citdl_expr_for_trigger(text, trg)
    }

    fn in_string_or_comment(&self, text: &str, pos: usize) -> bool {
        super::python::in_string_or_comment(text, pos, JS_QUOTES, "//")
    }

    fn base_denylist(&self) -> &'static [&'static str] {
        &["Object"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::TrgForm;

    #[test]
    fn test_dot_trigger() {
        let plugin = JavaScriptPlugin::new();
        let text = "document.";
        let trg = plugin.trg_from_pos(text, text.len(), true).unwrap();
        assert_eq!(trg.language, "javascript");
        assert_eq!(trg.form, TrgForm::Completion);
        assert_eq!(plugin.citdl_expr_at(text, &trg), "document");
    }

    #[test]
    fn test_no_implicit_trigger_in_comment_or_template() {
        let plugin = JavaScriptPlugin::new();
        let text = "// document.";
        assert!(plugin.trg_from_pos(text, text.len(), true).is_none());
        let text = "let s = `a.`";
        assert!(plugin.trg_from_pos(text, 11, true).is_none());
        // Division is not a comment marker.
        let text = "let r = a / b; r.";
        assert!(plugin.trg_from_pos(text, text.len(), true).is_some());
    }

    #[test]
    fn test_object_base_is_denied() {
        let plugin = JavaScriptPlugin::new();
        assert!(plugin.base_denylist().contains(&"Object"));
    }
}
