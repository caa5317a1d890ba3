//! Language plugin registry
//!
//! Trigger detection and expression extraction are language-specific; the
//! resolver core is not. Each language ships a `LanguagePlugin` and registers
//! it here. The registry separates "available" (compiled in) from "enabled"
//! (allowed by citadel.toml), so users can switch languages off without
//! recompiling.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::Settings;
use crate::eval::Trigger;
use crate::tree::Blob;

/// Type-safe language identifier
///
/// Uses &'static str for zero-cost comparisons and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LanguageId(&'static str);

impl LanguageId {
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for LanguageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for LanguageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for LanguageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // LanguageId requires &'static str; known ids map to constants and
        // unknown ones are leaked once at startup.
        let static_str = match s.as_str() {
            "python" => "python",
            "javascript" => "javascript",
            _ => Box::leak(s.into_boxed_str()),
        };
        Ok(LanguageId(static_str))
    }
}

/// Registry errors with actionable suggestions
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "language '{0}' not found in registry\nSuggestion: check available languages with 'citadel list-languages'"
    )]
    LanguageNotFound(LanguageId),

    #[error(
        "language '{0}' is available but disabled\nSuggestion: enable it in citadel.toml by setting languages.{0}.enabled = true"
    )]
    LanguageDisabled(LanguageId),

    #[error(
        "no language found for extension '.{0}'\nSuggestion: add a language mapping in citadel.toml"
    )]
    ExtensionNotMapped(String),
}

/// Language-specific half of the resolution engine.
///
/// The walker in [`super`] asks a plugin three things: is there a trigger at
/// this position, what expression should be evaluated for a trigger, and
/// which names are off limits when walking base classes.
pub trait LanguagePlugin: Send + Sync + std::fmt::Debug {
    fn id(&self) -> LanguageId;

    /// File extensions (without dot) this language claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Classify the trigger, if any, created by the character *ending* at
    /// `pos` (the position right after the just-typed character).
    fn trg_from_pos(&self, text: &str, pos: usize, implicit: bool) -> Option<Trigger>;

    /// The CITDL expression that must be evaluated for a trigger, extracted
    /// from the text preceding it. Empty when there is nothing to evaluate.
    fn citdl_expr_at(&self, text: &str, trg: &Trigger) -> String;

    /// Scan backwards from `pos` for the closest trigger point, bounded by
    /// the start of the statement holding `curr_pos` (the actual cursor).
    /// Used for explicit "complete now" commands where the user is
    /// mid-expression; a trigger on an earlier statement is never returned.
    fn preceding_trg_from_pos(&self, text: &str, pos: usize, curr_pos: usize) -> Option<Trigger> {
        let anchor = pos.min(curr_pos).min(text.len());
        let floor = text[..anchor].rfind('\n').map_or(0, |i| i + 1);
        (floor..=anchor)
            .rev()
            .filter(|&p| text.is_char_boundary(p))
            .filter(|&p| !self.in_string_or_comment(text, p.saturating_sub(1)))
            .find_map(|p| self.trg_from_pos(text, p, false))
    }

    /// True when `pos` sits inside a string literal or a line comment.
    /// Implicit triggers never fire there, and the preceding-trigger scan
    /// skips such positions.
    fn in_string_or_comment(&self, _text: &str, _pos: usize) -> bool {
        false
    }

    /// Base-class names never walked for inherited members ("object" for
    /// Python; Perl's citadel equivalent lists "Exporter").
    fn base_denylist(&self) -> &'static [&'static str] {
        &[]
    }

    /// Synthesized blob of built-in names, consulted after the scope stack.
    fn builtins(&self) -> Option<Arc<Blob>> {
        None
    }

    /// Constructor method consulted when a class is called ("__init__" for
    /// Python). None when the language has no named constructor.
    fn constructor_name(&self) -> Option<&'static str> {
        None
    }
}

/// All compiled-in language plugins, keyed by id.
pub struct PluginRegistry {
    plugins: HashMap<LanguageId, Arc<dyn LanguagePlugin>>,
    by_extension: HashMap<&'static str, LanguageId>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in language registered.
    pub fn with_builtin_languages() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::python::PythonPlugin::new()));
        registry.register(Arc::new(super::javascript::JavaScriptPlugin::new()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn LanguagePlugin>) {
        let id = plugin.id();
        for ext in plugin.extensions() {
            self.by_extension.insert(ext, id);
        }
        self.plugins.insert(id, plugin);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn LanguagePlugin>> {
        self.plugins
            .iter()
            .find(|(id, _)| id.as_str() == language)
            .map(|(_, plugin)| Arc::clone(plugin))
    }

    /// Plugin lookup that honors the enabled flag in settings.
    pub fn get_enabled(
        &self,
        language: &str,
        settings: &Settings,
    ) -> Result<Arc<dyn LanguagePlugin>, RegistryError> {
        let plugin = self
            .get(language)
            .ok_or_else(|| RegistryError::LanguageNotFound(LanguageId(leak(language))))?;
        if !settings.is_language_enabled(language) {
            return Err(RegistryError::LanguageDisabled(plugin.id()));
        }
        Ok(plugin)
    }

    pub fn language_for_extension(&self, extension: &str) -> Option<LanguageId> {
        self.by_extension.get(extension).copied()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = LanguageId> + '_ {
        let mut ids: Vec<LanguageId> = self.plugins.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids.into_iter()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtin_languages()
    }
}

fn leak(s: &str) -> &'static str {
    match s {
        "python" => "python",
        "javascript" => "javascript",
        _ => Box::leak(s.to_string().into_boxed_str()),
    }
}
