//! Citadel: an editor-embedded, multi-language code intelligence engine.
//!
//! The engine keeps per-buffer scan results (scope trees) current through a
//! debounced background indexer, resolves CITDL type expressions against
//! the lexical scope stack and an ordered library search path, and answers
//! completion, calltip and go-to-definition requests through asynchronous
//! evaluation sessions.
//!
//! Embedders construct an [`Engine`], feed it [`citadel::Buffer`] snapshots
//! on edit, and ask for [`eval::Trigger`]s and their results.

pub mod citadel;
pub mod citdl;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod eval;
pub mod indexer;
pub mod library;
pub mod scan;
pub mod tree;
pub mod types;

// Explicit exports for better API clarity
pub use citadel::{Buffer, Citadel};
pub use citdl::{LanguagePlugin, PluginRegistry};
pub use config::Settings;
pub use engine::Engine;
pub use error::{
    DatabaseError, DatabaseResult, EngineError, EngineResult, ResolutionError, ResolutionResult,
    ScanError, ScanSourceResult,
};
pub use eval::{Calltip, Completion, Definition, EvalController, TrgForm, Trigger};
pub use indexer::{Indexer, Request, ScanHandle, ScanStatus};
pub use library::{Library, LibraryStack};
pub use scan::ScanSource;
pub use tree::{Blob, Hit, NodeId, ScopeRef};
pub use types::{BufferId, LineSpan, Pos, Priority};
