//! Error types for the code intelligence engine
//!
//! This module provides structured error types using thiserror. Errors local
//! to resolving one sub-expression stay inside the CITDL walker; errors that
//! end an evaluation session only ever surface through the controller's
//! `done(reason)` contract.

use crate::types::BufferId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving a CITDL expression.
///
/// These are terminal for one evaluation session (or one import branch),
/// never for the engine.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("couldn't resolve '{token}' starting at scope '{scope}'")]
    TokenNotFound { token: String, scope: String },

    #[error("couldn't find '{member}' attribute on '{on}'")]
    MemberNotFound { member: String, on: String },

    #[error("don't know type of '{name}' (no CITDL type recorded)")]
    UnknownType { name: String },

    #[error(
        "hit eval sentinel: expr '{expr}' eval count is {count} (likely cyclic type inference, aborting)"
    )]
    CyclicType { expr: String, count: u32 },

    #[error("'{module}' import could not be mapped to any library")]
    ImportNotFound { module: String },

    #[error("no {language} scan info for '{buffer}'")]
    NoScanData {
        language: String,
        buffer: BufferId,
    },

    #[error("calling '{name}' does not declare a return type")]
    NoReturnType { name: String },

    #[error("evaluation aborted")]
    Aborted,
}

/// Errors from the external scope-tree source (CILE driver).
///
/// A failed scan becomes the buffer's cached error string; it is never
/// propagated past the scan-result cache.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("error scanning '{buffer}': {message}")]
    Driver { buffer: BufferId, message: String },

    #[error(
        "cannot scan {language} buffer: no driver registered\nSuggestion: register a ScanSource for the language or disable it in citadel.toml"
    )]
    NoDriver { language: String },

    #[error(
        "cannot scan buffer: 'path' is not set (a synthetic path starting with '<Unsaved>' is okay)"
    )]
    NoPath,
}

/// Errors from the persisted zone index layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to write zone index '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize zone index '{path}': {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(
        "zone index '{path}' is corrupted: {reason}\nSuggestion: delete the file; the zone will rebuild from scratch on next use"
    )]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors visible at the engine API boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("eval for {trigger} timed out after {timeout_ms}ms")]
    EvalTimeout { trigger: String, timeout_ms: u64 },

    #[error("the engine has been shut down; no further requests are accepted")]
    ShutDown,

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type alias for CITDL resolution steps
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Result type alias for scope-tree source operations
pub type ScanSourceResult<T> = Result<T, ScanError>;

/// Result type alias for zone index operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Result type alias for engine API operations
pub type EngineResult<T> = Result<T, EngineError>;

impl ResolutionError {
    /// True for failures that only invalidate one lookup branch.
    ///
    /// Branch-local failures are absorbed by the walker (reported as "no
    /// match") so partial completion lists can still be produced.
    pub fn is_branch_local(&self) -> bool {
        matches!(self, Self::ImportNotFound { .. })
    }
}
