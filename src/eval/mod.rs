//! Triggers and evaluation sessions.
//!
//! A `Trigger` is a classified opportunity to offer completions, a calltip,
//! or a definition at a buffer position. An `EvalController` owns exactly
//! one resolution session and enforces its lifecycle: `start`, optional
//! description and log calls, at most one `set_*` result call, then
//! `done(reason)` exactly once. Terminal states are final.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::types::Pos;

/// The three things a trigger can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrgForm {
    Completion,
    Calltip,
    Definition,
}

impl TrgForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrgForm::Completion => "complete",
            TrgForm::Calltip => "calltip",
            TrgForm::Definition => "defn",
        }
    }
}

/// A classified completion/calltip/definition opportunity.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Language id, e.g. "python"
    pub language: String,
    pub form: TrgForm,
    /// Fine-grained subtype, e.g. "object-members"
    pub trg_type: String,
    pub pos: Pos,
    /// False when explicitly requested (e.g. a "complete now" command)
    pub implicit: bool,
    /// Number of characters of the trigger token ('.' = 1, '->' = 2)
    pub length: usize,
}

impl Trigger {
    pub fn new(
        language: &str,
        form: TrgForm,
        trg_type: &str,
        pos: Pos,
        implicit: bool,
        length: usize,
    ) -> Self {
        Self {
            language: language.to_string(),
            form,
            trg_type: trg_type.to_string(),
            pos,
            implicit,
            length,
        }
    }

    /// User-friendly name, e.g. "python-complete-object-members".
    pub fn name(&self) -> String {
        format!("{}-{}-{}", self.language, self.form.as_str(), self.trg_type)
    }

    /// True iff the given trigger is effectively the same as this one.
    pub fn is_same(&self, other: &Trigger) -> bool {
        self.pos == other.pos
            && self.trg_type == other.trg_type
            && self.form == other.form
            && self.language == other.language
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.name(),
            self.pos.line,
            self.pos.byte
        )
    }
}

/// A completion candidate: ilk plus name, e.g. ("function", "join").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Completion {
    pub ilk: String,
    pub name: String,
}

impl Completion {
    pub fn new(ilk: &str, name: &str) -> Self {
        Self {
            ilk: ilk.to_string(),
            name: name.to_string(),
        }
    }
}

/// A calltip: signature text plus attached documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Calltip {
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub language: String,
    /// Absolute source path; None for synthetic blobs (stdlib snapshots)
    pub path: Option<PathBuf>,
    pub blob_name: String,
    /// Scope-name path inside the blob
    pub lpath: Vec<String>,
    pub name: String,
    /// 1-based
    pub line: u32,
    pub ilk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citdl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Result payload of one evaluation session.
#[derive(Debug, Clone)]
pub enum EvalResults {
    Completions(Vec<Completion>),
    Calltips(Vec<Calltip>),
    Definitions(Vec<Definition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Pending,
    Running,
    Done(String),
}

struct ControllerState {
    state: SessionState,
    desc: Option<String>,
    results: Option<EvalResults>,
}

/// Controls one asynchronous evaluation session.
///
/// The evaluation engine calls `start`, may call `set_desc` and the log
/// methods, calls at most one of the `set_*` methods once, and finishes
/// with exactly one `done(reason)`. Long-running steps must poll
/// `is_aborted`. `done` latches; any later transition attempt is ignored.
pub struct EvalController {
    state: Mutex<ControllerState>,
    complete: Condvar,
    aborted: AtomicBool,
}

impl EvalController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ControllerState {
                state: SessionState::Pending,
                desc: None,
                results: None,
            }),
            complete: Condvar::new(),
            aborted: AtomicBool::new(false),
        })
    }

    /// Beginning of evaluation. At most one session runs per controller;
    /// a second `start` is a programming error and is ignored.
    pub fn start(&self, trg: &Trigger) {
        let mut state = self.state.lock();
        match state.state {
            SessionState::Pending => {
                state.state = SessionState::Running;
                debug!(trigger = %trg.name(), "eval session started");
            }
            _ => {
                warn!(trigger = %trg.name(), "eval controller already started, ignoring");
                debug_assert!(false, "EvalController::start called twice");
            }
        }
    }

    pub fn set_desc(&self, desc: &str) {
        self.state.lock().desc = Some(desc.to_string());
    }

    pub fn desc(&self) -> Option<String> {
        self.state.lock().desc.clone()
    }

    /// Completion handling has finished. Only the first call takes effect,
    /// regardless of abort/timeout/success path.
    pub fn done(&self, reason: &str) {
        let mut state = self.state.lock();
        if matches!(state.state, SessionState::Done(_)) {
            return;
        }
        info!(reason, "done eval");
        state.state = SessionState::Done(reason.to_string());
        self.complete.notify_all();
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state.lock().state, SessionState::Done(_))
    }

    pub fn done_reason(&self) -> Option<String> {
        match &self.state.lock().state {
            SessionState::Done(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Signal the session to abort. The resolution engine polls this
    /// between expensive recursive steps and unwinds promptly.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Block until this session is done or the timeout is reached.
    /// Returns true if the session finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !matches!(state.state, SessionState::Done(_)) {
            if self.complete.wait_until(&mut state, deadline).timed_out() {
                return false;
            }
        }
        true
    }

    fn set_results(&self, results: EvalResults) {
        let mut state = self.state.lock();
        if state.results.is_some() {
            warn!("eval results already set, ignoring second set");
            debug_assert!(false, "set_* called twice on one EvalController");
            return;
        }
        if matches!(state.state, SessionState::Done(_)) {
            // Late result from a session the caller already gave up on.
            debug!("discarding results delivered after done()");
            return;
        }
        state.results = Some(results);
    }

    pub fn set_cplns(&self, cplns: Vec<Completion>) {
        self.set_results(EvalResults::Completions(cplns));
    }

    pub fn set_calltips(&self, calltips: Vec<Calltip>) {
        self.set_results(EvalResults::Calltips(calltips));
    }

    pub fn set_defns(&self, defns: Vec<Definition>) {
        self.set_results(EvalResults::Definitions(defns));
    }

    pub fn cplns(&self) -> Option<Vec<Completion>> {
        match &self.state.lock().results {
            Some(EvalResults::Completions(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn calltips(&self) -> Option<Vec<Calltip>> {
        match &self.state.lock().results {
            Some(EvalResults::Calltips(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn defns(&self) -> Option<Vec<Definition>> {
        match &self.state.lock().results {
            Some(EvalResults::Definitions(d)) => Some(d.clone()),
            _ => None,
        }
    }

    // Session log hooks: forwarded to tracing under the session's desc.

    pub fn log_debug(&self, msg: &str) {
        debug!(target: "citadel::eval", "{msg}");
    }

    pub fn log_info(&self, msg: &str) {
        debug!(target: "citadel::eval", "{msg}");
    }

    pub fn log_warn(&self, msg: &str) {
        warn!(target: "citadel::eval", "{msg}");
    }

    pub fn log_error(&self, msg: &str) {
        error!(target: "citadel::eval", "{msg}");
    }
}
