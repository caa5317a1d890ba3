//! The engine: the one object an embedding editor holds.
//!
//! Owns the scan-result cache, the background indexer, the plugin registry
//! and a single evaluation thread. Evaluations are serialized: a new
//! session enters the queue behind the running one, and the synchronous
//! wrappers turn a missed deadline into an abort plus a timeout error.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use crate::citadel::{Buffer, Citadel};
use crate::citdl::{self, LanguagePlugin, PluginRegistry};
use crate::config::Settings;
use crate::database::Database;
use crate::error::{EngineError, EngineResult};
use crate::eval::{Calltip, Completion, Definition, EvalController, Trigger};
use crate::indexer::{Indexer, PauseGate, Request, ScanHandle};
use crate::library::{DirLibrary, Library, LibraryStack, SnapshotLibrary};
use crate::scan::{ScanSource, python::PythonScanSource};
use crate::types::{BufferId, Priority};

struct EvalJob {
    ctlr: Arc<EvalController>,
    trg: Trigger,
    buffer: Buffer,
    libs: LibraryStack,
    plugin: Arc<dyn LanguagePlugin>,
}

/// The top-level code intelligence engine.
pub struct Engine {
    settings: Settings,
    citadel: Arc<Citadel>,
    database: Arc<Database>,
    indexer: Indexer,
    registry: PluginRegistry,
    eval_tx: Mutex<Option<Sender<EvalJob>>>,
    eval_thread: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        let citadel = Arc::new(Citadel::new());
        citadel.register_driver(Arc::new(PythonScanSource::new()));
        let database = Arc::new(Database::new(&settings.database_path));
        let indexer = Indexer::new(
            Arc::clone(&citadel),
            settings.staging_delay(),
            Duration::from_millis(settings.indexer.finalize_grace_ms),
        );
        Self {
            settings,
            citadel,
            database,
            indexer,
            registry: PluginRegistry::with_builtin_languages(),
            eval_tx: Mutex::new(None),
            eval_thread: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Engine with default settings, for embedding without a config file.
    pub fn with_defaults() -> Self {
        Self::new(Settings::default())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn citadel(&self) -> &Arc<Citadel> {
        &self.citadel
    }

    /// Register an additional scope-tree source (external CILE driver).
    pub fn register_driver(&self, driver: Arc<dyn ScanSource>) {
        self.citadel.register_driver(driver);
    }

    /// Spawn the indexer and evaluation threads. Idempotent.
    pub fn start(&self) {
        self.indexer.start();
        let mut tx_guard = self.eval_tx.lock();
        if tx_guard.is_some() {
            return;
        }
        let (tx, rx) = crossbeam_channel::unbounded::<EvalJob>();
        let citadel = Arc::clone(&self.citadel);
        let thread = std::thread::Builder::new()
            .name("citadel-eval".to_string())
            .spawn(move || eval_loop(rx, citadel))
            .expect("failed to spawn eval thread");
        *tx_guard = Some(tx);
        *self.eval_thread.lock() = Some(thread);
    }

    /// Stop both background threads. The eval queue is drained; the indexer
    /// worker gets its bounded grace period.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("engine: shutting down");
        self.eval_tx.lock().take();
        if let Some(thread) = self.eval_thread.lock().take() {
            let _ = thread.join();
        }
        self.indexer.finalize();
    }

    fn check_running(&self) -> EngineResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    // ---- indexing -------------------------------------------------------

    /// Enqueue a scan immediately, bypassing the edit debounce.
    pub fn request_scan(
        &self,
        buffer: Buffer,
        priority: Priority,
        force: bool,
        mtime: Option<u64>,
    ) -> EngineResult<ScanHandle> {
        self.check_running()?;
        let (request, handle) = Request::scan(buffer, priority, force, mtime);
        self.indexer.add_request(request);
        Ok(handle)
    }

    /// Stage a scan behind the debounce delay; further edits restage it.
    pub fn stage_scan(&self, buffer: Buffer, priority: Priority) -> EngineResult<ScanHandle> {
        self.check_running()?;
        let (request, handle) = Request::scan(buffer, priority, false, None);
        self.indexer.stage_request(request, None);
        Ok(handle)
    }

    /// Forced background re-derivation of a buffer's scan result.
    pub fn request_reparse(&self, buffer: Buffer, priority: Priority) -> EngineResult<()> {
        self.check_running()?;
        self.indexer.add_request(Request::reparse(buffer, priority));
        Ok(())
    }

    /// Queue a background warm-up of the libraries a buffer would search.
    pub fn request_preload_libs(&self, buffer: &Buffer) -> EngineResult<()> {
        self.check_running()?;
        let libs = self.library_stack(buffer);
        self.indexer
            .add_request(Request::preload_libs(buffer.id.as_str(), libs));
        Ok(())
    }

    /// Pause the indexer worker; blocks until it actually has.
    pub fn pause_indexer(&self) -> Arc<PauseGate> {
        self.indexer.pause()
    }

    pub fn resume_indexer(&self, gate: &PauseGate) {
        self.indexer.resume(gate);
    }

    /// Drop all cached state for a closed buffer.
    pub fn close_buffer(&self, id: &BufferId) {
        self.citadel.evict(id);
    }

    /// (scan time, scan error) of a buffer's last scan, for status display.
    pub fn scan_status(&self, id: &BufferId) -> (Option<u64>, Option<String>) {
        (self.citadel.scan_time(id), self.citadel.scan_error(id))
    }

    // ---- libraries ------------------------------------------------------

    /// The ordered library search targets for one buffer: the buffer's own
    /// directory, configured extra dirs, env-var dirs, catalogs, stdlib.
    pub fn library_stack(&self, buffer: &Buffer) -> LibraryStack {
        let mut libs: Vec<Arc<dyn Library>> = Vec::new();
        let driver = self.citadel.driver_for(&buffer.language);
        let extensions = self.extensions_for(&buffer.language);

        if let Some(driver) = &driver {
            let mut dirs: Vec<PathBuf> = Vec::new();
            if let Some(dir) = buffer.dir() {
                dirs.push(dir.to_path_buf());
            }
            dirs.extend(self.settings.libraries.extra_dirs.iter().cloned());
            if let Some(var) = &self.settings.libraries.env_path_var {
                if let Ok(value) = std::env::var(var) {
                    dirs.extend(std::env::split_paths(&value));
                }
            }
            for dir in dirs {
                libs.push(Arc::new(DirLibrary::new(
                    &dir,
                    &extensions,
                    Arc::clone(driver),
                    Arc::clone(&self.database),
                )));
            }
        } else {
            debug!(language = %buffer.language, "no driver, skipping directory libraries");
        }

        for catalog in &self.settings.libraries.catalogs {
            libs.push(Arc::new(SnapshotLibrary::catalog(catalog)));
        }
        if let Some(stdlib) = self.settings.libraries.stdlibs.get(&buffer.language) {
            libs.push(Arc::new(SnapshotLibrary::stdlib(&buffer.language, stdlib)));
        }
        LibraryStack::new(libs)
    }

    fn extensions_for(&self, language: &str) -> Vec<String> {
        if let Some(config) = self.settings.languages.get(language) {
            if !config.extensions.is_empty() {
                return config.extensions.clone();
            }
        }
        self.registry
            .get(language)
            .map(|plugin| {
                plugin
                    .extensions()
                    .iter()
                    .map(|e| e.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ---- triggers and evaluation ----------------------------------------

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    fn plugin_for(&self, language: &str) -> EngineResult<Arc<dyn LanguagePlugin>> {
        self.registry
            .get_enabled(language, &self.settings)
            .map_err(|e| EngineError::Config {
                reason: e.to_string(),
            })
    }

    /// Classify the trigger, if any, at a byte position in the buffer.
    pub fn trg_from_pos(
        &self,
        buffer: &Buffer,
        pos: usize,
        implicit: bool,
    ) -> EngineResult<Option<Trigger>> {
        let plugin = self.plugin_for(&buffer.language)?;
        Ok(plugin.trg_from_pos(buffer.text(), pos, implicit))
    }

    /// Find the closest trigger point at or before `pos`, bounded by the
    /// statement holding the cursor at `curr_pos`.
    pub fn preceding_trg_from_pos(
        &self,
        buffer: &Buffer,
        pos: usize,
        curr_pos: usize,
    ) -> EngineResult<Option<Trigger>> {
        let plugin = self.plugin_for(&buffer.language)?;
        Ok(plugin.preceding_trg_from_pos(buffer.text(), pos, curr_pos))
    }

    /// Queue an evaluation session; the controller tracks its progress.
    pub fn evaluate_async(
        &self,
        buffer: &Buffer,
        trg: &Trigger,
    ) -> EngineResult<Arc<EvalController>> {
        self.check_running()?;
        let plugin = self.plugin_for(&trg.language)?;
        let ctlr = EvalController::new();
        let job = EvalJob {
            ctlr: Arc::clone(&ctlr),
            trg: trg.clone(),
            buffer: buffer.clone(),
            libs: self.library_stack(buffer),
            plugin,
        };
        let tx_guard = self.eval_tx.lock();
        match tx_guard.as_ref() {
            Some(tx) if tx.send(job).is_ok() => Ok(ctlr),
            _ => Err(EngineError::ShutDown),
        }
    }

    fn wait_for(&self, ctlr: &EvalController, trg: &Trigger) -> EngineResult<()> {
        let timeout = self.settings.eval_timeout();
        if !ctlr.wait(timeout) {
            // The session stays latched as timed out; a late result from
            // the eval thread is discarded.
            ctlr.done("timed out");
            ctlr.abort();
            return Err(EngineError::EvalTimeout {
                trigger: trg.name(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Synchronous completion lookup. Empty when the session ended without
    /// results (resolution failure).
    pub fn completions_for(
        &self,
        buffer: &Buffer,
        trg: &Trigger,
    ) -> EngineResult<Vec<Completion>> {
        let ctlr = self.evaluate_async(buffer, trg)?;
        self.wait_for(&ctlr, trg)?;
        Ok(ctlr.cplns().unwrap_or_default())
    }

    /// Synchronous calltip lookup.
    pub fn calltips_for(&self, buffer: &Buffer, trg: &Trigger) -> EngineResult<Vec<Calltip>> {
        let ctlr = self.evaluate_async(buffer, trg)?;
        self.wait_for(&ctlr, trg)?;
        Ok(ctlr.calltips().unwrap_or_default())
    }

    /// Synchronous definition lookup.
    pub fn defns_for(&self, buffer: &Buffer, trg: &Trigger) -> EngineResult<Vec<Definition>> {
        let ctlr = self.evaluate_async(buffer, trg)?;
        self.wait_for(&ctlr, trg)?;
        Ok(ctlr.defns().unwrap_or_default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The evaluation thread: one session at a time, in arrival order.
fn eval_loop(rx: Receiver<EvalJob>, citadel: Arc<Citadel>) {
    debug!("eval thread: start");
    for job in rx.iter() {
        if job.ctlr.is_done() {
            // The requestor already timed this session out.
            continue;
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            citdl::evaluate(
                &job.ctlr,
                &job.trg,
                &job.buffer,
                &citadel,
                &job.libs,
                job.plugin.as_ref(),
            );
        }));
        if result.is_err() {
            warn!(trigger = %job.trg.name(), "eval session panicked");
            job.ctlr.done("error");
        }
    }
    debug!("eval thread: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Engine, tempfile::TempDir) {
        let mut settings = Settings::default();
        settings.eval.timeout_ms = 5000;
        settings.indexer.staging_delay_ms = 20;
        let dir = tempfile::tempdir().unwrap();
        settings.database_path = dir.path().join("db");
        let engine = Engine::new(settings);
        engine.start();
        (engine, dir)
    }

    #[test]
    fn test_completion_through_sibling_file() {
        let project = tempfile::tempdir().unwrap();
        std::fs::write(
            project.path().join("foo.py"),
            "def bar():\n    pass\nbaz = 1\n",
        )
        .unwrap();
        let main = project.path().join("main.py");
        let text = "import foo\nfoo.";
        std::fs::write(&main, text).unwrap();

        let (engine, _db) = engine();
        let buf = Buffer::new("python", &main, text);
        let trg = engine
            .trg_from_pos(&buf, text.len(), true)
            .unwrap()
            .expect("dot should trigger");
        let cplns = engine.completions_for(&buf, &trg).unwrap();
        assert_eq!(
            cplns,
            vec![
                Completion::new("function", "bar"),
                Completion::new("variable", "baz"),
            ]
        );
        engine.shutdown();
    }

    #[test]
    fn test_definition_through_sibling_file() {
        let project = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("util.py"), "def helper(x):\n    pass\n").unwrap();
        let main = project.path().join("main.py");
        let text = "import util\nutil.helper(1)\n";
        std::fs::write(&main, text).unwrap();

        let (engine, _db) = engine();
        let buf = Buffer::new("python", &main, text);
        let at = text.find("helper").unwrap() + 2;
        let trg = Trigger::new(
            "python",
            crate::eval::TrgForm::Definition,
            "defn",
            buf.pos_at(at),
            false,
            0,
        );
        let defns = engine.defns_for(&buf, &trg).unwrap();
        assert_eq!(defns.len(), 1);
        assert_eq!(defns[0].name, "helper");
        assert_eq!(defns[0].blob_name, "util");
        assert_eq!(defns[0].line, 1);
        engine.shutdown();
    }

    #[test]
    fn test_calltip_for_local_function() {
        let (engine, _db) = engine();
        let text = "def greet(name, loud=False):\n    pass\ngreet(";
        let buf = Buffer::unsaved("python", "t.py", text);
        let trg = engine
            .trg_from_pos(&buf, text.len(), true)
            .unwrap()
            .expect("paren should trigger");
        let tips = engine.calltips_for(&buf, &trg).unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].signature, "greet(name, loud=False)");
        engine.shutdown();
    }

    #[test]
    fn test_shutdown_refuses_new_work() {
        let (engine, _db) = engine();
        engine.shutdown();
        let buf = Buffer::unsaved("python", "t.py", "x.");
        let trg = engine.trg_from_pos(&buf, 2, true).unwrap().unwrap();
        assert!(matches!(
            engine.evaluate_async(&buf, &trg),
            Err(EngineError::ShutDown)
        ));
        assert!(matches!(
            engine.request_scan(buf, Priority::Current, false, None),
            Err(EngineError::ShutDown)
        ));
    }

    #[test]
    fn test_scan_request_reaches_cache() {
        let (engine, _db) = engine();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        let handle = engine
            .request_scan(buf.clone(), Priority::Immediate, false, Some(42))
            .unwrap();
        assert!(handle.wait(Duration::from_secs(5)).is_some());
        let (scan_time, scan_error) = engine.scan_status(&buf.id);
        assert_eq!(scan_time, Some(42));
        assert!(scan_error.is_none());
        engine.close_buffer(&buf.id);
        assert_eq!(engine.scan_status(&buf.id).0, None);
        engine.shutdown();
    }

    #[test]
    fn test_disabled_language_refused_at_api() {
        let mut settings = Settings::default();
        settings.languages.insert(
            "python".to_string(),
            crate::config::LanguageConfig {
                enabled: false,
                ..Default::default()
            },
        );
        let engine = Engine::new(settings);
        engine.start();
        let buf = Buffer::unsaved("python", "t.py", "x.");
        assert!(matches!(
            engine.trg_from_pos(&buf, 2, true),
            Err(EngineError::Config { .. })
        ));
        engine.shutdown();
    }
}
