//! The background indexer: one worker thread that serializes all scan and
//! preload work, fed by a deduplicating priority queue with a debounced
//! staging layer.
//!
//! Concurrent edits never cause concurrent scans of the same buffer; the
//! editor thread stages/enqueues without blocking. A control-priority
//! request can stop the worker or pause it until resumed.

mod queue;

pub use queue::{Item, StagingQueue, UniqueRequestQueue};

use parking_lot::{Condvar, Mutex};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, error, warn};

use crate::citadel::{Buffer, Citadel};
use crate::library::LibraryStack;
use crate::types::Priority;

/// Milliseconds since the epoch; the timestamp base for requests and scans.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Outcome of a completed scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// The scan ran and (presumably) something changed
    Changed,
    /// The cache already had a result at least as new; scan not re-executed
    Skipped,
}

/// Completion handle for a scan request. Requestors can block on it.
#[derive(Clone)]
pub struct ScanHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    status: Mutex<Option<ScanStatus>>,
    done: Condvar,
}

impl ScanHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                status: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    fn complete(&self, status: ScanStatus) {
        let mut guard = self.inner.status.lock();
        if guard.is_none() {
            *guard = Some(status);
        }
        self.inner.done.notify_all();
    }

    /// Wait for completion of this particular scan.
    pub fn wait(&self, timeout: Duration) -> Option<ScanStatus> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.status.lock();
        while guard.is_none() {
            if self.inner.done.wait_until(&mut guard, deadline).timed_out() {
                return None;
            }
        }
        *guard
    }

    pub fn status(&self) -> Option<ScanStatus> {
        *self.inner.status.lock()
    }
}

/// Handshake for pausing the worker between requests.
pub struct PauseGate {
    paused: Mutex<bool>,
    paused_cond: Condvar,
    resumed: Mutex<bool>,
    resumed_cond: Condvar,
}

impl PauseGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            paused: Mutex::new(false),
            paused_cond: Condvar::new(),
            resumed: Mutex::new(false),
            resumed_cond: Condvar::new(),
        })
    }

    /// Worker side: announce the pause, then block until resumed.
    fn enter(&self) {
        *self.paused.lock() = true;
        self.paused_cond.notify_all();
        let mut resumed = self.resumed.lock();
        while !*resumed {
            self.resumed_cond.wait(&mut resumed);
        }
    }

    /// Caller side: wait until the worker has actually paused.
    pub fn wait_paused(&self) {
        let mut paused = self.paused.lock();
        while !*paused {
            self.paused_cond.wait(&mut paused);
        }
    }

    pub fn resume(&self) {
        *self.resumed.lock() = true;
        self.resumed_cond.notify_all();
    }
}

/// Scheduler control instructions, carried at `Priority::Control`.
pub enum Control {
    Stop,
    Pause(Arc<PauseGate>),
}

/// What a queued request asks the worker to do.
pub enum RequestKind {
    /// Scan a buffer into the scan-result cache
    Scan {
        buffer: Buffer,
        force: bool,
        mtime: u64,
        handle: ScanHandle,
    },
    /// Warm the directory libraries a buffer imports from
    PreloadLibs { libs: LibraryStack },
    /// Forced re-derivation of a (markup) buffer's scan result
    Reparse { buffer: Buffer },
    Control(Control),
}

/// A queue-able request. One live request per id at any time.
pub struct Request {
    pub id: String,
    pub priority: Priority,
    pub kind: RequestKind,
}

impl Request {
    /// A scan request plus the handle its requestor can wait on.
    pub fn scan(
        buffer: Buffer,
        priority: Priority,
        force: bool,
        mtime: Option<u64>,
    ) -> (Self, ScanHandle) {
        let handle = ScanHandle::new();
        let request = Self {
            id: buffer.id.as_str().to_string(),
            priority,
            kind: RequestKind::Scan {
                buffer,
                force,
                mtime: mtime.unwrap_or_else(now_millis),
                handle: handle.clone(),
            },
        };
        (request, handle)
    }

    pub fn preload_libs(buffer_id: &str, libs: LibraryStack) -> Self {
        Self {
            id: format!("{buffer_id}#preload-libs"),
            priority: Priority::Background,
            kind: RequestKind::PreloadLibs { libs },
        }
    }

    pub fn reparse(buffer: Buffer, priority: Priority) -> Self {
        Self {
            id: format!("{}#reparse", buffer.id),
            priority,
            kind: RequestKind::Reparse { buffer },
        }
    }

    pub fn stop() -> Self {
        Self {
            id: "indexer stop request".to_string(),
            priority: Priority::Control,
            kind: RequestKind::Control(Control::Stop),
        }
    }

    pub fn pause(gate: Arc<PauseGate>) -> Self {
        Self {
            id: "indexer pause request".to_string(),
            priority: Priority::Control,
            kind: RequestKind::Control(Control::Pause(gate)),
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RequestKind::Scan { .. } => write!(f, "scan request '{}' (prio {})", self.id, self.priority),
            RequestKind::PreloadLibs { .. } => write!(f, "pre-load libs '{}'", self.id),
            RequestKind::Reparse { .. } => write!(f, "reparse '{}' (prio {})", self.id, self.priority),
            RequestKind::Control(Control::Stop) => write!(f, "<indexer stop request>"),
            RequestKind::Control(Control::Pause(_)) => write!(f, "<indexer pause request>"),
        }
    }
}

struct Threads {
    worker: JoinHandle<()>,
    timer: JoinHandle<()>,
    done_rx: crossbeam_channel::Receiver<()>,
}

/// The background indexer. Owns the staging queue, its timer thread, and
/// the single worker thread.
pub struct Indexer {
    staging: Arc<StagingQueue>,
    citadel: Arc<Citadel>,
    threads: Mutex<Option<Threads>>,
    grace: Duration,
}

impl Indexer {
    pub fn new(citadel: Arc<Citadel>, staging_delay: Duration, grace: Duration) -> Self {
        Self {
            staging: StagingQueue::new(staging_delay),
            citadel,
            threads: Mutex::new(None),
            grace,
        }
    }

    /// Spawn the timer and worker threads. Idempotent.
    pub fn start(&self) {
        let mut threads = self.threads.lock();
        if threads.is_some() {
            return;
        }
        let timer = {
            let staging = Arc::clone(&self.staging);
            std::thread::Builder::new()
                .name("citadel-staging".to_string())
                .spawn(move || staging.run_timer())
                .expect("failed to spawn staging timer thread")
        };
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = {
            let queue = Arc::clone(self.staging.live());
            let citadel = Arc::clone(&self.citadel);
            std::thread::Builder::new()
                .name("citadel-indexer".to_string())
                .spawn(move || {
                    worker_loop(queue, citadel);
                    let _ = done_tx.send(());
                })
                .expect("failed to spawn indexer worker thread")
        };
        *threads = Some(Threads {
            worker,
            timer,
            done_rx,
        });
    }

    /// Place a request on deck; it reaches the live queue after the
    /// debounce delay (or the given override) with no further restage.
    pub fn stage_request(&self, request: Request, delay: Option<Duration>) {
        self.staging.stage(request, delay);
    }

    /// Enqueue directly, bypassing the debounce.
    pub fn add_request(&self, request: Request) {
        self.staging.enqueue(request);
    }

    /// Pause the worker before its next request; blocks until it has.
    pub fn pause(&self) -> Arc<PauseGate> {
        let gate = PauseGate::new();
        self.add_request(Request::pause(Arc::clone(&gate)));
        gate.wait_paused();
        debug!("indexer: paused");
        gate
    }

    pub fn resume(&self, gate: &PauseGate) {
        gate.resume();
        debug!("indexer: resumed");
    }

    /// Stop the staging timer and worker, waiting a bounded grace period.
    /// Safe to call even if the worker never started, and more than once.
    pub fn finalize(&self) {
        self.staging.finalize();
        let threads = self.threads.lock().take();
        let Some(threads) = threads else {
            return;
        };
        self.add_request(Request::stop());
        if threads.done_rx.recv_timeout(self.grace).is_err() {
            warn!("indexer worker did not stop within the grace period, detaching");
            return;
        }
        let _ = threads.worker.join();
        let _ = threads.timer.join();
    }
}

/// The worker loop: dequeue, execute, mark complete, repeat. An unexpected
/// panic while processing one request is caught and logged; one bad file
/// must not kill the background thread.
fn worker_loop(queue: Arc<UniqueRequestQueue>, citadel: Arc<Citadel>) {
    debug!("indexer: start");
    loop {
        let item = queue.get();
        match item.request.kind {
            RequestKind::Control(Control::Stop) => break,
            RequestKind::Control(Control::Pause(gate)) => {
                gate.enter();
                continue;
            }
            RequestKind::Scan {
                buffer,
                force,
                mtime,
                handle,
            } => {
                let status = catch_unwind(AssertUnwindSafe(|| {
                    process_scan(&citadel, &buffer, force, mtime)
                }))
                .unwrap_or_else(|_| {
                    error!(buffer = %buffer.id, "unexpected internal error in indexer: ignoring and continuing");
                    ScanStatus::Changed
                });
                handle.complete(status);
            }
            RequestKind::PreloadLibs { libs } => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    for lib in libs.libs() {
                        lib.preload();
                    }
                }));
                if result.is_err() {
                    error!(id = %item.request.id, "unexpected internal error in indexer: ignoring and continuing");
                }
            }
            RequestKind::Reparse { buffer } => {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    citadel.scan(&buffer, now_millis(), true);
                }));
                if result.is_err() {
                    error!(buffer = %buffer.id, "unexpected internal error in indexer: ignoring and continuing");
                }
            }
        }
    }
    debug!("indexer thread: stopped");
}

fn process_scan(citadel: &Citadel, buffer: &Buffer, force: bool, mtime: u64) -> ScanStatus {
    if !force {
        if let Some(cached) = citadel.scan_time(&buffer.id) {
            if cached > mtime {
                debug!(buffer = %buffer.id, "indexer: drop scan, cache has newer data");
                return ScanStatus::Skipped;
            }
        }
    }
    citadel.scan(buffer, mtime, false);
    ScanStatus::Changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::python::PythonScanSource;

    fn indexer() -> (Indexer, Arc<Citadel>) {
        let citadel = Arc::new(Citadel::new());
        citadel.register_driver(Arc::new(PythonScanSource::new()));
        let indexer = Indexer::new(
            Arc::clone(&citadel),
            Duration::from_millis(20),
            Duration::from_secs(2),
        );
        (indexer, citadel)
    }

    #[test]
    fn test_scan_request_end_to_end() {
        let (indexer, citadel) = indexer();
        indexer.start();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        let (req, handle) = Request::scan(buf.clone(), Priority::Immediate, false, Some(100));
        indexer.add_request(req);
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(ScanStatus::Changed)
        );
        assert_eq!(citadel.scan_time(&buf.id), Some(100));
        indexer.finalize();
    }

    #[test]
    fn test_scan_skipped_when_cache_is_newer() {
        let (indexer, citadel) = indexer();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 200, false);

        indexer.start();
        let (req, handle) = Request::scan(buf.clone(), Priority::Current, false, Some(100));
        indexer.add_request(req);
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(ScanStatus::Skipped)
        );
        indexer.finalize();
    }

    #[test]
    fn test_force_rescans_despite_newer_cache() {
        let (indexer, citadel) = indexer();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        citadel.scan(&buf, 200, false);

        indexer.start();
        let (req, handle) = Request::scan(buf.clone(), Priority::Current, true, Some(100));
        indexer.add_request(req);
        // Forced: the scan runs; the cache still rejects the stale write.
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(ScanStatus::Changed)
        );
        assert_eq!(citadel.scan_time(&buf.id), Some(200));
        indexer.finalize();
    }

    #[test]
    fn test_pause_and_resume() {
        let (indexer, citadel) = indexer();
        indexer.start();
        let gate = indexer.pause();

        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        let (req, handle) = Request::scan(buf.clone(), Priority::Immediate, false, Some(50));
        indexer.add_request(req);
        assert!(
            handle.wait(Duration::from_millis(100)).is_none(),
            "paused worker must not process requests"
        );

        indexer.resume(&gate);
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(ScanStatus::Changed)
        );
        assert_eq!(citadel.scan_time(&buf.id), Some(50));
        indexer.finalize();
    }

    #[test]
    fn test_finalize_without_start() {
        let (indexer, _) = indexer();
        indexer.finalize();
        indexer.finalize();
    }

    #[test]
    fn test_staged_request_executes_after_delay() {
        let (indexer, citadel) = indexer();
        indexer.start();
        let buf = Buffer::unsaved("python", "t.py", "x = 1\n");
        let (req, handle) = Request::scan(buf.clone(), Priority::Current, false, Some(75));
        indexer.stage_request(req, Some(Duration::from_millis(10)));
        assert_eq!(
            handle.wait(Duration::from_secs(5)),
            Some(ScanStatus::Changed)
        );
        assert_eq!(citadel.scan_time(&buf.id), Some(75));
        indexer.finalize();
    }
}
