//! Deduplicating priority queues for indexer requests.
//!
//! The live queue holds at most one entry per request id, coalesced to the
//! minimum priority and earliest timestamp seen. The staging queue layers
//! an "on deck" map in front of it: staged entries only move onto the live
//! queue after a quiescence delay, which a restage resets.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{Request, RequestKind, ScanStatus, now_millis};
use crate::types::Priority;

/// A replaced scan request never reaches the worker; complete its handle so
/// a requestor blocked on it is released instead of waiting out its own
/// timeout.
fn complete_displaced(request: &Request) {
    if let RequestKind::Scan { handle, .. } = &request.kind {
        handle.complete(ScanStatus::Skipped);
    }
}

/// One queued entry. Ordered by (priority, timestamp, seq): strict priority
/// order with FIFO tie-break.
pub struct Item {
    pub priority: Priority,
    pub timestamp: u64,
    seq: u64,
    pub request: Request,
}

impl Item {
    fn sort_key(&self) -> (Priority, u64, u64) {
        (self.priority, self.timestamp, self.seq)
    }
}

#[derive(Default)]
struct QueueState {
    items: Vec<Item>,
    next_seq: u64,
}

/// Thread-safe priority queue holding at most one request per id.
///
/// Re-inserting an id replaces the older entry with the newer request while
/// keeping `min(priority)` and the earlier timestamp, so a requestor never
/// starves and stale content is never scanned twice.
pub struct UniqueRequestQueue {
    state: Mutex<QueueState>,
    /// Signaled when the queue goes non-empty
    available: Condvar,
}

impl UniqueRequestQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
        }
    }

    /// Insert with the current time as timestamp.
    pub fn put(&self, request: Request) {
        self.put_with_timestamp(request, now_millis());
    }

    /// Insert preserving an externally assigned timestamp (staging keeps
    /// the earliest timestamp seen for an id).
    pub fn put_with_timestamp(&self, request: Request, timestamp: u64) {
        let mut state = self.state.lock();
        let mut priority = request.priority;
        let mut timestamp = timestamp;
        if let Some(pos) = state
            .items
            .iter()
            .position(|item| item.request.id == request.id)
        {
            let old = state.items.remove(pos);
            priority = priority.min(old.priority);
            timestamp = timestamp.min(old.timestamp);
            complete_displaced(&old.request);
            trace!(id = %request.id, %priority, "replacing queued request");
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let item = Item {
            priority,
            timestamp,
            seq,
            request,
        };
        let at = state
            .items
            .partition_point(|existing| existing.sort_key() <= item.sort_key());
        state.items.insert(at, item);
        self.available.notify_one();
    }

    /// Blocking dequeue of the most urgent entry.
    pub fn get(&self) -> Item {
        let mut state = self.state.lock();
        while state.items.is_empty() {
            self.available.wait(&mut state);
        }
        state.items.remove(0)
    }

    /// Dequeue with a timeout; None if nothing arrived in time.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Item> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.items.is_empty() {
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
        Some(state.items.remove(0))
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UniqueRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct OnDeck {
    due: Instant,
    priority: Priority,
    /// Earliest timestamp seen across restages of this id
    timestamp: u64,
    request: Request,
}

struct DeckState {
    entries: HashMap<String, OnDeck>,
}

/// Staging layer: a deadline map swept by a single timer thread.
///
/// `stage` places a request on deck; restaging the same id keeps the newest
/// request content, the minimum priority, the earliest timestamp, and
/// resets the due time. The timer thread only moves due entries onto the
/// live queue; it never executes requests.
pub struct StagingQueue {
    pub(super) live: Arc<UniqueRequestQueue>,
    deck: Mutex<DeckState>,
    /// Wakes the timer when something lands on an empty deck or we shut down
    deck_changed: Condvar,
    terminate: AtomicBool,
    default_delay: Duration,
}

impl StagingQueue {
    pub fn new(default_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            live: Arc::new(UniqueRequestQueue::new()),
            deck: Mutex::new(DeckState {
                entries: HashMap::new(),
            }),
            deck_changed: Condvar::new(),
            terminate: AtomicBool::new(false),
            default_delay,
        })
    }

    pub fn live(&self) -> &Arc<UniqueRequestQueue> {
        &self.live
    }

    /// Place a request on deck, due after `delay` (default if None).
    ///
    /// An entry already on deck at Immediate priority is not displaced;
    /// anything less urgent is replaced as described above.
    pub fn stage(&self, request: Request, delay: Option<Duration>) {
        if self.terminate.load(Ordering::SeqCst) {
            complete_displaced(&request);
            return;
        }
        let delay = delay.unwrap_or(self.default_delay);
        let now = now_millis();
        let mut deck = self.deck.lock();
        let (priority, timestamp) = match deck.entries.remove(&request.id) {
            Some(old) if old.priority == Priority::Immediate => {
                complete_displaced(&request);
                deck.entries.insert(request.id.clone(), old);
                return;
            }
            Some(old) => {
                complete_displaced(&old.request);
                (request.priority.min(old.priority), old.timestamp.min(now))
            }
            None => (request.priority, now),
        };
        debug!(id = %request.id, %priority, delay_ms = delay.as_millis() as u64, "staging request");
        deck.entries.insert(
            request.id.clone(),
            OnDeck {
                due: Instant::now() + delay,
                priority,
                timestamp,
                request,
            },
        );
        self.deck_changed.notify_all();
    }

    /// Bypass the debounce and enqueue directly.
    pub fn enqueue(&self, request: Request) {
        self.live.put(request);
    }

    /// Number of requests currently on deck (not yet due).
    pub fn on_deck_len(&self) -> usize {
        self.deck.lock().entries.len()
    }

    /// Timer loop body; run on a dedicated thread. Returns when finalized.
    pub fn run_timer(&self) {
        debug!("staging timer: start");
        loop {
            let mut deck = self.deck.lock();
            if self.terminate.load(Ordering::SeqCst) {
                break;
            }
            if deck.entries.is_empty() {
                self.deck_changed.wait(&mut deck);
                continue;
            }
            let now = Instant::now();
            let due_ids: Vec<String> = deck
                .entries
                .iter()
                .filter(|(_, e)| e.due <= now)
                .map(|(id, _)| id.clone())
                .collect();
            let mut to_queue = Vec::new();
            for id in due_ids {
                if let Some(mut entry) = deck.entries.remove(&id) {
                    entry.request.priority = entry.priority;
                    to_queue.push((entry.request, entry.timestamp));
                }
            }
            drop(deck);

            for (request, timestamp) in to_queue {
                debug!(id = %request.id, "staging timer: queuing");
                self.live.put_with_timestamp(request, timestamp);
            }

            let mut deck = self.deck.lock();
            if self.terminate.load(Ordering::SeqCst) {
                break;
            }
            // The earliest deadline is computed under the re-acquired lock;
            // a request staged while the queue was being flushed counts too.
            match deck.entries.values().map(|e| e.due).min() {
                Some(due) => {
                    let _ = self.deck_changed.wait_until(&mut deck, due);
                }
                None => {
                    self.deck_changed.wait(&mut deck);
                }
            }
        }
        debug!("staging timer: end");
    }

    /// Stop the timer thread. Safe to call more than once.
    pub fn finalize(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        let _deck = self.deck.lock();
        self.deck_changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{Control, RequestKind};

    fn request(id: &str, priority: Priority) -> Request {
        // Queue mechanics only care about id and priority.
        Request {
            id: id.to_string(),
            priority,
            kind: RequestKind::Control(Control::Stop),
        }
    }

    #[test]
    fn test_priority_order_with_fifo_tie_break() {
        let q = UniqueRequestQueue::new();
        q.put_with_timestamp(request("bg", Priority::Background), 10);
        q.put_with_timestamp(request("a", Priority::Current), 20);
        q.put_with_timestamp(request("b", Priority::Current), 30);
        q.put_with_timestamp(request("now", Priority::Immediate), 40);

        assert_eq!(q.get().request.id, "now");
        assert_eq!(q.get().request.id, "a");
        assert_eq!(q.get().request.id, "b");
        assert_eq!(q.get().request.id, "bg");
    }

    #[test]
    fn test_dedup_keeps_min_priority_and_earliest_timestamp() {
        let q = UniqueRequestQueue::new();
        q.put_with_timestamp(request("x", Priority::Open), 100);
        q.put_with_timestamp(request("x", Priority::Immediate), 200);
        assert_eq!(q.len(), 1);

        let item = q.get();
        assert_eq!(item.priority, Priority::Immediate);
        assert_eq!(item.timestamp, 100);
    }

    #[test]
    fn test_dedup_never_raises_priority() {
        let q = UniqueRequestQueue::new();
        q.put_with_timestamp(request("x", Priority::Immediate), 100);
        q.put_with_timestamp(request("x", Priority::Background), 200);
        let item = q.get();
        assert_eq!(item.priority, Priority::Immediate);
    }

    #[test]
    fn test_get_timeout_on_empty_queue() {
        let q = UniqueRequestQueue::new();
        assert!(q.get_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_stage_resets_delay() {
        let staging = StagingQueue::new(Duration::from_millis(50));
        staging.stage(request("x", Priority::Current), None);
        assert_eq!(staging.on_deck_len(), 1);
        // Restage within the window: still exactly one on deck, nothing live.
        staging.stage(request("x", Priority::Current), None);
        assert_eq!(staging.on_deck_len(), 1);
        assert!(staging.live().is_empty());
    }

    #[test]
    fn test_timer_moves_due_requests() {
        let staging = StagingQueue::new(Duration::from_millis(20));
        let timer = {
            let staging = Arc::clone(&staging);
            std::thread::spawn(move || staging.run_timer())
        };
        staging.stage(request("x", Priority::Current), None);
        let item = staging
            .live()
            .get_timeout(Duration::from_millis(500))
            .expect("staged request should reach the live queue");
        assert_eq!(item.request.id, "x");
        staging.finalize();
        timer.join().unwrap();
    }

    #[test]
    fn test_timer_wakes_for_shorter_deadline_staged_later() {
        let staging = StagingQueue::new(Duration::from_millis(20));
        let timer = {
            let staging = Arc::clone(&staging);
            std::thread::spawn(move || staging.run_timer())
        };
        staging.stage(
            request("slow", Priority::Current),
            Some(Duration::from_millis(500)),
        );
        staging.stage(
            request("fast", Priority::Current),
            Some(Duration::from_millis(20)),
        );
        let item = staging
            .live()
            .get_timeout(Duration::from_millis(300))
            .expect("the shorter deadline should fire first");
        assert_eq!(item.request.id, "fast");
        staging.finalize();
        timer.join().unwrap();
    }

    #[test]
    fn test_displaced_staged_scan_completes_its_handle() {
        use crate::citadel::Buffer;
        use crate::indexer::ScanStatus;

        let staging = StagingQueue::new(Duration::from_millis(60));
        let buf = Buffer::unsaved("python", "t.py", "a = 1\n");
        let (req, first) = Request::scan(buf.clone(), Priority::Current, false, Some(1));
        staging.stage(req, None);
        let (req, second) = Request::scan(buf, Priority::Current, false, Some(2));
        staging.stage(req, None);

        // The superseded request never reaches the worker; its requestor is
        // released right away rather than waiting out its own timeout.
        assert_eq!(
            first.wait(Duration::from_millis(200)),
            Some(ScanStatus::Skipped)
        );
        assert!(second.status().is_none());
        assert_eq!(staging.on_deck_len(), 1);
        staging.finalize();
    }

    #[test]
    fn test_replaced_queued_scan_completes_its_handle() {
        use crate::citadel::Buffer;
        use crate::indexer::ScanStatus;

        let q = UniqueRequestQueue::new();
        let buf = Buffer::unsaved("python", "t.py", "a = 1\n");
        let (req, first) = Request::scan(buf.clone(), Priority::Open, false, Some(1));
        q.put(req);
        let (req, second) = Request::scan(buf, Priority::Current, false, Some(2));
        q.put(req);

        assert_eq!(q.len(), 1);
        assert_eq!(
            first.wait(Duration::from_millis(200)),
            Some(ScanStatus::Skipped)
        );
        assert!(second.status().is_none());
    }

    #[test]
    fn test_finalize_without_timer_is_safe() {
        let staging = StagingQueue::new(Duration::from_millis(20));
        staging.finalize();
        staging.finalize();
    }
}
