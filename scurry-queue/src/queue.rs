//! The shared work queue.
//!
//! One `FetchQueue` instance serves a whole crawl session. It is the single
//! admission-control point: `dequeue` bounds both concurrency (in-progress
//! cap) and rate (the global politeness clock). All bookkeeping lives in one
//! mutex-guarded aggregate so every invariant is maintained under one lock.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{debug, error, trace, warn};
use url::Url;

use scurry_urls::UrlKey;

use crate::item::{FetchItem, FetchStatus};

struct QueueState {
    pending: VecDeque<FetchItem>,
    /// Canonical key -> document id. Doubles as the id registry: a key in
    /// this map has been scheduled exactly once for the session's lifetime.
    seen: HashMap<String, u64>,
    in_progress: usize,
    /// Earliest instant the next dequeue may return an item.
    next_fetch_time: Instant,
    last_item_id: u64,
}

pub struct FetchQueue {
    state: Mutex<QueueState>,
    keyer: Arc<dyn UrlKey>,
    politeness_delay: Duration,
    max_in_flight: usize,
    max_pages: i64,
}

impl FetchQueue {
    pub fn new(
        keyer: Arc<dyn UrlKey>,
        politeness_delay: Duration,
        max_in_flight: usize,
        max_pages: i64,
    ) -> Self {
        // Backdate the clock so the first dequeue is immediately eligible.
        let next_fetch_time = Instant::now()
            .checked_sub(politeness_delay)
            .unwrap_or_else(Instant::now);
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                seen: HashMap::new(),
                in_progress: 0,
                next_fetch_time,
                last_item_id: 0,
            }),
            keyer,
            politeness_delay,
            max_in_flight,
            max_pages,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a worker panicked mid-call; the
        // bookkeeping itself is still consistent between operations.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an item unless its canonical URL has already been scheduled.
    /// On acceptance the item receives the next document id and `true` is
    /// returned; `false` means the item was a duplicate (or unkeyable, or
    /// over the page budget) and was dropped.
    pub fn enqueue(&self, mut item: FetchItem) -> bool {
        let Some(key) = self.keyer.canonical_key(&item.url) else {
            warn!("cannot derive canonical key for {}, skipping", item.url);
            return false;
        };

        let mut state = self.state();
        if state.seen.contains_key(&key) {
            trace!("already scheduled: {}", item.url);
            return false;
        }
        if self.max_pages >= 0 && state.last_item_id >= self.max_pages as u64 {
            debug!("page budget reached, not scheduling {}", item.url);
            return false;
        }

        state.last_item_id += 1;
        item.item_id = state.last_item_id;
        item.status = FetchStatus::Queued;
        state.seen.insert(key, item.item_id);
        state.pending.push_back(item);
        true
    }

    /// Schedule a page's discovered links as one batch. Returns how many
    /// were accepted.
    pub fn enqueue_all(&self, items: Vec<FetchItem>) -> usize {
        items
            .into_iter()
            .map(|item| self.enqueue(item))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Pop the next item, or `None` when the concurrency bound is reached,
    /// the politeness clock has not elapsed, or nothing is pending.
    pub fn dequeue(&self) -> Option<FetchItem> {
        let mut state = self.state();
        if state.in_progress >= self.max_in_flight {
            return None;
        }
        if Instant::now() < state.next_fetch_time {
            return None;
        }
        let mut item = state.pending.pop_front()?;
        item.status = FetchStatus::InProgress;
        state.in_progress += 1;
        Some(item)
    }

    /// Release an item's in-progress slot. Unless `immediate`, the
    /// politeness clock is pushed out by the configured delay; `immediate`
    /// resets it to now (non-throttled completions, shutdown drains).
    pub fn complete(&self, item: &FetchItem, immediate: bool) {
        let mut state = self.state();
        if state.in_progress == 0 {
            error!("completing {} with no items in progress", item.url);
        }
        state.in_progress = state.in_progress.saturating_sub(1);
        let now = Instant::now();
        state.next_fetch_time = if immediate {
            now
        } else {
            now + self.politeness_delay
        };
    }

    /// Document id previously assigned to this URL's canonical key, if any.
    pub fn lookup_id(&self, url: &Url) -> Option<u64> {
        let key = self.keyer.canonical_key(url)?;
        self.state().seen.get(&key).copied()
    }

    /// Register a canonical key and hand out a fresh document id, without
    /// queueing anything. Used when an in-flight item is retargeted to the
    /// URL the server actually served. Returns the existing id if the key
    /// is already known.
    pub fn assign_id(&self, url: &Url) -> Option<u64> {
        let key = self.keyer.canonical_key(url)?;
        let mut state = self.state();
        if let Some(existing) = state.seen.get(&key) {
            return Some(*existing);
        }
        state.last_item_id += 1;
        let id = state.last_item_id;
        state.seen.insert(key, id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_progress(&self) -> usize {
        self.state().in_progress
    }

    /// Number of document ids handed out so far.
    pub fn assigned_ids(&self) -> u64 {
        self.state().last_item_id
    }

    /// Hard reset: clears pending items and the seen set, returning the
    /// prior pending length. Not part of normal shutdown.
    pub fn drain(&self) -> usize {
        let mut state = self.state();
        let previous = state.pending.len();
        state.pending.clear();
        state.seen.clear();
        previous
    }
}

impl std::fmt::Debug for FetchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("FetchQueue")
            .field("pending", &state.pending.len())
            .field("seen", &state.seen.len())
            .field("in_progress", &state.in_progress)
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scurry_urls::HostNameKey;
    use std::thread::sleep;

    fn queue(delay_ms: u64, max_in_flight: usize, max_pages: i64) -> FetchQueue {
        FetchQueue::new(
            Arc::new(HostNameKey),
            Duration::from_millis(delay_ms),
            max_in_flight,
            max_pages,
        )
    }

    fn item(url: &str, depth: i16) -> FetchItem {
        FetchItem::new(Url::parse(url).unwrap(), depth)
    }

    #[test]
    fn admits_each_canonical_url_once() {
        let queue = queue(0, 4, -1);
        assert!(queue.enqueue(item("http://a.com/x", 0)));
        // Textual variations on the same canonical key are rejected.
        assert!(!queue.enqueue(item("http://A.COM/x?utm=1", 0)));
        assert!(queue.enqueue(item("http://a.com/y", 0)));
        assert_eq!(queue.len(), 2);

        let first = queue.dequeue().unwrap();
        assert_eq!(first.url.as_str(), "http://a.com/x");
        assert_eq!(first.item_id, 1);
        assert_eq!(first.status, FetchStatus::InProgress);

        // The key stays burned for the session even after completion.
        queue.complete(&first, true);
        assert!(!queue.enqueue(item("http://a.com/x", 3)));
    }

    #[test]
    fn dequeue_respects_concurrency_bound() {
        let queue = queue(0, 1, -1);
        queue.enqueue(item("http://a.com/1", 0));
        queue.enqueue(item("http://a.com/2", 0));

        let first = queue.dequeue().unwrap();
        assert_eq!(queue.in_progress(), 1);
        assert!(queue.dequeue().is_none());

        queue.complete(&first, true);
        assert_eq!(queue.in_progress(), 0);
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn politeness_clock_gates_dequeue() {
        let queue = queue(60, 4, -1);
        queue.enqueue(item("http://a.com/1", 0));
        queue.enqueue(item("http://a.com/2", 0));

        let first = queue.dequeue().unwrap();
        queue.complete(&first, false);
        // The clock was pushed out, so the next dequeue is gated.
        assert!(queue.dequeue().is_none());
        sleep(Duration::from_millis(80));
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn immediate_completion_resets_the_clock() {
        let queue = queue(60, 4, -1);
        queue.enqueue(item("http://a.com/1", 0));
        queue.enqueue(item("http://a.com/2", 0));

        let first = queue.dequeue().unwrap();
        queue.complete(&first, true);
        assert!(queue.dequeue().is_some());
    }

    #[test]
    fn fifo_order_per_producer() {
        let queue = queue(0, 8, -1);
        for i in 0..5 {
            queue.enqueue(item(&format!("http://a.com/{i}"), 0));
        }
        for i in 0..5 {
            let next = queue.dequeue().unwrap();
            assert_eq!(next.url.path(), format!("/{i}"));
            queue.complete(&next, true);
        }
    }

    #[test]
    fn page_budget_rejects_fresh_urls() {
        let queue = queue(0, 4, 2);
        assert!(queue.enqueue(item("http://a.com/1", 0)));
        assert!(queue.enqueue(item("http://a.com/2", 0)));
        assert!(!queue.enqueue(item("http://a.com/3", 0)));
        assert_eq!(queue.assigned_ids(), 2);
    }

    #[test]
    fn batch_enqueue_counts_accepted() {
        let queue = queue(0, 4, -1);
        let accepted = queue.enqueue_all(vec![
            item("http://a.com/1", 1),
            item("http://a.com/1", 1),
            item("http://a.com/2", 1),
        ]);
        assert_eq!(accepted, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn id_registry_lookup_and_assign() {
        let queue = queue(0, 4, -1);
        let url = Url::parse("http://a.com/moved").unwrap();
        assert_eq!(queue.lookup_id(&url), None);

        let id = queue.assign_id(&url).unwrap();
        assert_eq!(queue.lookup_id(&url), Some(id));
        // Re-assigning the same key returns the same id.
        assert_eq!(queue.assign_id(&url), Some(id));
        // Registered keys are dedup'd like any seen URL.
        assert!(!queue.enqueue(item("http://a.com/moved", 0)));
    }

    #[test]
    fn drain_clears_pending_and_seen() {
        let queue = queue(0, 4, -1);
        queue.enqueue(item("http://a.com/1", 0));
        queue.enqueue(item("http://a.com/2", 0));
        assert_eq!(queue.drain(), 2);
        assert_eq!(queue.len(), 0);
        // After a hard reset the same URL may be scheduled again.
        assert!(queue.enqueue(item("http://a.com/1", 0)));
    }
}
