use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::interval;

const SCRUB_INTERVAL: Duration = Duration::from_secs(60);

struct State {
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
    capacity: usize,
}

impl State {
    fn insert(&mut self, key: String, now: Instant) {
        if self.seen.contains_key(&key) {
            // Re-marking an existing key moves it to the back so eviction
            // order reflects last-seen time, not first-seen time.
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key, now);

        while self.seen.len() > self.capacity {
            // Capacity overflow evicts the oldest entry regardless of TTL.
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn scrub(&mut self, ttl: Duration, now: Instant) {
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < ttl);
        self.order.retain(|key| self.seen.contains_key(key));
    }
}

/// Bounded key→timestamp map with insertion-order eviction, used for SSH
/// nonce replay detection (§4.7 "Dedupe Cache").
pub struct DedupeCache {
    state: Mutex<State>,
    ttl: Duration,
    scrubber: Mutex<Option<JoinHandle<()>>>,
}

impl DedupeCache {
    /// Spawns a background scrubber ticking at `SCRUB_INTERVAL` that bulk-
    /// removes entries older than `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> std::sync::Arc<Self> {
        let cache = std::sync::Arc::new(Self {
            state: Mutex::new(State {
                seen: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
            ttl,
            scrubber: Mutex::new(None),
        });

        let weak = std::sync::Arc::downgrade(&cache);
        let handle = tokio::spawn(async move {
            let mut tick = interval(SCRUB_INTERVAL);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(cache) => cache.scrub_once(),
                    None => break,
                }
            }
        });

        *cache.scrubber.lock().unwrap() = Some(handle);
        cache
    }

    fn scrub_once(&self) {
        let mut state = self.state.lock().unwrap();
        let ttl = self.ttl;
        state.scrub(ttl, Instant::now());
    }

    /// Returns true if `key` was seen within the TTL window, without
    /// marking it as seen now.
    pub fn check(&self, key: &str) -> bool {
        let state = self.state.lock().unwrap();
        match state.seen.get(key) {
            Some(seen_at) => Instant::now().duration_since(*seen_at) < self.ttl,
            None => false,
        }
    }

    /// Marks `key` as seen now, regardless of whether it was already present.
    pub fn mark(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.insert(key.to_string(), Instant::now());
    }

    /// Atomic test-and-set: returns true if `key` was already seen within
    /// the TTL (and leaves it marked); otherwise marks it and returns false.
    pub fn check_and_mark(&self, key: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let was_seen = state
            .seen
            .get(key)
            .map(|seen_at| now.duration_since(*seen_at) < self.ttl)
            .unwrap_or(false);
        state.insert(key.to_string(), now);
        was_seen
    }

    /// Stops the background scrubber task.
    pub fn close(&self) {
        if let Some(handle) = self.scrubber.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for DedupeCache {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_and_mark_detects_replay() {
        let cache = DedupeCache::new(16, Duration::from_secs(60));
        assert!(!cache.check_and_mark("nonce-1"));
        assert!(cache.check_and_mark("nonce-1"));
    }

    #[tokio::test]
    async fn capacity_overflow_evicts_oldest() {
        let cache = DedupeCache::new(2, Duration::from_secs(60));
        cache.mark("a");
        cache.mark("b");
        cache.mark("c");
        assert!(!cache.check("a"));
        assert!(cache.check("b"));
        assert!(cache.check("c"));
    }

    #[tokio::test]
    async fn check_without_mark_does_not_insert() {
        let cache = DedupeCache::new(16, Duration::from_secs(60));
        assert!(!cache.check("nonce-2"));
        assert!(!cache.check_and_mark("nonce-2"));
    }

    #[tokio::test]
    async fn re_marking_moves_key_to_back_for_true_lru_eviction() {
        let cache = DedupeCache::new(2, Duration::from_secs(60));
        cache.mark("a");
        cache.mark("b");
        cache.mark("a"); // re-mark: "a" is now more recently seen than "b"
        cache.mark("c"); // capacity overflow should evict "b", not "a"
        assert!(cache.check("a"));
        assert!(!cache.check("b"));
        assert!(cache.check("c"));
    }
}
