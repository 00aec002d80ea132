//! In-process sliding-window counter store.
//!
//! Keeps a timestamp log per key behind a lock. Only valid when a single instance
//! serves traffic. Memory is bounded two ways: idle keys are swept every
//! `cleanup_interval` hits, and no more than `max_tracked_keys` keys are held. A
//! new key arriving at the cap is an error after a forced sweep fails to make
//! room; it is never reported as a deny, since that key has no hits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::{CounterStore, RateLimitError, WindowDecision};

const DEFAULT_CLEANUP_INTERVAL: u64 = 100;
const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

struct KeyLog {
    window: Duration,
    hits: Vec<Instant>,
}

pub struct MemoryCounterStore {
    state: RwLock<HashMap<String, KeyLog>>,
    hit_count: AtomicU64,
    cleanup_interval: u64,
    max_tracked_keys: usize,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_TRACKED_KEYS)
    }
}

impl MemoryCounterStore {
    pub fn new(cleanup_interval: u64, max_tracked_keys: usize) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            hit_count: AtomicU64::new(0),
            cleanup_interval: cleanup_interval.max(1),
            max_tracked_keys,
        }
    }

    /// Drops keys with no hits left inside their window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.retain(|_, log| {
            let cutoff = now.checked_sub(log.window).unwrap_or(now);
            log.hits.retain(|&t| t > cutoff);
            !log.hits.is_empty()
        });
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn record(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<WindowDecision, RateLimitError> {
        let now = Instant::now();
        let cutoff = now.checked_sub(window).unwrap_or(now);

        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !state.contains_key(key) && state.len() >= self.max_tracked_keys {
            debug!(
                tracked_keys = state.len(),
                "max tracked keys reached, forcing cleanup"
            );
            drop(state);
            self.cleanup();
            state = self
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.contains_key(key) && state.len() >= self.max_tracked_keys {
                return Err(RateLimitError::AtCapacity {
                    tracked: state.len(),
                });
            }
        }

        let log = state.entry(key.to_string()).or_insert_with(|| KeyLog {
            window,
            hits: Vec::new(),
        });
        log.window = window;
        log.hits.retain(|&t| t > cutoff);

        if log.hits.len() >= limit as usize {
            // Oldest hit leaves the window first; that is when a slot frees up.
            let retry_after = log
                .hits
                .first()
                .map(|&oldest| (oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            return Ok(WindowDecision::Denied { retry_after });
        }

        log.hits.push(now);
        Ok(WindowDecision::Allowed {
            remaining: limit - log.hits.len() as u32,
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<WindowDecision, RateLimitError> {
        let count = self.hit_count.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.cleanup_interval == 0 {
            self.cleanup();
        }
        self.record(key, limit, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_n_plus_one_denied_within_window() {
        let store = MemoryCounterStore::default();
        for i in 0..20 {
            let decision = store.hit("rl:user:u1", 20, MINUTE).await.unwrap();
            assert_eq!(decision, WindowDecision::Allowed { remaining: 19 - i });
        }
        match store.hit("rl:user:u1", 20, MINUTE).await.unwrap() {
            WindowDecision::Denied { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= MINUTE);
            }
            other => panic!("21st hit must be denied, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_window_is_allowed() {
        let store = MemoryCounterStore::default();
        for _ in 0..3 {
            store.hit("k", 3, MINUTE).await.unwrap();
        }
        assert!(matches!(
            store.hit("k", 3, MINUTE).await.unwrap(),
            WindowDecision::Denied { .. }
        ));

        tokio::time::advance(MINUTE + Duration::from_millis(1)).await;

        assert!(matches!(
            store.hit("k", 3, MINUTE).await.unwrap(),
            WindowDecision::Allowed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_rather_than_resets() {
        let store = MemoryCounterStore::default();
        store.hit("k", 2, MINUTE).await.unwrap();
        tokio::time::advance(Duration::from_secs(40)).await;
        store.hit("k", 2, MINUTE).await.unwrap();

        // 30s later the first hit has left the window but the second has not.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            store.hit("k", 2, MINUTE).await.unwrap(),
            WindowDecision::Allowed { remaining: 0 }
        ));
        match store.hit("k", 2, MINUTE).await.unwrap() {
            WindowDecision::Denied { retry_after } => {
                // Second hit (t=40s) expires at t=100s; now is t=70s.
                assert_eq!(retry_after, Duration::from_secs(30));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_hits_are_not_recorded() {
        let store = MemoryCounterStore::default();
        store.hit("k", 1, MINUTE).await.unwrap();
        for _ in 0..5 {
            store.hit("k", 1, MINUTE).await.unwrap();
        }
        tokio::time::advance(MINUTE + Duration::from_millis(1)).await;
        assert!(matches!(
            store.hit("k", 1, MINUTE).await.unwrap(),
            WindowDecision::Allowed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_idle_keys() {
        let store = MemoryCounterStore::default();
        for i in 0..5 {
            store.hit(&format!("k{i}"), 10, Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(store.tracked_keys(), 5);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.cleanup();
        assert_eq!(store.tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_tracked_keys_is_a_hard_cap() {
        let store = MemoryCounterStore::new(1_000, 3);
        for i in 0..3 {
            assert!(matches!(
                store.hit(&format!("k{i}"), 10, MINUTE).await.unwrap(),
                WindowDecision::Allowed { .. }
            ));
        }
        assert!(matches!(
            store.hit("k-new", 10, MINUTE).await,
            Err(RateLimitError::AtCapacity { tracked: 3 })
        ));
        assert_eq!(store.tracked_keys(), 3);

        // Already-tracked keys keep working at the cap.
        assert!(matches!(
            store.hit("k0", 10, MINUTE).await.unwrap(),
            WindowDecision::Allowed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_cleanup_reclaims_space_at_cap() {
        let store = MemoryCounterStore::new(1_000, 2);
        store.hit("a", 10, Duration::from_secs(1)).await.unwrap();
        store.hit("b", 10, Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(matches!(
            store.hit("c", 10, Duration::from_secs(1)).await.unwrap(),
            WindowDecision::Allowed { .. }
        ));
        assert!(store.tracked_keys() <= 2);
    }
}
