//! Time-bounded lane cache with request coalescing.
//!
//! A lookup is answered from, in order:
//!
//! 1. a live cache entry,
//! 2. a fetch for the same key that is already in flight,
//! 3. a new fetch, which then becomes the in-flight fetch for its key.
//!
//! Fetches run in their own task. The in-flight registration is removed by
//! that task when the fetch settles, whatever the outcome and even if every
//! caller waiting on it went away, so a failed or timed-out fetch is retried
//! by the next lookup instead of being awaited forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::{CoverageError, CoverageLane, Result};

type Lanes = Arc<Vec<CoverageLane>>;
type PendingFetch = Shared<BoxFuture<'static, Result<Lanes>>>;

struct Entry {
    lanes: Lanes,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, PendingFetch>,
}

/// Process-local lane cache. Clones share the same entries.
///
/// Every call returns an owned `Vec`, so no caller can observe another
/// caller's changes or alter what is cached.
#[derive(Clone)]
pub struct LaneCache {
    ttl: Duration,
    state: Arc<Mutex<State>>,
}

impl LaneCache {
    /// Creates a cache keeping results for `ttl`. A zero TTL disables storing
    /// results but concurrent lookups are still coalesced.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for a destination: trimmed and case-folded.
    pub fn normalize_key(destination: &str) -> String {
        destination.trim().to_lowercase()
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored entry. In-flight fetches are unaffected.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    /// Returns the lanes cached under `key`, fetching them with `fetch` only
    /// when there is neither a live entry nor a fetch in flight.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<CoverageLane>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<CoverageLane>>> + Send + 'static,
    {
        let pending = {
            let mut state = lock(&self.state);
            if let Some(entry) = state.entries.get(key)
                && entry.expires_at > Instant::now()
            {
                metrics::counter!("coverage_cache_hits_total").increment(1);
                tracing::trace!(key, "lane cache hit");
                return Ok(entry.lanes.as_ref().clone());
            }
            // Expired.
            state.entries.remove(key);

            match state.in_flight.get(key) {
                Some(pending) => {
                    metrics::counter!("coverage_cache_coalesced_total").increment(1);
                    tracing::debug!(key, "joining in-flight lane fetch");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_fetch(key.to_string(), fetch());
                    state.in_flight.insert(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await.map(|lanes| lanes.as_ref().clone())
    }

    /// Must be called with the state lock held so the task cannot settle
    /// before its registration exists.
    fn spawn_fetch<Fut>(&self, key: String, fetch: Fut) -> PendingFetch
    where
        Fut: Future<Output = Result<Vec<CoverageLane>>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let task = tokio::spawn(async move {
            let result = fetch.await.map(Arc::new);
            let mut guard = lock(&state);
            if let Ok(lanes) = &result
                && !ttl.is_zero()
            {
                guard.entries.insert(
                    key.clone(),
                    Entry {
                        lanes: Arc::clone(lanes),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            guard.in_flight.remove(&key);
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(CoverageError::Transport {
                    operation: "laneFetch",
                    message: e.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lane(id: &str) -> CoverageLane {
        CoverageLane {
            lane_id: id.to_string(),
            owner: "hub".to_string(),
            owner_type: "hub".to_string(),
            sla_hours: 24,
        }
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<CoverageLane>>> + use<> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(vec![lane("west-1")])
            }
            .boxed()
        }
    }

    #[test]
    fn keys_are_trimmed_and_case_folded() {
        assert_eq!(LaneCache::normalize_key("  Ca "), "ca");
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let cache = LaneCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();
        let second = cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_fetch() {
        let cache = LaneCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get_or_fetch("ca", counting_fetch(&calls, Duration::from_millis(50))),
            cache.get_or_fetch("ca", counting_fetch(&calls, Duration::from_millis(50))),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_ttl_stores_nothing() {
        let cache = LaneCache::new(Duration::ZERO);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();
        cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let cache = LaneCache::new(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_is_shared_and_not_cached() {
        let cache = LaneCache::new(Duration::from_secs(60));
        let failing = || async {
            Err::<Vec<CoverageLane>, _>(CoverageError::Transport {
                operation: "test",
                message: "refused".to_string(),
            })
        };

        let err = cache.get_or_fetch("ca", failing).await.unwrap_err();
        assert!(matches!(err, CoverageError::Transport { .. }));
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn returned_lanes_are_independent_copies() {
        let cache = LaneCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut first = cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();
        first[0].owner = "mutated".to_string();
        first.push(lane("extra"));

        let second = cache.get_or_fetch("ca", counting_fetch(&calls, Duration::ZERO)).await.unwrap();
        assert_eq!(second, vec![lane("west-1")]);
    }

    #[tokio::test]
    async fn abandoned_fetch_still_clears_registration() {
        let cache = LaneCache::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let lookup = cache.get_or_fetch("ca", counting_fetch(&calls, Duration::from_millis(30)));
        let _ = tokio::time::timeout(Duration::from_millis(5), lookup).await;
        assert_eq!(cache.in_flight_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.in_flight_count(), 0);
        assert_eq!(cache.len(), 1);
    }
}
