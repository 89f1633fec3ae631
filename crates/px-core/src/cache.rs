//! Short-TTL response cache with in-flight coalescing
//!
//! Concurrent callers asking for the same uncached signature share a single
//! fetch. The first caller becomes the leader and runs `fetch`; everyone
//! arriving while it runs subscribes to its result. The map lock is only
//! held to inspect or mutate slots, never across an await.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CallError;

type Outcome<V> = Option<Result<V, CallError>>;

/// A stored value and when it was captured
struct CacheEntry<V> {
    value: V,
    captured_at: Instant,
}

/// Marker for a fetch currently running for a signature
struct InFlight<V> {
    generation: u64,
    result: watch::Receiver<Outcome<V>>,
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    in_flight: Option<InFlight<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

struct Inner<V> {
    slots: HashMap<String, Slot<V>>,
    next_generation: u64,
}

/// What a caller does after inspecting the slot
enum Role<V> {
    Hit(V),
    Follow(watch::Receiver<Outcome<V>>),
    Lead(watch::Sender<Outcome<V>>, u64),
}

/// Cache keyed by operation signature
pub struct ResponseCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> ResponseCache<V> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Return a fresh cached value, join a running fetch, or run `fetch`
    ///
    /// At most one `fetch` runs per signature at a time. Only successful
    /// results are stored. Failures are shared with the callers that joined
    /// the fetch but are not cached.
    pub async fn get_cached<F, Fut>(
        &self,
        signature: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<V, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CallError>>,
    {
        let (tx, generation) = loop {
            match self.inspect(signature, ttl) {
                Role::Hit(value) => {
                    tracing::trace!(signature, "Cache hit");
                    return Ok(value);
                }
                Role::Follow(mut result) => {
                    tracing::trace!(signature, "Joining in-flight fetch");
                    let shared = result
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|outcome| outcome.clone());
                    if let Some(outcome) = shared {
                        return outcome;
                    }
                    // Leader was dropped before finishing; take over
                }
                Role::Lead(tx, generation) => break (tx, generation),
            }
        };

        self.lead(signature, generation, tx, fetch).await
    }

    /// Last stored value for `signature`, regardless of age
    pub fn peek(&self, signature: &str) -> Option<V> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(signature)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| entry.value.clone())
    }

    /// Drop the entry for `signature`
    ///
    /// A fetch already running for it still answers its callers, but its
    /// result is not stored.
    pub fn invalidate(&self, signature: &str) {
        let mut inner = self.inner.lock();
        if inner.slots.remove(signature).is_some() {
            tracing::debug!(signature, "Invalidated cache entry");
        }
    }

    /// Drop every entry whose signature starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner.slots.retain(|signature, _| !signature.starts_with(prefix));
        let removed = before - inner.slots.len();
        if removed > 0 {
            tracing::debug!(prefix, removed, "Invalidated cache entries");
        }
    }

    /// Drop everything
    pub fn clear(&self) {
        self.inner.lock().slots.clear();
    }

    fn inspect(&self, signature: &str, ttl: Duration) -> Role<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let slot = inner.slots.entry(signature.to_string()).or_default();

        if let Some(entry) = &slot.entry {
            if entry.captured_at.elapsed() < ttl {
                return Role::Hit(entry.value.clone());
            }
        }

        // A closed sender means the leader vanished without clearing its marker
        if let Some(in_flight) = &slot.in_flight {
            if in_flight.result.has_changed().is_ok() {
                return Role::Follow(in_flight.result.clone());
            }
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let (tx, rx) = watch::channel(None);
        slot.in_flight = Some(InFlight {
            generation,
            result: rx,
        });
        Role::Lead(tx, generation)
    }

    async fn lead<F, Fut>(
        &self,
        signature: &str,
        generation: u64,
        tx: watch::Sender<Outcome<V>>,
        fetch: F,
    ) -> Result<V, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CallError>>,
    {
        let _guard = InFlightGuard {
            cache: self,
            signature,
            generation,
        };

        let result = fetch().await;

        {
            let mut inner = self.inner.lock();
            if let Some(slot) = inner.slots.get_mut(signature) {
                let ours = matches!(&slot.in_flight, Some(f) if f.generation == generation);
                if ours {
                    slot.in_flight = None;
                    if let Ok(value) = &result {
                        slot.entry = Some(CacheEntry {
                            value: value.clone(),
                            captured_at: Instant::now(),
                        });
                    }
                } else {
                    tracing::debug!(signature, "Cache invalidated during fetch, not storing result");
                }
            }
        }

        tx.send_replace(Some(result.clone()));
        result
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight marker if the leading future is dropped mid-fetch
struct InFlightGuard<'a, V> {
    cache: &'a ResponseCache<V>,
    signature: &'a str,
    generation: u64,
}

impl<V> Drop for InFlightGuard<'_, V> {
    fn drop(&mut self) {
        let mut inner = self.cache.inner.lock();
        if let Some(slot) = inner.slots.get_mut(self.signature) {
            if matches!(&slot.in_flight, Some(f) if f.generation == self.generation) {
                slot.in_flight = None;
                tracing::debug!(signature = self.signature, "Cache fetch abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn slow_fetch(
        calls: &AtomicUsize,
        value: &'static str,
    ) -> Result<String, CallError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(value.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Arc::new(ResponseCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_cached("/configs", Duration::from_secs(1), || {
                        slow_fetch(&calls, "rule")
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "rule");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::<String>::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_millis(1000);

        cache
            .get_cached("/configs", ttl, || slow_fetch(&calls, "rule"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(ttl - Duration::from_millis(10)).await;
        cache
            .get_cached("/configs", ttl, || slow_fetch(&calls, "rule"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(20)).await;
        cache
            .get_cached("/configs", ttl, || slow_fetch(&calls, "rule"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_shared_but_not_cached() {
        let cache = Arc::new(ResponseCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<String, _>(CallError::Transport(TransportError::severed("eof")))
        };

        let a = {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tokio::spawn(async move {
                cache
                    .get_cached("/proxies", Duration::from_secs(1), || failing(calls))
                    .await
            })
        };
        let b = {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tokio::spawn(async move {
                cache
                    .get_cached("/proxies", Duration::from_secs(1), || failing(calls))
                    .await
            })
        };

        assert!(a.await.unwrap().is_err());
        assert!(b.await.unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.peek("/proxies").is_none());

        let value = cache
            .get_cached("/proxies", Duration::from_secs(1), || {
                slow_fetch(&calls, "nodes")
            })
            .await
            .unwrap();
        assert_eq!(value, "nodes");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_fresh_fetch() {
        let cache = ResponseCache::<String>::new();
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_secs(60);

        cache
            .get_cached("/configs", ttl, || slow_fetch(&calls, "rule"))
            .await
            .unwrap();
        cache.invalidate("/configs");
        assert!(cache.peek("/configs").is_none());

        let value = cache
            .get_cached("/configs", ttl, || slow_fetch(&calls, "global"))
            .await
            .unwrap();
        assert_eq!(value, "global");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_during_fetch_skips_store() {
        let cache = Arc::new(ResponseCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tokio::spawn(async move {
                cache
                    .get_cached("/configs", Duration::from_secs(60), || {
                        slow_fetch(&calls, "stale")
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("/configs");

        assert_eq!(leader.await.unwrap().unwrap(), "stale");
        assert!(cache.peek("/configs").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_leader_hands_over() {
        let cache = Arc::new(ResponseCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tokio::spawn(async move {
                cache
                    .get_cached("/configs", Duration::from_secs(60), || {
                        slow_fetch(&calls, "never")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower = {
            let (cache, calls) = (Arc::clone(&cache), Arc::clone(&calls));
            tokio::spawn(async move {
                cache
                    .get_cached("/configs", Duration::from_secs(60), || {
                        slow_fetch(&calls, "rule")
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        assert_eq!(follower.await.unwrap().unwrap(), "rule");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = ResponseCache::<u32>::new();
        {
            let mut inner = cache.inner.lock();
            for sig in ["/proxies", "/proxies/GLOBAL", "/configs"] {
                inner.slots.insert(
                    sig.to_string(),
                    Slot {
                        entry: Some(CacheEntry {
                            value: 1,
                            captured_at: Instant::now(),
                        }),
                        in_flight: None,
                    },
                );
            }
        }

        cache.invalidate_prefix("/proxies");
        assert!(cache.peek("/proxies").is_none());
        assert!(cache.peek("/proxies/GLOBAL").is_none());
        assert_eq!(cache.peek("/configs"), Some(1));

        cache.clear();
        assert!(cache.peek("/configs").is_none());
    }
}
