//! Fetch deduplication
//!
//! At most one fetch per key is in flight at a time. Concurrent callers for
//! the same key await one shared pending result, and successful results are
//! kept in a freshness-bounded cache.
//!
//! The state lock is only taken in short synchronous sections and is never
//! held across an `.await`.

use crate::events::{EventCategory, EventSink, GraphEvent, TracingEventSink, DEDUPLICATOR};
use citeforge_common::config::CacheConfig;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::metrics::record_dedup;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type SharedOutcome<T> = std::result::Result<T, Arc<AppError>>;
type SharedFetch<T> = Shared<BoxFuture<'static, SharedOutcome<T>>>;

/// Deduplicator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    /// Freshness window of cached values
    pub ttl: Duration,
    /// Cache capacity; zero disables caching
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for DedupConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries,
        }
    }
}

/// Diagnostics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub pending_requests: usize,
    pub oldest_pending_age: Option<Duration>,
    pub cached_entries: usize,
    pub pending_keys: Vec<String>,
}

struct PendingRequest<T> {
    token: u64,
    started_at: Instant,
    fetch: WeakShared<BoxFuture<'static, SharedOutcome<T>>>,
}

struct CachedEntry<T> {
    value: T,
    stored_at: Instant,
}

struct DedupState<T> {
    pending: HashMap<String, PendingRequest<T>>,
    cache: HashMap<String, CachedEntry<T>>,
    /// Tokens of requests displaced by a refresh; their results are not cached
    superseded: HashSet<u64>,
    next_token: u64,
}

impl<T> Default for DedupState<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            cache: HashMap::new(),
            superseded: HashSet::new(),
            next_token: 0,
        }
    }
}

impl<T: Clone> DedupState<T> {
    fn fresh(&self, key: &str, ttl: Duration) -> Option<T> {
        self.cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    fn store(&mut self, key: &str, value: T, config: DedupConfig) {
        if config.max_entries == 0 {
            return;
        }
        if !self.cache.contains_key(key) && self.cache.len() >= config.max_entries {
            self.cache.retain(|_, entry| entry.stored_at.elapsed() < config.ttl);
        }
        while !self.cache.contains_key(key) && self.cache.len() >= config.max_entries {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(oldest) => {
                    self.cache.remove(&oldest);
                }
                None => break,
            }
        }
        self.cache.insert(
            key.to_string(),
            CachedEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

/// Removes the pending record when the tracked fetch ends, however it ends
struct PendingGuard<T> {
    state: Weak<Mutex<DedupState<T>>>,
    key: String,
    token: u64,
    config: DedupConfig,
    done: bool,
}

impl<T: Clone> PendingGuard<T> {
    fn complete(mut self, value: Option<&T>) {
        self.done = true;
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = match state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!(key = %self.key, "Deduplicator state poisoned, result not cached");
                let mut state = poisoned.into_inner();
                Self::deregister(&mut state, &self.key, self.token);
                return;
            }
        };

        let superseded = state.superseded.contains(&self.token);
        if let (Some(value), false) = (value, superseded) {
            state.store(&self.key, value.clone(), self.config);
        }
        Self::deregister(&mut state, &self.key, self.token);
    }

    fn deregister(state: &mut DedupState<T>, key: &str, token: u64) {
        state.superseded.remove(&token);
        if state.pending.get(key).is_some_and(|p| p.token == token) {
            state.pending.remove(key);
        }
    }
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.superseded.remove(&self.token);
            if state.pending.get(&self.key).is_some_and(|p| p.token == self.token) {
                state.pending.remove(&self.key);
                debug!(key = %self.key, "Abandoned fetch deregistered");
            }
        }
    }
}

/// Single-flight fetch coordinator with a freshness cache
pub struct FetchDeduplicator<T> {
    state: Arc<Mutex<DedupState<T>>>,
    config: DedupConfig,
    events: Arc<dyn EventSink>,
}

impl<T> Clone for FetchDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config,
            events: Arc::clone(&self.events),
        }
    }
}

impl<T> Default for FetchDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl<T> FetchDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: DedupConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState::default())),
            config,
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> DedupConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, DedupState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, name: &str, key: &str) {
        self.events.emit(GraphEvent::new(
            EventCategory::Fetch,
            DEDUPLICATOR,
            name,
            json!({ "key": key }),
        ));
    }

    /// Return the cached value for `key`, join the in-flight fetch for it,
    /// or start one with `fetch_fn`.
    ///
    /// `fetch_fn` is only invoked when no fresh value and no pending fetch
    /// exist; a coalesced caller's function is dropped without running.
    pub async fn get_entity<F, Fut>(&self, key: &str, fetch_fn: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetch = {
            let mut state = self.lock();

            if let Some(value) = state.fresh(key, self.config.ttl) {
                record_dedup("hit", state.pending.len());
                drop(state);
                self.emit("cache_hit", key);
                return Ok(value);
            }

            let joined = state.pending.get(key).and_then(|p| p.fetch.upgrade());
            match joined {
                Some(fetch) => {
                    record_dedup("coalesced", state.pending.len());
                    drop(state);
                    self.emit("request_coalesced", key);
                    fetch
                }
                None => {
                    let token = state.next_token;
                    state.next_token += 1;
                    let fetch = self.track(key, token, fetch_fn);
                    if let Some(weak) = fetch.downgrade() {
                        state.pending.insert(
                            key.to_string(),
                            PendingRequest {
                                token,
                                started_at: Instant::now(),
                                fetch: weak,
                            },
                        );
                    }
                    record_dedup("fetch", state.pending.len());
                    drop(state);
                    self.emit("fetch_started", key);
                    fetch
                }
            }
        };

        fetch.await.map_err(|source| AppError::FetchFailed {
            key: key.to_string(),
            source,
        })
    }

    /// Drop any cached value and pending fetch for `key`, then fetch anew
    pub async fn refresh_entity<F, Fut>(&self, key: &str, fetch_fn: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        {
            let mut state = self.lock();
            state.cache.remove(key);
            if let Some(previous) = state.pending.remove(key) {
                state.superseded.insert(previous.token);
            }
        }
        self.emit("refresh_requested", key);
        self.get_entity(key, fetch_fn).await
    }

    pub fn stats(&self) -> DedupStats {
        let state = self.lock();
        DedupStats {
            pending_requests: state.pending.len(),
            oldest_pending_age: state.pending.values().map(|p| p.started_at.elapsed()).max(),
            cached_entries: state.cache.len(),
            pending_keys: state.pending.keys().cloned().collect(),
        }
    }

    /// Forget every pending record and cached value
    pub fn clear(&self) {
        let mut state = self.lock();
        state.pending.clear();
        state.cache.clear();
        state.superseded.clear();
        debug!("Deduplicator cleared");
    }

    fn track<F, Fut>(&self, key: &str, token: u64, fetch_fn: F) -> SharedFetch<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let guard = PendingGuard {
            state: Arc::downgrade(&self.state),
            key: key.to_string(),
            token,
            config: self.config,
            done: false,
        };
        let events = Arc::clone(&self.events);

        async move {
            let started = Instant::now();
            let result = fetch_fn().await;
            guard.complete(result.as_ref().ok());

            let (name, error) = match &result {
                Ok(_) => ("fetch_completed", None),
                Err(e) => ("fetch_failed", Some(e.to_string())),
            };
            events.emit(GraphEvent::new(
                EventCategory::Fetch,
                DEDUPLICATOR,
                name,
                json!({
                    "token": token,
                    "duration_ms": started.elapsed().as_millis() as u64,
                    "error": error,
                }),
            ));
            result.map_err(Arc::new)
        }
        .boxed()
        .shared()
    }
}
