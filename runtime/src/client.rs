//! The query client: a keyed cache in front of a [`Repository`].
//!
//! # Invariants
//!
//! - **At most one request in flight per key.** Concurrent fetches of the
//!   same key join the running request instead of starting another.
//! - **Writes happen at settle time only.** The request task writes its
//!   outcome into the cache when it completes, never earlier.
//! - **Superseded requests never write.** Every entry carries a generation.
//!   Invalidating, overwriting or clearing an entry moves it to a new
//!   generation and aborts the old request, whose outcome is then discarded.
//!
//! Reads ([`QueryClient::snapshot`]) are safe from anywhere at any time.
//!
//! Entries that are idle for longer than the configured cache time are
//! dropped on the next fetch or invalidation. An entry is idle while no
//! request runs for it.

use crate::config::QueryClientConfig;
use crate::metrics::QueryMetrics;
use crate::repository::{ApiRequest, Repository};
use crate::retry::retry_with_predicate;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use marquee_core::environment::{Clock, SystemClock};
use marquee_core::{ApiResponse, FetchResult, QueryKey, StalePolicy, TransportError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

/// Outcome of a request task; `None` when the task was aborted because its
/// entry moved to a newer generation.
type SharedFetch = Shared<BoxFuture<'static, Option<FetchResult<Value>>>>;

#[derive(Debug, Clone)]
struct Cached {
    value: Value,
    /// `None` once invalidated: the value is kept for display but never fresh
    fetched_at: Option<DateTime<Utc>>,
}

struct InFlight {
    future: SharedFetch,
    abort: AbortHandle,
}

struct Entry {
    generation: u64,
    data: Option<Cached>,
    error: Option<TransportError>,
    in_flight: Option<InFlight>,
    /// Last fetch, settle or write
    used_at: DateTime<Utc>,
}

impl Entry {
    const fn new(generation: u64, now: DateTime<Utc>) -> Self {
        Self {
            generation,
            data: None,
            error: None,
            in_flight: None,
            used_at: now,
        }
    }

    /// Move to `generation`, aborting the running request.
    fn supersede(&mut self, generation: u64) {
        self.generation = generation;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.abort();
        }
    }
}

struct Inner<R, C> {
    repository: R,
    clock: C,
    config: QueryClientConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    generations: AtomicU64,
    invalidations: broadcast::Sender<QueryKey>,
}

impl<R, C> Inner<R, C>
where
    R: Repository + 'static,
    C: Clock + 'static,
{
    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn execute(&self, request: &ApiRequest) -> FetchResult<Value> {
        let repository = &self.repository;
        let outcome = retry_with_predicate(
            self.config.retry_policy.clone(),
            || async move { repository.send(request).await.and_then(ApiResponse::into_result) },
            TransportError::is_retryable,
        )
        .await;
        outcome.into()
    }

    /// Write a settled outcome, unless the entry moved on.
    fn settle(&self, key: &QueryKey, generation: u64, result: &FetchResult<Value>) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) else {
            QueryMetrics::record_discarded_write();
            tracing::debug!(key = %key, generation, "Discarding superseded result");
            return;
        };

        entry.in_flight = None;
        entry.used_at = self.clock.now();
        match result {
            FetchResult::Success(value) => {
                entry.data = Some(Cached {
                    value: value.clone(),
                    fetched_at: Some(self.clock.now()),
                });
                entry.error = None;
            },
            FetchResult::Error { error, .. } => {
                tracing::warn!(key = %key, error = %error, "Query failed");
                entry.error = Some(error.clone());
            },
            FetchResult::Pending { .. } => {},
        }
    }

    /// Drop idle entries older than the cache time. Returns how many went.
    fn collect_garbage(&self, entries: &mut HashMap<QueryKey, Entry>) -> usize {
        let now = self.clock.now();
        let cache_time = self.config.cache_time;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.in_flight.is_some()
                || !now
                    .signed_duration_since(entry.used_at)
                    .to_std()
                    .is_ok_and(|idle| idle >= cache_time)
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            QueryMetrics::record_evicted(evicted);
            tracing::debug!(evicted, "Evicted idle queries");
        }
        evicted
    }

    fn is_fresh(&self, cached: &Cached) -> bool {
        let Some(fetched_at) = cached.fetched_at else {
            return false;
        };
        let age = self.clock.now().signed_duration_since(fetched_at);
        age.to_std().is_ok_and(|age| age < self.config.stale_time)
    }
}

/// Keyed query cache with request deduplication.
///
/// Cloning is cheap; clones share the cache.
///
/// # Example
///
/// ```no_run
/// use marquee_core::QueryKey;
/// use marquee_runtime::{ApiRequest, HttpConfig, HttpRepository, QueryClient, QueryClientConfig, SessionContext};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repository = HttpRepository::new(&HttpConfig::from_env()?, SessionContext::new())?;
/// let client = QueryClient::new(repository, QueryClientConfig::default());
///
/// let key = QueryKey::builder(["genres"]).param("page", 1).build();
/// let genres = client.fetch(&key, &ApiRequest::get("/genres").with_query("page", 1)).await;
/// # Ok(())
/// # }
/// ```
pub struct QueryClient<R, C = SystemClock> {
    inner: Arc<Inner<R, C>>,
}

impl<R, C> Clone for QueryClient<R, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> QueryClient<R, SystemClock>
where
    R: Repository + 'static,
{
    /// Create a client using the system clock.
    #[must_use]
    pub fn new(repository: R, config: QueryClientConfig) -> Self {
        Self::with_clock(repository, config, SystemClock)
    }
}

impl<R, C> QueryClient<R, C>
where
    R: Repository + 'static,
    C: Clock + 'static,
{
    /// Create a client with an injected clock.
    #[must_use]
    pub fn with_clock(repository: R, config: QueryClientConfig, clock: C) -> Self {
        let (invalidations, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                repository,
                clock,
                config,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                invalidations,
            }),
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &QueryClientConfig {
        &self.inner.config
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.inner.repository
    }

    /// Fetch `key`, answering from fresh cache or joining an in-flight request
    /// when possible.
    ///
    /// Returns `Success` or `Error`, never `Pending`, and never carries stale
    /// data; use [`snapshot`](Self::snapshot) for that.
    #[tracing::instrument(skip(self, key, request), fields(key = %key), name = "query_fetch")]
    pub async fn fetch(&self, key: &QueryKey, request: &ApiRequest) -> FetchResult<Value> {
        loop {
            let shared = {
                let mut entries = self.inner.entries();
                self.inner.collect_garbage(&mut entries);
                let now = self.inner.clock.now();
                let entry = entries
                    .entry(key.clone())
                    .or_insert_with(|| Entry::new(self.inner.next_generation(), now));
                entry.used_at = now;

                if let Some(cached) = entry.data.as_ref().filter(|c| self.inner.is_fresh(c)) {
                    QueryMetrics::record_cache_hit();
                    tracing::debug!("Serving fresh cached data");
                    return FetchResult::Success(cached.value.clone());
                }

                if let Some(in_flight) = &entry.in_flight {
                    QueryMetrics::record_deduplicated();
                    tracing::debug!("Joining in-flight request");
                    in_flight.future.clone()
                } else {
                    let in_flight = self.start(key.clone(), entry.generation, request.clone());
                    let future = in_flight.future.clone();
                    entry.in_flight = Some(in_flight);
                    future
                }
            };

            match shared.await {
                Some(result) => return result,
                None => tracing::debug!("Request superseded, fetching again"),
            }
        }
    }

    /// Spawn the request task for `generation`. Must be called with the entry
    /// lock held so that registration and settle cannot interleave.
    fn start(&self, key: QueryKey, generation: u64, request: ApiRequest) -> InFlight {
        QueryMetrics::record_fetch_started();
        tracing::debug!(generation, method = %request.method, path = %request.path, "Starting request");

        let inner = Arc::clone(&self.inner);
        let url = request.path.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = inner.execute(&request).await;
            QueryMetrics::record_settled(started.elapsed(), result.is_error());
            inner.settle(&key, generation, &result);
            result
        });
        let abort = task.abort_handle();

        let future = task
            .map(move |joined| match joined {
                Ok(result) => Some(result),
                Err(e) if e.is_cancelled() => None,
                Err(e) => Some(FetchResult::failed(TransportError::network(
                    url,
                    format!("request task failed: {e}"),
                ))),
            })
            .boxed()
            .shared();

        InFlight { future, abort }
    }

    /// Current state of `key` without triggering a request.
    ///
    /// Previous success data is attached to `Pending` and `Error` results only
    /// when `policy` keeps previous data.
    #[must_use]
    pub fn snapshot(&self, key: &QueryKey, policy: StalePolicy) -> FetchResult<Value> {
        let entries = self.inner.entries();
        let Some(entry) = entries.get(key) else {
            return FetchResult::pending();
        };

        let stale = || {
            entry
                .data
                .as_ref()
                .filter(|_| policy.keeps_previous_data())
                .map(|cached| cached.value.clone())
        };

        if entry.in_flight.is_some() {
            FetchResult::Pending { stale: stale() }
        } else if let Some(error) = &entry.error {
            FetchResult::Error {
                error: error.clone(),
                stale: stale(),
            }
        } else if let Some(cached) = &entry.data {
            FetchResult::Success(cached.value.clone())
        } else {
            FetchResult::pending()
        }
    }

    /// Whether `key` holds data younger than the configured stale time.
    #[must_use]
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.inner
            .entries()
            .get(key)
            .and_then(|entry| entry.data.as_ref())
            .is_some_and(|cached| self.inner.is_fresh(cached))
    }

    /// Whether a request for `key` is running.
    #[must_use]
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .entries()
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Invalidate every entry within `prefix`.
    ///
    /// Cached values are kept as stale data, running requests are aborted and
    /// their outcomes discarded. Subscribers are notified once with the prefix.
    /// Returns the number of entries invalidated.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let count = {
            let mut entries = self.inner.entries();
            self.inner.collect_garbage(&mut entries);
            let mut count = 0;
            for (_, entry) in entries.iter_mut().filter(|(key, _)| key.is_within(prefix)) {
                entry.supersede(self.inner.next_generation());
                if let Some(cached) = &mut entry.data {
                    cached.fetched_at = None;
                }
                count += 1;
            }
            count
        };

        QueryMetrics::record_invalidated(count);
        tracing::debug!(prefix = %prefix, count, "Invalidated queries");
        // No subscribers is fine
        let _ = self.inner.invalidations.send(prefix.clone());
        count
    }

    /// Number of cached entries, including idle ones not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Drop entries idle for longer than the cache time now, instead of
    /// waiting for the next fetch or invalidation. Returns how many were
    /// dropped.
    pub fn collect_garbage(&self) -> usize {
        self.inner.collect_garbage(&mut self.inner.entries())
    }

    /// Drop every entry and abort every running request.
    pub fn clear(&self) {
        let mut entries = self.inner.entries();
        for entry in entries.values_mut() {
            entry.supersede(0);
        }
        entries.clear();
        tracing::debug!("Cleared query cache");
    }

    /// Overwrite the data of `key`, marking it freshly fetched.
    ///
    /// A running request for the key is aborted so it cannot overwrite the
    /// new value.
    pub fn set_data(&self, key: &QueryKey, value: Value) {
        let mut entries = self.inner.entries();
        let generation = self.inner.next_generation();
        let now = self.inner.clock.now();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry::new(generation, now));
        entry.supersede(generation);
        entry.used_at = now;
        entry.data = Some(Cached {
            value,
            fetched_at: Some(now),
        });
        entry.error = None;
    }

    /// Run a write request and, if it succeeds, invalidate each prefix.
    ///
    /// Mutations are not cached, deduplicated or retried.
    #[tracing::instrument(skip(self, request, invalidates), fields(method = %request.method, path = %request.path), name = "query_mutate")]
    pub async fn mutate(&self, request: &ApiRequest, invalidates: &[QueryKey]) -> FetchResult<Value> {
        let result = self.inner.repository.fetch(request).await;
        match &result {
            FetchResult::Success(_) => {
                for prefix in invalidates {
                    self.invalidate(prefix);
                }
            },
            FetchResult::Error { error, .. } => {
                tracing::warn!(error = %error, "Mutation failed");
            },
            FetchResult::Pending { .. } => {},
        }
        result
    }

    /// Receive the prefix of every future [`invalidate`](Self::invalidate).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.inner.invalidations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::ResponseMeta;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Answers every request with its path after a short delay.
    #[derive(Default)]
    struct EchoRepository {
        calls: AtomicUsize,
    }

    impl Repository for EchoRepository {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(ApiResponse::new(
                ResponseMeta::new(200, "OK", request.path.clone()),
                json!({ "path": request.path }),
            ))
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let client = QueryClient::new(EchoRepository::default(), QueryClientConfig::default());
        let key = QueryKey::new(["genres"]);
        let request = ApiRequest::get("/genres");

        let (a, b) = tokio::join!(client.fetch(&key, &request), client.fetch(&key, &request));

        assert_eq!(a, b);
        assert_eq!(client.repository().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_without_entry_is_pending() {
        let client = QueryClient::new(EchoRepository::default(), QueryClientConfig::default());
        let snapshot = client.snapshot(&QueryKey::new(["genres"]), StalePolicy::Never);
        assert_eq!(snapshot, FetchResult::pending());
    }

    #[tokio::test]
    async fn test_set_data_is_served_while_fresh() {
        let config = QueryClientConfig::default().with_stale_time(std::time::Duration::from_secs(60));
        let client = QueryClient::new(EchoRepository::default(), config);
        let key = QueryKey::new(["movies", "7"]);

        client.set_data(&key, json!({ "title": "Heat" }));
        let result = client.fetch(&key, &ApiRequest::get("/movies/7")).await;

        assert_eq!(result, FetchResult::Success(json!({ "title": "Heat" })));
        assert_eq!(client.repository().calls.load(Ordering::SeqCst), 0);
    }
}
