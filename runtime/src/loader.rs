//! Multi-query loaders.
//!
//! A loader issues one fetch per [`QueryDefinition`] concurrently and
//! publishes the per-source [`FetchResult`]s through a `watch` channel. The
//! [`LoaderHandle`] turns those results into an aggregate and a render branch
//! on demand.
//!
//! Every launch of the fetches belongs to a generation. A result is written
//! only if its generation is still current, so a refetch or a cancelled view
//! never sees results of a request it no longer cares about.

use crate::client::QueryClient;
use crate::error::LoaderError;
use crate::metrics::BoundaryMetrics;
use crate::repository::{ApiRequest, Repository};
use async_stream::stream;
use futures::Stream;
use marquee_core::environment::Clock;
use marquee_core::{AggregatedResult, Boundary, Branch, BranchTracker, FetchResult, QueryKey, ResultAggregator, StalePolicy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// One named source of a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    /// Name the source's data is keyed by in the aggregate
    pub name: String,
    /// Cache key
    pub key: QueryKey,
    /// Request issued on a cache miss
    pub request: ApiRequest,
}

impl QueryDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, key: QueryKey, request: ApiRequest) -> Self {
        Self {
            name: name.into(),
            key,
            request,
        }
    }
}

/// Per-source results published by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderState {
    /// Generation the results belong to
    pub generation: u64,
    /// One result per definition, in declaration order
    pub results: Vec<FetchResult<Value>>,
}

/// Operations a handle performs on its loader, independent of the client's
/// repository and clock types.
trait LoaderControl: Send + Sync {
    fn launch(self: Arc<Self>);
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
    fn tracked_tasks(&self) -> usize;
}

struct Loader<R, C> {
    client: QueryClient<R, C>,
    definitions: Arc<[QueryDefinition]>,
    policy: StalePolicy,
    state: watch::Sender<LoaderState>,
    generation: AtomicU64,
    cancelled: AtomicBool,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl<R, C> Loader<R, C>
where
    R: Repository + 'static,
    C: Clock + 'static,
{
    fn tasks(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refetch whenever the client invalidates a prefix covering one of our
    /// keys.
    fn watch_invalidations(self: &Arc<Self>) {
        let mut invalidations = self.client.subscribe();
        let loader = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                match invalidations.recv().await {
                    Ok(prefix) => {
                        if loader.definitions.iter().any(|d| d.key.is_within(&prefix)) {
                            tracing::debug!(prefix = %prefix, "Loader query invalidated, refetching");
                            Arc::clone(&loader).launch();
                        }
                    },
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Missed invalidations, refetching");
                        Arc::clone(&loader).launch();
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.tasks().push(task.abort_handle());
    }
}

impl<R, C> LoaderControl for Loader<R, C>
where
    R: Repository + 'static,
    C: Clock + 'static,
{
    fn launch(self: Arc<Self>) {
        // Held until every new task is tracked; cancel takes the same lock
        let mut tasks = self.tasks();
        if self.is_cancelled() {
            return;
        }
        tasks.retain(|task| !task.is_finished());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let keep_previous = self.policy.keeps_previous_data();
        self.state.send_modify(|state| {
            state.generation = generation;
            for result in &mut state.results {
                *result = std::mem::take(result).into_pending(keep_previous);
            }
        });
        tracing::debug!(generation, sources = self.definitions.len(), "Launching loader fetches");

        for index in 0..self.definitions.len() {
            let loader = Arc::clone(&self);
            let task = tokio::spawn(async move {
                let definition = &loader.definitions[index];
                let result = loader.client.fetch(&definition.key, &definition.request).await;

                let written = loader.state.send_if_modified(|state| {
                    if loader.is_cancelled() || state.generation != generation {
                        return false;
                    }
                    let previous = std::mem::take(&mut state.results[index]);
                    state.results[index] = match result {
                        FetchResult::Error { error, .. } => FetchResult::Error {
                            error,
                            stale: previous.latest().cloned().filter(|_| keep_previous),
                        },
                        settled => settled,
                    };
                    true
                });
                if !written {
                    tracing::debug!(generation, source = %definition.name, "Discarding result of superseded generation");
                }
            });
            tasks.push(task.abort_handle());
        }
    }

    fn cancel(&self) {
        let tasks = {
            let mut tasks = self.tasks();
            if self.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.send_modify(|state| state.generation = generation);
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            task.abort();
        }
        tracing::debug!("Loader cancelled");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn tracked_tasks(&self) -> usize {
        self.tasks().len()
    }
}

/// Spawns loaders on a shared [`QueryClient`].
pub struct QueryLoader<R, C> {
    client: QueryClient<R, C>,
}

impl<R, C> QueryLoader<R, C>
where
    R: Repository + 'static,
    C: Clock + 'static,
{
    /// Create a loader factory.
    #[must_use]
    pub const fn new(client: QueryClient<R, C>) -> Self {
        Self { client }
    }

    /// Start fetching every definition concurrently.
    ///
    /// Sources start from the client's cached state, carrying previous data
    /// only when `policy` keeps it. Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn(&self, definitions: Vec<QueryDefinition>, policy: StalePolicy) -> LoaderHandle {
        let names: Vec<String> = definitions.iter().map(|d| d.name.clone()).collect();
        let results = definitions
            .iter()
            .map(|d| {
                self.client
                    .snapshot(&d.key, policy)
                    .into_pending(policy.keeps_previous_data())
            })
            .collect();
        let (state, receiver) = watch::channel(LoaderState {
            generation: 0,
            results,
        });

        let loader = Arc::new(Loader {
            client: self.client.clone(),
            definitions: definitions.into(),
            policy,
            state,
            generation: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });
        loader.watch_invalidations();
        Arc::clone(&loader).launch();

        LoaderHandle {
            names,
            receiver,
            control: loader,
        }
    }
}

/// Handle to a running loader.
///
/// Dropping the handle cancels the loader.
pub struct LoaderHandle {
    names: Vec<String>,
    receiver: watch::Receiver<LoaderState>,
    control: Arc<dyn LoaderControl>,
}

impl LoaderHandle {
    /// Source names, in declaration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Current per-source results.
    #[must_use]
    pub fn state(&self) -> LoaderState {
        self.receiver.borrow().clone()
    }

    /// Generation of the current results.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.receiver.borrow().generation
    }

    /// Joint state of every source, keyed by source name.
    #[must_use]
    pub fn aggregate(&self) -> AggregatedResult<Value> {
        aggregate(&self.names, &self.receiver.borrow().results)
    }

    /// Decide the branch for the current results.
    pub fn evaluate<T: DeserializeOwned>(&self, boundary: &Boundary) -> Branch<T> {
        evaluate(boundary, &self.aggregate())
    }

    /// Wait until the results change.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Cancelled`] if the loader was cancelled and
    /// [`LoaderError::Closed`] if the loader is gone.
    pub async fn changed(&mut self) -> Result<(), LoaderError> {
        if self.control.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }
        self.receiver.changed().await.map_err(|_| LoaderError::Closed)
    }

    /// Wait until no source is pending, then decide the branch.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError`] if the loader is cancelled before settling.
    pub async fn settled<T: DeserializeOwned>(&mut self, boundary: &Boundary) -> Result<Branch<T>, LoaderError> {
        loop {
            let aggregated = aggregate(&self.names, &self.receiver.borrow_and_update().results);
            if !aggregated.is_pending() {
                return Ok(evaluate(boundary, &aggregated));
            }
            self.changed().await?;
        }
    }

    /// Stream of branches, one per change of the results.
    ///
    /// The first item reflects the current results. The stream ends when the
    /// loader is cancelled or dropped.
    pub fn branches<T>(&self, boundary: Boundary) -> impl Stream<Item = Branch<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let names = self.names.clone();
        let mut receiver = self.receiver.clone();
        let control = Arc::clone(&self.control);

        stream! {
            let mut tracker = BranchTracker::new();
            loop {
                let aggregated = aggregate(&names, &receiver.borrow_and_update().results);
                let branch: Branch<T> = evaluate(&boundary, &aggregated);
                if let Some(transition) = tracker.observe_branch(&branch) {
                    BoundaryMetrics::record_branch(transition.to);
                }
                yield branch;

                if control.is_cancelled() || receiver.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Start a new generation of fetches.
    ///
    /// Results of the previous generation that settle afterwards are
    /// discarded. Previous data is kept as stale data only under a stale
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Cancelled`] if the loader was cancelled.
    pub fn refetch(&self) -> Result<(), LoaderError> {
        if self.control.is_cancelled() {
            return Err(LoaderError::Cancelled);
        }
        Arc::clone(&self.control).launch();
        Ok(())
    }

    /// Abort outstanding fetches and stop accepting results.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Whether the loader was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Number of tasks the loader still holds abort handles for: the
    /// invalidation watcher and the fetches of recent generations.
    #[must_use]
    pub fn tracked_tasks(&self) -> usize {
        self.control.tracked_tasks()
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.control.cancel();
    }
}

fn aggregate(names: &[String], results: &[FetchResult<Value>]) -> AggregatedResult<Value> {
    names
        .iter()
        .zip(results)
        .fold(ResultAggregator::new(), |aggregator, (name, result)| {
            aggregator.source(name.clone(), result)
        })
        .aggregate()
}

fn evaluate<T: DeserializeOwned>(boundary: &Boundary, aggregated: &AggregatedResult<Value>) -> Branch<T> {
    let branch = boundary.evaluate(aggregated);
    if let Branch::ValidationError(error) = &branch {
        BoundaryMetrics::record_validation_failure(error.len());
    }
    branch
}
