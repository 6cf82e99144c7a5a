//! Combining several fetch results into one joint state.
//!
//! # Precedence
//!
//! The rules are exact, because screens and tests both depend on them:
//!
//! 1. If any source is pending, the aggregate is pending. Errors of other
//!    sources are not evaluated at all.
//! 2. Otherwise, if any source failed, the aggregate is in error and
//!    [`AggregatedResult::first_error`] is the error of the failing source
//!    with the lowest declaration index. Completion order never matters.
//! 3. Values exist only when every source succeeded.
//!
//! Two entry points exist:
//!
//! - [`ResultAggregator`] for named JSON sources, producing a JSON object keyed
//!   by source name. This is the form fed to the schema validator.
//! - [`aggregate`] for typed tuples (or slices) of results, producing tuples of
//!   references.
//!
//! Aggregation is a pure function of its inputs and is cheap enough to run on
//! every evaluation.

use crate::fetch::{FetchResult, FetchState, TransportError};
use serde_json::{Map, Value};
use std::fmt;

/// The first failing source of an aggregation, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    /// Declaration index of the source
    pub index: usize,
    /// Diagnostic name of the source, if it was given one
    pub name: Option<String>,
    /// The transport error of that source
    pub error: TransportError,
}

impl SourceFailure {
    /// Name of the source, or `#<index>` for unnamed sources.
    #[must_use]
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("#{}", self.index))
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source {} failed: {}", self.label(), self.error)
    }
}

/// Joint state of N fetch results.
///
/// Derived, never stored: recompute it from the sources whenever they change.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult<V> {
    source_count: usize,
    is_pending: bool,
    first_failure: Option<SourceFailure>,
    latest: Option<V>,
}

/// What the aggregator needs to know about one source.
#[derive(Debug, Clone, Copy)]
struct Probe<'a> {
    name: Option<&'a str>,
    state: FetchState,
    error: Option<&'a TransportError>,
}

impl<'a> Probe<'a> {
    fn of<T>(name: Option<&'a str>, result: &'a FetchResult<T>) -> Self {
        Self {
            name,
            state: result.state(),
            error: result.error(),
        }
    }
}

impl<V> AggregatedResult<V> {
    fn from_probes(probes: &[Probe<'_>], latest: Option<V>) -> Self {
        let is_pending = probes.iter().any(|p| p.state == FetchState::Pending);

        let first_failure = if is_pending {
            None
        } else {
            probes.iter().enumerate().find_map(|(index, probe)| {
                probe.error.map(|error| SourceFailure {
                    index,
                    name: probe.name.map(str::to_string),
                    error: error.clone(),
                })
            })
        };

        Self {
            source_count: probes.len(),
            is_pending,
            first_failure,
            latest,
        }
    }

    /// Number of sources that took part.
    #[must_use]
    pub const fn source_count(&self) -> usize {
        self.source_count
    }

    /// True if any source is still pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.is_pending
    }

    /// True if no source is pending and at least one failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.first_failure.is_some()
    }

    /// True if every source succeeded.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !self.is_pending && self.first_failure.is_none()
    }

    /// Error of the first failing source in declaration order.
    #[must_use]
    pub fn first_error(&self) -> Option<&TransportError> {
        self.first_failure.as_ref().map(|f| &f.error)
    }

    /// First failing source, including its index and name.
    #[must_use]
    pub const fn first_failure(&self) -> Option<&SourceFailure> {
        self.first_failure.as_ref()
    }

    /// Combined data. Defined if and only if every source succeeded.
    #[must_use]
    pub const fn values(&self) -> Option<&V> {
        if self.is_ready() {
            self.latest.as_ref()
        } else {
            None
        }
    }

    /// Combined stale data while the aggregate is not ready.
    ///
    /// Defined only when every non-successful source retained data from an
    /// earlier success.
    #[must_use]
    pub const fn stale_values(&self) -> Option<&V> {
        if self.is_ready() {
            None
        } else {
            self.latest.as_ref()
        }
    }

    /// Fresh values if ready, otherwise stale values if available.
    #[must_use]
    pub const fn latest(&self) -> Option<&V> {
        self.latest.as_ref()
    }

    /// Consume the aggregate, returning values only if ready.
    #[must_use]
    pub fn into_values(self) -> Option<V> {
        if self.is_ready() { self.latest } else { None }
    }

    /// Transform the combined data.
    pub fn map<U, F>(self, f: F) -> AggregatedResult<U>
    where
        F: FnOnce(V) -> U,
    {
        AggregatedResult {
            source_count: self.source_count,
            is_pending: self.is_pending,
            first_failure: self.first_failure,
            latest: self.latest.map(f),
        }
    }
}

/// Merges named JSON sources into one [`AggregatedResult`].
///
/// Values are a JSON object keyed by source name; unnamed sources are keyed by
/// their declaration index.
///
/// # Example
///
/// ```
/// use marquee_core::{FetchResult, ResultAggregator, TransportError};
/// use serde_json::json;
///
/// let movie = FetchResult::Success(json!({ "title": "Heat" }));
/// let persons = FetchResult::failed(TransportError::http(404, "Not Found", "/persons", None));
///
/// let aggregated = ResultAggregator::new()
///     .source("movie", &movie)
///     .source("persons", &persons)
///     .aggregate();
///
/// assert!(aggregated.is_error());
/// assert_eq!(aggregated.first_failure().map(|f| f.label()), Some("persons".to_string()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator<'a> {
    sources: Vec<(Option<String>, &'a FetchResult<Value>)>,
}

impl<'a> ResultAggregator<'a> {
    /// Create an aggregator with no sources.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a named source. Declaration order is preserved.
    #[must_use]
    pub fn source(mut self, name: impl Into<String>, result: &'a FetchResult<Value>) -> Self {
        self.sources.push((Some(name.into()), result));
        self
    }

    /// Add an unnamed source, keyed by its index.
    #[must_use]
    pub fn unnamed(mut self, result: &'a FetchResult<Value>) -> Self {
        self.sources.push((None, result));
        self
    }

    /// Number of declared sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no sources were declared.
    ///
    /// An empty aggregation is vacuously ready with `{}` as its values, which
    /// is rarely what a screen wants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Compute the joint state.
    #[must_use]
    pub fn aggregate(&self) -> AggregatedResult<Value> {
        let probes: Vec<Probe<'_>> = self
            .sources
            .iter()
            .map(|(name, result)| Probe::of(name.as_deref(), result))
            .collect();

        let mut record = Map::with_capacity(self.sources.len());
        let mut complete = true;
        for (index, (name, result)) in self.sources.iter().enumerate() {
            let Some(data) = result.latest() else {
                complete = false;
                break;
            };
            let key = name.clone().unwrap_or_else(|| index.to_string());
            record.insert(key, data.clone());
        }

        let latest = complete.then(|| Value::Object(record));
        AggregatedResult::from_probes(&probes, latest)
    }
}

/// Sources that can be aggregated: tuples and slices of `&FetchResult`.
pub trait Aggregate {
    /// Combined data produced when every source succeeded.
    type Values;

    /// Compute the joint state.
    fn aggregate(self) -> AggregatedResult<Self::Values>;
}

/// Aggregate typed sources.
///
/// # Example
///
/// ```
/// use marquee_core::{aggregate, FetchResult};
///
/// let genres = FetchResult::Success(vec!["Action", "Drama"]);
/// let count: FetchResult<u32> = FetchResult::pending();
///
/// let aggregated = aggregate((&genres, &count));
/// assert!(aggregated.is_pending());
/// assert!(aggregated.values().is_none());
/// ```
pub fn aggregate<S: Aggregate>(sources: S) -> AggregatedResult<S::Values> {
    sources.aggregate()
}

impl<'a, T> Aggregate for &'a [FetchResult<T>] {
    type Values = Vec<&'a T>;

    fn aggregate(self) -> AggregatedResult<Self::Values> {
        let probes: Vec<Probe<'a>> = self.iter().map(|r| Probe::of(None, r)).collect();
        let latest = self.iter().map(FetchResult::latest).collect::<Option<Vec<_>>>();
        AggregatedResult::from_probes(&probes, latest)
    }
}

macro_rules! impl_aggregate_for_tuple {
    ($($ty:ident $var:ident $idx:tt),+) => {
        impl<'a, $($ty),+> Aggregate for ($(&'a FetchResult<$ty>,)+) {
            type Values = ($(&'a $ty,)+);

            fn aggregate(self) -> AggregatedResult<Self::Values> {
                let probes = [$(Probe::of(None, self.$idx)),+];
                let latest = match ($(self.$idx.latest(),)+) {
                    ($(Some($var),)+) => Some(($($var,)+)),
                    _ => None,
                };
                AggregatedResult::from_probes(&probes, latest)
            }
        }
    };
}

impl_aggregate_for_tuple!(A a 0);
impl_aggregate_for_tuple!(A a 0, B b 1);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2, D d 3);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6);
impl_aggregate_for_tuple!(A a 0, B b 1, C c 2, D d 3, E e 4, F f 5, G g 6, H h 7);
