//! Render-branch decision logic.
//!
//! Given an [`AggregatedResult`] and, when applicable, a
//! [`ValidationOutcome`], exactly one [`Branch`] applies. Precedence is strict:
//!
//! 1. **Loading** while any source is pending
//! 2. **Transport error** when a source failed
//! 3. **Validation error** when the payload does not match the schema
//! 4. **Success** otherwise
//!
//! Stale-while-revalidate never happens implicitly. A caller that wants
//! previous data shown instead of a loader (or instead of a transport error)
//! passes a [`StalePolicy`] saying so.
//!
//! Deciding is pure. Side effects such as toasts or redirects belong to the
//! caller and should run once per branch change, which [`BranchTracker`]
//! detects.

use crate::aggregate::{AggregatedResult, SourceFailure};
use crate::schema::{Schema, SchemaValidator, ValidationError, ValidationOutcome};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Per-call stale-while-revalidate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StalePolicy {
    /// Always show the loader while pending and the error when failed
    #[default]
    Never,
    /// Show previous data instead of the loader while refetching
    WhileRefetching,
    /// Show previous data while refetching and after a failed refetch
    WhileRefetchingOrFailed,
}

impl StalePolicy {
    /// Whether previous data survives a new request at all.
    #[must_use]
    pub const fn keeps_previous_data(self) -> bool {
        !matches!(self, Self::Never)
    }

    /// Whether stale data replaces the loading branch.
    #[must_use]
    pub const fn serves_stale_while_pending(self) -> bool {
        matches!(self, Self::WhileRefetching | Self::WhileRefetchingOrFailed)
    }

    /// Whether stale data replaces the transport-error branch.
    #[must_use]
    pub const fn serves_stale_on_error(self) -> bool {
        matches!(self, Self::WhileRefetchingOrFailed)
    }
}

/// Fieldless discriminant of [`Branch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Waiting for data
    Loading,
    /// A source failed at the transport level
    TransportError,
    /// The payload did not match the schema
    ValidationError,
    /// Validated data is available
    Success,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::TransportError => write!(f, "transport_error"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// The one state a boundary renders.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch<T> {
    /// Waiting for data
    Loading,
    /// The first failing source, in declaration order
    TransportError(SourceFailure),
    /// Every schema violation of the payload
    ValidationError(ValidationError),
    /// Validated data
    Success {
        /// The typed payload
        data: T,
        /// True when the data predates a refetch that is pending or failed
        stale: bool,
    },
}

impl<T> Branch<T> {
    /// Which branch this is.
    #[must_use]
    pub const fn kind(&self) -> BranchKind {
        match self {
            Self::Loading => BranchKind::Loading,
            Self::TransportError(_) => BranchKind::TransportError,
            Self::ValidationError(_) => BranchKind::ValidationError,
            Self::Success { .. } => BranchKind::Success,
        }
    }

    /// Check if this is the loading branch
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Check if this is the success branch
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Data of the success branch.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Consume the branch, returning success data.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Transform success data.
    pub fn map<U, F>(self, f: F) -> Branch<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Loading => Branch::Loading,
            Self::TransportError(failure) => Branch::TransportError(failure),
            Self::ValidationError(error) => Branch::ValidationError(error),
            Self::Success { data, stale } => Branch::Success {
                data: f(data),
                stale,
            },
        }
    }
}

/// Pick the branch to render.
///
/// `validation` is the outcome of validating the aggregate's values (or, under
/// a stale policy, its stale values). A ready aggregate without an outcome is
/// treated as not yet validated and yields [`Branch::Loading`].
pub fn decide<V, T>(
    aggregated: &AggregatedResult<V>,
    validation: Option<ValidationOutcome<T>>,
    policy: StalePolicy,
) -> Branch<T> {
    if aggregated.is_pending() {
        return match validation {
            Some(Ok(data)) if policy.serves_stale_while_pending() => {
                Branch::Success { data, stale: true }
            },
            _ => Branch::Loading,
        };
    }

    if let Some(failure) = aggregated.first_failure() {
        return match validation {
            Some(Ok(data)) if policy.serves_stale_on_error() => {
                Branch::Success { data, stale: true }
            },
            _ => Branch::TransportError(failure.clone()),
        };
    }

    match validation {
        None => Branch::Loading,
        Some(Err(error)) => Branch::ValidationError(error),
        Some(Ok(data)) => Branch::Success { data, stale: false },
    }
}

/// A schema and stale policy bundled for repeated evaluation.
///
/// # Example
///
/// ```
/// use marquee_core::{Boundary, Branch, FetchResult, ResultAggregator, Schema};
/// use serde_json::{json, Value};
///
/// let genres = FetchResult::Success(json!([{ "name": "Action" }]));
/// let persons: FetchResult<Value> = FetchResult::pending();
///
/// let aggregated = ResultAggregator::new()
///     .source("genres", &genres)
///     .source("persons", &persons)
///     .aggregate();
///
/// let branch = Boundary::new(Schema::any()).evaluate::<Value>(&aggregated);
/// assert!(matches!(branch, Branch::Loading));
/// ```
#[derive(Debug, Clone)]
pub struct Boundary {
    schema: Schema,
    policy: StalePolicy,
    summary: Option<String>,
}

impl Boundary {
    /// Create a boundary validating against `schema`, with no stale data.
    #[must_use]
    pub fn new(schema: impl Into<Schema>) -> Self {
        Self {
            schema: schema.into(),
            policy: StalePolicy::Never,
            summary: None,
        }
    }

    /// Create a boundary that only converts raw data into the target type.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(Schema::any())
    }

    /// Set the stale-while-revalidate policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: StalePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Summary message attached to validation errors.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The configured policy.
    #[must_use]
    pub const fn policy(&self) -> StalePolicy {
        self.policy
    }

    /// The configured schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate what the policy allows to be shown, then decide the branch.
    ///
    /// Nothing is validated while the aggregate is pending or failed unless
    /// the policy serves stale data in that state.
    pub fn evaluate<T: DeserializeOwned>(&self, aggregated: &AggregatedResult<Value>) -> Branch<T> {
        let candidate = if aggregated.is_ready() {
            aggregated.values()
        } else if (aggregated.is_pending() && self.policy.serves_stale_while_pending())
            || (aggregated.is_error() && self.policy.serves_stale_on_error())
        {
            aggregated.stale_values()
        } else {
            None
        };

        let validation = candidate.map(|raw| {
            SchemaValidator::validate::<T>(&self.schema, raw).map_err(|error| match &self.summary {
                Some(summary) => error.with_summary(summary.clone()),
                None => error,
            })
        });

        decide(aggregated, validation, self.policy)
    }
}

/// A change of rendered branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTransition {
    /// Previously observed branch, `None` on first observation
    pub from: Option<BranchKind>,
    /// Newly observed branch
    pub to: BranchKind,
}

/// Detects branch changes across repeated evaluations.
///
/// Side effects tied to a branch (a toast on error, a redirect on success)
/// should run only when [`observe`](Self::observe) returns a transition, not
/// on every evaluation.
///
/// # Example
///
/// ```
/// use marquee_core::{BranchKind, BranchTracker};
///
/// let mut tracker = BranchTracker::new();
/// assert!(tracker.observe(BranchKind::Loading).is_some());
/// assert!(tracker.observe(BranchKind::Loading).is_none());
/// assert!(tracker.observe(BranchKind::TransportError).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BranchTracker {
    current: Option<BranchKind>,
}

impl BranchTracker {
    /// Create a tracker that has observed nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Record `kind`, returning a transition only if it differs from the last
    /// observed kind.
    pub fn observe(&mut self, kind: BranchKind) -> Option<BranchTransition> {
        if self.current == Some(kind) {
            return None;
        }
        let from = self.current.replace(kind);
        Some(BranchTransition { from, to: kind })
    }

    /// Record the kind of `branch`.
    pub fn observe_branch<T>(&mut self, branch: &Branch<T>) -> Option<BranchTransition> {
        self.observe(branch.kind())
    }

    /// The last observed kind.
    #[must_use]
    pub const fn current(&self) -> Option<BranchKind> {
        self.current
    }

    /// Forget the last observed kind (e.g. when the view is torn down).
    pub const fn reset(&mut self) {
        self.current = None;
    }
}
