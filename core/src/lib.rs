//! # Marquee Core
//!
//! Core types for the Marquee aggregate-validate-render boundary.
//!
//! Every screen of the theatre client loads one or more resources, waits for
//! all of them, checks the combined payload against a schema and then shows
//! exactly one of four things: a loader, a transport error, a validation error
//! or the data. This crate holds the pure, synchronous part of that pipeline.
//!
//! ## Core Concepts
//!
//! - **`FetchResult`**: The outcome of one request at a point in time
//! - **`ResultAggregator`**: Merges N results into one joint pending/error/data state
//! - **`SchemaValidator`**: Checks raw JSON against a declarative [`Schema`]
//! - **`decide`**: Picks the [`Branch`] to render, in strict precedence order
//! - **`QueryKey`**: Stable cache key derived from scope segments and filters
//!
//! ## Pipeline
//!
//! ```text
//! FetchResult<Value> ─┐
//! FetchResult<Value> ─┼─▶ ResultAggregator ─▶ SchemaValidator ─▶ decide ─▶ Branch<T>
//! FetchResult<Value> ─┘
//! ```
//!
//! ## Example
//!
//! ```
//! use marquee_core::{
//!     Boundary, Branch, FetchResult, ResultAggregator, Schema, StalePolicy,
//! };
//! use serde::Deserialize;
//! use serde_json::json;
//!
//! #[derive(Debug, Deserialize, PartialEq)]
//! struct Page {
//!     movie: Movie,
//! }
//!
//! #[derive(Debug, Deserialize, PartialEq)]
//! struct Movie {
//!     title: String,
//!     runtime: i64,
//! }
//!
//! let movie = FetchResult::Success(json!({ "title": "A", "runtime": 120 }));
//!
//! let aggregated = ResultAggregator::new().source("movie", &movie).aggregate();
//!
//! let schema = Schema::object().field(
//!     "movie",
//!     Schema::object()
//!         .field("title", Schema::string().min_len(1))
//!         .field("runtime", Schema::integer().gt(0.0)),
//! );
//!
//! let branch = Boundary::new(schema)
//!     .with_policy(StalePolicy::Never)
//!     .evaluate::<Page>(&aggregated);
//!
//! assert!(matches!(branch, Branch::Success { stale: false, .. }));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde_json::Value;

/// Single-request outcomes and the transport error type
pub mod fetch;

/// Combining several fetch results into one joint state
pub mod aggregate;

/// Declarative schemas and the validator that applies them
pub mod schema;

/// Render-branch decision logic
pub mod render;

/// Cache keys for deduplicating identical queries
pub mod query_key;

/// Theatre domain records and their schemas
pub mod catalog;

/// Display formatting helpers
pub mod format;

/// Environment module - Dependency injection traits
///
/// External dependencies that influence query behaviour (currently only time)
/// are abstracted behind traits and injected into the runtime, so tests can
/// control them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use marquee_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use aggregate::{Aggregate, AggregatedResult, ResultAggregator, SourceFailure, aggregate};
pub use fetch::{ApiResponse, FetchResult, FetchState, ResponseMeta, TransportError, TransportErrorKind};
pub use query_key::{QueryKey, QueryKeyBuilder, QueryKeyError};
pub use render::{Boundary, Branch, BranchKind, BranchTracker, BranchTransition, StalePolicy, decide};
pub use schema::{
    FieldPath, Schema, SchemaValidator, ValidationError, ValidationOutcome, Violation,
    ViolationKind,
};
