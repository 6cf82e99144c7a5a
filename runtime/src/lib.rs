//! # Marquee Runtime
//!
//! The asynchronous half of the Marquee boundary: repositories that talk to
//! the theatre API, a query client that caches and deduplicates requests, and
//! loaders that combine several queries into one render branch.
//!
//! ## Core Components
//!
//! - **`Repository`**: Turns an [`ApiRequest`] into an `ApiResponse` (`HttpRepository` over `reqwest`)
//! - **`QueryClient`**: Keyed cache with at most one request in flight per key
//! - **`QueryLoader`**: Fetches N queries concurrently and publishes their results
//! - **`LoaderHandle`**: Aggregates, validates and decides the branch; cancels on drop
//!
//! ## Example
//!
//! ```no_run
//! use marquee_core::{Boundary, Branch, QueryKey, Schema, StalePolicy};
//! use marquee_runtime::{
//!     ApiRequest, HttpConfig, HttpRepository, QueryClient, QueryClientConfig, QueryDefinition,
//!     QueryLoader, SessionContext,
//! };
//! use serde_json::Value;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = HttpRepository::new(&HttpConfig::from_env()?, SessionContext::new())?;
//! let client = QueryClient::new(repository, QueryClientConfig::default());
//!
//! let mut handle = QueryLoader::new(client).spawn(
//!     vec![
//!         QueryDefinition::new("movie", QueryKey::new(["movies", "7"]), ApiRequest::get("/movies/7")),
//!         QueryDefinition::new("persons", QueryKey::new(["persons"]), ApiRequest::get("/persons")),
//!     ],
//!     StalePolicy::Never,
//! );
//!
//! match handle.settled::<Value>(&Boundary::new(Schema::any())).await? {
//!     Branch::Success { data, .. } => println!("{data}"),
//!     Branch::TransportError(failure) => eprintln!("{failure}"),
//!     Branch::ValidationError(error) => eprintln!("{error}"),
//!     Branch::Loading => unreachable!("settled never returns loading"),
//! }
//! # Ok(())
//! # }
//! ```

/// Keyed query cache with request deduplication
pub mod client;

/// Configuration for the query client and HTTP layer
pub mod config;

/// Multi-query loaders
pub mod loader;

/// Prometheus metrics for observability
pub mod metrics;

/// HTTP data sources
pub mod repository;

/// Retry logic with exponential backoff
pub mod retry;

/// Explicit authentication context
pub mod session;

/// Error types for the runtime
pub mod error {
    use thiserror::Error;

    /// Invalid configuration.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ConfigError {
        /// Base URL is not an `http` or `https` URL
        #[error("invalid API base URL: {0:?}")]
        InvalidUrl(String),

        /// Timeout is not a positive number of seconds
        #[error("invalid API timeout: {0:?} (expected a positive number of seconds)")]
        InvalidTimeout(String),

        /// The HTTP client could not be constructed
        #[error("failed to build HTTP client: {0}")]
        Client(String),
    }

    /// Errors returned by a [`LoaderHandle`](crate::loader::LoaderHandle).
    #[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LoaderError {
        /// The loader was cancelled and will not produce further results
        #[error("loader was cancelled")]
        Cancelled,

        /// The loader's state channel closed
        #[error("loader state channel closed")]
        Closed,
    }
}

pub use client::QueryClient;
pub use config::{HttpConfig, QueryClientConfig};
pub use error::{ConfigError, LoaderError};
pub use loader::{LoaderHandle, LoaderState, QueryDefinition, QueryLoader};
pub use repository::{ApiRequest, HttpRepository, Method, Repository};
pub use retry::RetryPolicy;
pub use session::SessionContext;
