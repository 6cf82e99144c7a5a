//! Ergonomic testing utilities for render-branch decisions
//!
//! This module provides a fluent API for testing boundaries with readable
//! Given-When-Then syntax: given some source results, when the boundary
//! evaluates them, then the branch looks like this.

#![allow(clippy::module_name_repetitions)] // BoundaryTest is the natural name

use marquee_core::{Boundary, Branch, FetchResult, ResultAggregator, Schema, StalePolicy, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Type alias for branch assertion functions
type BranchAssertion<T> = Box<dyn FnOnce(&Branch<T>)>;

/// Fluent API for testing boundaries with Given-When-Then syntax
///
/// # Example
///
/// ```
/// use marquee_core::Schema;
/// use marquee_testing::{BoundaryTest, assertions};
/// use serde_json::{Value, json};
///
/// BoundaryTest::<Value>::new()
///     .given_success("genre", json!({ "name": "" }))
///     .with_schema(Schema::object().field(
///         "genre",
///         Schema::object().field("name", Schema::string().min_len(1)),
///     ))
///     .then_branch(|branch| assertions::assert_violation_paths(branch, &["genre.name"]))
///     .run();
/// ```
pub struct BoundaryTest<T = Value> {
    sources: Vec<(String, FetchResult<Value>)>,
    boundary: Boundary,
    assertions: Vec<BranchAssertion<T>>,
    target: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for BoundaryTest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> BoundaryTest<T> {
    /// Create a test with no sources and a passthrough boundary
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            boundary: Boundary::passthrough(),
            assertions: Vec::new(),
            target: PhantomData,
        }
    }

    /// Add a named source in any state (Given)
    #[must_use]
    pub fn given_source(mut self, name: impl Into<String>, result: FetchResult<Value>) -> Self {
        self.sources.push((name.into(), result));
        self
    }

    /// Add a named source that settled with `data` (Given)
    #[must_use]
    pub fn given_success(self, name: impl Into<String>, data: Value) -> Self {
        self.given_source(name, FetchResult::Success(data))
    }

    /// Add a named source still in flight (Given)
    #[must_use]
    pub fn given_pending(self, name: impl Into<String>) -> Self {
        self.given_source(name, FetchResult::pending())
    }

    /// Add a named source that failed (Given)
    #[must_use]
    pub fn given_error(self, name: impl Into<String>, error: TransportError) -> Self {
        self.given_source(name, FetchResult::failed(error))
    }

    /// Validate against `schema`, keeping the configured policy
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<Schema>) -> Self {
        let policy = self.boundary.policy();
        self.boundary = Boundary::new(schema).with_policy(policy);
        self
    }

    /// Set the stale-while-revalidate policy
    #[must_use]
    pub fn with_policy(mut self, policy: StalePolicy) -> Self {
        self.boundary = self.boundary.with_policy(policy);
        self
    }

    /// Use a fully configured boundary
    #[must_use]
    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Add an assertion about the decided branch (Then)
    #[must_use]
    pub fn then_branch<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&Branch<T>) + 'static,
    {
        self.assertions.push(Box::new(assertion));
        self
    }

    /// Aggregate the sources, evaluate the boundary (When) and run every
    /// assertion. Returns the branch for further inspection.
    ///
    /// # Panics
    ///
    /// Panics if any assertion fails.
    pub fn run(self) -> Branch<T> {
        let aggregated = self
            .sources
            .iter()
            .fold(ResultAggregator::new(), |aggregator, (name, result)| {
                aggregator.source(name.clone(), result)
            })
            .aggregate();

        let branch = self.boundary.evaluate::<T>(&aggregated);

        for assertion in self.assertions {
            assertion(&branch);
        }

        branch
    }
}

/// Helper assertions for branches
pub mod assertions {
    use marquee_core::{Branch, BranchKind};
    use std::fmt::Debug;

    /// Assert that the branch is `Loading`
    ///
    /// # Panics
    ///
    /// Panics if the branch is anything else.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_loading<T: Debug>(branch: &Branch<T>) {
        assert!(branch.is_loading(), "Expected loading branch, but found {branch:?}");
    }

    /// Assert that the branch is a transport error with `status`
    ///
    /// # Panics
    ///
    /// Panics if the branch is not a transport error or the status differs.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_transport_error_status<T: Debug>(branch: &Branch<T>, status: u16) {
        match branch {
            Branch::TransportError(failure) => assert_eq!(
                failure.error.status,
                Some(status),
                "Expected transport error with status {status}, but found {:?}",
                failure.error.status
            ),
            other => panic!("Expected transport error branch, but found {other:?}"),
        }
    }

    /// Assert that the branch is a validation error with exactly these
    /// violation paths, in order
    ///
    /// # Panics
    ///
    /// Panics if the branch is not a validation error or the paths differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_violation_paths<T: Debug>(branch: &Branch<T>, expected: &[&str]) {
        match branch {
            Branch::ValidationError(error) => assert_eq!(
                error.paths(),
                expected,
                "Violation paths differ: {:?}",
                error.violations
            ),
            other => panic!("Expected validation error branch, but found {other:?}"),
        }
    }

    /// Assert that the branch is a fresh success and return its data
    ///
    /// # Panics
    ///
    /// Panics if the branch is not a success or the data is stale.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_success<T: Debug>(branch: &Branch<T>) -> &T {
        match branch {
            Branch::Success { data, stale: false } => data,
            other => panic!("Expected fresh success branch, but found {other:?}"),
        }
    }

    /// Assert that the branch serves stale data and return it
    ///
    /// # Panics
    ///
    /// Panics if the branch is not a stale success.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_stale_success<T: Debug>(branch: &Branch<T>) -> &T {
        match branch {
            Branch::Success { data, stale: true } => data,
            other => panic!("Expected stale success branch, but found {other:?}"),
        }
    }

    /// Assert the branch kind
    ///
    /// # Panics
    ///
    /// Panics if the kind differs.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_kind<T>(branch: &Branch<T>, expected: BranchKind) {
        assert_eq!(branch.kind(), expected, "Expected {expected} branch, but found {}", branch.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::*;
    use marquee_core::BranchKind;
    use serde_json::json;

    #[test]
    fn test_pending_source_renders_loading() {
        BoundaryTest::<Value>::new()
            .given_success("genre", json!({ "name": "Action" }))
            .given_pending("persons")
            .then_branch(assert_loading)
            .run();
    }

    #[test]
    fn test_failed_source_renders_transport_error() {
        BoundaryTest::<Value>::new()
            .given_success("genre", json!({ "name": "Action" }))
            .given_error("persons", TransportError::http(404, "Not Found", "/persons", None))
            .then_branch(|branch| assert_transport_error_status(branch, 404))
            .run();
    }

    #[test]
    fn test_run_returns_the_branch() {
        let branch = BoundaryTest::<Value>::new()
            .given_success("genre", json!({ "name": "Action" }))
            .run();

        assert_eq!(assert_success(&branch), &json!({ "genre": { "name": "Action" } }));
    }

    #[test]
    fn test_with_schema_keeps_policy() {
        BoundaryTest::<Value>::new()
            .with_policy(StalePolicy::WhileRefetching)
            .with_schema(Schema::any())
            .given_source("genre", FetchResult::Pending { stale: Some(json!({ "name": "Drama" })) })
            .then_branch(|branch| {
                assert_kind(branch, BranchKind::Success);
                assert_eq!(assert_stale_success(branch), &json!({ "genre": { "name": "Drama" } }));
            })
            .run();
    }
}
