//! # Marquee Testing
//!
//! Testing utilities and helpers for the Marquee boundary.
//!
//! This crate provides:
//! - Deterministic clocks for freshness decisions
//! - A scripted [`Repository`](marquee_runtime::Repository) with per-path responses,
//!   call counts and gates that hold requests pending
//! - A Given-When-Then harness for render-branch decisions
//! - Property-based testing strategies for fetch results
//!
//! ## Example
//!
//! ```
//! use marquee_core::{BranchKind, Schema};
//! use marquee_testing::BoundaryTest;
//! use serde_json::json;
//!
//! BoundaryTest::<serde_json::Value>::new()
//!     .given_success("genre", json!({ "name": "Action" }))
//!     .given_pending("persons")
//!     .with_schema(Schema::any())
//!     .then_branch(|branch| assert_eq!(branch.kind(), BranchKind::Loading))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use marquee_core::environment::Clock;

/// Given-When-Then harness for render-branch decisions
pub mod boundary_test;

/// Scripted repository for driving the query client in tests
pub mod repository_mocks;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    pub use crate::repository_mocks::{Gate, ScriptedRepository, ScriptedResponse};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use marquee_testing::mocks::FixedClock;
    /// use marquee_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one clone and hand the
    /// other to a query client.
    ///
    /// # Example
    ///
    /// ```
    /// use marquee_testing::mocks::{ManualClock, test_clock};
    /// use marquee_core::environment::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new(test_clock().now());
    /// let start = clock.now();
    /// clock.advance(Duration::from_secs(90));
    /// assert_eq!((clock.now() - start).num_seconds(), 90);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        ///
        /// # Panics
        ///
        /// Panics if `by` exceeds the range chrono can represent.
        #[allow(clippy::expect_used)]
        pub fn advance(&self, by: std::time::Duration) {
            let by = chrono::Duration::from_std(by).expect("advance should fit in a chrono duration");
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to a specific time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use marquee_core::{FetchResult, FetchState, TransportError};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    /// Any lifecycle state.
    pub fn fetch_state() -> impl Strategy<Value = FetchState> {
        prop_oneof![
            Just(FetchState::Pending),
            Just(FetchState::Success),
            Just(FetchState::Error),
        ]
    }

    /// A transport error: HTTP 4xx/5xx or a network failure.
    pub fn transport_error() -> impl Strategy<Value = TransportError> {
        prop_oneof![
            (400u16..600).prop_map(|status| TransportError::http(status, "", format!("/status/{status}"), None)),
            "[a-z ]{1,20}".prop_map(|message| TransportError::network("/network", message)),
        ]
    }

    /// A small JSON payload.
    pub fn payload() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z ]{0,12}".prop_map(Value::from),
            (any::<u32>(), "[a-z]{1,8}").prop_map(|(id, name)| json!({ "id": id, "name": name })),
        ]
    }

    /// A fetch result in any state, with or without stale data.
    pub fn fetch_result() -> impl Strategy<Value = FetchResult<Value>> {
        prop_oneof![
            proptest::option::of(payload()).prop_map(|stale| FetchResult::Pending { stale }),
            payload().prop_map(FetchResult::Success),
            (transport_error(), proptest::option::of(payload()))
                .prop_map(|(error, stale)| FetchResult::Error { error, stale }),
        ]
    }

    /// Between one and `max` fetch results.
    pub fn fetch_results(max: usize) -> impl Strategy<Value = Vec<FetchResult<Value>>> {
        proptest::collection::vec(fetch_result(), 1..=max.max(1))
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything. The
/// filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init_test_tracing() {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        // Another crate's tests may already have installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// Re-export commonly used items
pub use boundary_test::{BoundaryTest, assertions};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use repository_mocks::{Gate, ScriptedRepository, ScriptedResponse};
