//! # Waitlist Testing
//!
//! Testing utilities for reducers and the code that drives them.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A Given-When-Then harness for reducers (`ReducerTest`)
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use waitlist_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(AdmissionReducer::new())
//!     .with_env(environment_with(test_clock()))
//!     .given_state(AdmissionState::default())
//!     .when_action(AdmissionAction::Submit { request })
//!     .then_state(|state| assert_eq!(state.phase, AdmissionPhase::Received))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use waitlist_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use waitlist_testing::mocks::FixedClock;
    /// use waitlist_core::environment::Clock;
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

    /// Clock whose time is moved explicitly by the test
    ///
    /// Useful when one scenario spans a date boundary, e.g. a request made
    /// before a release date and another made after it.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Jump to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            let mut guard = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = time;
        }

        /// Move forward by `delta`
        pub fn advance(&self, delta: chrono::Duration) {
            let mut guard = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Build a UTC instant from calendar parts, for readable test fixtures
    ///
    /// Out-of-range parts fall back to the Unix epoch.
    #[must_use]
    pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(utc(2025, 1, 1, 0))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, utc};
pub use reducer_test::{ReducerTest, assertions};
