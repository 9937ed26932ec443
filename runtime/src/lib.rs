//! # Waitlist Runtime
//!
//! Runtime implementation for the reducer architecture.
//!
//! This crate provides the `Store` that coordinates reducer execution and
//! effect handling for one unit of work.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, runs the reducer and executes the effects it returns
//! - **Event Loop**: action → reducer → effects → action, until no action is left
//! - **Retry**: Exponential backoff with jitter for effects that retry
//! - **Metrics**: Prometheus exporter wiring and runtime counters
//!
//! ## Example
//!
//! ```ignore
//! use waitlist_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Runs the action and every action its effects feed back
//! store.send(Action::DoSomething).await?;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use waitlist_core::{effect::Effect, reducer::Reducer};

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use error::StoreError;
pub use retry::RetryPolicy;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// The reducer kept producing follow-up actions past the configured limit
        ///
        /// This almost always means two actions feed each other forever.
        #[error("Action feedback limit of {0} exceeded")]
        FeedbackLimitExceeded(usize),
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{Arc, Effect, Reducer, RwLock, StoreError, VecDeque};

    /// Default cap on actions processed by a single `send`.
    pub const DEFAULT_ACTION_LIMIT: usize = 256;

    /// The Store - runtime coordinator for a reducer
    ///
    /// `send` drives the feedback loop to completion before returning, so
    /// once it resolves the state reflects every step the action triggered.
    /// Effects of one action run in order, one at a time; an action fed back
    /// by an effect is reduced only after all effects of the current action
    /// have finished.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer type
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        action_limit: usize,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync,
        A: Send + 'static,
        S: Send + Sync,
        E: Send + Sync,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                action_limit: DEFAULT_ACTION_LIMIT,
            }
        }

        /// Override the maximum number of actions a single `send` may process
        #[must_use]
        pub const fn with_action_limit(mut self, limit: usize) -> Self {
            self.action_limit = limit;
            self
        }

        /// Send an action to the store and run the resulting feedback loop
        ///
        /// Returns the number of actions reduced, including the initial one.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::FeedbackLimitExceeded`] if more than the
        /// configured number of actions are produced.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<usize, StoreError> {
            let mut queue = VecDeque::from([action]);
            let mut processed = 0usize;

            while let Some(action) = queue.pop_front() {
                processed += 1;
                if processed > self.action_limit {
                    tracing::error!(limit = self.action_limit, "Action feedback limit exceeded");
                    return Err(StoreError::FeedbackLimitExceeded(self.action_limit));
                }

                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut state, action, &self.environment)
                };
                metrics::counter!("store_actions_total").increment(1);

                self.execute_effects(effects, &mut queue).await;
            }

            Ok(processed)
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        async fn execute_effects<I>(&self, effects: I, queue: &mut VecDeque<A>)
        where
            I: IntoIterator<Item = Effect<A>>,
        {
            // Effects run in the order the reducer returned them
            for effect in effects {
                match effect {
                    Effect::None => {},
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store_effects_total", "type" => "delay").increment(1);
                        tokio::time::sleep(duration).await;
                        queue.push_back(*action);
                    },
                    Effect::Future(future) => {
                        metrics::counter!("store_effects_total", "type" => "future").increment(1);
                        if let Some(next) = future.await {
                            queue.push_back(next);
                        }
                    },
                }
            }
        }
    }
}
