//! Production implementation of MockerContext using Tokio.

use crate::MockerContext;
use async_trait::async_trait;
use rand::{Rng, RngCore};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by Tokio and thread-local entropy.
///
/// Time comes from the system clock, randomness from `thread_rng`.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MockerContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn next_u64(&self) -> u64 {
        rand::thread_rng().next_u64()
    }

    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}
