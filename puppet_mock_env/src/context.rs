//! Core environment context trait for the mocker.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the mocker can run
/// against both a production clock and a deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `thread_rng`
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every method that would normally introduce non-determinism
/// (time, randomness) is controlled by the implementation.
#[async_trait]
pub trait MockerContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for message timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: waits until the virtual clock is advanced past the deadline
    async fn sleep(&self, duration: Duration);

    /// Draws the next 64 random bits.
    fn next_u64(&self) -> u64;

    /// Draws a uniform float in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;

    /// Milliseconds since the Unix epoch according to `system_time()`.
    fn timestamp_ms(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Uniform index in `0..len`.
    ///
    /// `len` must be non-zero; a zero length yields 0.
    fn random_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let index = (self.next_f64() * len as f64) as usize;
        index.min(len - 1)
    }

    /// Returns true with probability `p`.
    fn chance(&self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Fills a 16-byte buffer, used to build random identifiers.
    fn random_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&self.next_u64().to_le_bytes());
        bytes[8..16].copy_from_slice(&self.next_u64().to_le_bytes());
        bytes
    }
}
