//! Simulation context implementing MockerContext for deterministic testing.

use crate::error::EnvError;
use crate::MockerContext;
use async_trait::async_trait;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `MockerContext` using:
/// - A virtual clock that can be advanced manually
/// - A seeded ChaCha8 RNG for entity generation and random picks
/// - Simulated sleep that waits for the clock to be advanced externally
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Deterministic RNG
    rng: Arc<Mutex<ChaCha8Rng>>,

    /// Wakes sleepers whenever the clock moves
    ticked: Arc<Notify>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            ticked: Arc::new(Notify::new()),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        {
            let mut time = self.clock();
            *time = time.saturating_add(duration.as_nanos() as u64);
        }
        self.ticked.notify_waiters();
    }

    /// Sets the virtual time to a specific value.
    ///
    /// The clock is monotonic: moving it backwards is rejected.
    pub fn set_time(&self, time_ns: u64) -> Result<(), EnvError> {
        {
            let mut time = self.clock();
            if time_ns < *time {
                return Err(EnvError::ClockRewind {
                    from_ns: *time,
                    to_ns: time_ns,
                });
            }
            *time = time_ns;
        }
        self.ticked.notify_waiters();
        Ok(())
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn rng(&self) -> MutexGuard<'_, ChaCha8Rng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
            ticked: Arc::clone(&self.ticked),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl MockerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    /// Waits until someone else moves the clock past `now + duration`.
    /// Never advances the clock itself.
    async fn sleep(&self, duration: Duration) {
        let deadline = self.time_ns().saturating_add(duration.as_nanos() as u64);
        loop {
            // Registered before the check so an advance in between is not lost
            let ticked = self.ticked.notified();
            if self.time_ns() >= deadline {
                return;
            }
            ticked.await;
        }
    }

    fn next_u64(&self) -> u64 {
        self.rng().next_u64()
    }

    fn next_f64(&self) -> f64 {
        self.rng().gen::<f64>()
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_sim_context_rejects_rewind() {
        let ctx = SimContext::new(42);
        ctx.set_time(1_000).unwrap();

        let err = ctx.set_time(10).unwrap_err();
        assert_eq!(err, EnvError::ClockRewind { from_ns: 1_000, to_ns: 10 });
        assert_eq!(ctx.time_ns(), 1_000);
    }

    #[test]
    fn test_sim_context_deterministic_random() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let a: Vec<u64> = (0..8).map(|_| ctx1.next_u64()).collect();
        let b: Vec<u64> = (0..8).map(|_| ctx2.next_u64()).collect();
        assert_eq!(a, b);

        let ctx3 = SimContext::new(43);
        let c: Vec<u64> = (0..8).map(|_| ctx3.next_u64()).collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_sim_context_timestamp_follows_virtual_clock() {
        let ctx = SimContext::new(1);
        let t0 = ctx.timestamp_ms();
        assert_eq!(t0, 1_704_067_200_000);

        ctx.advance_time(Duration::from_millis(250));
        assert_eq!(ctx.timestamp_ms(), t0 + 250);
    }

    #[tokio::test]
    async fn test_sim_context_sleep_waits_for_advance() {
        let ctx = SimContext::new(42);
        let sleeper = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.sleep(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sleeper.is_finished());
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(3));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sleeper.is_finished());

        ctx.set_time(Duration::from_secs(5).as_nanos() as u64).unwrap();
        tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("sleeper should wake once the deadline is reached")
            .unwrap();
        assert_eq!(ctx.now(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sim_context_zero_sleep_returns_immediately() {
        let ctx = SimContext::new(42);
        ctx.sleep(Duration::ZERO).await;
        assert_eq!(ctx.now(), Duration::ZERO);
    }

    #[test]
    fn test_sim_context_clone_shares_state() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx1.now(), ctx2.now());
        assert_eq!(ctx2.seed(), 42);
    }
}
