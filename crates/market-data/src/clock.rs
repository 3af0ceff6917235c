//! Time sources and delay primitives.
//!
//! The rate limiter and result cache read time through [`Clock`]; the
//! orchestrator waits through [`Sleeper`]. Production wiring uses
//! [`SystemClock`] and [`TokioSleeper`]. [`ManualClock`] implements both and
//! only moves when told to (or when something "sleeps" on it), which keeps
//! backoff and expiry tests free of real delays.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Asynchronous delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// Deterministic clock for tests and simulations.
///
/// `sleep` returns immediately after advancing the clock by the requested
/// duration and recording it.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState {
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Total time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }
}

#[async_trait]
impl Sleeper for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_only_on_request() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - start, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_manual_sleep_records_and_advances() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(250)).await;
        clock.sleep(Duration::from_millis(500)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(250), Duration::from_millis(500)]
        );
        assert_eq!(clock.elapsed(), Duration::from_millis(750));
    }
}
