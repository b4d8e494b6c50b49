//! Injectable time source.
//!
//! Every expiry computation in the crate (cache freshness, rate windows) and
//! every backoff delay goes through a [`Clock`], so tests can drive time
//! explicitly with [`ManualClock`] instead of sleeping.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::warn;

/// Source of monotonic time, wall time and delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic "now", used for all expiry math.
    fn now(&self) -> Instant;

    /// Wall-clock "now", used only for reporting when data was fetched.
    fn wall_time(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests.
///
/// Time only moves when [`advance`](Self::advance) is called or when someone
/// sleeps on it: `sleep` returns immediately after moving time forward by the
/// requested amount and recording it.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.lock_offset();
        *offset += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.lock_offset()
    }

    /// Every delay requested through [`Clock::sleep`], in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_offset(&self) -> MutexGuard<'_, Duration> {
        self.offset.lock().unwrap_or_else(|poisoned| {
            warn!("Manual clock mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.lock_offset()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let offset = TimeDelta::from_std(*self.lock_offset()).unwrap_or(TimeDelta::zero());
        self.wall_origin + offset
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
        self.advance(duration);
    }
}
