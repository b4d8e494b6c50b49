//! Fixed-window quota tracking for a provider.
//!
//! A budget owns one or more windows (e.g. per-hour and per-day). A call is
//! admitted only if every window has room, and admission increments every
//! window under the same lock. Consumption is never refunded: providers bill
//! per HTTP call regardless of outcome.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;

use crate::clock::Clock;

/// Configuration for one quota window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateWindowSpec {
    /// Label used in logs and status reports ("hourly", "daily").
    pub name: String,
    /// Calls allowed per window.
    pub limit: u32,
    /// Window length.
    pub duration: Duration,
}

impl RateWindowSpec {
    pub fn new(name: impl Into<String>, limit: u32, duration: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            duration,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new("minute", limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new("hourly", limit, Duration::from_secs(3600))
    }

    pub fn per_day(limit: u32) -> Self {
        Self::new("daily", limit, Duration::from_secs(86_400))
    }
}

/// Live state of one window.
#[derive(Debug)]
struct RateWindow {
    name: String,
    window_start: Instant,
    window_duration: Duration,
    limit: u32,
    used: u32,
}

impl RateWindow {
    fn new(spec: &RateWindowSpec, now: Instant) -> Self {
        Self {
            name: spec.name.clone(),
            window_start: now,
            // A zero-length window would never roll over
            window_duration: spec.duration.max(Duration::from_millis(1)),
            limit: spec.limit,
            used: 0,
        }
    }

    /// Reset the counter if the window has elapsed.
    ///
    /// The start advances by whole window lengths so windows stay aligned to
    /// their original start rather than drifting with call times.
    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window_duration {
            return;
        }

        let into_period = elapsed.as_nanos() % self.window_duration.as_nanos();
        // Always below `elapsed`, so it only overflows u64 for centuries-long gaps
        self.window_start = match u64::try_from(into_period) {
            Ok(nanos) => now - Duration::from_nanos(nanos),
            Err(_) => now,
        };
        if self.used > 0 {
            debug!(
                "Rate budget: {} window reset ({}/{} used)",
                self.name, self.used, self.limit
            );
        }
        self.used = 0;
    }

    fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }

    fn resets_in(&self, now: Instant) -> Duration {
        (self.window_start + self.window_duration).saturating_duration_since(now)
    }
}

/// Outcome of [`RateBudget::try_acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// At least one window is exhausted.
    Denied {
        /// Time until every exhausted window has reset, i.e. the latest of
        /// their resets rather than the soonest.
        ///
        /// With a single exhausted window the two agree. With several (hourly
        /// and daily both spent) this is the daily reset: retrying after only
        /// the hourly reset would be denied again by the daily window.
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Snapshot of one window for monitoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindowStatus {
    pub name: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub resets_in: Duration,
}

/// Quota tracker over one or more windows.
pub struct RateBudget {
    name: String,
    windows: Mutex<Vec<RateWindow>>,
    clock: Arc<dyn Clock>,
}

impl RateBudget {
    /// Create a budget whose windows all start now.
    pub fn new(name: impl Into<String>, specs: &[RateWindowSpec], clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            windows: Mutex::new(specs.iter().map(|spec| RateWindow::new(spec, now)).collect()),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock the windows mutex, recovering from poison if necessary.
    ///
    /// Every critical section leaves the counters consistent, so a poisoned
    /// lock still holds usable state.
    fn lock_windows(&self) -> MutexGuard<'_, Vec<RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("Rate budget '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Check every window and, if all have room, consume one call from each.
    ///
    /// The check and the increment happen under one lock, so concurrent
    /// callers can never push `used` past `limit`.
    pub fn try_acquire(&self) -> RateDecision {
        let now = self.clock.now();
        let mut windows = self.lock_windows();

        for window in windows.iter_mut() {
            window.roll(now);
        }

        let retry_after = windows
            .iter()
            .filter(|w| w.is_exhausted())
            .map(|w| w.resets_in(now))
            .max();

        if let Some(retry_after) = retry_after {
            debug!(
                "Rate budget '{}': denied, retry after {:?}",
                self.name, retry_after
            );
            return RateDecision::Denied { retry_after };
        }

        for window in windows.iter_mut() {
            window.used += 1;
        }
        RateDecision::Allowed
    }

    /// Per-window usage, after rolling expired windows.
    pub fn status(&self) -> Vec<RateWindowStatus> {
        let now = self.clock.now();
        let mut windows = self.lock_windows();

        windows
            .iter_mut()
            .map(|window| {
                window.roll(now);
                RateWindowStatus {
                    name: window.name.clone(),
                    used: window.used,
                    limit: window.limit,
                    remaining: window.limit.saturating_sub(window.used),
                    resets_in: window.resets_in(now),
                }
            })
            .collect()
    }
}
