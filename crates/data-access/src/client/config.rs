//! Static per-provider configuration.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::SettingsError;
use crate::resilience::{RateWindowSpec, RetryPolicy};

use super::RequestKey;

/// Overrides applied to keys of one endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndpointPolicy {
    pub fresh_ttl: Option<Duration>,
    pub stale_window: Option<Duration>,
    pub max_retries: Option<u32>,
}

/// Effective policy for one key after endpoint overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPolicy {
    pub fresh_ttl: Duration,
    pub stale_window: Duration,
    pub retry: RetryPolicy,
}

/// Configuration owned by a single [`ProviderClient`](super::ProviderClient).
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    /// How long a fetched value is served without re-validation.
    pub fresh_ttl: Duration,
    /// How long past `fresh_ttl` a value may still be served as a fallback.
    pub stale_window: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
    pub max_backoff: Duration,
    /// Quota windows; every one must admit a call.
    pub rate_windows: Vec<RateWindowSpec>,
    /// Cache capacity; `None` leaves it unbounded.
    pub max_entries: Option<usize>,
    /// Per-endpoint overrides keyed by the endpoint part of the request key.
    pub endpoints: HashMap<String, EndpointPolicy>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            fresh_ttl: Duration::from_secs(60),
            stale_window: Duration::from_secs(300),
            max_retries: retry.max_retries,
            base_backoff: retry.base_backoff,
            backoff_multiplier: retry.backoff_multiplier,
            jitter_fraction: retry.jitter_fraction,
            max_backoff: retry.max_backoff,
            rate_windows: Vec::new(),
            max_entries: None,
            endpoints: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Quotes go stale quickly; profiles barely change during a day.
    pub fn market_data() -> Self {
        Self {
            rate_windows: vec![RateWindowSpec::per_hour(100), RateWindowSpec::per_day(500)],
            max_entries: Some(1000),
            ..Self::default()
        }
        .with_endpoint(
            "profile",
            EndpointPolicy {
                fresh_ttl: Some(Duration::from_secs(86_400)),
                ..EndpointPolicy::default()
            },
        )
        .with_endpoint(
            "candles",
            EndpointPolicy {
                fresh_ttl: Some(Duration::from_secs(3600)),
                ..EndpointPolicy::default()
            },
        )
    }

    /// News free tiers allow ~200 calls a day, so articles are cached longer.
    pub fn news() -> Self {
        Self {
            fresh_ttl: Duration::from_secs(600),
            stale_window: Duration::from_secs(3600),
            max_retries: 2,
            rate_windows: vec![RateWindowSpec::per_hour(30), RateWindowSpec::per_day(180)],
            max_entries: Some(100),
            ..Self::default()
        }
        .with_endpoint(
            "headlines",
            EndpointPolicy {
                fresh_ttl: Some(Duration::from_secs(900)),
                ..EndpointPolicy::default()
            },
        )
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>, policy: EndpointPolicy) -> Self {
        self.endpoints.insert(endpoint.into(), policy);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: self.base_backoff,
            backoff_multiplier: self.backoff_multiplier,
            jitter_fraction: self.jitter_fraction,
            max_backoff: self.max_backoff,
        }
    }

    /// Apply the endpoint override matching `key`, if any.
    pub fn policy_for(&self, key: &str) -> ResolvedPolicy {
        let mut retry = self.retry_policy();
        let overrides = self.endpoints.get(RequestKey::endpoint_of(key));

        let Some(overrides) = overrides else {
            return ResolvedPolicy {
                fresh_ttl: self.fresh_ttl,
                stale_window: self.stale_window,
                retry,
            };
        };

        if let Some(max_retries) = overrides.max_retries {
            retry.max_retries = max_retries;
        }
        ResolvedPolicy {
            fresh_ttl: overrides.fresh_ttl.unwrap_or(self.fresh_ttl),
            stale_window: overrides.stale_window.unwrap_or(self.stale_window),
            retry,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.fresh_ttl.is_zero() {
            return Err(SettingsError::InvalidValue {
                name: "fresh_ttl".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(SettingsError::InvalidValue {
                name: "jitter_fraction".to_string(),
                message: format!("{} is outside [0, 1]", self.jitter_fraction),
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(SettingsError::InvalidValue {
                name: "backoff_multiplier".to_string(),
                message: format!("{} must be >= 1", self.backoff_multiplier),
            });
        }
        if let Some(window) = self.rate_windows.iter().find(|w| w.duration.is_zero()) {
            return Err(SettingsError::InvalidValue {
                name: format!("rate_windows.{}", window.name),
                message: "window duration must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
