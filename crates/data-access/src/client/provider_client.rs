//! Cache + rate budget + retry + coalescing around one upstream.
//!
//! `fetch` serves, in order of preference:
//! 1. a fresh cached value (no budget, no coalescing)
//! 2. the result of a single coalesced upstream call
//! 3. a stale cached value when the call was denied by the budget or failed
//!    transiently
//!
//! and only then surfaces a [`DataError`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::cache::{CacheEntry, CacheLookup, TtlCache};
use crate::clock::Clock;
use crate::errors::DataError;
use crate::provider::Upstream;
use crate::resilience::{
    RateBudget, RateDecision, RateWindowStatus, RequestCoalescer, RetryError, RetryExecutor,
};

use super::ProviderConfig;

/// Whether a returned value is within its primary TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    /// Served from the stale window because the live call was not possible.
    Stale,
}

/// A value together with how old it is.
#[derive(Clone, Debug)]
pub struct Fetched<V> {
    pub value: V,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
}

impl<V: Clone> Fetched<V> {
    fn from_entry(entry: &CacheEntry<V>, freshness: Freshness) -> Self {
        Self {
            value: entry.value.clone(),
            freshness,
            fetched_at: entry.fetched_at_utc,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

type Outcome<V> = Result<Fetched<V>, DataError>;

/// State the detached refresh task needs after the caller has gone.
struct Shared<V> {
    provider: String,
    config: ProviderConfig,
    upstream: Arc<dyn Upstream<V>>,
    cache: TtlCache<V>,
    budget: Arc<RateBudget>,
    clock: Arc<dyn Clock>,
}

/// Resilient client for one provider.
pub struct ProviderClient<V> {
    shared: Arc<Shared<V>>,
    coalescer: RequestCoalescer<Outcome<V>>,
}

impl<V> ProviderClient<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a client with its own rate budget built from `config.rate_windows`.
    pub fn new(config: ProviderConfig, upstream: Arc<dyn Upstream<V>>, clock: Arc<dyn Clock>) -> Self {
        let budget = Arc::new(RateBudget::new(
            upstream.id(),
            &config.rate_windows,
            Arc::clone(&clock),
        ));
        Self::with_budget(config, upstream, budget, clock)
    }

    /// Create a client drawing from a budget shared with other clients of the
    /// same provider quota. `config.rate_windows` is ignored.
    pub fn with_budget(
        config: ProviderConfig,
        upstream: Arc<dyn Upstream<V>>,
        budget: Arc<RateBudget>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = match config.max_entries {
            Some(max_entries) => TtlCache::with_capacity_limit(Arc::clone(&clock), max_entries),
            None => TtlCache::new(Arc::clone(&clock)),
        };

        Self {
            shared: Arc::new(Shared {
                provider: upstream.id().to_string(),
                config,
                upstream,
                cache,
                budget,
                clock,
            }),
            coalescer: RequestCoalescer::new(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.shared.provider
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.shared.config
    }

    /// Fetch the value for `key`.
    pub async fn fetch(&self, key: &str) -> Result<V, DataError> {
        self.fetch_detailed(key).await.map(|fetched| fetched.value)
    }

    /// Fetch the value for `key`, reporting whether it is fresh or a stale
    /// fallback.
    ///
    /// The upstream call runs on its own task. A caller that stops waiting
    /// (timeout, cancellation) does not abort it; the result still lands in
    /// the cache and reaches every other caller waiting on the same key.
    pub async fn fetch_detailed(&self, key: &str) -> Result<Fetched<V>, DataError> {
        if let CacheLookup::Fresh(entry) = self.shared.cache.get(key) {
            debug!("{}: fresh cache hit for '{}'", self.shared.provider, key);
            return Ok(Fetched::from_entry(&entry, Freshness::Fresh));
        }

        let shared = Arc::clone(&self.shared);
        let owned_key = key.to_string();
        self.coalescer
            .dedupe(key, move || async move { shared.refresh(&owned_key).await })
            .await
    }

    /// Drop the cached entry for `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        self.shared.cache.invalidate(key)
    }

    /// Remove every entry past its stale window.
    pub fn purge_expired(&self) -> usize {
        self.shared.cache.purge_expired()
    }

    pub fn cached_entries(&self) -> usize {
        self.shared.cache.len()
    }

    pub fn budget_status(&self) -> Vec<RateWindowStatus> {
        self.shared.budget.status()
    }

    /// Keys with an upstream fetch currently in flight.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Periodically purge dead entries on the tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the client is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let client: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(client) = client.upgrade() else {
                    break;
                };
                let purged = client.purge_expired();
                if purged > 0 {
                    debug!("{}: swept {} dead cache entries", client.provider(), purged);
                }
            }
        })
    }
}

impl<V> Shared<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Leader path: budget check, retried upstream call, cache update, and
    /// stale fallback on failure.
    async fn refresh(&self, key: &str) -> Outcome<V> {
        // A previous leader may have stored a value since our cache check
        if let CacheLookup::Fresh(entry) = self.cache.get(key) {
            return Ok(Fetched::from_entry(&entry, Freshness::Fresh));
        }

        let policy = self.config.policy_for(key);

        let failure = match self.budget.try_acquire() {
            RateDecision::Denied { retry_after } => {
                info!(
                    "{}: rate budget exhausted, skipping upstream call for '{}'",
                    self.provider, key
                );
                DataError::RateLimited {
                    provider: self.provider.clone(),
                    retry_after,
                }
            }
            RateDecision::Allowed => {
                let executor = RetryExecutor::new(policy.retry, Arc::clone(&self.clock));
                let label = format!("{} '{}'", self.provider, key);

                match executor.execute(&label, || self.upstream.call(key)).await {
                    Ok(value) => {
                        let entry =
                            self.cache
                                .put(key, value, policy.fresh_ttl, policy.stale_window);
                        debug!("{}: refreshed '{}'", self.provider, key);
                        return Ok(Fetched::from_entry(&entry, Freshness::Fresh));
                    }
                    Err(RetryError::Fatal(cause)) => {
                        return Err(DataError::Fatal {
                            provider: self.provider.clone(),
                            cause: Arc::new(cause),
                        });
                    }
                    Err(RetryError::Exhausted { attempts, last }) => {
                        DataError::UpstreamUnavailable {
                            provider: self.provider.clone(),
                            attempts,
                            cause: Arc::new(last),
                        }
                    }
                }
            }
        };

        match self.cache.get(key) {
            CacheLookup::Stale(entry) => {
                warn!(
                    "{}: serving stale '{}' from {} ({})",
                    self.provider, key, entry.fetched_at_utc, failure
                );
                Ok(Fetched::from_entry(&entry, Freshness::Stale))
            }
            CacheLookup::Fresh(entry) => Ok(Fetched::from_entry(&entry, Freshness::Fresh)),
            CacheLookup::Miss => Err(failure),
        }
    }
}
