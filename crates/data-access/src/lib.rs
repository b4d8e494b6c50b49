//! StockBro Data Access Crate
//!
//! This crate sits between the application and its rate-limited upstream
//! providers (market data and news). It serves fresh data when possible,
//! serves stale data rather than fail, issues at most one upstream call per
//! key at a time, and retries transient failures with backoff.
//!
//! # Architecture
//!
//! ```text
//!                          +------------------+
//!                          |  fetch(key)      |  (collaborators)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    TtlCache      |  fresh hit -> return
//!                          +------------------+
//!                                  | miss / stale
//!                                  v
//!                          +------------------+
//!                          | RequestCoalescer |  one leader per key
//!                          +------------------+
//!                                  | leader
//!                                  v
//!                          +------------------+
//!                          |   RateBudget     |  denied -> stale or RateLimited
//!                          +------------------+
//!                                  | allowed
//!                                  v
//!                          +------------------+
//!                          |  RetryExecutor   |  backoff on transient errors
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    Upstream      |  (Finnhub, NewsData)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`ProviderClient`] - Cache, budget, retries and coalescing for one provider
//! - [`ProviderConfig`] - TTLs, retry policy and quota windows for one provider
//! - [`DataError`] - What `fetch` surfaces once every fallback is exhausted
//! - [`Clock`] - Time source; [`ManualClock`] drives tests deterministically
//! - [`DataServices`] - The market data and news clients built from [`Settings`]

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod errors;
pub mod provider;
pub mod resilience;
pub mod services;

pub use cache::{CacheEntry, CacheLookup, TtlCache};
pub use client::{EndpointPolicy, Fetched, Freshness, ProviderClient, ProviderConfig, RequestKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Settings, SettingsError};
pub use errors::{DataError, RetryClass, UpstreamError};
pub use provider::finnhub::FinnhubUpstream;
pub use provider::newsdata::NewsDataUpstream;
pub use provider::{upstream_fn, Payload, Upstream};
pub use resilience::{
    RateBudget, RateDecision, RateWindowSpec, RateWindowStatus, RequestCoalescer, RetryError,
    RetryExecutor, RetryPolicy,
};
pub use services::{DataServices, MarketDataClient, NewsClient};
