//! Resilience primitives composed by the provider clients.
//!
//! This module provides:
//! - Quota tracking across one or more fixed windows ([`RateBudget`])
//! - Bounded retries with jittered exponential backoff ([`RetryExecutor`])
//! - Per-key deduplication of concurrent fetches ([`RequestCoalescer`])

mod coalescer;
mod rate_budget;
mod retry_executor;

pub use coalescer::RequestCoalescer;
pub use rate_budget::{RateBudget, RateDecision, RateWindowSpec, RateWindowStatus};
pub use retry_executor::{RetryError, RetryExecutor, RetryPolicy};
