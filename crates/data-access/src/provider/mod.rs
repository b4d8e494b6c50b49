//! Upstream provider integrations.
//!
//! This module contains:
//! - The `Upstream` trait every provider implements
//! - Shared HTTP status and transport classification
//! - Concrete upstreams for market data (Finnhub) and news (NewsData.io)
//!
//! Upstreams perform exactly one HTTP call per invocation. Caching, budgeting,
//! retries and coalescing are layered on top by
//! [`ProviderClient`](crate::client::ProviderClient).

mod http;
mod traits;

pub mod finnhub;
pub mod newsdata;

use std::sync::Arc;

pub use http::{classify_status, classify_transport};
pub use traits::{upstream_fn, FnUpstream, Upstream};

/// Response body as returned by a provider. Shared so cache hits and
/// coalesced callers never deep-copy it.
pub type Payload = Arc<serde_json::Value>;
