//! Provider clients.
//!
//! A [`ProviderClient`] bundles the cache, rate budget, retry policy and
//! coalescing registry for one upstream provider. Each client owns its state;
//! nothing here is global.

mod config;
mod provider_client;
mod request_key;

pub use config::{EndpointPolicy, ProviderConfig, ResolvedPolicy};
pub use provider_client::{Fetched, Freshness, ProviderClient};
pub use request_key::RequestKey;
