//! In-memory response cache.

mod ttl_cache;

pub use ttl_cache::{CacheEntry, CacheLookup, TtlCache};
