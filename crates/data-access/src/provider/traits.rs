//! Upstream call abstraction.
//!
//! This module defines the `Upstream` trait that every provider integration
//! implements. The client wraps it with caching, rate budgeting, retries and
//! coalescing; the upstream itself performs exactly one call per invocation.

use std::future::Future;

use async_trait::async_trait;

use crate::errors::UpstreamError;

/// A single provider endpoint family.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use stockbro_data_access::provider::Upstream;
///
/// struct EchoUpstream;
///
/// #[async_trait]
/// impl Upstream<String> for EchoUpstream {
///     fn id(&self) -> &'static str {
///         "ECHO"
///     }
///
///     async fn call(&self, key: &str) -> Result<String, UpstreamError> {
///         Ok(key.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Upstream<V>: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "FINNHUB" or "NEWSDATA".
    /// Used for logging and error reporting.
    fn id(&self) -> &'static str;

    /// Perform one call for `key`. Must not retry internally.
    async fn call(&self, key: &str) -> Result<V, UpstreamError>;
}

/// [`Upstream`] backed by an async closure, for collaborators that already
/// have a call function at hand.
pub struct FnUpstream<F> {
    id: &'static str,
    call: F,
}

/// Wrap `call` as an [`Upstream`] named `id`.
pub fn upstream_fn<F>(id: &'static str, call: F) -> FnUpstream<F> {
    FnUpstream { id, call }
}

#[async_trait]
impl<V, F, Fut> Upstream<V> for FnUpstream<F>
where
    V: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, UpstreamError>> + Send,
{
    fn id(&self) -> &'static str {
        self.id
    }

    async fn call(&self, key: &str) -> Result<V, UpstreamError> {
        (self.call)(key.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upstream_fn_forwards_key() {
        let upstream = upstream_fn("ECHO", |key: String| async move {
            if key == "quote:BAD" {
                Err(UpstreamError::NotFound(key))
            } else {
                Ok(key.len())
            }
        });
        let upstream: &dyn Upstream<usize> = &upstream;

        assert_eq!(upstream.id(), "ECHO");
        assert_eq!(upstream.call("quote:AAPL").await.unwrap(), 10);
        assert!(matches!(
            upstream.call("quote:BAD").await,
            Err(UpstreamError::NotFound(_))
        ));
    }
}
