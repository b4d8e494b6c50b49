//! Error types and retry classification for the data-access crate.
//!
//! This module provides:
//! - [`UpstreamError`]: what a single provider call can fail with
//! - [`RetryClass`]: classification for determining retry behavior
//! - [`DataError`]: what `fetch` surfaces to collaborators

mod retry;

pub use retry::RetryClass;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by one upstream call.
///
/// Each variant is classified into a [`RetryClass`] via
/// [`retry_class`](Self::retry_class), which the retry executor uses to decide
/// between aborting and backing off.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The provider does not know the requested key.
    /// This is a terminal error - retrying won't help.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request itself is malformed (bad key format, unsupported endpoint, 4xx).
    #[error("Invalid request to {provider}: {message}")]
    InvalidRequest {
        /// The provider that rejected the request
        provider: String,
        /// Why the request was rejected
        message: String,
    },

    /// The API key was missing or refused (HTTP 401).
    #[error("Unauthorized: {provider}")]
    Unauthorized {
        /// The provider that refused the credentials
        provider: String,
    },

    /// The provider answered but the body could not be decoded.
    #[error("Failed to decode response from {provider}: {message}")]
    Decode {
        /// The provider that sent the payload
        provider: String,
        /// The decoder error
        message: String,
    },

    /// The provider throttled the request (HTTP 429 or quota response).
    /// Should retry with exponential backoff.
    #[error("Rate limited by provider: {provider}")]
    RateLimited {
        /// The provider that throttled the request
        provider: String,
    },

    /// The request timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The connection could not be established or was reset.
    #[error("Connection error: {provider} - {message}")]
    Connection {
        /// The provider we tried to reach
        provider: String,
        /// Transport error message
        message: String,
    },

    /// The provider failed with a 5xx status.
    #[error("Server error: {provider} - HTTP {status}: {message}")]
    Server {
        /// The provider that failed
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// A transport error not mapped to a more specific variant.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl UpstreamError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use stockbro_data_access::errors::{RetryClass, UpstreamError};
    ///
    /// let error = UpstreamError::RateLimited { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = UpstreamError::NotFound("quote:INVALID".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Terminal errors - never retry
            Self::NotFound(_)
            | Self::InvalidRequest { .. }
            | Self::Unauthorized { .. }
            | Self::Decode { .. } => RetryClass::Never,

            // Transient errors - retry with backoff
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::Server { .. } => RetryClass::WithBackoff,

            Self::Network(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
                    RetryClass::WithBackoff
                } else {
                    RetryClass::Never
                }
            }
        }
    }
}

/// Error surfaced by `fetch` once both the live call and the stale fallback
/// have failed.
///
/// Causes are shared behind an [`Arc`] so a single outcome can be handed to
/// every caller that was coalesced onto the same upstream call.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    /// The local rate budget is exhausted and nothing usable is cached.
    /// No upstream call was made.
    #[error("Rate limited: {provider}, retry after {retry_after:?}")]
    RateLimited {
        /// The provider whose budget is exhausted
        provider: String,
        /// Time until the budget admits calls again
        retry_after: Duration,
    },

    /// Transient upstream failures exhausted every retry.
    #[error("Upstream unavailable: {provider} after {attempts} attempts")]
    UpstreamUnavailable {
        /// The provider that kept failing
        provider: String,
        /// Number of upstream invocations made
        attempts: u32,
        /// The last error observed
        #[source]
        cause: Arc<UpstreamError>,
    },

    /// The request can never succeed (bad key, 4xx, undecodable payload).
    #[error("Fatal error from {provider}")]
    Fatal {
        /// The provider that rejected the request
        provider: String,
        /// The classified-fatal error
        #[source]
        cause: Arc<UpstreamError>,
    },
}

impl DataError {
    /// Soft failures are eligible for a "data temporarily unavailable" fallback
    /// message; hard failures (bad symbol) should be surfaced as-is.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::UpstreamUnavailable { .. }
        )
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider, .. }
            | Self::UpstreamUnavailable { provider, .. }
            | Self::Fatal { provider, .. } => provider,
        }
    }
}
