//! NewsData.io news upstream.
//!
//! Supported request keys:
//! - `search:QUERY` for free-text search (`q=`)
//! - `headlines:CATEGORY` for top headlines in a category (`category=`)
//!
//! Every request is narrowed to the configured country and language.
//! The free plan allows roughly 200 requests a day.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::RequestKey;
use crate::config::DEFAULT_NEWSDATA_BASE_URL;
use crate::errors::UpstreamError;
use crate::provider::http::{decode, http_client, send};
use crate::provider::{Payload, Upstream};

pub const PROVIDER_ID: &str = "NEWSDATA";

/// News upstream backed by the NewsData.io `latest` endpoint.
pub struct NewsDataUpstream {
    client: Client,
    api_key: String,
    base_url: String,
    country: String,
    language: String,
}

impl NewsDataUpstream {
    /// Indian English-language news with a 15s request timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(
            api_key,
            DEFAULT_NEWSDATA_BASE_URL,
            "in",
            "en",
            Duration::from_secs(15),
        )
    }

    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        country: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.into(),
            base_url: base_url.into(),
            country: country.into(),
            language: language.into(),
        }
    }

    /// Query parameters for `key`, excluding the API key.
    fn params_for(&self, key: &str) -> Result<Vec<(&'static str, String)>, UpstreamError> {
        let request_key = RequestKey::parse(key).ok_or_else(|| invalid(format!("malformed key '{}'", key)))?;

        let filter = match request_key.endpoint() {
            "search" => ("q", request_key.argument().to_string()),
            "headlines" => ("category", request_key.argument().to_ascii_lowercase()),
            other => return Err(invalid(format!("unsupported endpoint '{}'", other))),
        };

        Ok(vec![
            filter,
            ("language", self.language.clone()),
            ("country", self.country.clone()),
        ])
    }

    /// NewsData reports some failures in a 200 body with `"status": "error"`.
    fn check_payload(body: &Value) -> Result<(), UpstreamError> {
        if body.get("status").and_then(Value::as_str) != Some("error") {
            return Ok(());
        }

        let code = body.pointer("/results/code").and_then(Value::as_str).unwrap_or_default();
        let message = body
            .pointer("/results/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        if code.eq_ignore_ascii_case("RateLimitExceeded") {
            return Err(UpstreamError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        Err(invalid(message))
    }
}

fn invalid(message: String) -> UpstreamError {
    UpstreamError::InvalidRequest {
        provider: PROVIDER_ID.to_string(),
        message,
    }
}

#[async_trait]
impl Upstream<Payload> for NewsDataUpstream {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn call(&self, key: &str) -> Result<Payload, UpstreamError> {
        let params = self.params_for(key)?;

        debug!("NewsData request for '{}'", key);

        let builder = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(&params);

        let body = send(PROVIDER_ID, key, builder).await?;
        let value = decode(PROVIDER_ID, &body)?;

        if let Err(e) = Self::check_payload(&value) {
            warn!("NewsData rejected '{}': {}", key, e);
            return Err(e);
        }
        Ok(Arc::new(value))
    }
}
