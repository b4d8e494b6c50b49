//! Finnhub market data upstream.
//!
//! Supported request keys:
//! - `quote:SYMBOL` via /quote
//! - `profile:SYMBOL` via /stock/profile2
//! - `candles:DAYS:SYMBOL` via /stock/candle (daily resolution)
//!
//! API documentation: https://finnhub.io/docs/api

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::RequestKey;
use crate::config::DEFAULT_FINNHUB_BASE_URL;
use crate::errors::UpstreamError;
use crate::provider::http::{decode, http_client, send};
use crate::provider::{Payload, Upstream};

pub const PROVIDER_ID: &str = "FINNHUB";

/// Longest candle history a single key may ask for.
const MAX_CANDLE_DAYS: u32 = 3650;

/// A resolved Finnhub call: path plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FinnhubRequest {
    endpoint: Endpoint,
    path: &'static str,
    params: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Quote,
    Profile,
    Candles,
}

/// Market data upstream backed by the Finnhub REST API.
pub struct FinnhubUpstream {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubUpstream {
    /// Create an upstream against the public API with a 30s request timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key, DEFAULT_FINNHUB_BASE_URL, Duration::from_secs(30))
    }

    pub fn with_options(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Translate a request key into a Finnhub call.
    fn request_for(key: &str, now: DateTime<Utc>) -> Result<FinnhubRequest, UpstreamError> {
        let request_key = RequestKey::parse(key).ok_or_else(|| invalid(format!("malformed key '{}'", key)))?;
        let argument = request_key.argument();

        match request_key.endpoint() {
            "quote" => Ok(FinnhubRequest {
                endpoint: Endpoint::Quote,
                path: "/quote",
                params: vec![("symbol", argument.to_string())],
            }),
            "profile" => Ok(FinnhubRequest {
                endpoint: Endpoint::Profile,
                path: "/stock/profile2",
                params: vec![("symbol", argument.to_string())],
            }),
            "candles" => {
                let (days, symbol) = argument
                    .split_once(':')
                    .ok_or_else(|| invalid(format!("candles key needs DAYS:SYMBOL, got '{}'", argument)))?;
                let days: u32 = days
                    .trim()
                    .parse()
                    .ok()
                    .filter(|d| (1..=MAX_CANDLE_DAYS).contains(d))
                    .ok_or_else(|| invalid(format!("invalid candle range '{}'", days)))?;
                let symbol = symbol.trim();
                if symbol.is_empty() {
                    return Err(invalid("candles key has no symbol".to_string()));
                }

                let to = now.timestamp();
                let from = to - i64::from(days) * 86_400;
                Ok(FinnhubRequest {
                    endpoint: Endpoint::Candles,
                    path: "/stock/candle",
                    params: vec![
                        ("symbol", symbol.to_string()),
                        ("resolution", "D".to_string()),
                        ("from", from.to_string()),
                        ("to", to.to_string()),
                    ],
                })
            }
            other => Err(invalid(format!("unsupported endpoint '{}'", other))),
        }
    }

    /// Reject bodies Finnhub returns with 200 for unknown symbols.
    fn check_payload(endpoint: Endpoint, key: &str, body: &Value) -> Result<(), UpstreamError> {
        let not_found = match endpoint {
            // Finnhub returns 0 for unknown symbols instead of an error
            Endpoint::Quote => {
                let price = |field: &str| body.get(field).and_then(Value::as_f64).unwrap_or(0.0);
                price("c") == 0.0 && price("o") == 0.0
            }
            Endpoint::Profile => body.as_object().map_or(true, |fields| fields.is_empty()),
            Endpoint::Candles => body.get("s").and_then(Value::as_str) == Some("no_data"),
        };

        if not_found {
            return Err(UpstreamError::NotFound(key.to_string()));
        }
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(invalid(error.to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> UpstreamError {
    UpstreamError::InvalidRequest {
        provider: PROVIDER_ID.to_string(),
        message,
    }
}

#[async_trait]
impl Upstream<Payload> for FinnhubUpstream {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn call(&self, key: &str) -> Result<Payload, UpstreamError> {
        let request = Self::request_for(key, Utc::now())?;
        let url = format!("{}{}", self.base_url, request.path);

        debug!("Finnhub request: {} with {} params", request.path, request.params.len());

        // API key as header rather than query param
        let builder = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(&request.params);

        let body = send(PROVIDER_ID, key, builder).await?;
        let value = decode(PROVIDER_ID, &body)?;

        if let Err(e) = Self::check_payload(request.endpoint, key, &value) {
            warn!("Finnhub returned no data for '{}': {}", key, e);
            return Err(e);
        }
        Ok(Arc::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RetryClass;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_provider_id() {
        let upstream = FinnhubUpstream::new("test_key");
        assert_eq!(upstream.id(), "FINNHUB");
    }

    #[test]
    fn test_quote_request() {
        let request = FinnhubUpstream::request_for("quote:AAPL", now()).unwrap();
        assert_eq!(request.path, "/quote");
        assert_eq!(request.params, vec![("symbol", "AAPL".to_string())]);
    }

    #[test]
    fn test_exchange_qualified_symbols_keep_their_colon() {
        let request = FinnhubUpstream::request_for("quote:BINANCE:BTCUSDT", now()).unwrap();
        assert_eq!(request.params[0].1, "BINANCE:BTCUSDT");

        let request = FinnhubUpstream::request_for("candles:7:OANDA:EUR_USD", now()).unwrap();
        assert_eq!(request.params[0].1, "OANDA:EUR_USD");
    }

    #[test]
    fn test_candles_request_covers_range() {
        let request = FinnhubUpstream::request_for("candles:30:AAPL", now()).unwrap();
        assert_eq!(request.path, "/stock/candle");

        let param = |name: &str| {
            request
                .params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        let from: i64 = param("from").parse().unwrap();
        let to: i64 = param("to").parse().unwrap();
        assert_eq!(to, now().timestamp());
        assert_eq!(to - from, 30 * 86_400);
        assert_eq!(param("resolution"), "D");
    }

    #[test]
    fn test_bad_keys_are_fatal() {
        for key in ["quote", "news:AAPL", "candles:AAPL", "candles:0:AAPL", "candles:abc:AAPL", "candles:5: "] {
            let err = FinnhubUpstream::request_for(key, now()).unwrap_err();
            assert_eq!(err.retry_class(), RetryClass::Never, "key {key}");
        }
    }

    #[test]
    fn test_zero_quote_is_not_found() {
        let body = json!({"c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0});
        assert!(matches!(
            FinnhubUpstream::check_payload(Endpoint::Quote, "quote:NOPE", &body),
            Err(UpstreamError::NotFound(_))
        ));

        let body = json!({"c": 189.98, "h": 190.5, "l": 188.1, "o": 189.0, "t": 1717430400});
        assert!(FinnhubUpstream::check_payload(Endpoint::Quote, "quote:AAPL", &body).is_ok());
    }

    #[test]
    fn test_empty_profile_and_no_data_candles_are_not_found() {
        assert!(matches!(
            FinnhubUpstream::check_payload(Endpoint::Profile, "profile:NOPE", &json!({})),
            Err(UpstreamError::NotFound(_))
        ));
        assert!(matches!(
            FinnhubUpstream::check_payload(Endpoint::Candles, "candles:5:NOPE", &json!({"s": "no_data"})),
            Err(UpstreamError::NotFound(_))
        ));
        assert!(FinnhubUpstream::check_payload(
            Endpoint::Candles,
            "candles:5:AAPL",
            &json!({"s": "ok", "c": [1.0], "t": [1717430400]})
        )
        .is_ok());
    }
}
