//! HTTP plumbing shared by the concrete upstreams.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::errors::UpstreamError;

const MESSAGE_EXCERPT_CHARS: usize = 200;

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a non-success HTTP status to an [`UpstreamError`].
///
/// | Status            | Error            |
/// |-------------------|------------------|
/// | 429               | `RateLimited`    |
/// | 403 quota message | `RateLimited`    |
/// | 401, other 403    | `Unauthorized`   |
/// | 404               | `NotFound`       |
/// | other 4xx         | `InvalidRequest` |
/// | 5xx and the rest  | `Server`         |
pub fn classify_status(provider: &str, key: &str, status: StatusCode, body: &str) -> UpstreamError {
    let message = error_message(body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::FORBIDDEN if mentions_quota(&message) => UpstreamError::RateLimited {
            provider: provider.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Unauthorized {
            provider: provider.to_string(),
        },
        StatusCode::NOT_FOUND => UpstreamError::NotFound(key.to_string()),
        s if s.is_client_error() => UpstreamError::InvalidRequest {
            provider: provider.to_string(),
            message: format!("HTTP {} - {}", s.as_u16(), message),
        },
        s => UpstreamError::Server {
            provider: provider.to_string(),
            status: s.as_u16(),
            message,
        },
    }
}

/// Map a transport failure (nothing usable came back) to an [`UpstreamError`].
///
/// A body cut off mid-read (peer reset, `Content-Length` not met) surfaces
/// from reqwest as a body or decode error and is treated like a dropped
/// connection.
pub fn classify_transport(provider: &str, error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout {
            provider: provider.to_string(),
        }
    } else if error.is_connect() || error.is_body() || error.is_decode() {
        UpstreamError::Connection {
            provider: provider.to_string(),
            message: error.to_string(),
        }
    } else {
        UpstreamError::Network(error)
    }
}

/// Send `request` and return the body of a successful response.
pub(crate) async fn send(provider: &str, key: &str, request: RequestBuilder) -> Result<String, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(provider, e))?;

    let status = response.status();
    debug!("{} responded {} for '{}'", provider, status.as_u16(), key);

    let body = response
        .text()
        .await
        .map_err(|e| classify_transport(provider, e))?;

    if !status.is_success() {
        return Err(classify_status(provider, key, status, &body));
    }
    Ok(body)
}

pub(crate) fn decode(provider: &str, body: &str) -> Result<Value, UpstreamError> {
    serde_json::from_str(body).map_err(|e| UpstreamError::Decode {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// Best-effort error text: Finnhub's `{"error": ..}`, NewsData's
/// `{"results": {"message": ..}}`, or a body excerpt.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| value.pointer("/results/message").and_then(Value::as_str))
            .or_else(|| value.get("message").and_then(Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }
    body.chars().take(MESSAGE_EXCERPT_CHARS).collect()
}

fn mentions_quota(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("limit") || message.contains("quota")
}
