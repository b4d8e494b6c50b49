//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stockbro_data_access::{
    ManualClock, ProviderClient, ProviderConfig, RateWindowSpec, Upstream, UpstreamError,
};

/// Upstream that replays scripted outcomes, then falls back to a default,
/// counting every invocation.
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Result<String, UpstreamError>>>,
    fallback: Box<dyn Fn(&str) -> Result<String, UpstreamError> + Send + Sync>,
    calls: AtomicU32,
    latency: Duration,
}

impl ScriptedUpstream {
    pub fn always_ok(value: &str) -> Self {
        let value = value.to_string();
        Self::with_fallback(move |_| Ok(value.clone()))
    }

    pub fn always_failing(error: fn() -> UpstreamError) -> Self {
        Self::with_fallback(move |_| Err(error()))
    }

    pub fn with_fallback(
        fallback: impl Fn(&str) -> Result<String, UpstreamError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Box::new(fallback),
            calls: AtomicU32::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Queue outcomes returned before the fallback kicks in.
    pub fn then(self, outcome: Result<String, UpstreamError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    /// Real-time delay per call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream<String> for ScriptedUpstream {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn call(&self, key: &str) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => (self.fallback)(key),
        }
    }
}

pub fn server_error() -> UpstreamError {
    UpstreamError::Server {
        provider: "SCRIPTED".to_string(),
        status: 503,
        message: "unavailable".to_string(),
    }
}

pub fn not_found() -> UpstreamError {
    UpstreamError::NotFound("quote:NOPE".to_string())
}

/// 60s fresh, 300s stale, 3 retries, no jitter, generous budget.
pub fn test_config() -> ProviderConfig {
    ProviderConfig {
        jitter_fraction: 0.0,
        rate_windows: vec![RateWindowSpec::per_hour(100)],
        ..ProviderConfig::default()
    }
}

pub fn client_with(
    config: ProviderConfig,
    upstream: &Arc<ScriptedUpstream>,
) -> (ProviderClient<String>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let client = ProviderClient::<String>::new(config, upstream.clone(), clock.clone());
    (client, clock)
}
