//! Typed entry points over the two provider clients.
//!
//! Collaborators (route handlers, agent tools) use these instead of composing
//! request keys by hand. Every call goes through [`ProviderClient::fetch_detailed`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::client::{Fetched, ProviderClient, RequestKey};
use crate::clock::Clock;
use crate::config::{Settings, SettingsError};
use crate::errors::{DataError, UpstreamError};
use crate::provider::finnhub::FinnhubUpstream;
use crate::provider::newsdata::NewsDataUpstream;
use crate::provider::Payload;

pub type PayloadClient = ProviderClient<Payload>;

/// Quotes, company profiles and daily candles.
#[derive(Clone)]
pub struct MarketDataClient {
    inner: Arc<PayloadClient>,
}

impl MarketDataClient {
    pub fn new(inner: Arc<PayloadClient>) -> Self {
        Self { inner }
    }

    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self, SettingsError> {
        let upstream = FinnhubUpstream::with_options(
            settings.require_finnhub_key()?,
            settings.finnhub_base_url.clone(),
            settings.http_timeout,
        );
        let client = ProviderClient::<Payload>::new(settings.market.clone(), Arc::new(upstream), clock);
        Ok(Self::new(Arc::new(client)))
    }

    pub async fn quote(&self, symbol: &str) -> Result<Fetched<Payload>, DataError> {
        self.fetch("quote", normalize_symbol(symbol)).await
    }

    pub async fn profile(&self, symbol: &str) -> Result<Fetched<Payload>, DataError> {
        self.fetch("profile", normalize_symbol(symbol)).await
    }

    /// Daily candles covering the last `days` days.
    pub async fn candles(&self, symbol: &str, days: u32) -> Result<Fetched<Payload>, DataError> {
        self.fetch("candles", format!("{}:{}", days, normalize_symbol(symbol)))
            .await
    }

    pub fn client(&self) -> &Arc<PayloadClient> {
        &self.inner
    }

    async fn fetch(&self, endpoint: &str, argument: String) -> Result<Fetched<Payload>, DataError> {
        let key = RequestKey::new(endpoint, argument);
        self.inner.fetch_detailed(&key.to_string()).await
    }
}

/// Search results and category headlines.
#[derive(Clone)]
pub struct NewsClient {
    inner: Arc<PayloadClient>,
}

impl NewsClient {
    pub fn new(inner: Arc<PayloadClient>) -> Self {
        Self { inner }
    }

    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self, SettingsError> {
        let upstream = NewsDataUpstream::with_options(
            settings.require_newsdata_key()?,
            settings.newsdata_base_url.clone(),
            settings.news_country.clone(),
            settings.news_language.clone(),
            settings.http_timeout,
        );
        let client = ProviderClient::<Payload>::new(settings.news.clone(), Arc::new(upstream), clock);
        Ok(Self::new(Arc::new(client)))
    }

    pub async fn search(&self, query: &str) -> Result<Fetched<Payload>, DataError> {
        let key = RequestKey::new("search", query);
        self.inner.fetch_detailed(&key.to_string()).await
    }

    pub async fn headlines(&self, category: &str) -> Result<Fetched<Payload>, DataError> {
        let key = RequestKey::new("headlines", category.trim().to_ascii_lowercase());
        self.inner.fetch_detailed(&key.to_string()).await
    }

    pub fn client(&self) -> &Arc<PayloadClient> {
        &self.inner
    }
}

/// Both clients, built once at startup and handed to collaborators.
#[derive(Clone)]
pub struct DataServices {
    pub market: MarketDataClient,
    pub news: NewsClient,
}

impl DataServices {
    pub fn from_settings(settings: &Settings, clock: Arc<dyn Clock>) -> Result<Self, SettingsError> {
        Ok(Self {
            market: MarketDataClient::from_settings(settings, Arc::clone(&clock))?,
            news: NewsClient::from_settings(settings, clock)?,
        })
    }

    /// Route a raw `endpoint:argument` key to the client that serves it.
    pub async fn fetch(&self, key: &str) -> Result<Fetched<Payload>, DataError> {
        match RequestKey::endpoint_of(key) {
            "quote" | "profile" | "candles" => self.market.client().fetch_detailed(key).await,
            "search" | "headlines" => self.news.client().fetch_detailed(key).await,
            other => Err(DataError::Fatal {
                provider: "stockbro".to_string(),
                cause: Arc::new(UpstreamError::InvalidRequest {
                    provider: "stockbro".to_string(),
                    message: format!("no provider serves endpoint '{}'", other),
                }),
            }),
        }
    }

    /// Start a background cache sweep for each client.
    pub fn spawn_sweepers(&self, every: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.market.client().spawn_sweeper(every),
            self.news.client().spawn_sweeper(every),
        ]
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
