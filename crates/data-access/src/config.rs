//! Environment-driven settings for the concrete providers.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::client::ProviderConfig;
use crate::resilience::RateWindowSpec;

pub const DEFAULT_FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
pub const DEFAULT_NEWSDATA_BASE_URL: &str = "https://newsdata.io/api/1/latest";

/// Errors raised while reading or validating settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A provider API key is required but was not configured.
    #[error("Missing setting: {name}")]
    MissingKey { name: String },

    /// A setting is present but cannot be used.
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub finnhub_api_key: Option<String>,
    pub newsdata_api_key: Option<String>,
    pub finnhub_base_url: String,
    pub newsdata_base_url: String,
    /// Country filter sent with every news request.
    pub news_country: String,
    pub news_language: String,
    pub http_timeout: Duration,
    pub market: ProviderConfig,
    pub news: ProviderConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            finnhub_api_key: None,
            newsdata_api_key: None,
            finnhub_base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
            newsdata_base_url: DEFAULT_NEWSDATA_BASE_URL.to_string(),
            news_country: "in".to_string(),
            news_language: "en".to_string(),
            http_timeout: Duration::from_secs(15),
            market: ProviderConfig::market_data(),
            news: ProviderConfig::news(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut settings = Self {
            finnhub_api_key: get("FINNHUB_API_KEY"),
            newsdata_api_key: get("NEWSDATA_API_KEY"),
            ..Self::default()
        };
        if let Some(url) = get("FINNHUB_BASE_URL") {
            settings.finnhub_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = get("NEWSDATA_BASE_URL") {
            settings.newsdata_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(country) = get("NEWSDATA_COUNTRY") {
            settings.news_country = country;
        }
        if let Some(language) = get("NEWSDATA_LANGUAGE") {
            settings.news_language = language;
        }
        if let Some(ms) = parse_var::<u64>(&get, "STOCKBRO_HTTP_TIMEOUT_MS")? {
            settings.http_timeout = Duration::from_millis(ms);
        }

        apply_overrides(&mut settings.market, "STOCKBRO_MARKET", &get)?;
        apply_overrides(&mut settings.news, "STOCKBRO_NEWS", &get)?;

        settings.market.validate()?;
        settings.news.validate()?;
        Ok(settings)
    }

    pub fn require_finnhub_key(&self) -> Result<&str, SettingsError> {
        self.finnhub_api_key
            .as_deref()
            .ok_or_else(|| SettingsError::MissingKey {
                name: "FINNHUB_API_KEY".to_string(),
            })
    }

    pub fn require_newsdata_key(&self) -> Result<&str, SettingsError> {
        self.newsdata_api_key
            .as_deref()
            .ok_or_else(|| SettingsError::MissingKey {
                name: "NEWSDATA_API_KEY".to_string(),
            })
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| SettingsError::InvalidValue {
                name: name.to_string(),
                message: format!("'{}': {}", raw, e),
            })
        })
        .transpose()
}

fn apply_overrides(
    config: &mut ProviderConfig,
    prefix: &str,
    get: &impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(secs) = parse_var::<u64>(get, &format!("{prefix}_FRESH_TTL_SECS"))? {
        config.fresh_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = parse_var::<u64>(get, &format!("{prefix}_STALE_WINDOW_SECS"))? {
        config.stale_window = Duration::from_secs(secs);
    }
    if let Some(retries) = parse_var::<u32>(get, &format!("{prefix}_MAX_RETRIES"))? {
        config.max_retries = retries;
    }
    if let Some(limit) = parse_var::<u32>(get, &format!("{prefix}_HOURLY_LIMIT"))? {
        set_window(config, RateWindowSpec::per_hour(limit));
    }
    if let Some(limit) = parse_var::<u32>(get, &format!("{prefix}_DAILY_LIMIT"))? {
        set_window(config, RateWindowSpec::per_day(limit));
    }
    Ok(())
}

/// Replace the window with the same name, or add it.
fn set_window(config: &mut ProviderConfig, spec: RateWindowSpec) {
    match config.rate_windows.iter_mut().find(|w| w.name == spec.name) {
        Some(existing) => *existing = spec,
        None => config.rate_windows.push(spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();

        assert!(settings.finnhub_api_key.is_none());
        assert_eq!(settings.finnhub_base_url, DEFAULT_FINNHUB_BASE_URL);
        assert_eq!(settings.news_country, "in");
        assert_eq!(settings.news_language, "en");
        assert_eq!(settings.market, ProviderConfig::market_data());
        assert_eq!(settings.news, ProviderConfig::news());
        assert!(matches!(
            settings.require_finnhub_key(),
            Err(SettingsError::MissingKey { name }) if name == "FINNHUB_API_KEY"
        ));
    }

    #[test]
    fn test_reads_keys_and_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("FINNHUB_API_KEY", " fh-key "),
            ("NEWSDATA_API_KEY", ""),
            ("FINNHUB_BASE_URL", "http://localhost:9000/api/"),
            ("STOCKBRO_HTTP_TIMEOUT_MS", "2500"),
            ("STOCKBRO_MARKET_FRESH_TTL_SECS", "30"),
            ("STOCKBRO_MARKET_DAILY_LIMIT", "50"),
            ("STOCKBRO_NEWS_MAX_RETRIES", "0"),
            ("STOCKBRO_NEWS_STALE_WINDOW_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(settings.require_finnhub_key().unwrap(), "fh-key");
        assert!(settings.newsdata_api_key.is_none());
        assert_eq!(settings.finnhub_base_url, "http://localhost:9000/api");
        assert_eq!(settings.http_timeout, Duration::from_millis(2500));

        assert_eq!(settings.market.fresh_ttl, Duration::from_secs(30));
        let daily = settings
            .market
            .rate_windows
            .iter()
            .find(|w| w.name == "daily")
            .unwrap();
        assert_eq!(daily.limit, 50);
        assert_eq!(settings.market.rate_windows.len(), 2);

        assert_eq!(settings.news.max_retries, 0);
        assert_eq!(settings.news.stale_window, Duration::from_secs(120));
    }

    #[test]
    fn test_rejects_unparsable_numbers() {
        let result = Settings::from_lookup(lookup(&[("STOCKBRO_NEWS_HOURLY_LIMIT", "lots")]));
        assert!(matches!(
            result,
            Err(SettingsError::InvalidValue { name, .. }) if name == "STOCKBRO_NEWS_HOURLY_LIMIT"
        ));
    }

    #[test]
    fn test_rejects_zero_fresh_ttl() {
        let result = Settings::from_lookup(lookup(&[("STOCKBRO_MARKET_FRESH_TTL_SECS", "0")]));
        assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
    }
}
