use std::fmt;

/// Cache / coalescing key of the form `endpoint:argument`.
///
/// The endpoint selects the per-endpoint policy; the argument is opaque to the
/// client and interpreted only by the upstream (`quote:AAPL`,
/// `search:reliance industries`, `candles:30:AAPL`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    endpoint: String,
    argument: String,
}

impl RequestKey {
    pub fn new(endpoint: impl Into<String>, argument: impl AsRef<str>) -> Self {
        Self {
            endpoint: endpoint.into(),
            argument: argument.as_ref().trim().to_string(),
        }
    }

    /// Split a key at its first `:`. Returns `None` when there is no separator
    /// or either half is empty.
    pub fn parse(key: &str) -> Option<Self> {
        let (endpoint, argument) = key.split_once(':')?;
        let argument = argument.trim();
        if endpoint.is_empty() || argument.is_empty() {
            return None;
        }
        Some(Self::new(endpoint, argument))
    }

    /// Endpoint part of a raw key; a key without `:` is its own endpoint.
    pub fn endpoint_of(key: &str) -> &str {
        key.split_once(':').map_or(key, |(endpoint, _)| endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.argument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_at_first_colon() {
        let key = RequestKey::parse("quote:BINANCE:BTCUSDT").unwrap();
        assert_eq!(key.endpoint(), "quote");
        assert_eq!(key.argument(), "BINANCE:BTCUSDT");
        assert_eq!(key.to_string(), "quote:BINANCE:BTCUSDT");
    }

    #[test]
    fn test_parse_rejects_incomplete_keys() {
        assert!(RequestKey::parse("quote").is_none());
        assert!(RequestKey::parse("quote:").is_none());
        assert!(RequestKey::parse(":AAPL").is_none());
        assert!(RequestKey::parse("quote:   ").is_none());
    }

    #[test]
    fn test_argument_is_trimmed() {
        let key = RequestKey::new("search", "  reliance industries ");
        assert_eq!(key.to_string(), "search:reliance industries");
    }

    #[test]
    fn test_endpoint_of() {
        assert_eq!(RequestKey::endpoint_of("headlines:business"), "headlines");
        assert_eq!(RequestKey::endpoint_of("plain"), "plain");
    }
}
