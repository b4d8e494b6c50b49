//! JSON report printed by the CLI.

use std::collections::BTreeMap;

use serde::Serialize;
use stockbro_data_access::{DataError, Fetched, Freshness, Payload, RateWindowStatus};

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub fetches: Vec<FetchReport>,
    pub budgets: BTreeMap<String, Vec<BudgetReport>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub round: u32,
    pub key: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    #[serde(rename_all = "camelCase")]
    Ok {
        /// `stale` when the value came from the stale window
        freshness: Freshness,
        fetched_at: String,
        data: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        kind: &'static str,
        provider: String,
        message: String,
        /// Whether a "data temporarily unavailable" message is appropriate
        soft: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
}

impl FetchReport {
    pub fn new(round: u32, key: &str, result: Result<Fetched<Payload>, DataError>) -> Self {
        let outcome = match result {
            Ok(fetched) => Outcome::Ok {
                freshness: fetched.freshness,
                fetched_at: fetched.fetched_at.to_rfc3339(),
                data: fetched.value.as_ref().clone(),
            },
            Err(error) => {
                let (kind, retry_after_secs) = match &error {
                    DataError::RateLimited { retry_after, .. } => {
                        ("rateLimited", Some(retry_after.as_secs()))
                    }
                    DataError::UpstreamUnavailable { .. } => ("upstreamUnavailable", None),
                    DataError::Fatal { .. } => ("fatal", None),
                };
                let message = match std::error::Error::source(&error) {
                    Some(cause) => format!("{}: {}", error, cause),
                    None => error.to_string(),
                };
                Outcome::Error {
                    kind,
                    provider: error.provider().to_string(),
                    message,
                    soft: error.is_soft(),
                    retry_after_secs,
                }
            }
        };

        Self {
            round,
            key: key.to_string(),
            outcome,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetReport {
    pub window: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub resets_in_secs: u64,
}

impl From<RateWindowStatus> for BudgetReport {
    fn from(status: RateWindowStatus) -> Self {
        Self {
            window: status.name,
            used: status.used,
            limit: status.limit,
            remaining: status.remaining,
            resets_in_secs: status.resets_in.as_secs(),
        }
    }
}
