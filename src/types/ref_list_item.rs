use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefListItem {
    pub ref_id: String,
    pub registered_at: Timestamp,
    #[serde(default)]
    pub ref_balance_usd: Option<f64>,
    #[serde(default)]
    pub earn_senders: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub top_balance_share_usd: Option<f64>,
}

/// Registration time as sent by the backend: RFC 3339 text or epoch millis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, Error> {
        match self {
            Timestamp::Millis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms)
                .ok_or_else(|| {
                    Error::InvalidOption {
                        option: format!("timestamp {}", ms),
                    }
                }),
            Timestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::InvalidOption {
                    option: format!("timestamp '{}': {}", text, e),
                }),
        }
    }
}
