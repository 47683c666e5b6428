use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuoteRequest {
    pub address: String,
    pub amount: BigDecimal,
    pub address_from: Option<String>,
    pub wallet_address: Option<String>,
    pub referral: Option<String>,
}

impl SwapQuoteRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("address", self.address.to_owned()),
            ("amount", self.amount.to_string()),
        ];

        if let Some(address_from) = &self.address_from {
            pairs.push(("addressFrom", address_from.to_owned()));
        }
        if let Some(wallet_address) = &self.wallet_address {
            pairs.push(("walletAddress", wallet_address.to_owned()));
        }
        if let Some(referral) = &self.referral {
            pairs.push(("ref", referral.to_owned()));
        }

        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuoteResponse {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSubmitRequest {
    pub txn: String,
    pub request_id: String,
}
