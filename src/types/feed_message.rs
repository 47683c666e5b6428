use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Discovery { coins: Vec<Coin> },
    Price(PriceUpdate),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Coin {
    pub symbol: String,
    pub address: String,
    pub exchange: String,
    #[serde(default)]
    pub liquidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceUpdate {
    pub exchange: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub method: &'a str,
    pub symbol: &'a str,
}
