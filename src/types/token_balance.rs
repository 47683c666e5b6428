use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub ui_amount: f64,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub is_frozen: Option<bool>,
}

pub type Balances = HashMap<String, TokenBalance>;
