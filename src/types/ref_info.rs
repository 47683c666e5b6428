use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefInfo {
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub earn_balance: EarnBalance,
    #[serde(default)]
    pub unclaimed_earn: EarnBalance,
    #[serde(default)]
    pub claimed_earn: EarnBalance,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EarnBalance {
    #[serde(default)]
    pub sol: f64,
    #[serde(default)]
    pub usd: f64,
}
