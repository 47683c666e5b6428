use tracing::debug;

use crate::{
    error::Error,
    provider::BalanceApi,
    types::{Balances, TokenBalance},
};

/// Lists the native balance under the wrapped-native token address as well,
/// so both identifiers resolve to the same holding.
pub fn alias_native_balance(
    balances: &mut Balances,
    native_symbol: &str,
    wrapped_native_address: &str,
) {
    let native = balances.get(native_symbol).cloned();

    match native {
        Some(balance) => {
            balances.insert(wrapped_native_address.to_owned(), balance);
        },
        None => {
            balances.remove(wrapped_native_address);
        },
    }
}

/// Spendable amount of `token`; tokens the wallet does not hold read as zero.
pub fn balance_of(balances: &Balances, token: &str) -> f64 {
    balances
        .get(token)
        .map(|balance: &TokenBalance| balance.ui_amount)
        .unwrap_or(0.0)
}

pub async fn fetch_balances<A: BalanceApi>(
    api: &A,
    wallet: &str,
) -> Result<Balances, Error> {
    let balances = api.balances(wallet).await?;
    debug!("Fetched {} balances for {}", balances.len(), wallet);
    Ok(balances)
}
