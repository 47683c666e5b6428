use std::future::Future;

use crate::{
    error::Error,
    model::LeaderboardSort,
    types::{
        Balances, RefInfo, RefListItem, SwapQuoteRequest, SwapQuoteResponse,
        SwapSubmitRequest,
    },
};

pub trait ReferralApi: Send + Sync + 'static {
    fn ref_info(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<RefInfo, Error>> + Send;

    fn ref_list(
        &self,
        sort: LeaderboardSort,
    ) -> impl Future<Output = Result<Vec<RefListItem>, Error>> + Send;
}

pub trait SwapApi: Send + Sync + 'static {
    fn swap_quote(
        &self,
        request: &SwapQuoteRequest,
    ) -> impl Future<Output = Result<SwapQuoteResponse, Error>> + Send;

    fn submit_swap(
        &self,
        request: &SwapSubmitRequest,
    ) -> impl Future<Output = Result<serde_json::Value, Error>> + Send;
}

pub trait BalanceApi: Send + Sync + 'static {
    /// Holdings of `wallet`, with the native entry also listed under the
    /// wrapped-native token address.
    fn balances(
        &self,
        wallet: &str,
    ) -> impl Future<Output = Result<Balances, Error>> + Send;
}
