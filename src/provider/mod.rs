pub use self::{
    api::{BalanceApi, ReferralApi, SwapApi},
    http::HTTP,
    quote_stream::{parse_message, QuoteFeed, QuoteStream, Subscription},
    wallet::{KeypairSigner, WalletSigner},
};

pub mod transaction;

mod api;
mod http;
mod quote_stream;
mod wallet;
