pub use self::{
    feed_message::{Coin, FeedMessage, PriceUpdate, SubscribeRequest},
    ref_info::{EarnBalance, RefInfo},
    ref_list_item::{RefListItem, Timestamp},
    swap_quote::{SwapQuoteRequest, SwapQuoteResponse, SwapSubmitRequest},
    token_balance::{Balances, TokenBalance},
};

mod feed_message;
mod ref_info;
mod ref_list_item;
mod swap_quote;
mod token_balance;
