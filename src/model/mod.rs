pub use self::{
    exchange_quote::{ExchangeQuote, FeedEvent},
    leaderboard_sort::LeaderboardSort,
    loadable::Loadable,
    notification::Notification,
    referral_entry::{ReferralEntry, REFERRAL_FEE_RATE},
    swap_quote::{counter_amount, QuoteState, SwapQuote, UnsignedTransaction},
};

mod exchange_quote;
mod leaderboard_sort;
mod loadable;
mod notification;
mod referral_entry;
mod swap_quote;
