pub mod balances;
pub mod quote_aggregator;
pub mod referral_dashboard;
pub mod swap_widget;
