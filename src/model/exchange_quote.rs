use bigdecimal::{BigDecimal, Zero};

use crate::{
    error::Error,
    helpers::decimal_from_f64,
    types::{Coin, FeedMessage},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeQuote {
    pub exchange: String,
    pub price: BigDecimal,
    pub address: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Discovery(Vec<Coin>),
    Price(ExchangeQuote),
}

impl FeedEvent {
    /// Price updates without a usable price carry nothing and map to `None`.
    pub fn from_message(message: FeedMessage) -> Result<Option<FeedEvent>, Error> {
        match message {
            FeedMessage::Discovery { coins } => {
                Ok(Some(FeedEvent::Discovery(coins)))
            },
            FeedMessage::Price(update) => {
                let price = match update.price {
                    Some(price) => decimal_from_f64(price)?,
                    None => return Ok(None),
                };
                if price.is_zero() {
                    return Ok(None);
                }

                Ok(Some(FeedEvent::Price(ExchangeQuote {
                    exchange: update.exchange,
                    price,
                    address: update.address,
                    symbol: update.symbol,
                })))
            },
        }
    }
}
