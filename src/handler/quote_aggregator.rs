//! Per-exchange view of the quote feed for one trading symbol.
//!
//! Quotes are kept in first-seen order; a later price event for the same
//! exchange replaces the earlier one in place. Display order is by the
//! magnitude of each exchange's spread against the reference exchange, with
//! ties and the no-reference case falling back to first-seen order.

use bigdecimal::{BigDecimal, One, RoundingMode, ToPrimitive, Zero};
use tracing::debug;

use crate::{
    helpers::get_price,
    model::{ExchangeQuote, FeedEvent},
    types::Coin,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub exchange: String,
    pub price: String,
    /// Units of the quoted token per one unit of the source token.
    pub rate: String,
    pub spread: Option<String>,
    pub address: Option<String>,
    pub symbol: Option<String>,
    pub pinned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QuoteAggregator {
    symbol: Option<String>,
    to_address: Option<String>,
    reference: Option<String>,
    markets: Vec<ExchangeQuote>,
}

impl QuoteAggregator {
    pub fn new(symbol: Option<String>) -> Self {
        Self {
            symbol,
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Token address picked from the most liquid discovered coin.
    pub fn to_address(&self) -> Option<&str> {
        self.to_address.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn set_reference(&mut self, exchange: &str) {
        self.reference = Some(exchange.to_owned());
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn quote(&self, exchange: &str) -> Option<&ExchangeQuote> {
        self.markets.iter().find(|quote| quote.exchange == exchange)
    }

    /// Folds one feed event in. Returns the stored quote when the event was a
    /// price update.
    pub fn apply(&mut self, event: FeedEvent) -> Option<&ExchangeQuote> {
        match event {
            FeedEvent::Discovery(coins) => {
                self.discover(&coins);
                None
            },
            FeedEvent::Price(quote) => Some(self.upsert(quote)),
        }
    }

    fn discover(&mut self, coins: &[Coin]) {
        let best = coins.iter().reduce(|best, coin| {
            if coin.liquidity > best.liquidity {
                coin
            } else {
                best
            }
        });

        let Some(coin) = best else {
            return;
        };
        debug!(
            "Discovered {} on {} with liquidity {}",
            coin.symbol, coin.exchange, coin.liquidity
        );

        if self.symbol.is_none() {
            self.symbol = Some(coin.symbol.to_owned());
        }
        if self.to_address.is_none() {
            self.to_address = Some(coin.address.to_owned());
        }
        if self.reference.is_none() {
            self.reference = Some(coin.exchange.to_owned());
        }
    }

    fn upsert(&mut self, quote: ExchangeQuote) -> &ExchangeQuote {
        let position = self
            .markets
            .iter()
            .position(|item| item.exchange == quote.exchange);

        let index = match position {
            Some(index) => {
                self.markets[index] = quote;
                index
            },
            None => {
                self.markets.push(quote);
                self.markets.len() - 1
            },
        };

        &self.markets[index]
    }

    pub fn reference_price(&self) -> Option<&BigDecimal> {
        let reference = self.reference.as_deref()?;
        self.quote(reference)
            .map(|quote| &quote.price)
            .filter(|price| !price.is_zero())
    }

    /// Percentage difference of `exchange` against the reference price:
    /// `(price / reference - 1) * 100`.
    pub fn spread(&self, exchange: &str) -> Option<BigDecimal> {
        let reference = self.reference_price()?;
        let quote = self.quote(exchange)?;

        Some(spread_of(&quote.price, reference))
    }

    pub fn sorted(&self) -> Vec<&ExchangeQuote> {
        let mut markets: Vec<&ExchangeQuote> = self.markets.iter().collect();

        let Some(reference) = self.reference_price() else {
            return markets;
        };

        markets.sort_by(|a, b| {
            let a = spread_of(&a.price, reference).abs();
            let b = spread_of(&b.price, reference).abs();
            b.cmp(&a)
        });

        markets
    }

    pub fn rows(&self, pinned: Option<&str>) -> Vec<MarketRow> {
        let reference = self.reference_price();

        self.sorted()
            .into_iter()
            .map(|quote| {
                let rate = if quote.price.is_zero() {
                    BigDecimal::zero()
                } else {
                    BigDecimal::one() / &quote.price
                };
                let spread = reference.and_then(|reference| {
                    one_decimal(&spread_of(&quote.price, reference))
                });

                MarketRow {
                    exchange: quote.exchange.to_owned(),
                    price: get_price(&quote.price),
                    rate: get_price(&rate),
                    spread,
                    address: quote.address.to_owned(),
                    symbol: quote.symbol.to_owned(),
                    pinned: pinned == Some(quote.exchange.as_str()),
                }
            })
            .collect()
    }
}

/// Fixed one-decimal form, `-12.5` or `0.0`.
fn one_decimal(value: &BigDecimal) -> Option<String> {
    let tenths = (value * BigDecimal::from(10))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()?;
    let sign = if tenths < 0 { "-" } else { "" };
    let tenths = tenths.unsigned_abs();

    Some(format!("{}{}.{}", sign, tenths / 10, tenths % 10))
}

fn spread_of(price: &BigDecimal, reference: &BigDecimal) -> BigDecimal {
    (price / reference - BigDecimal::one()) * BigDecimal::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn price(exchange: &str, value: &str) -> FeedEvent {
        FeedEvent::Price(ExchangeQuote {
            exchange: exchange.to_owned(),
            price: BigDecimal::from_str(value).unwrap(),
            address: None,
            symbol: Some(String::from("BONK")),
        })
    }

    fn coin(exchange: &str, address: &str, liquidity: f64) -> Coin {
        Coin {
            symbol: String::from("BONK"),
            address: address.to_owned(),
            exchange: exchange.to_owned(),
            liquidity,
        }
    }

    fn order(aggregator: &QuoteAggregator) -> Vec<&str> {
        aggregator
            .sorted()
            .into_iter()
            .map(|quote| quote.exchange.as_str())
            .collect()
    }

    #[test]
    fn test_sorted_by_absolute_spread_with_stable_ties() {
        let mut aggregator = QuoteAggregator::new(Some(String::from("BONK")));
        aggregator.set_reference("A");
        aggregator.apply(price("A", "100"));
        aggregator.apply(price("B", "110"));
        aggregator.apply(price("C", "90"));

        assert_eq!(order(&aggregator), vec!["B", "C", "A"]);
        assert_eq!(aggregator.spread("B"), Some(BigDecimal::from(10)));
        assert_eq!(aggregator.spread("C"), Some(BigDecimal::from(-10)));
        assert_eq!(aggregator.spread("A"), Some(BigDecimal::from(0)));
    }

    #[test]
    fn test_insertion_order_without_reference_price() {
        let mut aggregator = QuoteAggregator::new(None);
        aggregator.apply(price("A", "100"));
        aggregator.apply(price("B", "110"));
        aggregator.apply(price("C", "90"));
        assert_eq!(order(&aggregator), vec!["A", "B", "C"]);
        assert_eq!(aggregator.spread("B"), None);

        // reference exchange named but not quoted yet
        aggregator.set_reference("D");
        assert_eq!(order(&aggregator), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_price_event_replaces_in_place() {
        let mut aggregator = QuoteAggregator::new(None);
        aggregator.apply(price("A", "1"));
        aggregator.apply(price("B", "2"));

        let updated = aggregator.apply(price("A", "3")).cloned();
        assert_eq!(updated.map(|q| q.price), Some(BigDecimal::from(3)));
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.markets[0].exchange, "A");
        assert_eq!(aggregator.markets[0].price, BigDecimal::from(3));
    }

    #[test]
    fn test_discovery_picks_most_liquid_once() {
        let mut aggregator = QuoteAggregator::new(None);
        aggregator.apply(FeedEvent::Discovery(vec![
            coin("orca", "Bonk1", 5.0),
            coin("raydium", "Bonk2", 50.0),
            coin("meteora", "Bonk3", 50.0),
        ]));

        assert_eq!(aggregator.symbol(), Some("BONK"));
        assert_eq!(aggregator.to_address(), Some("Bonk2"));
        assert_eq!(aggregator.reference(), Some("raydium"));

        aggregator
            .apply(FeedEvent::Discovery(vec![coin("orca", "Bonk9", 500.0)]));
        assert_eq!(aggregator.to_address(), Some("Bonk2"));
        assert_eq!(aggregator.reference(), Some("raydium"));

        aggregator.apply(FeedEvent::Discovery(vec![]));
        assert_eq!(aggregator.reference(), Some("raydium"));
    }

    #[test]
    fn test_rows() {
        let mut aggregator = QuoteAggregator::new(None);
        aggregator.set_reference("A");
        aggregator.apply(price("A", "0.02"));
        aggregator.apply(price("B", "0.025"));

        let rows = aggregator.rows(Some("A"));
        assert_eq!(rows[0].exchange, "B");
        assert_eq!(rows[0].spread.as_deref(), Some("25.0"));
        assert_eq!(rows[0].rate, "40");
        assert!(!rows[0].pinned);

        assert_eq!(rows[1].spread.as_deref(), Some("0.0"));
        assert_eq!(rows[1].price, "0.02");
        assert_eq!(rows[1].rate, "50");
        assert!(rows[1].pinned);
    }

    #[test]
    fn test_row_spreads_keep_one_decimal() {
        let mut aggregator = QuoteAggregator::new(None);
        aggregator.set_reference("A");
        aggregator.apply(price("A", "100"));
        aggregator.apply(price("B", "87.66"));
        aggregator.apply(price("C", "100.05"));
        aggregator.apply(price("D", "99.96"));

        let rows = aggregator.rows(None);
        let spread = |exchange: &str| {
            rows.iter()
                .find(|row| row.exchange == exchange)
                .and_then(|row| row.spread.clone())
        };

        assert_eq!(spread("A").as_deref(), Some("0.0"));
        assert_eq!(spread("B").as_deref(), Some("-12.3"));
        assert_eq!(spread("C").as_deref(), Some("0.1"));
        assert_eq!(spread("D").as_deref(), Some("0.0"));
    }
}
