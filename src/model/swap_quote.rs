use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};

use crate::{
    error::Error, helpers::decimal_from_f64, types::SwapQuoteResponse,
};

/// Backend-built transaction awaiting a wallet signature, with the id that
/// ties the signed copy back to the quote.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub payload: String,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub price: BigDecimal,
    pub amount: BigDecimal,
    pub to_amount: BigDecimal,
    pub transaction: Option<UnsignedTransaction>,
    pub fetched_at: DateTime<Utc>,
}

impl SwapQuote {
    pub fn from_response(
        response: SwapQuoteResponse,
        amount: BigDecimal,
    ) -> Result<SwapQuote, Error> {
        let price = response
            .price
            .ok_or_else(|| Error::MissingParams(String::from("price")))?;
        let price = decimal_from_f64(price)?;
        let to_amount = counter_amount(&amount, &price)?;

        let transaction = match (response.transaction, response.request_id) {
            (Some(payload), Some(request_id)) => Some(UnsignedTransaction {
                payload,
                request_id,
            }),
            _ => None,
        };

        Ok(SwapQuote {
            price,
            amount,
            to_amount,
            transaction,
            fetched_at: Utc::now(),
        })
    }
}

/// Destination amount for `amount` of the source token at `price`.
pub fn counter_amount(
    amount: &BigDecimal,
    price: &BigDecimal,
) -> Result<BigDecimal, Error> {
    if price.is_zero() {
        return Err(Error::InvalidPrice(price.to_string()));
    }
    Ok(amount / price)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum QuoteState {
    #[default]
    NoQuote,
    QuotePending {
        seq: u64,
    },
    QuoteReady {
        seq: u64,
        quote: SwapQuote,
    },
    QuoteStale {
        quote: SwapQuote,
    },
}

impl QuoteState {
    /// The quote that may be signed and submitted.
    pub fn live(&self) -> Option<&SwapQuote> {
        match self {
            QuoteState::QuoteReady { quote, .. } => Some(quote),
            _ => None,
        }
    }

    /// Last known quote for display, live or not.
    pub fn latest(&self) -> Option<&SwapQuote> {
        match self {
            QuoteState::QuoteReady { quote, .. }
            | QuoteState::QuoteStale { quote } => Some(quote),
            _ => None,
        }
    }

    /// Called on input edits: a ready quote turns stale and a pending
    /// request no longer has anything to fill.
    pub fn invalidate(self) -> QuoteState {
        match self {
            QuoteState::QuoteReady { quote, .. } => {
                QuoteState::QuoteStale { quote }
            },
            QuoteState::QuotePending { .. } => QuoteState::NoQuote,
            other => other,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, QuoteState::QuotePending { .. })
    }
}
