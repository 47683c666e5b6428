use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};

use crate::error::Error;

const SYMBOL_DISPLAY_LENGTH: usize = 5;

/// JSON floats go through their shortest decimal text so that `0.02` stays
/// `0.02` instead of its binary expansion.
pub fn decimal_from_f64(value: f64) -> Result<BigDecimal, Error> {
    if !value.is_finite() {
        return Err(Error::InvalidPrice(value.to_string()));
    }

    Ok(BigDecimal::from_str(&value.to_string())?)
}

/// Formats a price or amount with precision that depends on its magnitude.
/// Sub-unit values keep four significant digits after the leading zeros.
pub fn get_price(value: &BigDecimal) -> String {
    let value = value.to_f64().unwrap_or(0.0);

    if value == 0.0 {
        return String::from("0");
    }

    let abs = value.abs();
    let decimals = if abs >= 100.0 {
        2
    } else if abs >= 1.0 {
        4
    } else {
        let zeros = (-abs.log10()).floor() as usize;
        zeros + 4
    };

    trim_zeros(format!("{:.*}", decimals, value))
}

/// Compact human form for balances: 1.5K, 2.25M, 3B.
pub fn get_big_number(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };

    format!("{}{}", trim_zeros(format!("{:.2}", scaled)), suffix)
}

pub fn truncate_symbol(symbol: &str) -> String {
    if symbol.chars().count() > SYMBOL_DISPLAY_LENGTH {
        let head: String = symbol.chars().take(SYMBOL_DISPLAY_LENGTH).collect();
        return format!("{}...", head);
    }
    symbol.to_owned()
}

/// An explicit selection wins over the symbol taken from the route path.
pub fn resolve_symbol(explicit: Option<&str>, route: &str) -> Option<String> {
    if let Some(symbol) = explicit.filter(|s| !s.is_empty()) {
        return Some(symbol.to_owned());
    }

    let symbol = route.trim_start_matches('/');
    if symbol.is_empty() {
        return None;
    }
    Some(symbol.to_owned())
}

pub fn format_time_difference(
    target: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    let remaining = target - now;
    if remaining.num_seconds() <= 0 {
        return String::from("Rewarding");
    }

    let total = remaining.num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn trim_zeros(value: String) -> String {
    if !value.contains('.') {
        return value;
    }
    value
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_owned()
}
