use std::borrow::Borrow;

use askama::Result;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Formats a price as `€1234.50`. Used as `{{ value|money }}`.
pub fn money<T: Borrow<Decimal>>(value: T) -> Result<String> {
    let rounded = value
        .borrow()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("€{:.2}", rounded))
}

pub fn datetime<T: Borrow<DateTime<Utc>>>(value: T) -> Result<String> {
    Ok(value.borrow().format("%Y-%m-%d %H:%M").to_string())
}
