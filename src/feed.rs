//! Upstream market-data types and liquidity seeding.
//!
//! The engine is agnostic to where quotes come from; adapters parse raw
//! decimal rows (CSV/JSON dumps, replay files) into integer-tick records
//! with an explicit price multiplier, and a seeded quote becomes two
//! resting limit orders. Nothing here touches the matching path.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::book::OrderBook;
use crate::order::{OrderType, Side};

/// Conversion failures from raw rows to tick records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("price not representable in ticks: {0}")]
    PriceOutOfRange(Decimal),
    #[error("size not representable: {0}")]
    SizeOutOfRange(Decimal),
}

/// Top-of-book quote in integer ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: i64,
    pub ask_price: i64,
    pub bid_size: u64,
    pub ask_size: u64,
    pub timestamp_ns: u64,
}

/// One candle in integer ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
    pub timestamp_ns: u64,
}

/// Raw decimal quote row as it arrives from a feed dump.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRow {
    pub bid_price: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Raw decimal OHLCV row.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvRow {
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Convert a decimal price to ticks.
/// Price multiplier: e.g. 100 for cents, 100000000 for satoshis.
fn to_ticks(price: Decimal, price_mult: u64) -> Result<i64, FeedError> {
    price
        .checked_mul(Decimal::from(price_mult))
        .and_then(|scaled| scaled.round().to_i64())
        .ok_or(FeedError::PriceOutOfRange(price))
}

fn to_size(size: Decimal) -> Result<u64, FeedError> {
    size.round().to_u64().ok_or(FeedError::SizeOutOfRange(size))
}

fn to_timestamp_ns(timestamp: Option<DateTime<Utc>>) -> u64 {
    timestamp
        .and_then(|t| t.timestamp_nanos_opt())
        .map(|ns| ns as u64)
        .unwrap_or(0)
}

impl QuoteRow {
    /// Convert the raw row to an integer-tick [`Quote`].
    pub fn to_quote(&self, price_mult: u64) -> Result<Quote, FeedError> {
        let bid_price = to_ticks(
            self.bid_price.ok_or(FeedError::MissingField("bid_price"))?,
            price_mult,
        )?;
        let ask_price = to_ticks(
            self.ask_price.ok_or(FeedError::MissingField("ask_price"))?,
            price_mult,
        )?;
        let bid_size = to_size(self.bid_size.unwrap_or(Decimal::ZERO))?;
        let ask_size = to_size(self.ask_size.unwrap_or(Decimal::ZERO))?;
        Ok(Quote {
            bid_price,
            ask_price,
            bid_size,
            ask_size,
            timestamp_ns: to_timestamp_ns(self.timestamp),
        })
    }
}

impl OhlcvRow {
    /// Convert the raw row to an integer-tick [`Ohlcv`].
    pub fn to_ohlcv(&self, price_mult: u64) -> Result<Ohlcv, FeedError> {
        Ok(Ohlcv {
            open: to_ticks(self.open.ok_or(FeedError::MissingField("open"))?, price_mult)?,
            high: to_ticks(self.high.ok_or(FeedError::MissingField("high"))?, price_mult)?,
            low: to_ticks(self.low.ok_or(FeedError::MissingField("low"))?, price_mult)?,
            close: to_ticks(self.close.ok_or(FeedError::MissingField("close"))?, price_mult)?,
            volume: to_size(self.volume.unwrap_or(Decimal::ZERO))?,
            timestamp_ns: to_timestamp_ns(self.timestamp),
        })
    }
}

/// Place a quote's two sides as resting limit orders. Zero-sized sides are
/// skipped.
pub fn seed_from_quote(book: &mut OrderBook, quote: &Quote) {
    if quote.bid_size > 0 {
        book.add_order(quote.bid_price, quote.bid_size, Side::Buy, OrderType::Limit);
    }
    if quote.ask_size > 0 {
        book.add_order(quote.ask_price, quote.ask_size, Side::Sell, OrderType::Limit);
    }
}
