//! Derived market-state snapshot.
//!
//! Recomputed on demand from the book and the bounded recent-trade window;
//! nothing here is owned state. Downstream agents read this instead of
//! touching the book's internals.

use serde::{Deserialize, Serialize};

use crate::book::OrderBook;
use crate::order::Side;

/// Levels walked from the top of each side into the depth ladders.
pub const DEPTH_LEVELS: usize = 10;

/// A point-in-time view of the book's microstructure.
///
/// Absent values (an empty side, no trades yet) are reported as zeroes so
/// the snapshot stays a flat, fixed-shape record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    /// Top of book; zero when the side is empty.
    pub best_bid: i64,
    pub best_ask: i64,
    /// Resting quantity at the best level of each side.
    pub bid_quantity: u64,
    pub ask_quantity: u64,
    /// `best_ask - best_bid`; zero unless both sides rest.
    pub spread: i64,
    /// Integer mean of best bid and ask; zero unless both sides rest.
    pub mid_price: i64,
    /// Up to [`DEPTH_LEVELS`] `(price, quantity)` pairs, best first.
    pub bid_levels: Vec<(i64, u64)>,
    pub ask_levels: Vec<(i64, u64)>,
    /// `(bid_qty - ask_qty) / (bid_qty + ask_qty)` over the top levels,
    /// in [-1, 1]; zero when both are empty.
    pub order_flow_imbalance: f64,
    pub last_trade_price: i64,
    pub last_trade_quantity: u64,
    /// Volume-weighted average price over the book's whole trade history.
    pub vwap: f64,
    /// Population standard deviation of the recent trade prices.
    pub price_volatility: f64,
    pub timestamp_ns: u64,
}

impl OrderBook {
    /// Project the current book into a [`MarketState`] snapshot.
    pub fn get_market_state(&self) -> MarketState {
        let mut state = MarketState {
            timestamp_ns: self.now_ns(),
            ..MarketState::default()
        };

        let best_bid = self.best_bid();
        let best_ask = self.best_ask();
        state.best_bid = best_bid.unwrap_or(0);
        state.best_ask = best_ask.unwrap_or(0);

        if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
            state.spread = ask - bid;
            state.mid_price = (bid + ask) / 2;
        }

        state.bid_levels = self.depth(Side::Buy, DEPTH_LEVELS);
        state.ask_levels = self.depth(Side::Sell, DEPTH_LEVELS);
        state.bid_quantity = state.bid_levels.first().map(|&(_, q)| q).unwrap_or(0);
        state.ask_quantity = state.ask_levels.first().map(|&(_, q)| q).unwrap_or(0);

        let total_top = state.bid_quantity + state.ask_quantity;
        if total_top > 0 {
            state.order_flow_imbalance =
                (state.bid_quantity as f64 - state.ask_quantity as f64) / total_top as f64;
        }

        if let Some(&(price, quantity)) = self.recent_trades.back() {
            state.last_trade_price = price;
            state.last_trade_quantity = quantity;
        }

        if self.cum_volume > 0 {
            state.vwap = self.cum_notional as f64 / self.cum_volume as f64;
        }

        state.price_volatility = recent_price_volatility(self.recent_trades.iter().map(|&(p, _)| p));

        state
    }
}

/// Population standard deviation; zero for fewer than two samples.
fn recent_price_volatility(prices: impl Iterator<Item = i64> + Clone) -> f64 {
    let count = prices.clone().count();
    if count < 2 {
        return 0.0;
    }
    let mean = prices.clone().map(|p| p as f64).sum::<f64>() / count as f64;
    let sq_sum = prices.map(|p| (p as f64 - mean).powi(2)).sum::<f64>();
    (sq_sum / count as f64).sqrt()
}
