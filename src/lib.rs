//! # microlob
//!
//! A single-instrument limit order book matching engine with the
//! market-observation surface algorithmic traders consume.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns the book, its pools and its
//!   listeners; every operation completes synchronously
//! - **Price-Time Priority**: best price first, FIFO within a level,
//!   trades at the passive price
//! - **Pooled Allocation**: orders and price levels live in slot arenas
//!   addressed by 32-bit indices; no per-order heap churn
//! - **Integer Ticks**: prices never touch floating point on the matching
//!   path; derived statistics and rewards are where floats live
//!
//! ## Architecture
//!
//! ```text
//! [Synthetic Flow / Feed Seeding] --> [OrderBook] --> trade / order / state
//!                                          ^              listeners
//!                                          |                  |
//!                                     [TradingEnv] <----------+
//!                                   (actions, PnL, reward)
//! ```

pub mod agent;
pub mod arena;
pub mod book;
pub mod feed;
pub mod flow;
pub mod market_state;
pub mod order;
pub mod price_level;

// Re-exports for convenience
pub use agent::{Action, EnvConfig, EquityCurve, Observation, PerformanceMetrics, Position, Reward, TradingEnv};
pub use arena::{Arena, ArenaIndex, NULL_INDEX};
pub use book::OrderBook;
pub use feed::{seed_from_quote, FeedError, Ohlcv, Quote};
pub use flow::{FlowConfig, SyntheticFlow};
pub use market_state::MarketState;
pub use order::{Order, OrderSnapshot, OrderStatus, OrderType, Side, Trade};
pub use price_level::PriceLevel;
