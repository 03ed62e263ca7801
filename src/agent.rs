//! Trading-agent environment over the order book.
//!
//! Translates a small discrete action alphabet into order submissions,
//! tracks position/cash/PnL from the book's trade callbacks, and returns a
//! scalar reward per action. The environment is the surface a reinforcement
//! learner sees (observation, action, reward, reset); the learner itself is
//! the client's business.
//!
//! Prices cross the environment boundary in ticks and are booked at 1/100
//! of a currency unit per tick. All cash accounting is exact
//! [`Decimal`] arithmetic; only the reward fields are floats.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::book::OrderBook;
use crate::market_state::MarketState;
use crate::order::{OrderType, Side, Trade};

/// Discrete action alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Do nothing.
    Hold,
    /// Market buy at the touch.
    BuyMarket,
    /// Market sell at the touch.
    SellMarket,
    /// Join the bid with a limit buy.
    BuyLimitAtBid,
    /// Join the ask with a limit sell.
    SellLimitAtAsk,
    /// Limit buy at the integer mean of bid and ask, inside the spread.
    BuyLimitAggressive,
    /// Limit sell at the same inside price.
    SellLimitAggressive,
    /// Cancel every order the agent still owns.
    CancelAll,
}

/// Environment parameters. Loadable from any serde format; every field has
/// a default.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Starting cash balance.
    pub initial_cash: Decimal,
    /// λ in the `-λ·|position|` inventory penalty.
    pub inventory_penalty: f64,
    /// Actions between prunes of terminal order ids. Must be non-zero.
    pub prune_interval: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(1_000_000),
            inventory_penalty: 0.01,
            prune_interval: 10,
        }
    }
}

/// Signed inventory plus the PnL ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Positive long, negative short.
    pub quantity: i64,
    /// Quantity-weighted average entry price, in currency units.
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
    /// Marked at mid; refreshed on observation.
    pub unrealized_pnl: Decimal,
}

/// What the agent sees between actions.
#[derive(Clone, Debug, Serialize)]
pub struct Observation {
    pub market_state: MarketState,
    pub position: Position,
    pub active_orders: Vec<u64>,
    pub cash: Decimal,
    pub portfolio_value: Decimal,
}

/// Per-action reward decomposition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Reward {
    /// Delta of realized + unrealized PnL across the action.
    pub pnl_change: f64,
    /// `-λ·|position|`.
    pub inventory_penalty: f64,
    /// Reserved; zero in the baseline.
    pub spread_capture: f64,
    pub total: f64,
}

/// Convert a tick price to currency units (100 ticks per unit).
#[inline]
fn cash_price(price: i64) -> Decimal {
    Decimal::new(price, 2)
}

/// The agent's gateway to the book.
///
/// Owns the book; hosts drive external flow (synthetic or replayed) through
/// [`book_mut`](Self::book_mut). Fills are collected from the book's trade
/// callback into a pending queue and folded into the position at the next
/// action or observation. The queue exists because an aggressor's id is
/// only known once `add_order` returns, after its fills already happened.
pub struct TradingEnv {
    book: OrderBook,
    config: EnvConfig,
    position: Position,
    cash: Decimal,
    active_orders: Vec<u64>,
    pending_fills: Rc<RefCell<VecDeque<Trade>>>,
    action_count: u64,
    total_trades: u64,
    total_volume: u64,
}

impl TradingEnv {
    pub fn new(mut book: OrderBook, config: EnvConfig) -> Self {
        assert!(config.prune_interval > 0, "prune_interval must be non-zero");
        let pending_fills: Rc<RefCell<VecDeque<Trade>>> = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&pending_fills);
        book.register_trade_callback(move |trade| sink.borrow_mut().push_back(*trade));

        Self {
            book,
            cash: config.initial_cash,
            config,
            position: Position::default(),
            active_orders: Vec::with_capacity(100),
            pending_fills,
            action_count: 0,
            total_trades: 0,
            total_volume: 0,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Mutable book access for external flow. The environment is not reset
    /// by book mutations; its fills arrive through the trade callback.
    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    // ========================================================================
    // Acting
    // ========================================================================

    /// Execute one action with the given order quantity.
    ///
    /// Actions that need a missing book side are no-ops: no order, no
    /// rejection, only the passive reward terms. Every
    /// `config.prune_interval` actions the active-order list drops ids whose
    /// orders reached a terminal state.
    pub fn execute_action(&mut self, action: Action, quantity: u64) -> Reward {
        self.apply_pending_fills();
        let previous_pnl = self.current_pnl();

        match action {
            Action::Hold => {}
            Action::BuyMarket => {
                if let Some(best_ask) = self.book.best_ask() {
                    let id = self.book.add_order(best_ask, quantity, Side::Buy, OrderType::Market);
                    self.active_orders.push(id);
                }
            }
            Action::SellMarket => {
                if let Some(best_bid) = self.book.best_bid() {
                    let id = self.book.add_order(best_bid, quantity, Side::Sell, OrderType::Market);
                    self.active_orders.push(id);
                }
            }
            Action::BuyLimitAtBid => {
                if let Some(best_bid) = self.book.best_bid() {
                    let id = self.book.add_order(best_bid, quantity, Side::Buy, OrderType::Limit);
                    self.active_orders.push(id);
                }
            }
            Action::SellLimitAtAsk => {
                if let Some(best_ask) = self.book.best_ask() {
                    let id = self.book.add_order(best_ask, quantity, Side::Sell, OrderType::Limit);
                    self.active_orders.push(id);
                }
            }
            Action::BuyLimitAggressive => {
                if let (Some(bid), Some(ask)) = (self.book.best_bid(), self.book.best_ask()) {
                    let price = (bid + ask) / 2;
                    let id = self.book.add_order(price, quantity, Side::Buy, OrderType::Limit);
                    self.active_orders.push(id);
                }
            }
            Action::SellLimitAggressive => {
                if let (Some(bid), Some(ask)) = (self.book.best_bid(), self.book.best_ask()) {
                    let price = (bid + ask) / 2;
                    let id = self.book.add_order(price, quantity, Side::Sell, OrderType::Limit);
                    self.active_orders.push(id);
                }
            }
            Action::CancelAll => {
                for id in std::mem::take(&mut self.active_orders) {
                    self.book.cancel_order(id);
                }
            }
        }

        self.apply_pending_fills();

        self.action_count += 1;
        if self.action_count % self.config.prune_interval == 0 {
            self.prune_terminal_orders();
        }

        self.reward_since(previous_pnl)
    }

    /// Snapshot for the learner; folds in any fills that arrived since the
    /// last action and marks the position at mid.
    pub fn get_observation(&mut self) -> Observation {
        self.apply_pending_fills();
        let market_state = self.book.get_market_state();
        let mut position = self.position.clone();
        position.unrealized_pnl = self.unrealized_pnl();
        Observation {
            market_state,
            position,
            active_orders: self.active_orders.clone(),
            cash: self.cash,
            portfolio_value: self.portfolio_value(),
        }
    }

    /// Restore initial cash, flatten the position, forget all orders and
    /// counters. The book is left untouched; reset it explicitly through
    /// [`book_mut`](Self::book_mut) when a fresh market is wanted.
    pub fn reset(&mut self) {
        self.position = Position::default();
        self.active_orders.clear();
        self.pending_fills.borrow_mut().clear();
        self.cash = self.config.initial_cash;
        self.action_count = 0;
        self.total_trades = 0;
        self.total_volume = 0;
    }

    // ========================================================================
    // Accounting
    // ========================================================================

    fn apply_pending_fills(&mut self) {
        loop {
            let trade = self.pending_fills.borrow_mut().pop_front();
            let Some(trade) = trade else { break };

            if self.active_orders.contains(&trade.buy_order_id) {
                self.apply_fill(Side::Buy, &trade);
            } else if self.active_orders.contains(&trade.sell_order_id) {
                self.apply_fill(Side::Sell, &trade);
            }
        }
    }

    /// Close-then-open ledger: a fill first closes any opposing inventory
    /// (realizing PnL against the average price), then any residual opens or
    /// extends a position at the trade price.
    fn apply_fill(&mut self, side: Side, trade: &Trade) {
        self.total_trades += 1;
        self.total_volume += trade.quantity;

        let price = cash_price(trade.price);
        let quantity = trade.quantity as i64;
        debug!(?side, price = trade.price, quantity, "agent fill");

        match side {
            Side::Buy => {
                if self.position.quantity < 0 {
                    let close_qty = quantity.min(-self.position.quantity);
                    let pnl = Decimal::from(close_qty) * (self.position.avg_price - price);
                    self.position.realized_pnl += pnl;
                    self.cash += pnl;
                    self.position.quantity += close_qty;

                    let residual = quantity - close_qty;
                    if residual > 0 {
                        self.position.avg_price = price;
                        self.position.quantity += residual;
                        self.cash -= Decimal::from(residual) * price;
                    }
                } else {
                    let total_cost = Decimal::from(self.position.quantity) * self.position.avg_price
                        + Decimal::from(quantity) * price;
                    self.position.quantity += quantity;
                    self.position.avg_price = total_cost / Decimal::from(self.position.quantity);
                    self.cash -= Decimal::from(quantity) * price;
                }
            }
            Side::Sell => {
                if self.position.quantity > 0 {
                    let close_qty = quantity.min(self.position.quantity);
                    let pnl = Decimal::from(close_qty) * (price - self.position.avg_price);
                    self.position.realized_pnl += pnl;
                    self.cash += pnl + Decimal::from(close_qty) * self.position.avg_price;
                    self.position.quantity -= close_qty;

                    let residual = quantity - close_qty;
                    if residual > 0 {
                        self.position.avg_price = price;
                        self.position.quantity -= residual;
                        self.cash += Decimal::from(residual) * price;
                    }
                } else {
                    let total_value = Decimal::from(-self.position.quantity) * self.position.avg_price
                        + Decimal::from(quantity) * price;
                    self.position.quantity -= quantity;
                    self.position.avg_price = total_value / Decimal::from(-self.position.quantity);
                    self.cash += Decimal::from(quantity) * price;
                }
            }
        }
    }

    /// Mark-to-mid of the open position; zero when flat or one side empty.
    fn unrealized_pnl(&self) -> Decimal {
        match self.book.mid_price() {
            Some(mid) if self.position.quantity != 0 && mid > 0 => {
                Decimal::from(self.position.quantity) * (cash_price(mid) - self.position.avg_price)
            }
            _ => Decimal::ZERO,
        }
    }

    fn current_pnl(&self) -> Decimal {
        self.position.realized_pnl + self.unrealized_pnl()
    }

    fn reward_since(&self, previous_pnl: Decimal) -> Reward {
        let pnl_change = (self.current_pnl() - previous_pnl).to_f64().unwrap_or(0.0);
        let inventory_penalty =
            -self.config.inventory_penalty * self.position.quantity.unsigned_abs() as f64;
        let spread_capture = 0.0;
        Reward {
            pnl_change,
            inventory_penalty,
            spread_capture,
            total: pnl_change + inventory_penalty + spread_capture,
        }
    }

    /// Terminal orders are evicted from the book's id map, so liveness is
    /// exactly membership there.
    fn prune_terminal_orders(&mut self) {
        let book = &self.book;
        self.active_orders.retain(|&id| book.get_order(id).is_some());
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Cash plus realized PnL plus the position marked at mid.
    pub fn portfolio_value(&self) -> Decimal {
        let mut value = self.cash + self.position.realized_pnl;
        if let Some(mid) = self.book.mid_price() {
            if self.position.quantity != 0 {
                value += Decimal::from(self.position.quantity) * cash_price(mid);
            }
        }
        value
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn active_orders(&self) -> &[u64] {
        &self.active_orders
    }
}

// ============================================================================
// Backtest metrics
// ============================================================================

/// Equity recorder with the usual backtest summary statistics.
#[derive(Debug, Clone)]
pub struct EquityCurve {
    equity: Vec<f64>,
    returns: Vec<f64>,
}

/// Summary statistics over a recorded equity curve.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    /// Annualized at √252.
    pub sharpe_ratio: f64,
    /// Downside-deviation variant, annualized at √252.
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
}

const ANNUALIZATION: f64 = 252.0;

impl EquityCurve {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            equity: vec![initial_equity],
            returns: Vec::new(),
        }
    }

    pub fn record(&mut self, equity: f64) {
        let last = *self.equity.last().expect("curve starts non-empty");
        if last != 0.0 {
            self.returns.push((equity - last) / last);
        }
        self.equity.push(equity);
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let mut metrics = PerformanceMetrics::default();
        let first = self.equity[0];
        let last = *self.equity.last().expect("curve starts non-empty");
        if first != 0.0 {
            metrics.total_return = (last - first) / first;
        }

        if !self.returns.is_empty() {
            let n = self.returns.len() as f64;
            let mean = self.returns.iter().sum::<f64>() / n;
            let variance = self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();
            if std_dev > 0.0 {
                metrics.sharpe_ratio = mean / std_dev * ANNUALIZATION.sqrt();
            }

            let downside: Vec<f64> = self.returns.iter().copied().filter(|r| *r < 0.0).collect();
            if !downside.is_empty() {
                let downside_dev =
                    (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
                if downside_dev > 0.0 {
                    metrics.sortino_ratio = mean / downside_dev * ANNUALIZATION.sqrt();
                }
            }
        }

        let mut peak = self.equity[0];
        for &equity in &self.equity {
            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                let drawdown = (peak - equity) / peak;
                if drawdown > metrics.max_drawdown {
                    metrics.max_drawdown = drawdown;
                }
            }
        }

        metrics
    }

    pub fn equity(&self) -> &[f64] {
        &self.equity
    }
}
