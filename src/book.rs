//! Order book and matching engine.
//!
//! Owns the two price-indexed sides (bids descending, asks ascending), the
//! order-id lookup, both object pools and the matching loop. Aggressive
//! orders sweep the opposite side under strict price-time priority; trades
//! execute at the passive order's price.
//!
//! The book is single-threaded by contract: one thread owns it, every
//! operation completes synchronously, and listeners run inline on that
//! thread.

use std::collections::{BTreeMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::market_state::MarketState;
use crate::order::{Order, OrderSnapshot, OrderStatus, OrderType, Side, Trade};
use crate::price_level::PriceLevel;

/// Bounded window of (price, quantity) pairs feeding the microstructure
/// statistics.
pub(crate) const MAX_RECENT_TRADES: usize = 100;

/// Trade listener; invoked once per executed match.
pub type TradeListener = Box<dyn FnMut(&Trade)>;
/// Order listener; invoked on every order state change.
pub type OrderListener = Box<dyn FnMut(&OrderSnapshot)>;
/// State listener; invoked with a fresh snapshot after every submission.
pub type StateListener = Box<dyn FnMut(&MarketState)>;

/// A single-instrument limit order book.
pub struct OrderBook {
    pub(crate) orders: Arena<Order>,
    pub(crate) levels: Arena<PriceLevel>,
    /// price -> level, best bid = last key.
    pub(crate) bids: BTreeMap<i64, ArenaIndex>,
    /// price -> level, best ask = first key.
    pub(crate) asks: BTreeMap<i64, ArenaIndex>,
    by_id: FxHashMap<u64, ArenaIndex>,
    next_order_id: u64,
    epoch: Instant,
    pub(crate) recent_trades: VecDeque<(i64, u64)>,
    pub(crate) cum_volume: u64,
    pub(crate) cum_notional: i128,
    trade_listeners: Vec<TradeListener>,
    order_listeners: Vec<OrderListener>,
    state_listeners: Vec<StateListener>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: Arena::new(),
            levels: Arena::new(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            by_id: FxHashMap::default(),
            next_order_id: 1,
            epoch: Instant::now(),
            recent_trades: VecDeque::with_capacity(MAX_RECENT_TRADES),
            cum_volume: 0,
            cum_notional: 0,
            trade_listeners: Vec::new(),
            order_listeners: Vec::new(),
            state_listeners: Vec::new(),
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit an order. Returns the assigned id, even when the order ends up
    /// rejected or cancelled, so clients can correlate the `order_update`.
    ///
    /// Zero quantity, or a non-positive price on a price-carrying type, is
    /// rejected without matching. A market order is pinned to the best
    /// opposite price, or rejected when no opposing liquidity exists. A
    /// fill-or-kill order that cannot fill in full is rejected before any
    /// trade executes.
    pub fn add_order(
        &mut self,
        price: i64,
        quantity: u64,
        side: Side,
        order_type: OrderType,
    ) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        let timestamp_ns = self.now_ns();
        let idx = self
            .orders
            .alloc(Order::new(id, price, quantity, side, order_type, timestamp_ns));
        self.by_id.insert(id, idx);

        if quantity == 0 || (order_type != OrderType::Market && price <= 0) {
            debug!(id, price, quantity, "order rejected: invalid input");
            return self.finish_rejected(idx, id);
        }

        if order_type == OrderType::Market {
            match self.best_opposite(side) {
                Some(best) => self.orders.get_mut(idx).price = best,
                None => {
                    debug!(id, "market order rejected: no opposing liquidity");
                    return self.finish_rejected(idx, id);
                }
            }
        }

        if order_type == OrderType::Fok {
            let limit = self.orders.get(idx).price;
            if !self.fok_fillable(side, limit, quantity) {
                debug!(id, quantity, "fill-or-kill rejected: insufficient liquidity");
                return self.finish_rejected(idx, id);
            }
        }

        self.match_incoming(idx);

        let (remaining, status, limit_price) = {
            let order = self.orders.get(idx);
            (order.remaining_quantity(), order.status, order.price)
        };

        let resting = order_type == OrderType::Limit && remaining > 0 && !status.is_terminal();
        if resting {
            let level_idx = self.get_or_create_level(side, limit_price);
            self.levels.get_mut(level_idx).push_back(&mut self.orders, idx);
            trace!(id, price = limit_price, remaining, "order resting");
        } else if remaining > 0 && !status.is_terminal() {
            // Market/IOC residue cancels rather than rests.
            self.orders.get_mut(idx).status = OrderStatus::Cancelled;
        }

        let snapshot = self.orders.get(idx).snapshot();
        self.notify_order(&snapshot);
        if !resting {
            self.discard(idx, id);
        }

        let state = self.get_market_state();
        self.notify_state(&state);
        id
    }

    /// Reject path: emit the terminal update while the id still resolves,
    /// then free the order.
    fn finish_rejected(&mut self, idx: ArenaIndex, id: u64) -> u64 {
        self.orders.get_mut(idx).status = OrderStatus::Rejected;
        let snapshot = self.orders.get(idx).snapshot();
        self.notify_order(&snapshot);
        self.discard(idx, id);
        let state = self.get_market_state();
        self.notify_state(&state);
        id
    }

    // ========================================================================
    // Matching loop
    // ========================================================================

    /// Sweep the opposite side while the incoming order's price crosses.
    fn match_incoming(&mut self, incoming: ArenaIndex) {
        loop {
            let (side, limit, remaining) = {
                let order = self.orders.get(incoming);
                (order.side, order.price, order.remaining_quantity())
            };
            if remaining == 0 {
                break;
            }

            let best = match side {
                Side::Buy => self.asks.iter().next().map(|(&p, &l)| (p, l)),
                Side::Sell => self.bids.iter().next_back().map(|(&p, &l)| (p, l)),
            };
            let (best_price, level_idx) = match best {
                Some(entry) => entry,
                None => break,
            };

            let crosses = match side {
                Side::Buy => limit >= best_price,
                Side::Sell => limit <= best_price,
            };
            if !crosses {
                break;
            }

            let passive_idx = self.levels.get(level_idx).peek_head();
            debug_assert!(passive_idx != NULL_INDEX, "level exists iff non-empty");

            let match_qty = remaining.min(self.orders.get(passive_idx).remaining_quantity());
            self.execute_trade(passive_idx, incoming, match_qty, level_idx);
        }
    }

    /// Fill `quantity` between the head of a level and the incoming order.
    ///
    /// Emits `trade`, then `order_update` for both parties; a fully filled
    /// passive order is unlinked and freed, and its level destroyed when the
    /// queue empties.
    fn execute_trade(
        &mut self,
        passive_idx: ArenaIndex,
        aggressive_idx: ArenaIndex,
        quantity: u64,
        level_idx: ArenaIndex,
    ) {
        let timestamp_ns = self.now_ns();

        {
            let passive = self.orders.get_mut(passive_idx);
            passive.filled_quantity += quantity;
            passive.status = if passive.is_fully_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
        }
        {
            let aggressive = self.orders.get_mut(aggressive_idx);
            aggressive.filled_quantity += quantity;
            aggressive.status = if aggressive.is_fully_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
        }
        self.levels.get_mut(level_idx).reduce_quantity(quantity);

        let passive = *self.orders.get(passive_idx);
        let aggressive = *self.orders.get(aggressive_idx);
        let (buy_order_id, sell_order_id) = match passive.side {
            Side::Buy => (passive.id, aggressive.id),
            Side::Sell => (aggressive.id, passive.id),
        };
        let trade = Trade {
            buy_order_id,
            sell_order_id,
            price: passive.price,
            quantity,
            timestamp_ns,
        };

        self.record_trade_stats(trade.price, quantity);
        trace!(
            buy = buy_order_id,
            sell = sell_order_id,
            price = trade.price,
            quantity,
            "trade"
        );

        self.notify_trade(&trade);
        self.notify_order(&passive.snapshot());
        self.notify_order(&aggressive.snapshot());

        if passive.is_fully_filled() {
            let empty = self
                .levels
                .get_mut(level_idx)
                .remove(&mut self.orders, passive_idx);
            self.by_id.remove(&passive.id);
            self.orders.free(passive_idx);
            if empty {
                self.remove_level(passive.side, passive.price, level_idx);
            }
        }
    }

    /// Can a fill-or-kill order be covered entirely within its limit?
    fn fok_fillable(&self, side: Side, limit: i64, quantity: u64) -> bool {
        let mut available = 0u64;
        match side {
            Side::Buy => {
                for (&price, &level_idx) in self.asks.iter() {
                    if price > limit {
                        break;
                    }
                    available += self.levels.get(level_idx).total_quantity;
                    if available >= quantity {
                        return true;
                    }
                }
            }
            Side::Sell => {
                for (&price, &level_idx) in self.bids.iter().rev() {
                    if price < limit {
                        break;
                    }
                    available += self.levels.get(level_idx).total_quantity;
                    if available >= quantity {
                        return true;
                    }
                }
            }
        }
        available >= quantity
    }

    // ========================================================================
    // Cancel / modify
    // ========================================================================

    /// Cancel a resting order. Returns `false` when the id is unknown.
    pub fn cancel_order(&mut self, id: u64) -> bool {
        let idx = match self.by_id.get(&id) {
            Some(&idx) => idx,
            None => return false,
        };
        let (side, price) = {
            let order = self.orders.get(idx);
            (order.side, order.price)
        };

        // Every live order is linked into exactly one level between
        // operations.
        let level_idx = self.side_levels(side).get(&price).copied();
        if let Some(level_idx) = level_idx {
            let empty = self.levels.get_mut(level_idx).remove(&mut self.orders, idx);
            if empty {
                self.remove_level(side, price, level_idx);
            }
        }

        self.orders.get_mut(idx).status = OrderStatus::Cancelled;
        let snapshot = self.orders.get(idx).snapshot();
        debug!(id, "order cancelled");
        self.notify_order(&snapshot);
        self.discard(idx, id);
        true
    }

    /// Cancel-and-replace. The replacement keeps the original side and type
    /// but receives a fresh id and therefore loses time priority.
    pub fn modify_order(&mut self, id: u64, new_price: i64, new_quantity: u64) -> bool {
        let (side, order_type) = match self.by_id.get(&id) {
            Some(&idx) => {
                let order = self.orders.get(idx);
                (order.side, order.order_type)
            }
            None => return false,
        };
        self.cancel_order(id);
        self.add_order(new_price, new_quantity, side, order_type);
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Highest bid price with resting quantity.
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest ask price with resting quantity.
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    /// Integer mean of best bid and ask; `None` unless both sides rest.
    #[inline]
    pub fn mid_price(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2),
            _ => None,
        }
    }

    /// `best_ask - best_bid`; `None` unless both sides rest.
    #[inline]
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Best price on the opposite side of `side`.
    #[inline]
    fn best_opposite(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.best_ask(),
            Side::Sell => self.best_bid(),
        }
    }

    /// Total resting quantity at a price, zero when no level exists.
    pub fn volume_at_price(&self, price: i64, side: Side) -> u64 {
        self.side_levels(side)
            .get(&price)
            .map(|&idx| self.levels.get(idx).total_quantity)
            .unwrap_or(0)
    }

    /// Walk up to `depth` levels from the top of `side` outward.
    pub fn depth(&self, side: Side, depth: usize) -> Vec<(i64, u64)> {
        match side {
            Side::Buy => self
                .bids
                .iter()
                .rev()
                .take(depth)
                .map(|(&price, &idx)| (price, self.levels.get(idx).total_quantity))
                .collect(),
            Side::Sell => self
                .asks
                .iter()
                .take(depth)
                .map(|(&price, &idx)| (price, self.levels.get(idx).total_quantity))
                .collect(),
        }
    }

    /// Look up a live order by id.
    pub fn get_order(&self, id: u64) -> Option<OrderSnapshot> {
        self.by_id.get(&id).map(|&idx| self.orders.get(idx).snapshot())
    }

    /// Number of live orders.
    pub fn order_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Digest of top-of-book, live orders and cumulative volume, for
    /// golden-master determinism tests.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.best_bid().hash(&mut hasher);
        self.best_ask().hash(&mut hasher);
        self.by_id.len().hash(&mut hasher);
        self.orders.allocated().hash(&mut hasher);
        self.cum_volume.hash(&mut hasher);
        hasher.finish()
    }

    /// Remove every order and level and zero the trade statistics. The id
    /// counter keeps running so ids stay unique for the book's lifetime.
    pub fn clear(&mut self) {
        self.orders = Arena::new();
        self.levels = Arena::new();
        self.bids.clear();
        self.asks.clear();
        self.by_id.clear();
        self.recent_trades.clear();
        self.cum_volume = 0;
        self.cum_notional = 0;
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a trade listener. Listeners run synchronously, in
    /// registration order, on the submitting thread, and must not reenter
    /// the book.
    pub fn register_trade_callback(&mut self, callback: impl FnMut(&Trade) + 'static) {
        self.trade_listeners.push(Box::new(callback));
    }

    /// Register an order-update listener. Same delivery contract as
    /// [`register_trade_callback`](Self::register_trade_callback).
    pub fn register_order_callback(&mut self, callback: impl FnMut(&OrderSnapshot) + 'static) {
        self.order_listeners.push(Box::new(callback));
    }

    /// Register a market-state listener, invoked after every submission.
    pub fn register_state_callback(&mut self, callback: impl FnMut(&MarketState) + 'static) {
        self.state_listeners.push(Box::new(callback));
    }

    fn notify_trade(&mut self, trade: &Trade) {
        for listener in &mut self.trade_listeners {
            listener(trade);
        }
    }

    fn notify_order(&mut self, snapshot: &OrderSnapshot) {
        for listener in &mut self.order_listeners {
            listener(snapshot);
        }
    }

    fn notify_state(&mut self, state: &MarketState) {
        for listener in &mut self.state_listeners {
            listener(state);
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    pub(crate) fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn side_levels(&self, side: Side) -> &BTreeMap<i64, ArenaIndex> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn get_or_create_level(&mut self, side: Side, price: i64) -> ArenaIndex {
        let existing = self.side_levels(side).get(&price).copied();
        if let Some(idx) = existing {
            return idx;
        }
        let idx = self.levels.alloc(PriceLevel::new(price));
        match side {
            Side::Buy => self.bids.insert(price, idx),
            Side::Sell => self.asks.insert(price, idx),
        };
        idx
    }

    fn remove_level(&mut self, side: Side, price: i64, level_idx: ArenaIndex) {
        match side {
            Side::Buy => self.bids.remove(&price),
            Side::Sell => self.asks.remove(&price),
        };
        self.levels.free(level_idx);
    }

    fn discard(&mut self, idx: ArenaIndex, id: u64) {
        self.by_id.remove(&id);
        self.orders.free(idx);
    }

    fn record_trade_stats(&mut self, price: i64, quantity: u64) {
        if self.recent_trades.len() == MAX_RECENT_TRADES {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back((price, quantity));
        self.cum_volume += quantity;
        self.cum_notional += price as i128 * quantity as i128;
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.by_id.len())
            .finish()
    }
}
