//! Core order-book domain types.
//!
//! Prices are signed 64-bit tick counts; quantities are unsigned 64-bit.
//! Monetary values never touch floating point on the matching path.

use serde::{Deserialize, Serialize};

use crate::arena::{ArenaIndex, NULL_INDEX};

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type determines matching behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    /// Rests in the book if not fully matched (default).
    #[default]
    Limit = 0,
    /// Matches at the best opposite price; any remainder is cancelled.
    Market = 1,
    /// Immediate-or-cancel: fill what crosses now, cancel the rest.
    Ioc = 2,
    /// Fill-or-kill: all-or-nothing, rejected if it cannot fill in full.
    Fok = 3,
}

/// Lifecycle state of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    New = 0,
    PartiallyFilled = 1,
    Filled = 2,
    Cancelled = 3,
    Rejected = 4,
}

impl OrderStatus {
    /// A terminal order never fills again and is no longer in the book.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A live order as stored in the order pool.
///
/// The `prev`/`next` fields are intrusive FIFO links into the order's
/// resident price level; they are `NULL_INDEX` while the order is not
/// resting.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub id: u64,
    /// Limit price in ticks.
    pub price: i64,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Nanoseconds since the owning book's epoch; observability only,
    /// priority is positional.
    pub timestamp_ns: u64,
    pub(crate) prev: ArenaIndex,
    pub(crate) next: ArenaIndex,
}

impl Order {
    pub(crate) fn new(
        id: u64,
        price: i64,
        quantity: u64,
        side: Side,
        order_type: OrderType,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            id,
            price,
            quantity,
            filled_quantity: 0,
            side,
            order_type,
            status: OrderStatus::New,
            timestamp_ns,
            prev: NULL_INDEX,
            next: NULL_INDEX,
        }
    }

    /// Quantity still open.
    #[inline]
    pub const fn remaining_quantity(&self) -> u64 {
        self.quantity - self.filled_quantity
    }

    #[inline]
    pub const fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Copy of the order's observable fields.
    #[inline]
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            price: self.price,
            quantity: self.quantity,
            filled_quantity: self.filled_quantity,
            side: self.side,
            order_type: self.order_type,
            status: self.status,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// Observable view of an order: the `order_update` payload and the
/// `get_order` return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: u64,
    pub price: i64,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub timestamp_ns: u64,
}

impl OrderSnapshot {
    /// Quantity still open.
    #[inline]
    pub const fn remaining_quantity(&self) -> u64 {
        self.quantity - self.filled_quantity
    }
}

/// An executed match between a buy and a sell order.
///
/// The ids are resolved by each party's side, not by arrival order; the
/// price is always the passive order's price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub price: i64,
    pub quantity: u64,
    pub timestamp_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_type_default() {
        assert_eq!(OrderType::default(), OrderType::Limit);
    }

    #[test]
    fn test_remaining_quantity() {
        let mut order = Order::new(1, 10000, 500, Side::Buy, OrderType::Limit, 0);
        assert_eq!(order.remaining_quantity(), 500);
        assert!(!order.is_fully_filled());

        order.filled_quantity = 200;
        assert_eq!(order.remaining_quantity(), 300);

        order.filled_quantity = 500;
        assert_eq!(order.remaining_quantity(), 0);
        assert!(order.is_fully_filled());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_snapshot_mirrors_order() {
        let mut order = Order::new(7, 9990, 100, Side::Sell, OrderType::Ioc, 42);
        order.filled_quantity = 60;
        order.status = OrderStatus::PartiallyFilled;

        let snap = order.snapshot();
        assert_eq!(snap.id, 7);
        assert_eq!(snap.price, 9990);
        assert_eq!(snap.remaining_quantity(), 40);
        assert_eq!(snap.status, OrderStatus::PartiallyFilled);
        assert_eq!(snap.timestamp_ns, 42);
    }
}
