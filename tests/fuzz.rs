//! Randomized comparison of the engine against a naive reference book.
//!
//! The reference models resting liquidity as sorted vectors and is slow but
//! obviously correct; the engine must agree with it on best prices, live
//! order counts and traded volume over long random command streams.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use microlob::{OrderBook, OrderType, Side};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Slow reference implementation for verification.
struct ReferenceBook {
    bids: BTreeMap<i64, Vec<(u64, u64)>>, // price -> [(order_id, qty)]
    asks: BTreeMap<i64, Vec<(u64, u64)>>,
    orders: HashMap<u64, (Side, i64)>,
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    fn best_bid(&self) -> Option<i64> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<i64> {
        self.asks.keys().next().copied()
    }

    fn place(&mut self, order_id: u64, side: Side, price: i64, mut qty: u64) -> u64 {
        let mut traded = 0u64;

        match side {
            Side::Buy => {
                let mut exhausted = Vec::new();
                for (&ask_price, orders) in self.asks.iter_mut() {
                    if ask_price > price || qty == 0 {
                        break;
                    }
                    while !orders.is_empty() && qty > 0 {
                        let fill = orders[0].1.min(qty);
                        orders[0].1 -= fill;
                        qty -= fill;
                        traded += fill;
                        if orders[0].1 == 0 {
                            let (maker_id, _) = orders.remove(0);
                            self.orders.remove(&maker_id);
                        }
                    }
                    if orders.is_empty() {
                        exhausted.push(ask_price);
                    }
                }
                for price in exhausted {
                    self.asks.remove(&price);
                }

                if qty > 0 {
                    self.bids.entry(price).or_default().push((order_id, qty));
                    self.orders.insert(order_id, (Side::Buy, price));
                }
            }
            Side::Sell => {
                let mut exhausted = Vec::new();
                let prices: Vec<i64> = self.bids.keys().rev().copied().collect();
                for bid_price in prices {
                    if bid_price < price || qty == 0 {
                        break;
                    }
                    let orders = self.bids.get_mut(&bid_price).unwrap();
                    while !orders.is_empty() && qty > 0 {
                        let fill = orders[0].1.min(qty);
                        orders[0].1 -= fill;
                        qty -= fill;
                        traded += fill;
                        if orders[0].1 == 0 {
                            let (maker_id, _) = orders.remove(0);
                            self.orders.remove(&maker_id);
                        }
                    }
                    if orders.is_empty() {
                        exhausted.push(bid_price);
                    }
                }
                for price in exhausted {
                    self.bids.remove(&price);
                }

                if qty > 0 {
                    self.asks.entry(price).or_default().push((order_id, qty));
                    self.orders.insert(order_id, (Side::Sell, price));
                }
            }
        }

        traded
    }

    fn cancel(&mut self, order_id: u64) -> bool {
        if let Some((side, price)) = self.orders.remove(&order_id) {
            let book = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            if let Some(orders) = book.get_mut(&price) {
                orders.retain(|&(id, _)| id != order_id);
                if orders.is_empty() {
                    book.remove(&price);
                }
            }
            true
        } else {
            false
        }
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

struct RandomOrder {
    side: Side,
    price: i64,
    qty: u64,
}

fn random_order(rng: &mut ChaCha8Rng) -> RandomOrder {
    RandomOrder {
        side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
        price: rng.gen_range(9800..10200) * 100,
        qty: rng.gen_range(1..200),
    }
}

fn traded_volume_recorder(book: &mut OrderBook) -> Rc<RefCell<u64>> {
    let volume = Rc::new(RefCell::new(0u64));
    let sink = Rc::clone(&volume);
    book.register_trade_callback(move |t| *sink.borrow_mut() += t.quantity);
    volume
}

#[test]
fn fuzz_best_prices_match_reference() {
    const SEED: u64 = 0xFEEDFACE;
    const OPS: usize = 10_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut book = OrderBook::new();
    let mut reference = ReferenceBook::new();
    let mut active: Vec<u64> = Vec::new();

    for i in 0..OPS {
        // 70% place, 30% cancel
        if active.is_empty() || rng.gen_bool(0.7) {
            let order = random_order(&mut rng);
            let id = book.add_order(order.price, order.qty, order.side, OrderType::Limit);
            reference.place(id, order.side, order.price, order.qty);
            if book.get_order(id).is_some() {
                active.push(id);
            }
        } else {
            let idx = rng.gen_range(0..active.len());
            let id = active.swap_remove(idx);
            assert_eq!(book.cancel_order(id), reference.cancel(id));
        }

        assert_eq!(
            book.best_bid(),
            reference.best_bid(),
            "best bid diverged at op {i}"
        );
        assert_eq!(
            book.best_ask(),
            reference.best_ask(),
            "best ask diverged at op {i}"
        );

        // Non-crossing invariant holds after every operation.
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book crossed at op {i}: bid {bid} >= ask {ask}");
        }
    }
}

#[test]
fn fuzz_order_counts_match_reference() {
    const SEED: u64 = 0xBADC0DE;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut book = OrderBook::new();
    let mut reference = ReferenceBook::new();
    let mut active: Vec<u64> = Vec::new();

    for i in 0..OPS {
        if active.is_empty() || rng.gen_bool(0.6) {
            let order = random_order(&mut rng);
            let id = book.add_order(order.price, order.qty, order.side, OrderType::Limit);
            reference.place(id, order.side, order.price, order.qty);
            if book.get_order(id).is_some() {
                active.push(id);
            }
        } else {
            let idx = rng.gen_range(0..active.len());
            let id = active.swap_remove(idx);
            book.cancel_order(id);
            reference.cancel(id);
        }

        if i % 100 == 0 {
            assert_eq!(
                book.order_count(),
                reference.order_count(),
                "order count diverged at op {i}"
            );
        }
    }

    assert_eq!(book.order_count(), reference.order_count());
}

#[test]
fn fuzz_traded_volume_matches_reference() {
    const SEED: u64 = 0x12345678;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut book = OrderBook::new();
    let volume = traded_volume_recorder(&mut book);
    let mut reference = ReferenceBook::new();
    let mut reference_traded = 0u64;

    for _ in 0..OPS {
        let order = random_order(&mut rng);
        let id = book.add_order(order.price, order.qty, order.side, OrderType::Limit);
        reference_traded += reference.place(id, order.side, order.price, order.qty);
    }

    assert_eq!(*volume.borrow(), reference_traded);
}

#[test]
fn fuzz_depth_matches_reference_levels() {
    const SEED: u64 = 0xA5A5A5A5;
    const OPS: usize = 3_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut book = OrderBook::new();
    let mut reference = ReferenceBook::new();

    for _ in 0..OPS {
        let order = random_order(&mut rng);
        let id = book.add_order(order.price, order.qty, order.side, OrderType::Limit);
        reference.place(id, order.side, order.price, order.qty);
    }

    let ref_bids: Vec<(i64, u64)> = reference
        .bids
        .iter()
        .rev()
        .map(|(&p, orders)| (p, orders.iter().map(|&(_, q)| q).sum()))
        .collect();
    let ref_asks: Vec<(i64, u64)> = reference
        .asks
        .iter()
        .map(|(&p, orders)| (p, orders.iter().map(|&(_, q)| q).sum()))
        .collect();

    assert_eq!(book.depth(Side::Buy, usize::MAX), ref_bids);
    assert_eq!(book.depth(Side::Sell, usize::MAX), ref_asks);
}
