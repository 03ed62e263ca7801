//! Golden-master determinism: identical command streams must produce
//! identical event streams and final book state on every run.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use microlob::{FlowConfig, OrderBook, OrderType, Side, SyntheticFlow};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Copy)]
enum Op {
    Place { price: i64, qty: u64, side: Side },
    Cancel { id: u64 },
}

/// Deterministic command stream. Ids are predictable because the book
/// assigns them monotonically from 1 per submission.
fn generate_ops(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ops = Vec::with_capacity(count);
    let mut active: Vec<u64> = Vec::new();
    let mut next_id = 1u64;

    for _ in 0..count {
        // 70% place, 30% cancel
        if active.is_empty() || rng.gen_bool(0.7) {
            ops.push(Op::Place {
                price: rng.gen_range(9500..10500) * 100,
                qty: rng.gen_range(1..500),
                side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
            });
            active.push(next_id);
            next_id += 1;
        } else {
            let idx = rng.gen_range(0..active.len());
            let id = active.swap_remove(idx);
            ops.push(Op::Cancel { id });
        }
    }

    ops
}

/// Run the stream against a fresh book, recording every emitted event and
/// hashing the record (timestamps excluded; they are wall-clock
/// observability fields).
fn run_ops(ops: &[Op]) -> (u64, u64) {
    let mut book = OrderBook::new();
    let trades: Rc<RefCell<Vec<(u64, u64, i64, u64)>>> = Rc::new(RefCell::new(Vec::new()));
    let updates: Rc<RefCell<Vec<(u64, u8, u64)>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&trades);
    book.register_trade_callback(move |t| {
        sink.borrow_mut()
            .push((t.buy_order_id, t.sell_order_id, t.price, t.quantity));
    });
    let sink = Rc::clone(&updates);
    book.register_order_callback(move |u| {
        sink.borrow_mut().push((u.id, u.status as u8, u.filled_quantity));
    });

    for op in ops {
        match *op {
            Op::Place { price, qty, side } => {
                book.add_order(price, qty, side, OrderType::Limit);
            }
            Op::Cancel { id } => {
                book.cancel_order(id);
            }
        }
    }

    let mut hasher = DefaultHasher::new();
    trades.borrow().hash(&mut hasher);
    updates.borrow().hash(&mut hasher);
    (hasher.finish(), book.state_hash())
}

#[test]
fn determinism_small() {
    const SEED: u64 = 0xDEADBEEF;
    const COUNT: usize = 1_000;
    const RUNS: usize = 10;

    let ops = generate_ops(SEED, COUNT);
    let (first_events, first_state) = run_ops(&ops);

    for run in 1..RUNS {
        let (events, state) = run_ops(&ops);
        assert_eq!(events, first_events, "event hash mismatch on run {run}");
        assert_eq!(state, first_state, "state hash mismatch on run {run}");
    }
}

#[test]
fn determinism_large() {
    const SEED: u64 = 0xCAFEBABE;
    const COUNT: usize = 100_000;
    const RUNS: usize = 3;

    let ops = generate_ops(SEED, COUNT);
    let (first_events, first_state) = run_ops(&ops);

    for run in 1..RUNS {
        let (events, state) = run_ops(&ops);
        assert_eq!(events, first_events, "event hash mismatch on run {run}");
        assert_eq!(state, first_state, "state hash mismatch on run {run}");
    }
}

#[test]
fn different_seeds_diverge() {
    let (hash_a, _) = run_ops(&generate_ops(1, 1_000));
    let (hash_b, _) = run_ops(&generate_ops(2, 1_000));
    assert_ne!(hash_a, hash_b);
}

#[test]
fn synthetic_flow_replays_identically() {
    let run = |seed: u64| {
        let mut book = OrderBook::new();
        let mut flow = SyntheticFlow::new(FlowConfig::default(), seed);
        for _ in 0..50 {
            flow.simulate_microseconds(&mut book, 2);
        }
        book.state_hash()
    };

    assert_eq!(run(99), run(99));
    assert_ne!(run(99), run(100));
}
