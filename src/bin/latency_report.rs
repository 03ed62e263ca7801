//! Latency percentile report for order submission.
//!
//! Pre-generates order parameters, warms the pools and branch predictors,
//! then measures `add_order` wall time into an HDR histogram.

use hdrhistogram::Histogram;
use microlob::{OrderBook, OrderType, Side};
use std::time::Instant;

const ITERATIONS: usize = 1_000_000;
const BUFFER_SIZE: usize = 10_000;
const WARMUP_OPS: usize = 10_000;

fn main() {
    println!("Preparing latency benchmark...");

    let mut book = OrderBook::new();
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3).unwrap();

    // Alternating sides over a 100-tick band: roughly half the submissions
    // cross, so the book stays small and both code paths stay hot.
    println!("Pre-generating {BUFFER_SIZE} orders...");
    let orders: Vec<(i64, u64, Side)> = (0..BUFFER_SIZE)
        .map(|i| {
            let price = 10_000 + (i as i64 % 100);
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            (price, 10, side)
        })
        .collect();

    println!("Warming up ({WARMUP_OPS} ops)...");
    for &(price, qty, side) in orders.iter().cycle().take(WARMUP_OPS) {
        std::hint::black_box(book.add_order(price, qty, side, OrderType::Limit));
    }

    println!("Running {ITERATIONS} iterations...");
    let mut total_duration = std::time::Duration::ZERO;

    for &(price, qty, side) in orders.iter().cycle().take(ITERATIONS) {
        let start = Instant::now();
        std::hint::black_box(book.add_order(price, qty, side, OrderType::Limit));
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {ITERATIONS}");
    println!(
        "Throughput: {:.2} ops/sec",
        ITERATIONS as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");
    println!("Final book: {:?}", book);
}
