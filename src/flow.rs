//! Synthetic order-flow generator.
//!
//! Drives a book with Poisson-arriving random limit orders for training and
//! backtests: Bernoulli sides, normally distributed prices around a base
//! price pushed half a spread away from mid, exponentially distributed
//! sizes. Seeded explicitly so runs replay bit-for-bit.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal, Poisson};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::book::OrderBook;
use crate::order::{OrderType, Side};

/// Flow parameters. Loadable from any serde format; every field has a
/// default.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Center of the generated price distribution, in ticks.
    pub base_price: i64,
    /// Relative standard deviation of the price offset.
    pub volatility: f64,
    /// Order arrivals per microsecond.
    pub arrival_rate: f64,
    /// Full spread width as a fraction of the base price; buys land half of
    /// it below mid, sells half above.
    pub spread_width: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            base_price: 1_000_000,
            volatility: 0.01,
            arrival_rate: 100.0,
            spread_width: 0.01,
        }
    }
}

/// Mean size before the 10_000 multiplier and 100 floor.
const SIZE_RATE: f64 = 1.0 / 1000.0;
const SIZE_SCALE: f64 = 10_000.0;
const MIN_SIZE: u64 = 100;

/// Seeded random limit-order generator.
pub struct SyntheticFlow {
    config: FlowConfig,
    rng: ChaCha8Rng,
    price_dist: Normal<f64>,
    size_dist: Exp<f64>,
}

impl SyntheticFlow {
    /// Create a generator with a deterministic seed.
    ///
    /// # Panics
    /// Panics when `volatility` is negative or not finite.
    pub fn new(config: FlowConfig, seed: u64) -> Self {
        let price_dist =
            Normal::new(0.0, config.volatility).expect("volatility must be finite and >= 0");
        let size_dist = Exp::new(SIZE_RATE).expect("size rate is positive");
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            price_dist,
            size_dist,
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Submit `num_orders` random limit orders to `book`.
    pub fn simulate_step(&mut self, book: &mut OrderBook, num_orders: usize) {
        for _ in 0..num_orders {
            let side = if self.rng.gen_bool(0.5) {
                Side::Buy
            } else {
                Side::Sell
            };

            let offset = self.price_dist.sample(&mut self.rng);
            let mut price =
                self.config.base_price + (offset * self.config.base_price as f64) as i64;

            let half_spread =
                (self.config.spread_width * self.config.base_price as f64 / 2.0) as i64;
            match side {
                Side::Buy => price -= half_spread,
                Side::Sell => price += half_spread,
            }

            let size = ((self.size_dist.sample(&mut self.rng) * SIZE_SCALE) as u64).max(MIN_SIZE);

            trace!(?side, price, size, "synthetic order");
            book.add_order(price, size, side, OrderType::Limit);
        }
    }

    /// Advance simulated time: draws the arrival count from
    /// `Poisson(arrival_rate · microseconds)` and submits that many orders.
    pub fn simulate_microseconds(&mut self, book: &mut OrderBook, microseconds: u64) {
        let expected = self.config.arrival_rate * microseconds as f64;
        if expected <= 0.0 {
            return;
        }
        let num_orders = Poisson::new(expected)
            .expect("expected arrivals is positive")
            .sample(&mut self.rng) as usize;
        self.simulate_step(book, num_orders);
    }
}
