//! Simulation demo: synthetic Poisson flow drives the book while a trivial
//! imbalance-following agent trades against it.
//!
//! Run with `RUST_LOG=debug` for per-fill detail.

use microlob::{
    Action, EnvConfig, EquityCurve, FlowConfig, OrderBook, SyntheticFlow, TradingEnv,
};
use rust_decimal::prelude::ToPrimitive;
use tracing::info;
use tracing_subscriber::EnvFilter;

const STEPS: usize = 1_000;
const ORDER_QTY: u64 = 100;
const FLOW_SEED: u64 = 0xFEED5EED;

/// Lean against the short-term imbalance, flatten oversized inventory.
fn choose_action(imbalance: f64, position: i64, step: usize) -> Action {
    if step % 20 == 19 {
        return Action::CancelAll;
    }
    if position > 300 {
        return Action::SellMarket;
    }
    if position < -300 {
        return Action::BuyMarket;
    }
    if imbalance > 0.2 {
        return Action::BuyLimitAtBid;
    }
    if imbalance < -0.2 {
        return Action::SellLimitAtAsk;
    }
    Action::Hold
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flow_config = FlowConfig::default();
    let mut flow = SyntheticFlow::new(flow_config, FLOW_SEED);
    let mut env = TradingEnv::new(OrderBook::new(), EnvConfig::default());

    // Warm the book up before the agent starts.
    flow.simulate_step(env.book_mut(), 200);
    info!(
        best_bid = ?env.book().best_bid(),
        best_ask = ?env.book().best_ask(),
        orders = env.book().order_count(),
        "book seeded"
    );

    let initial_equity = env.portfolio_value().to_f64().unwrap_or(0.0);
    let mut curve = EquityCurve::new(initial_equity);
    let mut reward_sum = 0.0;

    for step in 0..STEPS {
        flow.simulate_microseconds(env.book_mut(), 1);

        let observation = env.get_observation();
        let action = choose_action(
            observation.market_state.order_flow_imbalance,
            observation.position.quantity,
            step,
        );

        let reward = env.execute_action(action, ORDER_QTY);
        reward_sum += reward.total;
        curve.record(env.portfolio_value().to_f64().unwrap_or(0.0));

        if step % 100 == 99 {
            let state = env.book().get_market_state();
            info!(
                step,
                mid = state.mid_price,
                spread = state.spread,
                imbalance = state.order_flow_imbalance,
                vwap = state.vwap,
                position = env.position().quantity,
                "progress"
            );
        }
    }

    let metrics = curve.metrics();
    info!(
        trades = env.total_trades(),
        volume = env.total_volume(),
        realized_pnl = %env.position().realized_pnl,
        cash = %env.cash(),
        reward_sum,
        "agent summary"
    );
    info!(
        total_return = metrics.total_return,
        sharpe = metrics.sharpe_ratio,
        sortino = metrics.sortino_ratio,
        max_drawdown = metrics.max_drawdown,
        "backtest metrics"
    );
}
