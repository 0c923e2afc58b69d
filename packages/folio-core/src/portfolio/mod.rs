//! Portfolio management module.
//!
//! Provides position tracking, valuation, value history, performance and
//! risk analytics.

mod history;
mod merge;
mod performance;
mod risk;
mod tracker;
mod valuation;

pub use history::build_history;
pub use merge::{merge_position, parse_amount, NewLot};
pub use performance::{
    holding_period_return, windowed_return, ytd_return, PortfolioPerformance,
};
pub use risk::{
    benchmark_risk, daily_returns, daily_risk_free, exclude_crypto, manual_sharpe, sample_std,
    sharpe_from_history, Benchmark, BenchmarkClass, BenchmarkModel, BenchmarkRisk, EmpiricalRisk,
    MIN_HISTORY_POINTS, TRADING_DAYS,
};
pub use tracker::{PortfolioTracker, PositionEdit};
pub use valuation::{cash_in_base, display_order, value_positions, CASH_MATERIALITY};
