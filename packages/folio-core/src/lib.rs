//! Folio Core - Portfolio valuation and analytics engine.
//!
//! This crate turns a set of holdings and external market data into:
//!
//! - **Valuation**: net asset value in a display currency, with cash in
//!   several currencies consolidated through live FX
//! - **History**: a daily portfolio value series rebuilt from price history
//! - **Risk**: empirical Sharpe ratio and volatility from that series, and a
//!   separate benchmark-weighted estimate from asset-class composition
//! - **Performance**: YTD and arbitrary-window returns
//! - **Position merging**: weighted-average cost basis on repeated buys
//!
//! Market data comes in through the [`market::QuoteProvider`] and
//! [`market::HistoryProvider`] traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use folio_core::engine::AnalyticsEngine;
//! use folio_core::market::MarketSnapshot;
//! use folio_core::portfolio::PortfolioTracker;
//! use folio_core::EngineConfig;
//!
//! let market = MarketSnapshot::load("market.json".as_ref()).unwrap();
//! let tracker = PortfolioTracker::new();
//! let config = EngineConfig::default();
//!
//! let engine = AnalyticsEngine::new(&market, &market, &config);
//! let report = engine.run(tracker.get(), chrono::Local::now().date_naive());
//! println!("Total: {:.2} {}", report.snapshot.total_display, report.snapshot.display_currency);
//! ```

pub mod config;
pub mod engine;
pub mod market;
pub mod portfolio;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use types::{
    ApiResponse, AssetClass, CashLedger, FxRates, PortfolioSnapshot, Position, PriceSource,
    ValuePoint,
};

// Re-export main functionality
pub use portfolio::{
    benchmark_risk, build_history, manual_sharpe, merge_position, sharpe_from_history,
    value_positions, windowed_return, ytd_return, BenchmarkModel, PortfolioTracker,
};

/// Error types for folio-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for folio-core operations.
pub type Result<T> = std::result::Result<T, Error>;
