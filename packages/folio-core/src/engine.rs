//! Analytics engine: one full valuation, history and risk pass.
//!
//! Providers are injected per engine; there is no global state. Every pass is
//! pure given the portfolio and what the providers return, so an engine can
//! be shared across threads and re-run freely.

use crate::config::EngineConfig;
use crate::market::{FxResolver, HistoryProvider, QuoteProvider};
use crate::portfolio::{
    benchmark_risk, build_history, exclude_crypto, manual_sharpe, sharpe_from_history,
    value_positions, windowed_return, ytd_return, BenchmarkRisk, EmpiricalRisk,
    PortfolioPerformance,
};
use crate::types::{FxRates, Portfolio, PortfolioSnapshot, Position, ValuePoint, BASE_CURRENCY};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Everything computed in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub snapshot: PortfolioSnapshot,
    pub performance: PortfolioPerformance,
    /// Daily portfolio value in the display currency, cash included
    pub history: Vec<ValuePoint>,
    pub ytd_return: f64,
    /// Empirical risk of the held assets, in base currency
    pub risk: EmpiricalRisk,
    /// Same, with crypto holdings removed
    pub risk_ex_crypto: EmpiricalRisk,
    /// Benchmark-weighted estimate from the current composition
    pub benchmark: BenchmarkRisk,
    /// Sharpe ratio from the user's stored return and volatility inputs
    pub manual_sharpe: f64,
    /// FX rates were cached or hardcoded rather than live
    pub fx_stale: bool,
}

impl AnalyticsReport {
    /// Return of the display series since `baseline`.
    pub fn return_since(&self, baseline: NaiveDate) -> f64 {
        windowed_return(&self.history, baseline)
    }
}

/// Runs analytics passes against injected providers.
pub struct AnalyticsEngine<'a> {
    quotes: &'a dyn QuoteProvider,
    history: &'a dyn HistoryProvider,
    config: &'a EngineConfig,
}

impl<'a> AnalyticsEngine<'a> {
    pub fn new(
        quotes: &'a dyn QuoteProvider,
        history: &'a dyn HistoryProvider,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            quotes,
            history,
            config,
        }
    }

    /// FX resolver configured with this engine's fallback table.
    pub fn fx_resolver(&self) -> FxResolver {
        FxResolver::new()
            .with_fallback(self.config.fx_fallback.clone())
            .with_freshness_secs(self.config.fx_freshness_secs)
    }

    /// Run a pass, resolving FX rates from the quote provider.
    ///
    /// Callers that keep a long-lived [`FxResolver`] across passes should
    /// resolve themselves and call [`AnalyticsEngine::run_with_fx`].
    pub fn run(&self, portfolio: &Portfolio, today: NaiveDate) -> AnalyticsReport {
        let fx = self.fx_resolver().resolve(self.quotes);
        self.run_with_fx(portfolio, &fx, today)
    }

    /// Run a pass with already resolved FX rates.
    pub fn run_with_fx(
        &self,
        portfolio: &Portfolio,
        fx: &FxRates,
        today: NaiveDate,
    ) -> AnalyticsReport {
        let settings = &portfolio.settings;
        tracing::debug!(
            "Analytics pass: {} positions, display {}",
            portfolio.positions.len(),
            settings.display_currency
        );

        let snapshot = self.value(portfolio, fx);
        let window = self.config.history_window();

        let history = build_history(
            &portfolio.positions,
            snapshot.cash_base,
            self.history,
            &window,
            fx,
            &settings.display_currency,
        );

        let risk = self.empirical_risk(&portfolio.positions, settings.risk_free_rate);
        let risk_ex_crypto =
            self.empirical_risk(&exclude_crypto(&portfolio.positions), settings.risk_free_rate);

        let benchmark = benchmark_risk(&snapshot.positions, &self.config.benchmarks);
        let manual = manual_sharpe(
            settings.risk_inputs.roi,
            settings.risk_inputs.volatility,
            settings.risk_free_rate,
        );

        AnalyticsReport {
            performance: PortfolioPerformance::from_snapshot(&snapshot),
            ytd_return: ytd_return(&history, today),
            history,
            risk,
            risk_ex_crypto,
            benchmark,
            manual_sharpe: manual,
            fx_stale: snapshot.fx_stale,
            snapshot,
        }
    }

    /// Valuation only.
    pub fn value(&self, portfolio: &Portfolio, fx: &FxRates) -> PortfolioSnapshot {
        value_positions(
            &portfolio.positions,
            self.quotes,
            &portfolio.cash,
            fx,
            &portfolio.settings.display_currency,
            self.config.cash_materiality,
        )
    }

    /// Empirical risk of the assets alone, valued in base currency.
    fn empirical_risk(&self, positions: &[Position], risk_free_rate: f64) -> EmpiricalRisk {
        let series = build_history(
            positions,
            0.0,
            self.history,
            &self.config.history_window(),
            &FxRates::default(),
            BASE_CURRENCY,
        );
        sharpe_from_history(&series, risk_free_rate)
    }
}
