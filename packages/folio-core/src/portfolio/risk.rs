//! Portfolio risk metrics.
//!
//! Two independent models are provided and both are reported:
//!
//! - an empirical Sharpe ratio and volatility computed from the portfolio's
//!   actual value history ([`sharpe_from_history`]),
//! - a benchmark-weighted estimate computed from static per-class return and
//!   volatility assumptions weighted by current value ([`benchmark_risk`]).

use crate::types::{AssetClass, Position, ValuePoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trading days per year used to annualize daily figures.
pub const TRADING_DAYS: f64 = 252.0;

/// Minimum number of positive points before a Sharpe ratio is computed.
pub const MIN_HISTORY_POINTS: usize = 5;

/// Risk figures derived from a value series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalRisk {
    /// Annualized Sharpe ratio
    pub sharpe: f64,
    /// Annualized volatility of daily returns
    pub annual_volatility: f64,
    /// The series the figures were computed from (strictly positive points)
    pub series: Vec<ValuePoint>,
}

/// Simple day-over-day returns.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sample standard deviation (n - 1 denominator). 0 for fewer than 2 values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Geometric de-annualization of an annual rate.
pub fn daily_risk_free(annual_rate: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / TRADING_DAYS) - 1.0
}

/// Empirical Sharpe ratio and annualized volatility of a value series.
///
/// Leading zero-value points (before the portfolio held anything) and any
/// other non-positive points are discarded first. Fewer than
/// [`MIN_HISTORY_POINTS`] remaining points give an all-zero result with an
/// empty series; zero variance gives zero figures with the filtered series.
///
/// # Arguments
///
/// * `series` - Portfolio value series, ascending by date
/// * `risk_free_rate` - Annual risk-free rate (e.g., 0.045 for 4.5%)
pub fn sharpe_from_history(series: &[ValuePoint], risk_free_rate: f64) -> EmpiricalRisk {
    let series: Vec<ValuePoint> = series
        .iter()
        .filter(|p| p.value.is_finite() && p.value > 0.0)
        .copied()
        .collect();

    if series.len() < MIN_HISTORY_POINTS {
        tracing::debug!("Only {} positive points, skipping Sharpe", series.len());
        return EmpiricalRisk::default();
    }

    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let returns = daily_returns(&values);
    let std = sample_std(&returns);

    if returns.is_empty() || std == 0.0 {
        return EmpiricalRisk {
            sharpe: 0.0,
            annual_volatility: 0.0,
            series,
        };
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let daily_rf = daily_risk_free(risk_free_rate);

    EmpiricalRisk {
        sharpe: (mean - daily_rf) / std * TRADING_DAYS.sqrt(),
        annual_volatility: std * TRADING_DAYS.sqrt(),
        series,
    }
}

/// Holdings without crypto: class Crypto or a ticker containing `BTC`.
pub fn exclude_crypto(positions: &[Position]) -> Vec<Position> {
    positions
        .iter()
        .filter(|p| !p.is_crypto())
        .cloned()
        .collect()
}

/// Expected annual return and volatility for one benchmark class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub roi: f64,
    pub volatility: f64,
}

impl Benchmark {
    pub const fn new(roi: f64, volatility: f64) -> Self {
        Self { roi, volatility }
    }
}

/// Classes of the benchmark table. Every asset class maps onto one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BenchmarkClass {
    Crypto,
    Stock,
    Bond,
    Cash,
    Other,
}

impl From<AssetClass> for BenchmarkClass {
    fn from(class: AssetClass) -> Self {
        match class {
            AssetClass::Crypto => Self::Crypto,
            AssetClass::Stock | AssetClass::Etf => Self::Stock,
            AssetClass::Bond => Self::Bond,
            AssetClass::Cash => Self::Cash,
            AssetClass::Other | AssetClass::Future | AssetClass::Index => Self::Other,
        }
    }
}

/// Static per-class return and volatility assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkModel {
    pub crypto: Benchmark,
    pub stock: Benchmark,
    pub bond: Benchmark,
    pub cash: Benchmark,
    pub other: Benchmark,
    /// Risk-free rate used by this model only
    pub risk_free_rate: f64,
}

impl Default for BenchmarkModel {
    fn default() -> Self {
        Self {
            crypto: Benchmark::new(0.70, 0.60),
            stock: Benchmark::new(0.12, 0.20),
            bond: Benchmark::new(0.04, 0.08),
            cash: Benchmark::new(0.035, 0.0),
            other: Benchmark::new(0.05, 0.10),
            risk_free_rate: 0.035,
        }
    }
}

impl BenchmarkModel {
    /// Assumptions for an asset class.
    pub fn benchmark(&self, class: AssetClass) -> Benchmark {
        match BenchmarkClass::from(class) {
            BenchmarkClass::Crypto => self.crypto,
            BenchmarkClass::Stock => self.stock,
            BenchmarkClass::Bond => self.bond,
            BenchmarkClass::Cash => self.cash,
            BenchmarkClass::Other => self.other,
        }
    }
}

/// Output of the benchmark-weighted model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRisk {
    pub weighted_roi: f64,
    pub weighted_volatility: f64,
    pub sharpe: f64,
    /// Value weight per benchmark class
    pub composition: BTreeMap<BenchmarkClass, f64>,
}

/// Expected risk-adjusted return of the current composition.
///
/// Each valued position (the synthetic cash row included) contributes its
/// class benchmark weighted by its share of total value. This does not look
/// at price history.
pub fn benchmark_risk(positions: &[Position], model: &BenchmarkModel) -> BenchmarkRisk {
    let total: f64 = positions.iter().map(|p| p.value().max(0.0)).sum();
    if total <= 0.0 {
        return BenchmarkRisk::default();
    }

    let mut composition: BTreeMap<BenchmarkClass, f64> = BTreeMap::new();
    let mut weighted_roi = 0.0;
    let mut weighted_volatility = 0.0;

    for position in positions {
        let weight = position.value().max(0.0) / total;
        let benchmark = model.benchmark(position.asset_class);
        weighted_roi += weight * benchmark.roi;
        weighted_volatility += weight * benchmark.volatility;
        *composition
            .entry(BenchmarkClass::from(position.asset_class))
            .or_insert(0.0) += weight;
    }

    let sharpe = if weighted_volatility > 0.0 {
        (weighted_roi - model.risk_free_rate) / weighted_volatility
    } else {
        0.0
    };

    BenchmarkRisk {
        weighted_roi,
        weighted_volatility,
        sharpe,
        composition,
    }
}

/// Sharpe ratio from user-entered expected return and volatility.
pub fn manual_sharpe(roi: f64, volatility: f64, risk_free_rate: f64) -> f64 {
    if volatility > 0.0 {
        (roi - risk_free_rate) / volatility
    } else {
        0.0
    }
}
