//! Portfolio performance analytics.

use crate::types::{PortfolioSnapshot, PriceSource, ValuePoint};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Gain/loss summary of a valued snapshot, in base currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    /// Total cost basis of all priced positions
    pub total_cost: f64,
    /// Market value of positions, cash excluded
    pub total_market_value: f64,
    /// Unrealized gain/loss in base currency
    pub total_gain_loss: f64,
    /// Unrealized gain/loss percentage of cost
    pub total_gain_loss_percent: f64,
    /// Number of positions
    pub position_count: usize,
    /// Number of positions with gains
    pub positions_in_profit: usize,
    /// Number of positions with losses
    pub positions_in_loss: usize,
    /// Positions valued at cost because no quote was available
    pub positions_at_cost: usize,
}

impl PortfolioPerformance {
    /// Summarize a valuation pass.
    ///
    /// Crypto positions carry no cost basis, so their whole value counts as
    /// gain.
    pub fn from_snapshot(snapshot: &PortfolioSnapshot) -> Self {
        let mut summary = Self::default();

        for position in snapshot.real_positions() {
            let cost = position.total_cost();
            let gain = position.value() - cost;

            summary.total_cost += cost;
            summary.total_market_value += position.value();
            summary.position_count += 1;
            if gain > 0.0 {
                summary.positions_in_profit += 1;
            } else if gain < 0.0 {
                summary.positions_in_loss += 1;
            }
            if position.price_source == Some(PriceSource::CostBasis) {
                summary.positions_at_cost += 1;
            }
        }

        summary.total_gain_loss = summary.total_market_value - summary.total_cost;
        summary.total_gain_loss_percent = if summary.total_cost > 0.0 {
            (summary.total_gain_loss / summary.total_cost) * 100.0
        } else {
            0.0
        };
        summary
    }
}

/// Holding-period return between two values. 0 when the start is not positive.
pub fn holding_period_return(initial_value: f64, final_value: f64) -> f64 {
    if initial_value <= 0.0 {
        return 0.0;
    }
    (final_value - initial_value) / initial_value
}

/// Return of `series` from `baseline` to its latest point.
///
/// The baseline value is the first point dated on or after `baseline`. When
/// no such point exists the return is 0; points before the baseline are
/// never used.
pub fn windowed_return(series: &[ValuePoint], baseline: NaiveDate) -> f64 {
    let start = match series.iter().find(|p| p.date >= baseline) {
        Some(point) => point.value,
        None => return 0.0,
    };
    let latest = match series.last() {
        Some(point) => point.value,
        None => return 0.0,
    };
    holding_period_return(start, latest)
}

/// Year-to-date return as of `today`.
pub fn ytd_return(series: &[ValuePoint], today: NaiveDate) -> f64 {
    match NaiveDate::from_ymd_opt(today.year(), 1, 1) {
        Some(jan_first) => windowed_return(series, jan_first),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{AssetInfo, PriceLookup, QuoteProvider};
    use crate::portfolio::value_positions;
    use crate::types::{AssetClass, CashLedger, FxRates, Position};
    use crate::Result;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series() -> Vec<ValuePoint> {
        vec![
            ValuePoint::new(date(2023, 12, 29), 900.0),
            ValuePoint::new(date(2024, 1, 2), 1000.0),
            ValuePoint::new(date(2024, 3, 1), 1100.0),
            ValuePoint::new(date(2024, 6, 3), 1200.0),
        ]
    }

    #[test]
    fn test_ytd_uses_first_point_of_year() {
        assert_relative_eq!(ytd_return(&series(), date(2024, 6, 3)), 0.2);
    }

    #[test]
    fn test_windowed_return_arbitrary_baseline() {
        // First point on/after Feb 1 is Mar 1
        let r = windowed_return(&series(), date(2024, 2, 1));
        assert_relative_eq!(r, 100.0 / 1100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_windowed_return_no_baseline_data() {
        let before = vec![
            ValuePoint::new(date(2023, 11, 1), 800.0),
            ValuePoint::new(date(2023, 12, 29), 900.0),
        ];
        assert_eq!(ytd_return(&before, date(2024, 3, 1)), 0.0);
        assert_eq!(windowed_return(&[], date(2024, 1, 1)), 0.0);
    }

    #[test]
    fn test_windowed_return_zero_baseline() {
        let zero_start = vec![
            ValuePoint::new(date(2024, 1, 2), 0.0),
            ValuePoint::new(date(2024, 1, 3), 500.0),
        ];
        assert_eq!(ytd_return(&zero_start, date(2024, 1, 3)), 0.0);
    }

    #[test]
    fn test_holding_period_return() {
        assert_relative_eq!(holding_period_return(100.0, 110.0), 0.1, epsilon = 1e-12);
        assert_eq!(holding_period_return(0.0, 110.0), 0.0);
    }

    struct Quotes;

    impl QuoteProvider for Quotes {
        fn current_price(&self, ticker: &str) -> PriceLookup {
            match ticker {
                "AAPL" => PriceLookup::Available(150.0),
                "BTC-USD" => PriceLookup::Available(50000.0),
                _ => PriceLookup::Unavailable,
            }
        }

        fn asset_info(&self, _ticker: &str) -> Option<AssetInfo> {
            None
        }

        fn fetch_fx_rates(&self, _base: &str) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    #[test]
    fn test_portfolio_performance() {
        let positions = vec![
            Position::new("AAPL", 10.0, 100.0),
            Position::new("BTC-USD", 0.1, 0.0).with_class(AssetClass::Crypto),
            Position::new("GONE", 5.0, 20.0),
        ];
        let cash = CashLedger::empty().with("USD", 5000.0);
        let snapshot =
            value_positions(&positions, &Quotes, &cash, &FxRates::default(), "USD", 1.0);

        let perf = PortfolioPerformance::from_snapshot(&snapshot);

        assert_eq!(perf.position_count, 3);
        assert_relative_eq!(perf.total_cost, 1100.0);
        assert_relative_eq!(perf.total_market_value, 1500.0 + 5000.0 + 100.0);
        assert_relative_eq!(perf.total_gain_loss, 5500.0);
        assert_eq!(perf.positions_in_profit, 2);
        assert_eq!(perf.positions_in_loss, 0);
        assert_eq!(perf.positions_at_cost, 1);
    }
}
