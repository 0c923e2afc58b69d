//! Valuation pass: price every holding, consolidate cash, rank for display.

use crate::market::QuoteProvider;
use crate::types::{
    AssetClass, CashLedger, FxRates, PortfolioSnapshot, Position, PriceSource, CASH_TICKER,
    LIQUIDITY_SECTOR,
};
use std::cmp::Ordering;

/// Cash below or at this base-currency amount is not listed as a position.
pub const CASH_MATERIALITY: f64 = 1.0;

/// Sum every cash balance converted into base currency.
///
/// Each balance is divided by its rate in `fx`. The table already carries
/// the configured fallbacks once resolved, so a currency missing from it is
/// skipped with a warning.
pub fn cash_in_base(cash: &CashLedger, fx: &FxRates) -> f64 {
    cash.iter()
        .filter(|(_, amount)| *amount != 0.0)
        .filter_map(|(currency, amount)| match fx.get(currency) {
            Some(rate) => Some(amount / rate),
            None => {
                tracing::warn!("No FX rate for {}, skipping {} in cash", currency, amount);
                None
            }
        })
        .fold(0.0, |total, value| total + value)
}

/// Display ordering: asset class rank, then sector, then largest value first.
pub fn display_order(a: &Position, b: &Position) -> Ordering {
    a.asset_class
        .rank()
        .cmp(&b.asset_class.rank())
        .then_with(|| a.sector.cmp(&b.sector))
        .then_with(|| b.value().partial_cmp(&a.value()).unwrap_or(Ordering::Equal))
}

/// Price a single position, falling back to its cost basis.
fn price_position(position: &Position, quotes: &dyn QuoteProvider) -> Position {
    match quotes.current_price(&position.ticker).price() {
        Some(price) => position.priced(price, PriceSource::Live),
        None => {
            tracing::warn!(
                "No price for {}, valuing at cost basis {}",
                position.ticker,
                position.avg_cost
            );
            position.priced(position.avg_cost, PriceSource::CostBasis)
        }
    }
}

/// Value a set of positions and cash balances.
///
/// Never fails: an unavailable quote degrades that one position to its cost
/// basis. Cash is always counted in the totals but only listed as a `CASH`
/// row when it exceeds `materiality`. The staleness of `fx` is passed
/// through to the snapshot.
pub fn value_positions(
    positions: &[Position],
    quotes: &dyn QuoteProvider,
    cash: &CashLedger,
    fx: &FxRates,
    display_currency: &str,
    materiality: f64,
) -> PortfolioSnapshot {
    tracing::debug!("Valuing {} positions", positions.len());

    let mut valued: Vec<Position> = positions
        .iter()
        .filter(|p| !p.is_cash())
        .map(|p| price_position(p, quotes))
        .collect();

    let cash_base = cash_in_base(cash, fx);
    let total_base = valued
        .iter()
        .map(Position::value)
        .fold(cash_base, |total, value| total + value);

    if cash_base > materiality {
        let row = Position::new(CASH_TICKER, 1.0, cash_base)
            .with_class(AssetClass::Cash)
            .with_sector(LIQUIDITY_SECTOR)
            .priced(cash_base, PriceSource::Cash);
        valued.push(row);
    }

    valued.sort_by(display_order);

    let display_currency = display_currency.trim().to_uppercase();
    let total_display = total_base * fx.get_or(&display_currency, 1.0);

    PortfolioSnapshot {
        total_base,
        total_display,
        display_currency,
        positions: valued,
        cash_base,
        fx_stale: fx.stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{AssetInfo, PriceLookup};
    use crate::Result;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct Quotes(HashMap<&'static str, f64>);

    impl QuoteProvider for Quotes {
        fn current_price(&self, ticker: &str) -> PriceLookup {
            PriceLookup::from_raw(self.0.get(ticker).copied().unwrap_or(0.0))
        }

        fn asset_info(&self, _ticker: &str) -> Option<AssetInfo> {
            None
        }

        fn fetch_fx_rates(&self, _base: &str) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    struct Down;

    impl QuoteProvider for Down {
        fn current_price(&self, _ticker: &str) -> PriceLookup {
            PriceLookup::from_raw(0.0)
        }

        fn asset_info(&self, _ticker: &str) -> Option<AssetInfo> {
            None
        }

        fn fetch_fx_rates(&self, _base: &str) -> Result<HashMap<String, f64>> {
            Err(crate::Error::MarketData("offline".to_string()))
        }
    }

    fn quotes() -> Quotes {
        Quotes(HashMap::from([("AAPL", 150.0), ("BTC-USD", 50000.0)]))
    }

    fn fx() -> FxRates {
        FxRates::from_pairs(&[("CAD", 1.35), ("KRW", 1300.0)])
    }

    fn holdings() -> Vec<Position> {
        vec![
            Position::new("AAPL", 2.0, 120.0).with_sector("Technology"),
            Position::new("BTC-USD", 0.01, 0.0)
                .with_class(AssetClass::Crypto)
                .with_sector("Crypto"),
        ]
    }

    #[test]
    fn test_value_and_order() {
        let cash = CashLedger::empty().with("USD", 1000.0);
        let snapshot = value_positions(&holdings(), &quotes(), &cash, &fx(), "USD", 1.0);

        assert_relative_eq!(snapshot.total_base, 1800.0, epsilon = 1e-9);
        assert_relative_eq!(snapshot.total_display, 1800.0, epsilon = 1e-9);
        let order: Vec<&str> = snapshot.positions.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(order, vec!["BTC-USD", "AAPL", "CASH"]);
    }

    #[test]
    fn test_missing_price_uses_cost_basis() {
        let positions = vec![Position::new("DELISTED", 3.0, 40.0)];
        let snapshot =
            value_positions(&positions, &quotes(), &CashLedger::empty(), &fx(), "USD", 1.0);

        let row = &snapshot.positions[0];
        assert_eq!(row.current_price, Some(40.0));
        assert_eq!(row.price_source, Some(PriceSource::CostBasis));
        assert_relative_eq!(snapshot.total_base, 120.0);
    }

    #[test]
    fn test_cash_materiality_threshold() {
        let exact = CashLedger::empty().with("USD", 1.0);
        let snapshot = value_positions(&[], &quotes(), &exact, &fx(), "USD", CASH_MATERIALITY);
        assert!(snapshot.positions.is_empty());
        assert_relative_eq!(snapshot.total_base, 1.0);

        let above = CashLedger::empty().with("USD", 1.01);
        let snapshot = value_positions(&[], &quotes(), &above, &fx(), "USD", CASH_MATERIALITY);
        assert_eq!(snapshot.positions.len(), 1);
        assert_eq!(snapshot.positions[0].sector, LIQUIDITY_SECTOR);
        assert_eq!(snapshot.positions[0].asset_class, AssetClass::Cash);
    }

    #[test]
    fn test_multi_currency_cash() {
        let cash = CashLedger::empty()
            .with("USD", 100.0)
            .with("CAD", 135.0)
            .with("KRW", 130_000.0);
        assert_relative_eq!(cash_in_base(&cash, &fx()), 300.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cash_skips_currency_without_rate() {
        let cash = CashLedger::empty()
            .with("USD", 10.0)
            .with("CAD", 135.0)
            .with("XYZ", 50.0);
        assert_relative_eq!(cash_in_base(&cash, &fx()), 110.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cash_follows_configured_fallback_table() {
        let cash = CashLedger::empty().with("KRW", 130_000.0).with("CAD", 100.0);

        // Configured table overrides CAD and leaves KRW out
        let mut config = crate::EngineConfig::default();
        config.fx_fallback = HashMap::from([("CAD".to_string(), 2.0)]);
        let mut resolver = crate::market::FxResolver::new().with_fallback(config.fx_fallback);
        let rates = resolver.resolve(&Down);

        assert!(rates.stale);
        assert_relative_eq!(cash_in_base(&cash, &rates), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_portfolio_totals_are_positive_zero() {
        let snapshot = value_positions(
            &[],
            &quotes(),
            &CashLedger::empty(),
            &FxRates::default(),
            "USD",
            CASH_MATERIALITY,
        );

        assert_eq!(snapshot.total_base, 0.0);
        assert!(snapshot.total_base.is_sign_positive());
        assert!(snapshot.total_display.is_sign_positive());
        assert!(snapshot.cash_base.is_sign_positive());
        assert!(cash_in_base(&CashLedger::default(), &fx()).is_sign_positive());
    }

    #[test]
    fn test_display_currency_conversion() {
        let cash = CashLedger::empty().with("USD", 1000.0);
        let snapshot = value_positions(&holdings(), &quotes(), &cash, &fx(), "krw", 1.0);

        assert_eq!(snapshot.display_currency, "KRW");
        assert_relative_eq!(snapshot.total_display, 1800.0 * 1300.0, epsilon = 1e-6);
        assert_relative_eq!(snapshot.total_display / 1300.0, snapshot.total_base, epsilon = 1e-9);
    }

    #[test]
    fn test_sector_then_value_order() {
        let positions = vec![
            Position::new("MSFT", 1.0, 0.0).with_sector("Technology"),
            Position::new("AAPL", 1.0, 0.0).with_sector("Technology"),
            Position::new("JPM", 1.0, 0.0).with_sector("Financials"),
            Position::new("VOO", 1.0, 0.0).with_class(AssetClass::Etf),
        ];
        let quotes = Quotes(HashMap::from([
            ("MSFT", 400.0),
            ("AAPL", 150.0),
            ("JPM", 200.0),
            ("VOO", 500.0),
        ]));

        let snapshot =
            value_positions(&positions, &quotes, &CashLedger::empty(), &fx(), "USD", 1.0);
        let order: Vec<&str> = snapshot.positions.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(order, vec!["JPM", "MSFT", "AAPL", "VOO"]);
    }

    #[test]
    fn test_stale_flag_passes_through() {
        let stale = FxRates::new(HashMap::from([("CAD".to_string(), 1.35)]), true);
        let snapshot = value_positions(&[], &quotes(), &CashLedger::empty(), &stale, "CAD", 1.0);
        assert!(snapshot.fx_stale);
    }
}
