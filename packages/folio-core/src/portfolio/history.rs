//! Historical portfolio value series.

use crate::market::{HistoryProvider, HistoryWindow};
use crate::types::{FxRates, Position, ValuePoint};
use std::collections::HashMap;

/// Rebuild the daily value series of `positions` over `window`.
///
/// Holdings are valued at each day's close after forward-filling gaps. Any
/// day on which a held ticker still has no price is dropped from the whole
/// series, so a recently listed asset shortens the history. `cash_base` is
/// added as a flat offset and every point is converted at today's
/// `display_currency` rate.
///
/// Returns an empty series when there are no real holdings, when the
/// provider fails, or when no complete day remains.
pub fn build_history(
    positions: &[Position],
    cash_base: f64,
    history: &dyn HistoryProvider,
    window: &HistoryWindow,
    fx: &FxRates,
    display_currency: &str,
) -> Vec<ValuePoint> {
    let mut quantities: HashMap<String, f64> = HashMap::new();
    for position in positions.iter().filter(|p| !p.is_cash()) {
        *quantities
            .entry(position.ticker.trim().to_uppercase())
            .or_insert(0.0) += position.quantity;
    }
    if quantities.is_empty() {
        return Vec::new();
    }

    let mut tickers: Vec<String> = quantities.keys().cloned().collect();
    tickers.sort();

    let mut matrix = match history.history(&tickers, window) {
        Ok(matrix) => matrix,
        Err(e) => {
            tracing::warn!("History fetch failed: {}", e);
            return Vec::new();
        }
    };

    // Only held tickers decide which rows are complete
    let returned = matrix.tickers().len();
    let missing = matrix.retain_tickers(&tickers);
    if matrix.tickers().len() < returned {
        tracing::debug!(
            "Ignoring {} unrequested history columns",
            returned - matrix.tickers().len()
        );
    }
    if !missing.is_empty() {
        tracing::warn!("No history returned for: {}", missing.join(", "));
    }

    let empty = matrix.drop_empty_columns();
    if !empty.is_empty() {
        tracing::warn!("Excluding tickers with no history: {}", empty.join(", "));
    }
    matrix.forward_fill();
    matrix.drop_incomplete_rows();

    if matrix.is_empty() {
        tracing::debug!("No complete history rows for {} tickers", tickers.len());
        return Vec::new();
    }

    let rate = fx.get_or(display_currency, 1.0);
    let columns: Vec<(f64, &[Option<f64>])> = matrix
        .tickers()
        .iter()
        .filter_map(|t| Some((*quantities.get(t)?, matrix.column(t)?)))
        .collect();

    matrix
        .dates()
        .iter()
        .enumerate()
        .map(|(row, date)| {
            let assets: f64 = columns
                .iter()
                .map(|(qty, prices)| prices[row].unwrap_or(0.0) * qty)
                .sum();
            ValuePoint::new(*date, (assets + cash_base) * rate)
        })
        .collect()
}
