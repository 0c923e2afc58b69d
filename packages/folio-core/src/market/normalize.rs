//! Normalization of raw history responses into a [`PriceMatrix`].
//!
//! Providers return price tables in several layouts depending on the number
//! of tickers requested and on the provider version:
//!
//! - a flat table of price fields (`Open`, `Close`, `Adj Close`, ...) for a
//!   single ticker,
//! - a flat table with one column per ticker,
//! - two column levels keyed `(field, ticker)`,
//! - two column levels keyed `(ticker, field)`.
//!
//! Adjusted close is preferred over close when both exist.

use super::PriceMatrix;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const ADJ_CLOSE_FIELDS: [&str; 3] = ["ADJ CLOSE", "ADJUSTED CLOSE", "ADJCLOSE"];
const PRICE_FIELDS: [&str; 9] = [
    "ADJ CLOSE",
    "ADJUSTED CLOSE",
    "ADJCLOSE",
    "CLOSE",
    "OPEN",
    "HIGH",
    "LOW",
    "VOLUME",
    "DIVIDENDS",
];

/// A history response as delivered by a provider, in split orientation
/// (`index` = dates, `columns`, `data[row][column]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum RawHistory {
    /// One column level.
    Flat {
        index: Vec<NaiveDate>,
        columns: Vec<String>,
        data: Vec<Vec<Option<f64>>>,
    },
    /// Two column levels, in either order.
    MultiLevel {
        index: Vec<NaiveDate>,
        columns: Vec<(String, String)>,
        data: Vec<Vec<Option<f64>>>,
    },
}

/// Column layout detected in a raw response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    SingleTickerFields,
    TickerColumns,
    FieldThenTicker,
    TickerThenField,
}

fn is_price_field(name: &str) -> bool {
    PRICE_FIELDS.contains(&name.trim().to_uppercase().as_str())
}

fn is_adj_close(name: &str) -> bool {
    ADJ_CLOSE_FIELDS.contains(&name.trim().to_uppercase().as_str())
}

fn is_close(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("close")
}

/// Pick the close-price field among `fields`: adjusted close, else close.
fn select_close_field<'a, I>(fields: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    fields
        .clone()
        .into_iter()
        .find(|f| is_adj_close(f))
        .or_else(|| fields.into_iter().find(|f| is_close(f)))
}

fn detect_layout(raw: &RawHistory) -> Layout {
    match raw {
        RawHistory::Flat { columns, .. } => {
            if columns.iter().any(|c| is_price_field(c)) {
                Layout::SingleTickerFields
            } else {
                Layout::TickerColumns
            }
        }
        RawHistory::MultiLevel { columns, .. } => {
            if columns.iter().any(|(outer, _)| is_price_field(outer)) {
                Layout::FieldThenTicker
            } else {
                Layout::TickerThenField
            }
        }
    }
}

fn column_values(data: &[Vec<Option<f64>>], col: usize) -> Result<Vec<Option<f64>>> {
    data.iter()
        .enumerate()
        .map(|(row, values)| {
            values.get(col).copied().ok_or_else(|| {
                Error::MarketData(format!("row {} has no value for column {}", row, col))
            })
        })
        .collect()
}

/// Normalize a raw response into the canonical matrix for `requested`.
///
/// Requested tickers missing from the response are dropped, never an error.
/// Only a structurally broken response (ragged rows) fails.
pub fn normalize(raw: RawHistory, requested: &[String]) -> Result<PriceMatrix> {
    let layout = detect_layout(&raw);
    tracing::debug!("Normalizing history response with layout {:?}", layout);

    let (index, selected) = match (&raw, layout) {
        (RawHistory::Flat { index, columns, data }, Layout::SingleTickerFields) => {
            if requested.len() != 1 {
                tracing::warn!(
                    "Price-field table returned for {} tickers; cannot attribute columns",
                    requested.len()
                );
                return Ok(PriceMatrix::empty());
            }
            let field = select_close_field(columns.iter().map(String::as_str));
            let selected = match field.and_then(|f| columns.iter().position(|c| c == f)) {
                Some(col) => vec![(requested[0].clone(), column_values(data, col)?)],
                None => Vec::new(),
            };
            (index, selected)
        }
        (RawHistory::Flat { index, columns, data }, _) => {
            let selected = columns
                .iter()
                .enumerate()
                .map(|(col, ticker)| Ok((ticker.clone(), column_values(data, col)?)))
                .collect::<Result<Vec<_>>>()?;
            (index, selected)
        }
        (RawHistory::MultiLevel { index, columns, data }, layout) => {
            let field_of = |c: &(String, String)| -> String {
                if layout == Layout::FieldThenTicker {
                    c.0.clone()
                } else {
                    c.1.clone()
                }
            };
            let ticker_of = |c: &(String, String)| -> String {
                if layout == Layout::FieldThenTicker {
                    c.1.clone()
                } else {
                    c.0.clone()
                }
            };

            let fields: Vec<String> = columns.iter().map(field_of).collect();
            let field = select_close_field(fields.iter().map(String::as_str)).map(String::from);
            let selected = match field {
                Some(field) => columns
                    .iter()
                    .enumerate()
                    .filter(|&(_, c)| field_of(c) == field)
                    .map(|(col, c)| Ok((ticker_of(c), column_values(data, col)?)))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            (index, selected)
        }
    };

    if selected.is_empty() {
        tracing::warn!("History response has no close-price column");
        return Ok(PriceMatrix::empty());
    }

    let mut matrix = PriceMatrix::from_columns(index.clone(), selected)?;
    let missing = matrix.retain_tickers(requested);
    if !missing.is_empty() {
        tracing::warn!("No history returned for: {}", missing.join(", "));
    }
    Ok(matrix)
}
