//! Canonical historical price table: trading dates × tickers.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily close prices, one column per ticker.
///
/// Rows are kept in ascending date order with one row per date. A `None`
/// cell is a gap: a non-trading day for that asset or a date before it was
/// listed. Deserializing goes through [`PriceMatrix::from_columns`], so a
/// stored matrix is checked the same way as a freshly built one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixParts")]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    /// Column-major: `columns[ticker_idx][row_idx]`
    columns: Vec<Vec<Option<f64>>>,
}

/// Unchecked serialized form of a [`PriceMatrix`].
#[derive(Deserialize)]
struct MatrixParts {
    #[serde(default)]
    dates: Vec<NaiveDate>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    columns: Vec<Vec<Option<f64>>>,
}

impl TryFrom<MatrixParts> for PriceMatrix {
    type Error = Error;

    fn try_from(parts: MatrixParts) -> Result<Self> {
        if parts.tickers.len() != parts.columns.len() {
            return Err(Error::MarketData(format!(
                "{} tickers for {} columns",
                parts.tickers.len(),
                parts.columns.len()
            )));
        }
        Self::from_columns(
            parts.dates,
            parts.tickers.into_iter().zip(parts.columns).collect(),
        )
    }
}

impl PriceMatrix {
    /// Create an empty matrix.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a matrix from named columns aligned with `dates`.
    ///
    /// Rows are sorted by date and non-finite cells become gaps. Ticker
    /// names are uppercased and duplicate tickers keep the first column.
    /// Rows sharing a date collapse into one: the later row wins, and its
    /// gaps are filled from the earlier ones.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        let n = dates.len();
        let mut tickers: Vec<String> = Vec::with_capacity(columns.len());
        let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());

        for (ticker, column) in columns {
            if column.len() != n {
                return Err(Error::MarketData(format!(
                    "column {} has {} values for {} dates",
                    ticker,
                    column.len(),
                    n
                )));
            }
            let ticker = ticker.trim().to_uppercase();
            if tickers.contains(&ticker) {
                continue;
            }
            tickers.push(ticker);
            values.push(
                column
                    .into_iter()
                    .map(|v| v.filter(|p| p.is_finite()))
                    .collect(),
            );
        }

        // Sort rows by date without assuming the provider did. The sort is
        // stable, so repeated dates stay in arrival order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| dates[i]);

        let mut rows: Vec<(NaiveDate, Vec<usize>)> = Vec::with_capacity(n);
        for i in order {
            match rows.last_mut() {
                Some((date, group)) if *date == dates[i] => group.push(i),
                _ => rows.push((dates[i], vec![i])),
            }
        }
        if rows.len() < n {
            tracing::debug!("Collapsed {} repeated dates", n - rows.len());
        }

        let dates = rows.iter().map(|(date, _)| *date).collect();
        let columns = values
            .into_iter()
            .map(|col| {
                rows.iter()
                    .map(|(_, group)| group.iter().rev().find_map(|&i| col[i]))
                    .collect()
            })
            .collect();

        Ok(Self {
            dates,
            tickers,
            columns,
        })
    }

    /// True when there is no row or no column.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.tickers.is_empty()
    }

    /// Trading dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Ticker columns present.
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Column for `ticker`, if present.
    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        let ticker = ticker.to_uppercase();
        self.tickers
            .iter()
            .position(|t| *t == ticker)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Whether a column for `ticker` is present.
    pub fn contains(&self, ticker: &str) -> bool {
        self.column(ticker).is_some()
    }

    /// Carry the last seen price forward over gaps. Leading gaps stay.
    pub fn forward_fill(&mut self) {
        for column in &mut self.columns {
            let mut last = None;
            for cell in column.iter_mut() {
                match cell {
                    Some(v) => last = Some(*v),
                    None => *cell = last,
                }
            }
        }
    }

    /// Remove columns without a single value. Returns the removed tickers.
    pub fn drop_empty_columns(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        let mut idx = 0;
        while idx < self.tickers.len() {
            if self.columns[idx].iter().all(Option::is_none) {
                dropped.push(self.tickers.remove(idx));
                self.columns.remove(idx);
            } else {
                idx += 1;
            }
        }
        dropped
    }

    /// Keep only rows where every column has a value.
    pub fn drop_incomplete_rows(&mut self) {
        let keep: Vec<bool> = (0..self.dates.len())
            .map(|row| self.columns.iter().all(|col| col[row].is_some()))
            .collect();
        self.retain_rows(&keep);
    }

    /// Keep only rows whose date satisfies `predicate`.
    pub fn retain_dates<F>(&mut self, predicate: F)
    where
        F: Fn(NaiveDate) -> bool,
    {
        let keep: Vec<bool> = self.dates.iter().map(|d| predicate(*d)).collect();
        self.retain_rows(&keep);
    }

    /// Keep only the listed tickers. Returns requested tickers that were absent.
    pub fn retain_tickers(&mut self, wanted: &[String]) -> Vec<String> {
        let wanted: Vec<String> = wanted.iter().map(|t| t.to_uppercase()).collect();
        let mut idx = 0;
        while idx < self.tickers.len() {
            if wanted.contains(&self.tickers[idx]) {
                idx += 1;
            } else {
                self.tickers.remove(idx);
                self.columns.remove(idx);
            }
        }
        wanted
            .into_iter()
            .filter(|t| !self.tickers.contains(t))
            .collect()
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        let mut row = 0;
        self.dates.retain(|_| {
            let k = keep[row];
            row += 1;
            k
        });
        for column in &mut self.columns {
            let mut row = 0;
            column.retain(|_| {
                let k = keep[row];
                row += 1;
                k
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_from_columns_sorts_and_uppercases() {
        let matrix = PriceMatrix::from_columns(
            vec![day(3), day(1), day(2)],
            vec![("aapl".to_string(), vec![Some(3.0), Some(1.0), Some(f64::NAN)])],
        )
        .unwrap();

        assert_eq!(matrix.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(matrix.tickers(), &["AAPL".to_string()]);
        assert_eq!(matrix.column("AAPL").unwrap(), &[Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_from_columns_length_mismatch() {
        let result = PriceMatrix::from_columns(
            vec![day(1), day(2)],
            vec![("AAPL".to_string(), vec![Some(1.0)])],
        );
        assert!(matches!(result, Err(Error::MarketData(_))));
    }

    #[test]
    fn test_repeated_dates_keep_later_row() {
        let matrix = PriceMatrix::from_columns(
            vec![day(2), day(1), day(2), day(3)],
            vec![
                ("X".to_string(), vec![Some(20.0), Some(1.0), Some(21.0), Some(3.0)]),
                ("Y".to_string(), vec![Some(5.0), Some(4.0), None, Some(6.0)]),
            ],
        )
        .unwrap();

        assert_eq!(matrix.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(matrix.column("X").unwrap(), &[Some(1.0), Some(21.0), Some(3.0)]);
        assert_eq!(matrix.column("Y").unwrap(), &[Some(4.0), Some(5.0), Some(6.0)]);
    }

    #[test]
    fn test_deserialize_rejects_ragged_columns() {
        let ragged = r#"{"dates":["2024-01-01","2024-01-02"],"tickers":["X"],"columns":[[1.0]]}"#;
        assert!(serde_json::from_str::<PriceMatrix>(ragged).is_err());

        let unnamed = r#"{"dates":["2024-01-01"],"tickers":["X"],"columns":[[1.0],[2.0]]}"#;
        assert!(serde_json::from_str::<PriceMatrix>(unnamed).is_err());
    }

    #[test]
    fn test_deserialize_normalizes_like_from_columns() {
        let json = r#"{
            "dates": ["2024-01-02", "2024-01-01"],
            "tickers": ["x"],
            "columns": [[2.0, null]]
        }"#;
        let matrix: PriceMatrix = serde_json::from_str(json).unwrap();

        assert_eq!(matrix.dates(), &[day(1), day(2)]);
        assert_eq!(matrix.column("X").unwrap(), &[None, Some(2.0)]);

        let stored = serde_json::to_string(&matrix).unwrap();
        let reloaded: PriceMatrix = serde_json::from_str(&stored).unwrap();
        assert_eq!(reloaded, matrix);
    }

    #[test]
    fn test_forward_fill_keeps_leading_gaps() {
        let mut matrix = PriceMatrix::from_columns(
            vec![day(1), day(2), day(3), day(4)],
            vec![("X".to_string(), vec![None, Some(10.0), None, Some(12.0)])],
        )
        .unwrap();

        matrix.forward_fill();

        assert_eq!(
            matrix.column("X").unwrap(),
            &[None, Some(10.0), Some(10.0), Some(12.0)]
        );
    }

    #[test]
    fn test_drop_incomplete_rows() {
        let mut matrix = PriceMatrix::from_columns(
            vec![day(1), day(2), day(3)],
            vec![
                ("X".to_string(), vec![None, Some(1.0), Some(1.0)]),
                ("Y".to_string(), vec![Some(2.0), Some(2.0), Some(2.0)]),
            ],
        )
        .unwrap();

        matrix.drop_incomplete_rows();

        assert_eq!(matrix.dates(), &[day(2), day(3)]);
        assert_eq!(matrix.column("Y").unwrap().len(), 2);
    }

    #[test]
    fn test_drop_empty_columns() {
        let mut matrix = PriceMatrix::from_columns(
            vec![day(1), day(2)],
            vec![
                ("X".to_string(), vec![None, None]),
                ("Y".to_string(), vec![Some(2.0), None]),
            ],
        )
        .unwrap();

        let dropped = matrix.drop_empty_columns();

        assert_eq!(dropped, vec!["X".to_string()]);
        assert_eq!(matrix.tickers(), &["Y".to_string()]);
    }

    #[test]
    fn test_retain_tickers_reports_missing() {
        let mut matrix = PriceMatrix::from_columns(
            vec![day(1)],
            vec![
                ("X".to_string(), vec![Some(1.0)]),
                ("Z".to_string(), vec![Some(3.0)]),
            ],
        )
        .unwrap();

        let missing = matrix.retain_tickers(&["x".to_string(), "Y".to_string()]);

        assert_eq!(missing, vec!["Y".to_string()]);
        assert_eq!(matrix.tickers(), &["X".to_string()]);
    }
}
