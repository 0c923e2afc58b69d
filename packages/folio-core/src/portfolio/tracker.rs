//! Portfolio storage and commands, persisted to JSON.

use super::merge::{merge_position, parse_amount, NewLot};
use crate::types::{AssetClass, Portfolio, Position, Settings, CASH_TICKER};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Field edits for an existing position, as raw user text.
///
/// Unparseable numbers leave the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionEdit {
    pub ticker: Option<String>,
    pub quantity: Option<String>,
    pub avg_cost: Option<String>,
    pub asset_class: Option<String>,
    pub sector: Option<String>,
}

/// Portfolio tracker that manages positions and persists to JSON.
#[derive(Debug)]
pub struct PortfolioTracker {
    /// Path to the portfolio JSON file
    path: PathBuf,
    /// In-memory portfolio state
    portfolio: Portfolio,
}

impl PortfolioTracker {
    /// Create a new portfolio tracker with the default path.
    ///
    /// Default path: `~/.folio/portfolio.json`
    /// Can be overridden with `FOLIO_PORTFOLIO_FILE` environment variable.
    pub fn new() -> Self {
        Self::with_path(Self::default_path())
    }

    /// Create a tracker with a custom path.
    ///
    /// A missing or unreadable file starts an empty portfolio.
    pub fn with_path(path: PathBuf) -> Self {
        let portfolio = Self::load_from_path(&path).unwrap_or_else(|e| {
            tracing::warn!("Could not load {}: {}; starting empty", path.display(), e);
            Portfolio::default()
        });
        Self { path, portfolio }
    }

    /// Create an in-memory tracker (no persistence).
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            portfolio: Portfolio::default(),
        }
    }

    /// Get the default portfolio file path.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("FOLIO_PORTFOLIO_FILE") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".folio/portfolio.json"))
            .unwrap_or_else(|| PathBuf::from("portfolio.json"))
    }

    /// Get the current path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load portfolio from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<Portfolio> {
        if !path.exists() {
            return Ok(Portfolio::default());
        }

        let content = fs::read_to_string(path)?;
        let data: serde_json::Value = serde_json::from_str(&content)?;

        // Handle legacy format (list of positions)
        let mut portfolio = if data.is_array() {
            let positions: Vec<Position> = serde_json::from_value(data)?;
            Portfolio {
                positions,
                ..Default::default()
            }
        } else {
            serde_json::from_value(data)?
        };

        portfolio.positions = coalesce(std::mem::take(&mut portfolio.positions));
        Ok(portfolio)
    }

    /// Save the current portfolio to disk.
    pub fn save(&mut self) -> Result<()> {
        // Skip if in-memory only
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if self.portfolio.created_at.is_none() {
            self.portfolio.created_at = Some(Utc::now());
        }
        self.portfolio.updated_at = Some(Utc::now());

        // Derived valuation fields are never persisted
        let mut stored = self.portfolio.clone();
        stored.positions = stored
            .positions
            .iter()
            .map(Position::without_valuation)
            .collect();

        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, content)?;
        tracing::debug!("Saved portfolio to {}", self.path.display());
        Ok(())
    }

    /// Reload the portfolio from disk.
    pub fn reload(&mut self) -> Result<()> {
        self.portfolio = Self::load_from_path(&self.path)?;
        Ok(())
    }

    /// Get a reference to the current portfolio.
    pub fn get(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Get a mutable reference to the current portfolio.
    pub fn get_mut(&mut self) -> &mut Portfolio {
        &mut self.portfolio
    }

    /// Get all positions.
    pub fn positions(&self) -> &[Position] {
        &self.portfolio.positions
    }

    /// Find a position by ticker.
    pub fn find_position(&self, ticker: &str) -> Option<&Position> {
        let ticker_upper = ticker.trim().to_uppercase();
        self.portfolio
            .positions
            .iter()
            .find(|p| p.ticker == ticker_upper)
    }

    fn index_of(&self, ticker: &str) -> Option<usize> {
        let ticker_upper = ticker.trim().to_uppercase();
        self.portfolio
            .positions
            .iter()
            .position(|p| p.ticker == ticker_upper)
    }

    /// Add a lot to the portfolio.
    ///
    /// An existing ticker is merged with weighted-average cost, see
    /// [`merge_position`]. Returns the stored position and whether it was an
    /// update (true) or add (false). `CASH` is reserved for the synthetic
    /// cash row; balances go through [`PortfolioTracker::set_cash`].
    pub fn add_position(&mut self, lot: NewLot) -> Result<(Position, bool)> {
        check_ticker(&lot.ticker)?;

        if let Some(idx) = self.index_of(&lot.ticker) {
            let merged = merge_position(&self.portfolio.positions[idx], &lot);
            self.portfolio.positions[idx] = merged.clone();
            Ok((merged, true))
        } else {
            let position = lot.into_position();
            self.portfolio.positions.push(position.clone());
            Ok((position, false))
        }
    }

    /// Remove a position from the portfolio.
    ///
    /// Returns the removed position if found.
    pub fn remove_position(&mut self, ticker: &str) -> Result<Position> {
        match self.index_of(ticker) {
            Some(idx) => Ok(self.portfolio.positions.remove(idx)),
            None => Err(Error::PositionNotFound(ticker.trim().to_uppercase())),
        }
    }

    /// Apply field edits to a position.
    ///
    /// Malformed numbers are ignored field by field. Renaming onto another
    /// held ticker is rejected.
    pub fn edit_position(&mut self, ticker: &str, edit: PositionEdit) -> Result<Position> {
        let idx = self
            .index_of(ticker)
            .ok_or_else(|| Error::PositionNotFound(ticker.trim().to_uppercase()))?;

        if let Some(new_ticker) = edit.ticker.as_deref().map(|t| t.trim().to_uppercase()) {
            if !new_ticker.is_empty() && new_ticker != self.portfolio.positions[idx].ticker {
                check_ticker(&new_ticker)?;
                if self.index_of(&new_ticker).is_some() {
                    return Err(Error::InvalidOperation(format!(
                        "{} is already in the portfolio",
                        new_ticker
                    )));
                }
                self.portfolio.positions[idx].ticker = new_ticker;
            }
        }

        let position = &mut self.portfolio.positions[idx];

        if let Some(raw) = edit.quantity.as_deref() {
            match parse_amount(raw) {
                Some(qty) => position.quantity = qty,
                None => tracing::warn!("Ignoring quantity {:?} for {}", raw, position.ticker),
            }
        }
        if let Some(raw) = edit.avg_cost.as_deref() {
            match parse_amount(raw) {
                Some(cost) => position.avg_cost = cost,
                None => tracing::warn!("Ignoring cost {:?} for {}", raw, position.ticker),
            }
        }
        if let Some(sector) = edit.sector.as_deref() {
            position.sector = sector.trim().to_string();
        }
        if let Some(class) = edit.asset_class.as_deref() {
            position.asset_class = AssetClass::parse(class);
        }

        Ok(position.clone())
    }

    /// Cash balance in `currency`.
    pub fn cash(&self, currency: &str) -> f64 {
        self.portfolio.cash.balance(currency)
    }

    /// Set the cash balance in `currency`.
    pub fn set_cash(&mut self, currency: &str, amount: f64) {
        self.portfolio.cash.set(currency, amount);
    }

    /// Current settings.
    pub fn settings(&self) -> &Settings {
        &self.portfolio.settings
    }

    /// Set the display currency.
    pub fn set_display_currency(&mut self, currency: &str) {
        self.portfolio.settings.display_currency = currency.trim().to_uppercase();
    }

    /// Set the annual risk-free rate.
    pub fn set_risk_free_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || !(-1.0..1.0).contains(&rate) {
            return Err(Error::InvalidOperation(format!(
                "risk-free rate {} is out of range",
                rate
            )));
        }
        self.portfolio.settings.risk_free_rate = rate;
        Ok(())
    }

    /// Set the manual risk inputs.
    pub fn set_risk_inputs(&mut self, roi: f64, volatility: f64) {
        self.portfolio.settings.risk_inputs.roi = roi;
        self.portfolio.settings.risk_inputs.volatility = volatility.max(0.0);
    }

    /// Calculate the total cost basis of all positions.
    pub fn total_cost(&self) -> f64 {
        self.portfolio.total_cost()
    }
}

impl Default for PortfolioTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn check_ticker(ticker: &str) -> Result<()> {
    if ticker.is_empty() {
        return Err(Error::InvalidOperation("ticker is empty".to_string()));
    }
    if ticker == CASH_TICKER {
        return Err(Error::InvalidOperation(format!(
            "{} is reserved; set cash balances per currency instead",
            CASH_TICKER
        )));
    }
    Ok(())
}

/// Fold rows that share a ticker into one weighted-average position.
fn coalesce(positions: Vec<Position>) -> Vec<Position> {
    let mut merged: Vec<Position> = Vec::with_capacity(positions.len());
    for position in positions {
        match merged.iter_mut().find(|p| p.ticker == position.ticker) {
            Some(existing) => {
                tracing::warn!("Merging duplicate stored rows for {}", position.ticker);
                let lot = NewLot {
                    ticker: position.ticker.clone(),
                    quantity: position.quantity,
                    avg_cost: position.avg_cost,
                    asset_class: None,
                    sector: None,
                };
                *existing = merge_position(existing, &lot);
            }
            None => merged.push(position),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_new_position() {
        let mut tracker = PortfolioTracker::in_memory();
        let (position, was_update) = tracker
            .add_position(NewLot::new("AAPL", 10.0, 150.0))
            .unwrap();

        assert!(!was_update);
        assert_eq!(position.ticker, "AAPL");
        assert_eq!(position.quantity, 10.0);
        assert_eq!(position.avg_cost, 150.0);
        assert_eq!(tracker.positions().len(), 1);
    }

    #[test]
    fn test_add_position_cost_averaging() {
        let mut tracker = PortfolioTracker::in_memory();

        tracker.add_position(NewLot::new("AAPL", 10.0, 150.0)).unwrap();
        let (position, was_update) = tracker
            .add_position(NewLot::new("AAPL", 10.0, 170.0))
            .unwrap();

        assert!(was_update);
        assert_eq!(position.quantity, 20.0);
        // (10 * 150 + 10 * 170) / 20
        assert_eq!(position.avg_cost, 160.0);
        assert_eq!(tracker.positions().len(), 1);
    }

    #[test]
    fn test_remove_position() {
        let mut tracker = PortfolioTracker::in_memory();
        tracker.add_position(NewLot::new("AAPL", 10.0, 150.0)).unwrap();
        tracker.add_position(NewLot::new("GOOGL", 5.0, 100.0)).unwrap();

        let removed = tracker.remove_position("aapl").unwrap();
        assert_eq!(removed.ticker, "AAPL");
        assert_eq!(tracker.positions().len(), 1);
        assert_eq!(tracker.positions()[0].ticker, "GOOGL");
    }

    #[test]
    fn test_remove_position_not_found() {
        let mut tracker = PortfolioTracker::in_memory();
        let result = tracker.remove_position("AAPL");
        assert!(matches!(result, Err(Error::PositionNotFound(_))));
    }

    #[test]
    fn test_edit_ignores_malformed_fields() {
        let mut tracker = PortfolioTracker::in_memory();
        tracker.add_position(NewLot::new("AAPL", 10.0, 150.0)).unwrap();
        tracker.add_position(NewLot::new("MSFT", 1.0, 300.0)).unwrap();

        let edited = tracker
            .edit_position(
                "AAPL",
                PositionEdit {
                    quantity: Some("twelve".to_string()),
                    avg_cost: Some("$1,155.00".to_string()),
                    asset_class: Some("etf".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(edited.quantity, 10.0);
        assert_eq!(edited.avg_cost, 1155.0);
        assert_eq!(edited.asset_class, AssetClass::Etf);
        // Unrelated positions untouched
        assert_eq!(tracker.find_position("MSFT").unwrap().avg_cost, 300.0);
    }

    #[test]
    fn test_edit_rename_collision() {
        let mut tracker = PortfolioTracker::in_memory();
        tracker.add_position(NewLot::new("AAPL", 1.0, 1.0)).unwrap();
        tracker.add_position(NewLot::new("MSFT", 1.0, 1.0)).unwrap();

        let result = tracker.edit_position(
            "AAPL",
            PositionEdit {
                ticker: Some("msft".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidOperation(_))));

        let renamed = tracker
            .edit_position(
                "AAPL",
                PositionEdit {
                    ticker: Some("aapl.ne".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.ticker, "AAPL.NE");
    }

    #[test]
    fn test_cash_per_currency() {
        let mut tracker = PortfolioTracker::in_memory();

        assert_eq!(tracker.cash("USD"), 0.0);

        tracker.set_cash("usd", 10000.0);
        tracker.set_cash("KRW", 2_600_000.0);
        assert_eq!(tracker.cash("USD"), 10000.0);
        assert_eq!(tracker.cash("krw"), 2_600_000.0);
        assert_eq!(tracker.cash("CAD"), 0.0);
    }

    #[test]
    fn test_settings() {
        let mut tracker = PortfolioTracker::in_memory();
        assert_eq!(tracker.settings().display_currency, "USD");

        tracker.set_display_currency("krw");
        assert_eq!(tracker.settings().display_currency, "KRW");

        assert!(tracker.set_risk_free_rate(0.04).is_ok());
        assert!(tracker.set_risk_free_rate(5.0).is_err());
        assert_eq!(tracker.settings().risk_free_rate, 0.04);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");

        {
            let mut tracker = PortfolioTracker::with_path(path.clone());
            tracker
                .add_position(NewLot::new("AAPL", 10.0, 150.0).with_sector("Technology"))
                .unwrap();
            tracker.set_cash("CAD", 5000.0);
            tracker.set_display_currency("CAD");
            tracker.save().unwrap();
        }

        {
            let tracker = PortfolioTracker::with_path(path);
            assert_eq!(tracker.positions().len(), 1);
            assert_eq!(tracker.positions()[0].ticker, "AAPL");
            assert_eq!(tracker.positions()[0].sector, "Technology");
            assert_eq!(tracker.cash("CAD"), 5000.0);
            assert_eq!(tracker.settings().display_currency, "CAD");
        }
    }

    #[test]
    fn test_save_strips_valuation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");

        let mut tracker = PortfolioTracker::with_path(path.clone());
        tracker.add_position(NewLot::new("AAPL", 1.0, 1.0)).unwrap();
        let priced = tracker.positions()[0].priced(180.0, crate::types::PriceSource::Live);
        tracker.get_mut().positions[0] = priced;
        tracker.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("value_in_base"));
    }

    #[test]
    fn test_legacy_array_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(&path, r#"[{"ticker":"VOO","quantity":2.0,"avg_cost":400.0}]"#).unwrap();

        let tracker = PortfolioTracker::with_path(path);
        assert_eq!(tracker.positions().len(), 1);
        assert_eq!(tracker.total_cost(), 800.0);
    }

    #[test]
    fn test_cash_ticker_reserved() {
        let mut tracker = PortfolioTracker::in_memory();

        let result = tracker.add_position(NewLot::new("cash", 10.0, 50.0));
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert!(tracker.positions().is_empty());

        tracker.add_position(NewLot::new("AAPL", 1.0, 1.0)).unwrap();
        let result = tracker.edit_position(
            "AAPL",
            PositionEdit {
                ticker: Some(" Cash ".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(tracker.positions()[0].ticker, "AAPL");
    }

    #[test]
    fn test_lowercase_stored_ticker_merges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(
            &path,
            r#"[{"ticker":" aapl","quantity":1.0,"avg_cost":100.0}]"#,
        )
        .unwrap();

        let mut tracker = PortfolioTracker::with_path(path);
        assert_eq!(tracker.positions()[0].ticker, "AAPL");
        assert!(tracker.find_position("aapl").is_some());

        let (position, was_update) = tracker.add_position(NewLot::new("AAPL", 1.0, 200.0)).unwrap();
        assert!(was_update);
        assert_eq!(tracker.positions().len(), 1);
        assert_eq!(position.quantity, 2.0);
        assert_eq!(position.avg_cost, 150.0);
    }

    #[test]
    fn test_duplicate_stored_rows_coalesce() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(
            &path,
            r#"{"positions":[
                {"ticker":"MSFT","quantity":1.0,"avg_cost":300.0,"sector":"Technology"},
                {"ticker":"msft","quantity":3.0,"avg_cost":100.0}
            ]}"#,
        )
        .unwrap();

        let tracker = PortfolioTracker::with_path(path);
        assert_eq!(tracker.positions().len(), 1);
        let msft = &tracker.positions()[0];
        assert_eq!(msft.quantity, 4.0);
        assert_eq!(msft.avg_cost, 150.0);
        assert_eq!(msft.sector, "Technology");
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        fs::write(&path, "{not json").unwrap();

        let tracker = PortfolioTracker::with_path(path);
        assert!(tracker.positions().is_empty());
    }
}
