//! Engine configuration, read from TOML.
//!
//! Default path: `<config dir>/folio/config.toml` (e.g.
//! `~/.config/folio/config.toml` on Linux), overridable with `FOLIO_CONFIG`.
//! A missing file yields the defaults.
//!
//! ```toml
//! history_period = "6mo"
//! cash_materiality = 1.0
//!
//! [fx_fallback]
//! CAD = 1.36
//! KRW = 1350.0
//!
//! [benchmarks]
//! risk_free_rate = 0.04
//! crypto = { roi = 0.5, volatility = 0.7 }
//! ```

use crate::market::{HistoryWindow, FALLBACK_RATES, FX_FRESHNESS_SECS};
use crate::portfolio::{BenchmarkModel, CASH_MATERIALITY};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn default_history_period() -> String {
    "1y".to_string()
}

fn default_cash_materiality() -> f64 {
    CASH_MATERIALITY
}

fn default_fx_fallback() -> HashMap<String, f64> {
    FALLBACK_RATES
        .iter()
        .map(|(c, r)| (c.to_string(), *r))
        .collect()
}

fn default_fx_freshness_secs() -> i64 {
    FX_FRESHNESS_SECS
}

/// Tunables for an analytics pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lookback for the value history (`5d`, `6mo`, `1y`, `ytd`, `max`, ...)
    #[serde(default = "default_history_period")]
    pub history_period: String,
    /// Cash in base currency must exceed this to be listed as a position
    #[serde(default = "default_cash_materiality")]
    pub cash_materiality: f64,
    /// Rates used when live FX is unavailable (units per 1 USD)
    #[serde(default = "default_fx_fallback")]
    pub fx_fallback: HashMap<String, f64>,
    /// Seconds a live FX fetch is reused
    #[serde(default = "default_fx_freshness_secs")]
    pub fx_freshness_secs: i64,
    /// Benchmark-weighted model assumptions
    #[serde(default)]
    pub benchmarks: BenchmarkModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_period: default_history_period(),
            cash_materiality: default_cash_materiality(),
            fx_fallback: default_fx_fallback(),
            fx_freshness_secs: default_fx_freshness_secs(),
            benchmarks: BenchmarkModel::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_path())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("FOLIO_CONFIG") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("folio/config.toml"))
            .unwrap_or_else(|| PathBuf::from("folio.toml"))
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.fx_fallback = config
            .fx_fallback
            .into_iter()
            .map(|(c, r)| (c.trim().to_uppercase(), r))
            .collect();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.cash_materiality.is_finite() || self.cash_materiality < 0.0 {
            return Err(Error::Config(format!(
                "cash_materiality must be a non-negative number, got {}",
                self.cash_materiality
            )));
        }
        if let Some((currency, rate)) = self
            .fx_fallback
            .iter()
            .find(|(_, r)| !r.is_finite() || **r <= 0.0)
        {
            return Err(Error::Config(format!(
                "fx_fallback rate for {} must be positive, got {}",
                currency, rate
            )));
        }
        if self.history_period.trim().is_empty() {
            return Err(Error::Config("history_period is empty".to_string()));
        }
        Ok(())
    }

    /// History window for the configured period.
    pub fn history_window(&self) -> HistoryWindow {
        HistoryWindow::period(&self.history_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.history_period, "1y");
        assert_eq!(config.cash_materiality, 1.0);
        assert_eq!(config.fx_fallback.get("CAD"), Some(&1.35));
        assert_eq!(config.fx_fallback.get("KRW"), Some(&1300.0));
        assert_eq!(config.benchmarks.risk_free_rate, 0.035);
        assert_eq!(config.history_window(), HistoryWindow::Period("1y".to_string()));
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            history_period = "6MO"

            [fx_fallback]
            cad = 1.4

            [benchmarks]
            risk_free_rate = 0.04
            crypto = { roi = 0.5, volatility = 0.7 }
            "#,
        )
        .unwrap();

        assert_eq!(config.history_window(), HistoryWindow::Period("6mo".to_string()));
        assert_eq!(config.fx_fallback.get("CAD"), Some(&1.4));
        assert!(!config.fx_fallback.contains_key("KRW"));
        assert_eq!(config.benchmarks.crypto.roi, 0.5);
        // Unlisted classes keep their defaults
        assert_eq!(config.benchmarks.stock.roi, 0.12);
        assert_eq!(config.benchmarks.risk_free_rate, 0.04);
        assert_eq!(config.cash_materiality, 1.0);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("cash_materiality = -1.0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[fx_fallback]\nKRW = 0.0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("history_period = 5"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cash_materiality = 10.0").unwrap();

        let config = EngineConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.cash_materiality, 10.0);
    }
}
