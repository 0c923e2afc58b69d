//! File-backed market data provider.
//!
//! A market snapshot is a JSON document holding current quotes, FX rates and
//! a raw history table. It implements both provider traits, which makes the
//! engine usable offline and keeps tests deterministic.

use super::{
    classify_asset, normalize, AssetInfo, HistoryProvider, HistoryWindow, PriceLookup,
    PriceMatrix, QuoteProvider, RawHistory,
};
use crate::types::BASE_CURRENCY;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Quote and metadata for one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteEntry {
    /// Last price; 0 or absent means no price available
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Point-in-time market data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Date the snapshot was taken; anchors period windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub quotes: HashMap<String, QuoteEntry>,
    /// Units per 1 USD; absent simulates an FX outage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<HashMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<RawHistory>,
}

impl MarketSnapshot {
    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut snapshot: Self = serde_json::from_str(content)?;
        snapshot.quotes = snapshot
            .quotes
            .into_iter()
            .map(|(ticker, entry)| (ticker.trim().to_uppercase(), entry))
            .collect();
        Ok(snapshot)
    }

    /// Add or replace a quote.
    pub fn with_quote(mut self, ticker: &str, entry: QuoteEntry) -> Self {
        self.quotes.insert(ticker.trim().to_uppercase(), entry);
        self
    }

    fn entry(&self, ticker: &str) -> Option<&QuoteEntry> {
        self.quotes.get(&ticker.trim().to_uppercase())
    }
}

impl QuoteProvider for MarketSnapshot {
    fn current_price(&self, ticker: &str) -> PriceLookup {
        match self.entry(ticker) {
            Some(entry) => PriceLookup::from_raw(entry.price),
            None => {
                tracing::debug!("No quote for {} in snapshot", ticker);
                PriceLookup::Unavailable
            }
        }
    }

    fn asset_info(&self, ticker: &str) -> Option<AssetInfo> {
        self.entry(ticker).map(|entry| {
            classify_asset(
                ticker,
                entry.quote_type.as_deref(),
                entry.sector.as_deref(),
                entry.category.as_deref(),
                entry.name.as_deref(),
            )
        })
    }

    fn fetch_fx_rates(&self, base: &str) -> Result<HashMap<String, f64>> {
        if !base.eq_ignore_ascii_case(BASE_CURRENCY) {
            return Err(Error::MarketData(format!(
                "snapshot rates are quoted against {}, not {}",
                BASE_CURRENCY, base
            )));
        }
        self.fx
            .clone()
            .ok_or_else(|| Error::MarketData("snapshot has no FX rates".to_string()))
    }
}

impl HistoryProvider for MarketSnapshot {
    fn history(&self, tickers: &[String], window: &HistoryWindow) -> Result<PriceMatrix> {
        let raw = match &self.history {
            Some(raw) => raw.clone(),
            None => return Ok(PriceMatrix::empty()),
        };

        let mut matrix = normalize(raw, tickers)?;
        let anchor = match self.as_of.or_else(|| matrix.dates().last().copied()) {
            Some(anchor) => anchor,
            None => return Ok(matrix),
        };
        matrix.retain_dates(|date| window.contains(date, anchor));
        Ok(matrix)
    }
}
