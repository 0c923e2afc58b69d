//! Market data boundary.
//!
//! The analytics code only talks to the two provider traits defined here and
//! only ever sees a canonical [`PriceMatrix`]. Provider-specific response
//! shapes are handled by [`normalize`] inside the provider implementation.

mod fx;
mod matrix;
mod normalize;
mod snapshot;

pub use fx::{FxResolver, FALLBACK_RATES, FX_FRESHNESS_SECS};
pub use matrix::PriceMatrix;
pub use normalize::{normalize, RawHistory};
pub use snapshot::{MarketSnapshot, QuoteEntry};

use crate::types::{AssetClass, UNKNOWN_SECTOR};
use crate::Result;
use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a current-price lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceLookup {
    Available(f64),
    /// The provider failed or returned no usable price.
    Unavailable,
}

impl PriceLookup {
    /// Map a raw provider price to a lookup. Zero, negative and non-finite
    /// prices mean "no price available".
    pub fn from_raw(price: f64) -> Self {
        if price.is_finite() && price > 0.0 {
            Self::Available(price)
        } else {
            Self::Unavailable
        }
    }

    /// The price, if any.
    pub fn price(&self) -> Option<f64> {
        match self {
            Self::Available(p) => Some(*p),
            Self::Unavailable => None,
        }
    }
}

/// Static metadata for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset_class: AssetClass,
    pub sector: String,
    pub name: String,
}

/// Source of current prices, asset metadata and live FX rates.
pub trait QuoteProvider: Send + Sync {
    /// Current price for `ticker`. Never fails; failures are `Unavailable`.
    fn current_price(&self, ticker: &str) -> PriceLookup;

    /// Metadata for `ticker`, `None` when the lookup fails.
    fn asset_info(&self, ticker: &str) -> Option<AssetInfo>;

    /// Live FX rates as units of each currency per 1 unit of `base`.
    ///
    /// Callers normally go through [`FxResolver`], which adds caching and
    /// fallbacks on top of this raw fetch.
    fn fetch_fx_rates(&self, base: &str) -> Result<HashMap<String, f64>>;
}

/// Source of historical daily close prices.
pub trait HistoryProvider: Send + Sync {
    /// Close prices for `tickers` over `window`.
    ///
    /// Tickers the provider has no data for are absent from the result.
    fn history(&self, tickers: &[String], window: &HistoryWindow) -> Result<PriceMatrix>;
}

/// Time window for a history request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    /// Lookback period such as `5d`, `1wk`, `6mo`, `1y`, `ytd` or `max`.
    Period(String),
    /// Inclusive date range.
    Range { start: NaiveDate, end: NaiveDate },
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::Period("1y".to_string())
    }
}

impl HistoryWindow {
    /// Lookback period window.
    pub fn period(period: &str) -> Self {
        Self::Period(period.trim().to_lowercase())
    }

    /// Inclusive `(start, end)` bounds relative to `anchor`, the most recent
    /// date available. `None` means unbounded on that side.
    pub fn bounds(&self, anchor: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            Self::Range { start, end } => (Some(*start), Some(*end)),
            Self::Period(period) => (period_start(period, anchor), None),
        }
    }

    /// Whether `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate, anchor: NaiveDate) -> bool {
        let (start, end) = self.bounds(anchor);
        start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
    }
}

fn period_start(period: &str, anchor: NaiveDate) -> Option<NaiveDate> {
    match period {
        "max" => return None,
        "ytd" => return NaiveDate::from_ymd_opt(anchor.year(), 1, 1),
        _ => {}
    }

    let split = period
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(period.len());
    let (count, unit) = period.split_at(split);
    let count: u32 = match count.parse() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!("Unrecognized history period {:?}, using 1y", period);
            return anchor.checked_sub_months(Months::new(12));
        }
    };

    match unit {
        "d" => anchor.checked_sub_signed(Duration::days(count as i64)),
        "wk" | "w" => anchor.checked_sub_signed(Duration::weeks(count as i64)),
        "mo" | "m" => anchor.checked_sub_months(Months::new(count)),
        "y" => anchor.checked_sub_months(Months::new(count * 12)),
        _ => {
            tracing::warn!("Unrecognized history period {:?}, using 1y", period);
            anchor.checked_sub_months(Months::new(12))
        }
    }
}

/// Derive asset class and sector from provider metadata.
///
/// Sector falls back to the fund category, then to a generic ETF label, then
/// to "Unknown". Tickers quoted against USD (`*-USD`) are always crypto.
pub fn classify_asset(
    ticker: &str,
    quote_type: Option<&str>,
    sector: Option<&str>,
    category: Option<&str>,
    name: Option<&str>,
) -> AssetInfo {
    let ticker = ticker.trim().to_uppercase();

    let mut asset_class = match quote_type.map(|q| q.trim().to_uppercase()).as_deref() {
        Some("CRYPTOCURRENCY") => AssetClass::Crypto,
        Some("ETF") | Some("MUTUALFUND") => AssetClass::Etf,
        Some("FUTURE") => AssetClass::Future,
        Some("INDEX") => AssetClass::Index,
        _ => AssetClass::Stock,
    };

    let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    let mut sector = non_empty(sector)
        .or_else(|| non_empty(category))
        .unwrap_or_else(|| {
            if asset_class == AssetClass::Etf {
                "Exchange Traded Fund".to_string()
            } else {
                UNKNOWN_SECTOR.to_string()
            }
        });

    if ticker.ends_with("-USD") {
        asset_class = AssetClass::Crypto;
        sector = "Crypto".to_string();
    }

    AssetInfo {
        asset_class,
        sector,
        name: non_empty(name).unwrap_or_else(|| ticker.clone()),
    }
}
