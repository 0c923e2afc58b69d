//! Core data types for the Folio analytics engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Ticker of the synthetic cash position built at valuation time.
pub const CASH_TICKER: &str = "CASH";

/// Sector label reserved for the synthetic cash position.
pub const LIQUIDITY_SECTOR: &str = "Liquidity";

/// Sector label used when no sector is known.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Base currency for all internal totals.
pub const BASE_CURRENCY: &str = "USD";

/// Asset class of a holding.
///
/// Storage keeps the class as free text; anything unrecognized collapses to
/// [`AssetClass::Other`] when parsed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum AssetClass {
    #[default]
    Stock,
    Etf,
    Crypto,
    Bond,
    Cash,
    Other,
    Future,
    Index,
}

impl AssetClass {
    /// Canonical label, as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "Stock",
            Self::Etf => "ETF",
            Self::Crypto => "Crypto",
            Self::Bond => "Bond",
            Self::Cash => "Cash",
            Self::Other => "Other",
            Self::Future => "Future",
            Self::Index => "Index",
        }
    }

    /// Parse a free-text label. Unknown labels become `Other`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "STOCK" | "EQUITY" => Self::Stock,
            "ETF" => Self::Etf,
            "CRYPTO" => Self::Crypto,
            "BOND" => Self::Bond,
            "CASH" | "LIQUIDITY" => Self::Cash,
            "FUTURE" => Self::Future,
            "INDEX" => Self::Index,
            _ => Self::Other,
        }
    }

    /// Display priority: lower ranks are listed first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Crypto => 0,
            Self::Stock => 1,
            Self::Etf => 2,
            Self::Index => 3,
            Self::Future => 4,
            Self::Cash => 99,
            Self::Bond | Self::Other => 50,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AssetClass {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<&str> for AssetClass {
    fn from(label: &str) -> Self {
        Self::parse(label)
    }
}

impl From<AssetClass> for String {
    fn from(class: AssetClass) -> Self {
        class.as_str().to_string()
    }
}

/// Where the price used for a valuation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Live quote from the quote provider.
    Live,
    /// Quote unavailable; the position's cost basis stands in for the price.
    CostBasis,
    /// Synthetic cash position.
    Cash,
}

fn default_sector() -> String {
    UNKNOWN_SECTOR.to_string()
}

fn normalize_ticker<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ticker = String::deserialize(deserializer)?;
    Ok(ticker.trim().to_uppercase())
}

/// A holding in the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Ticker symbol (uppercase)
    #[serde(deserialize_with = "normalize_ticker")]
    pub ticker: String,
    /// Units held
    pub quantity: f64,
    /// Average cost per unit; 0 when cost basis is not tracked
    #[serde(default, alias = "avg_price")]
    pub avg_cost: f64,
    #[serde(default)]
    pub asset_class: AssetClass,
    #[serde(default = "default_sector")]
    pub sector: String,
    /// Price used in the last valuation pass (never read from storage)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    /// Value in base currency from the last valuation pass (never read from storage)
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub value_in_base: Option<f64>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub price_source: Option<PriceSource>,
}

impl Position {
    /// Create a new position. The ticker is normalized to uppercase.
    pub fn new(ticker: &str, quantity: f64, avg_cost: f64) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            quantity,
            avg_cost,
            asset_class: AssetClass::default(),
            sector: default_sector(),
            current_price: None,
            value_in_base: None,
            price_source: None,
        }
    }

    /// Set the asset class.
    pub fn with_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    /// Set the sector label.
    pub fn with_sector(mut self, sector: &str) -> Self {
        self.sector = sector.to_string();
        self
    }

    /// Total cost of the holding.
    pub fn total_cost(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    /// Whether this is the synthetic cash entry.
    pub fn is_cash(&self) -> bool {
        self.ticker == CASH_TICKER
    }

    /// Whether the position counts as crypto for the ex-crypto risk view.
    pub fn is_crypto(&self) -> bool {
        self.asset_class == AssetClass::Crypto || self.ticker.contains("BTC")
    }

    /// Copy of the position priced at `price` with the given source.
    pub fn priced(&self, price: f64, source: PriceSource) -> Self {
        Self {
            current_price: Some(price),
            value_in_base: Some(price * self.quantity),
            price_source: Some(source),
            ..self.clone()
        }
    }

    /// Derived value in base currency, 0 when not yet valued.
    pub fn value(&self) -> f64 {
        self.value_in_base.unwrap_or(0.0)
    }

    /// Drop derived valuation fields.
    pub fn without_valuation(&self) -> Self {
        Self {
            current_price: None,
            value_in_base: None,
            price_source: None,
            ..self.clone()
        }
    }
}

/// Cash balances keyed by currency code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CashLedger(BTreeMap<String, f64>);

impl Default for CashLedger {
    fn default() -> Self {
        let balances = ["USD", "CAD", "KRW"]
            .into_iter()
            .map(|c| (c.to_string(), 0.0))
            .collect();
        Self(balances)
    }
}

impl CashLedger {
    /// Create an empty ledger.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Balance in `currency`, 0 if never set.
    pub fn balance(&self, currency: &str) -> f64 {
        self.0.get(&currency.to_uppercase()).copied().unwrap_or(0.0)
    }

    /// Set the balance for `currency`, clamping negatives to 0.
    pub fn set(&mut self, currency: &str, amount: f64) {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        self.0.insert(currency.trim().to_uppercase(), amount);
    }

    /// Builder form of [`CashLedger::set`].
    pub fn with(mut self, currency: &str, amount: f64) -> Self {
        self.set(currency, amount);
        self
    }

    /// Iterate over `(currency, balance)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(c, v)| (c.as_str(), *v))
    }
}

/// FX rate table: units of each currency per 1 unit of base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FxRates {
    rates: HashMap<String, f64>,
    /// True when the rates came from a cache or hardcoded fallback
    pub stale: bool,
}

impl FxRates {
    /// Build a table. The base currency rate is always 1.0.
    pub fn new(rates: HashMap<String, f64>, stale: bool) -> Self {
        let mut rates: HashMap<String, f64> = rates
            .into_iter()
            .map(|(c, r)| (c.to_uppercase(), r))
            .collect();
        rates.insert(BASE_CURRENCY.to_string(), 1.0);
        Self { rates, stale }
    }

    /// Build a fresh table from `(currency, rate)` pairs.
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let rates = pairs.iter().map(|(c, r)| (c.to_string(), *r)).collect();
        Self::new(rates, false)
    }

    /// Rate for `currency` if known and usable.
    pub fn get(&self, currency: &str) -> Option<f64> {
        self.rates
            .get(&currency.to_uppercase())
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Rate for `currency`, or `default` when unknown.
    pub fn get_or(&self, currency: &str, default: f64) -> f64 {
        self.get(currency).unwrap_or(default)
    }

    /// All rates.
    pub fn rates(&self) -> &HashMap<String, f64> {
        &self.rates
    }

    /// Convert a base-currency amount into `currency`.
    pub fn to_display(&self, amount_base: f64, currency: &str) -> f64 {
        amount_base * self.get_or(currency, 1.0)
    }

    /// Convert an amount in `currency` back into base currency.
    pub fn to_base(&self, amount: f64, currency: &str) -> f64 {
        amount / self.get_or(currency, 1.0)
    }
}

impl Default for FxRates {
    fn default() -> Self {
        Self::new(HashMap::new(), false)
    }
}

/// Output of a valuation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Total value in base currency, cash included
    pub total_base: f64,
    /// Total value in the display currency
    pub total_display: f64,
    pub display_currency: String,
    /// Valued positions in display order, synthetic cash last
    pub positions: Vec<Position>,
    /// Cash converted to base currency, listed or not
    pub cash_base: f64,
    /// FX rates were not live
    pub fx_stale: bool,
}

impl PortfolioSnapshot {
    /// Positions that are not the synthetic cash entry.
    pub fn real_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.ticker != CASH_TICKER)
    }

    /// Number of listed positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }
}

/// One point of a portfolio value series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl ValuePoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Inputs for the manual Sharpe estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskInputs {
    /// Expected annual return (0.20 = 20%)
    #[serde(default)]
    pub roi: f64,
    /// Expected annual volatility
    #[serde(default)]
    pub volatility: f64,
}

fn default_display_currency() -> String {
    BASE_CURRENCY.to_string()
}

fn default_risk_free_rate() -> f64 {
    0.045
}

/// User settings persisted alongside the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_display_currency", alias = "base_currency")]
    pub display_currency: String,
    /// Annual risk-free rate for the empirical Sharpe ratio
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub risk_inputs: RiskInputs,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_currency: default_display_currency(),
            risk_free_rate: default_risk_free_rate(),
            risk_inputs: RiskInputs::default(),
        }
    }
}

/// A portfolio: positions, cash ledger and settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Portfolio {
    #[serde(default, alias = "assets")]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub cash: CashLedger,
    #[serde(default)]
    pub settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Portfolio {
    /// Create a new empty portfolio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate total cost basis of all positions.
    pub fn total_cost(&self) -> f64 {
        self.positions.iter().map(|p| p.total_cost()).sum()
    }

    /// Get the number of positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }
}

/// API response wrapper used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when any figure in `data` came from cached or fallback inputs
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            stale: false,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            stale: false,
        }
    }

    /// Mark the response as computed from stale inputs.
    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }
}
