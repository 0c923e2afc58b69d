//! Weighted-average cost merging for repeated buys of the same ticker.

use crate::types::{AssetClass, Position};
use serde::{Deserialize, Serialize};

/// An incoming lot, as supplied by the command layer.
///
/// Class and sector are optional: when absent the existing position keeps
/// its own values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLot {
    pub ticker: String,
    pub quantity: f64,
    #[serde(default)]
    pub avg_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<AssetClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
}

impl NewLot {
    /// Create a lot without class or sector.
    pub fn new(ticker: &str, quantity: f64, avg_cost: f64) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            quantity,
            avg_cost,
            asset_class: None,
            sector: None,
        }
    }

    /// Build a lot from raw user text. Unparseable amounts become 0 and
    /// blank labels are treated as not provided.
    pub fn from_input(
        ticker: &str,
        quantity: &str,
        avg_cost: &str,
        asset_class: Option<&str>,
        sector: Option<&str>,
    ) -> Self {
        let quantity = parse_amount(quantity).unwrap_or_else(|| {
            tracing::warn!("Unparseable quantity {:?} for {}, using 0", quantity, ticker);
            0.0
        });
        let avg_cost = parse_amount(avg_cost).unwrap_or_else(|| {
            tracing::warn!("Unparseable cost {:?} for {}, using 0", avg_cost, ticker);
            0.0
        });

        Self {
            ticker: ticker.trim().to_uppercase(),
            quantity,
            avg_cost,
            asset_class: non_blank(asset_class).map(AssetClass::parse),
            sector: non_blank(sector).map(String::from),
        }
    }

    /// Set the asset class.
    pub fn with_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = Some(asset_class);
        self
    }

    /// Set the sector.
    pub fn with_sector(mut self, sector: &str) -> Self {
        self.sector = non_blank(Some(sector)).map(String::from);
        self
    }

    /// Convert into a fresh position when there is nothing to merge with.
    pub fn into_position(self) -> Position {
        let mut position = Position::new(&self.ticker, self.quantity, self.avg_cost);
        if let Some(class) = self.asset_class {
            position.asset_class = class;
        }
        if let Some(sector) = self.sector {
            position.sector = sector;
        }
        if position.asset_class == AssetClass::Crypto {
            position.avg_cost = 0.0;
        }
        position
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a user-entered amount such as `"1,250.50"` or `"$99"`.
///
/// Returns `None` for anything that is not a finite, non-negative number.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Merge an incoming lot into an existing position.
///
/// - Quantities add up.
/// - Cost basis is the quantity-weighted average of both sides. A zero cost
///   on one side is a real zero and pulls the average down.
/// - Crypto never tracks cost basis: the merged cost is 0.
/// - A zero total quantity gives a zero cost.
/// - Class and sector come from the lot when provided.
pub fn merge_position(existing: &Position, incoming: &NewLot) -> Position {
    let total_qty = existing.quantity + incoming.quantity;

    let asset_class = incoming.asset_class.unwrap_or(existing.asset_class);
    let sector = incoming
        .sector
        .clone()
        .unwrap_or_else(|| existing.sector.clone());

    let is_crypto =
        asset_class == AssetClass::Crypto || existing.asset_class == AssetClass::Crypto;

    let avg_cost = if is_crypto || total_qty <= 0.0 {
        0.0
    } else {
        let weighted = (existing.quantity * existing.avg_cost
            + incoming.quantity * incoming.avg_cost)
            / total_qty;
        if weighted.is_finite() {
            weighted
        } else {
            0.0
        }
    };

    Position {
        ticker: existing.ticker.clone(),
        quantity: total_qty,
        avg_cost,
        asset_class,
        sector,
        ..existing.without_valuation()
    }
}
