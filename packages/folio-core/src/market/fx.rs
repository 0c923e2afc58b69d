//! FX rate resolution with last-known cache and hardcoded fallbacks.

use super::QuoteProvider;
use crate::types::{FxRates, BASE_CURRENCY};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Rates used when no live or cached rate exists (units per 1 USD).
pub const FALLBACK_RATES: [(&str, f64); 2] = [("CAD", 1.35), ("KRW", 1300.0)];

/// How long a successful live fetch is reused without refetching.
pub const FX_FRESHNESS_SECS: i64 = 3600;

/// Resolves the FX table for a valuation pass.
///
/// A live fetch within the freshness window is reused as-is. When the live
/// fetch fails the last successful table is returned, or the hardcoded
/// fallbacks if there never was one; both cases are flagged stale.
#[derive(Debug, Clone)]
pub struct FxResolver {
    fallback: HashMap<String, f64>,
    last_known: Option<(HashMap<String, f64>, DateTime<Utc>)>,
    freshness_secs: i64,
}

impl Default for FxResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FxResolver {
    /// Create a resolver with the built-in fallback table.
    pub fn new() -> Self {
        let fallback = FALLBACK_RATES
            .iter()
            .map(|(c, r)| (c.to_string(), *r))
            .collect();
        Self {
            fallback,
            last_known: None,
            freshness_secs: FX_FRESHNESS_SECS,
        }
    }

    /// Replace the fallback table.
    pub fn with_fallback(mut self, fallback: HashMap<String, f64>) -> Self {
        self.fallback = fallback
            .into_iter()
            .map(|(c, r)| (c.to_uppercase(), r))
            .collect();
        self
    }

    /// Change how long a live fetch is reused.
    pub fn with_freshness_secs(mut self, secs: i64) -> Self {
        self.freshness_secs = secs;
        self
    }

    /// Resolve rates now.
    pub fn resolve(&mut self, provider: &dyn QuoteProvider) -> FxRates {
        self.resolve_at(provider, Utc::now())
    }

    /// Resolve rates as of `now`.
    pub fn resolve_at(&mut self, provider: &dyn QuoteProvider, now: DateTime<Utc>) -> FxRates {
        if let Some((rates, fetched_at)) = &self.last_known {
            if (now - *fetched_at).num_seconds() < self.freshness_secs {
                return FxRates::new(rates.clone(), false);
            }
        }

        match provider.fetch_fx_rates(BASE_CURRENCY) {
            Ok(live) => {
                let mut rates: HashMap<String, f64> = live
                    .into_iter()
                    .filter(|(_, r)| r.is_finite() && *r > 0.0)
                    .map(|(c, r)| (c.to_uppercase(), r))
                    .collect();

                let mut partial = false;
                for (currency, rate) in &self.fallback {
                    if !rates.contains_key(currency) {
                        tracing::warn!("No live FX rate for {}, using fallback {}", currency, rate);
                        rates.insert(currency.clone(), *rate);
                        partial = true;
                    }
                }

                if partial {
                    FxRates::new(rates, true)
                } else {
                    self.last_known = Some((rates.clone(), now));
                    FxRates::new(rates, false)
                }
            }
            Err(e) => {
                tracing::warn!("FX fetch failed: {}", e);
                match &self.last_known {
                    Some((rates, _)) => FxRates::new(rates.clone(), true),
                    None => FxRates::new(self.fallback.clone(), true),
                }
            }
        }
    }
}
