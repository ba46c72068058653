//! Canonical listing schema and the deterministic ranking score.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// One GPU offering normalized to the common schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub source: SourceId,
    pub external_id: String,
    pub model: String,
    pub vram_gb: u32,
    pub price_per_hour: f64,
    pub available: bool,
    pub location: String,
    /// Raw reliability signal from the provider, in [0, 1].
    pub reliability: f64,
    /// Derived ranking score in [0, 100]; see [`ScoreWeights::score`].
    pub score: f64,
}

/// Fixed per-adapter weighting of performance, reliability, and cost
/// efficiency. Weights are adapter constants, not runtime-configurable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub performance: f64,
    pub reliability: f64,
    pub efficiency: f64,
}

impl ScoreWeights {
    pub const fn new(performance: f64, reliability: f64, efficiency: f64) -> Self {
        Self {
            performance,
            reliability,
            efficiency,
        }
    }

    /// Deterministic weighted score on a 0-100 scale.
    ///
    /// Efficiency is the inverse of the hourly price, offset to avoid a
    /// division by zero and capped at 1.0. The result is rounded to two
    /// decimals so repeated normalization of the same record is identical.
    pub fn score(&self, performance: f64, reliability: f64, price_per_hour: f64) -> f64 {
        let efficiency = (1.0 / (price_per_hour + 0.1)).min(1.0);
        let raw = (performance.clamp(0.0, 1.0) * self.performance
            + reliability.clamp(0.0, 1.0) * self.reliability
            + efficiency * self.efficiency)
            * 100.0;
        round2(raw.min(100.0))
    }
}

/// Round to two decimals; keeps scores stable across normalize calls.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Canonical ordering for merged listings: descending score, ties broken by
/// lowest price, then source name, then external id for full determinism.
pub fn canonical_order(a: &NormalizedListing, b: &NormalizedListing) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.price_per_hour.total_cmp(&b.price_per_hour))
        .then_with(|| a.source.as_str().cmp(b.source.as_str()))
        .then_with(|| a.external_id.cmp(&b.external_id))
}

/// Sort a merged batch into the canonical ranked order.
pub fn sort_canonical(listings: &mut [NormalizedListing]) {
    listings.sort_by(canonical_order);
}
