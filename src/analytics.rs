/*!
 * Derived statistics over the Pass 2 aggregates
 *
 * Every metric that can be undefined returns `Option`; a zero or absent
 * denominator is `None`, never zero or infinity.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_types::Totals;

/// Median of a sample
///
/// Sorts a copy ascending. The result is an estimate when the sample is a
/// capped subset of the population.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentage change from `early` to `late`, defined only when `early > 0`
pub fn growth_pct(early: f64, late: f64) -> Option<f64> {
    (early > 0.0).then(|| (late - early) / early * 100.0)
}

/// Change in cost per claim between two periods
pub fn cost_per_claim_growth_pct(early: &Totals, late: &Totals) -> Option<f64> {
    growth_pct(early.cost_per_claim()?, late.cost_per_claim()?)
}

/// Provider rate relative to the procedure median
///
/// Defined only when the rate and median are both positive, so a defined
/// index is always > 0.
pub fn cost_index(cost_per_claim: Option<f64>, median: Option<f64>) -> Option<f64> {
    let cpc = cost_per_claim?;
    let median = median?;
    (cpc > 0.0 && median > 0.0).then(|| cpc / median)
}

/// Round to cents, half away from zero
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round_cents_opt(value: Option<f64>) -> Option<f64> {
    value.map(round_cents)
}

/// Which side of the median an outlier falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierDirection {
    High,
    Low,
}

impl fmt::Display for OutlierDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlierDirection::High => write!(f, "high"),
            OutlierDirection::Low => write!(f, "low"),
        }
    }
}

/// Noise gate and cost-index thresholds for outlier detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierRule {
    pub min_claims: u64,
    pub min_paid: f64,
    pub high_index: f64,
    pub low_index: f64,
}

impl Default for OutlierRule {
    fn default() -> Self {
        Self {
            min_claims: 100,
            min_paid: 10_000.0,
            high_index: 2.0,
            low_index: 0.5,
        }
    }
}

impl OutlierRule {
    /// Whether a pair has enough volume to be considered at all
    pub fn is_candidate(&self, totals: &Totals) -> bool {
        totals.claims >= self.min_claims && totals.paid >= self.min_paid
    }

    pub fn classify(&self, totals: &Totals, cost_index: Option<f64>) -> Option<OutlierDirection> {
        if !self.is_candidate(totals) {
            return None;
        }
        let index = cost_index?;
        if index > self.high_index {
            Some(OutlierDirection::High)
        } else if index < self.low_index {
            Some(OutlierDirection::Low)
        } else {
            None
        }
    }
}
