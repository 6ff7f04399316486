//! Weighted-average system time.
use serde::{Deserialize, Serialize};

/// The published system time and when it was computed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEstimate {
    pub value: i64,
    pub computed_at: i64,
    pub contributing_count: usize,
}

/// `round(Σ tᵢ·wᵢ / Σ wᵢ)` over `(timestamp, weight)` samples.
///
/// When every weight is zero this falls back to the plain mean, also rounded
/// to the nearest millisecond. Returns `None` for no samples.
pub fn weighted_estimate(samples: &[(i64, f64)]) -> Option<i64> {
    if samples.is_empty() {
        return None;
    }
    let total_weight: f64 = samples.iter().map(|(_, weight)| weight).sum();
    if total_weight > 0.0 {
        let weighted_sum: f64 = samples
            .iter()
            .map(|(timestamp, weight)| *timestamp as f64 * weight)
            .sum();
        Some((weighted_sum / total_weight).round() as i64)
    } else {
        Some(mean(samples))
    }
}

fn mean(samples: &[(i64, f64)]) -> i64 {
    let sum: i128 = samples.iter().map(|(timestamp, _)| *timestamp as i128).sum();
    (sum as f64 / samples.len() as f64).round() as i64
}
