//! Success-rate series for percentage charts.

use serde::{Deserialize, Serialize};

use super::types::*;

/// One point of a percentage chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub label: String,
    pub success: f64,
    pub fail: f64,
    pub rate_percent: f64,
}

/// `success / (success + fail) * 100`, or 0 when nothing was attempted
pub fn success_rate(success: f64, fail: f64) -> f64 {
    let attempts = success + fail;
    if attempts <= 0.0 {
        0.0
    } else {
        success / attempts * 100.0
    }
}

/// Build a success-rate series from `records`.
///
/// `event_key` selects a per-event metric map; `None` reads the generic
/// success/fail counters.
pub fn success_rate_series(records: &[SeriesRecord], event_key: Option<&str>) -> Vec<RatePoint> {
    records
        .iter()
        .map(|record| {
            let (success, fail) = match event_key {
                Some(key) => (
                    record.metric(key, Metric::Success).unwrap_or(0.0),
                    record.metric(key, Metric::Fail).unwrap_or(0.0),
                ),
                None => (record.success_count, record.fail_count),
            };
            RatePoint {
                label: record.label(),
                success,
                fail,
                rate_percent: success_rate(success, fail),
            }
        })
        .collect()
}
