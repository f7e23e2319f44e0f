//! Hour-of-day bucketing of time-series records.
//!
//! Records from any calendar day are folded into a 24-slot histogram and
//! summarised with peak, lowest, average and a coarse trend signal.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::*;

/// Relative change between the two halves of the observed range below which the trend is stable
pub const DEFAULT_TREND_TOLERANCE: f64 = 0.10;

/// Match: "9 AM", "12pm", "Mar 3, 11 PM"
static TWELVE_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*([AP]M)\b").expect("Invalid twelve_hour regex")
});

/// Match: "14:00", "2024-03-03 9:30"
static TWENTY_FOUR_HOUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("Invalid twenty_four_hour regex")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HourParseError {
    #[error("Record {index} has no timestamp and an unreadable date label: {label:?}")]
    UnreadableDate { index: usize, label: Option<String> },

    #[error("Record {index} has an out-of-range timestamp: {timestamp}")]
    InvalidTimestamp { index: usize, timestamp: EpochMillis },
}

/// What to do with a record whose hour cannot be determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnparseablePolicy {
    /// Fail the whole bucketing pass
    #[default]
    Reject,
    /// Legacy behaviour: bucket into hour 0 and list the record in `defaulted_records`
    Midnight,
}

/// Selects one event series out of the per-record metric maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMetric {
    pub event_key: String,
    /// Rank hours by average delay instead of summed count
    #[serde(default)]
    pub averaged: bool,
}

#[derive(Debug, Clone)]
pub struct HourlyOptions {
    /// `None` reads the generic count/success/fail fields
    pub active_metric: Option<ActiveMetric>,
    /// Offset treated as local time when extracting the hour from timestamps
    pub utc_offset: FixedOffset,
    pub unparseable: UnparseablePolicy,
    pub trend_tolerance: f64,
}

impl Default for HourlyOptions {
    fn default() -> Self {
        Self {
            active_metric: None,
            utc_offset: Utc.fix(),
            unparseable: UnparseablePolicy::default(),
            trend_tolerance: DEFAULT_TREND_TOLERANCE,
        }
    }
}

/// Parse an hour out of a display label.
///
/// The 12-hour "H AM/PM" form takes priority over the 24-hour "H:MM" form.
pub fn parse_hour_label(label: &str) -> Option<u8> {
    if let Some(caps) = TWELVE_HOUR.captures(label) {
        let hour: u8 = caps.get(1)?.as_str().parse().ok()?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = caps.get(2)?.as_str().eq_ignore_ascii_case("PM");
        return Some(match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        });
    }

    let caps = TWENTY_FOUR_HOUR.captures(label)?;
    let hour: u8 = caps.get(1)?.as_str().parse().ok()?;
    (hour < 24).then_some(hour)
}

/// Hour of day for one record: the timestamp in `offset` if present, else the date label
pub fn hour_of_record(
    record: &SeriesRecord,
    index: usize,
    offset: &FixedOffset,
) -> Result<u8, HourParseError> {
    if let Some(timestamp) = record.timestamp {
        let utc: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp)
            .ok_or(HourParseError::InvalidTimestamp { index, timestamp })?;
        return Ok(utc.with_timezone(offset).hour() as u8);
    }

    record
        .date
        .as_deref()
        .and_then(parse_hour_label)
        .ok_or_else(|| HourParseError::UnreadableDate {
            index,
            label: record.date.clone(),
        })
}

/// Fold one record's contribution into its hour bucket
fn accumulate(bucket: &mut HourBucket, record: &SeriesRecord, active: Option<&ActiveMetric>) {
    bucket.occurrence_count += 1;

    let Some(active) = active else {
        bucket.total += record.count;
        bucket.success += record.success_count;
        bucket.fail += record.fail_count;
        return;
    };

    let key = active.event_key.as_str();
    bucket.total += record.metric(key, Metric::Count).unwrap_or(0.0);
    bucket.success += record.metric(key, Metric::Success).unwrap_or(0.0);
    bucket.fail += record.metric(key, Metric::Fail).unwrap_or(0.0);
    if active.averaged {
        if let Some(delay) = record.metric(key, Metric::AvgDelay) {
            bucket.avg_delay_sum += delay;
            bucket.delay_count += 1;
        }
    }
}

/// Compare the summed value of the first half of the observed hours to the second half
fn detect_trend(values: &[f64], tolerance: f64) -> Trend {
    let n = values.len();
    if n < 2 {
        return Trend::Stable;
    }

    let half = n / 2;
    let first: f64 = values[..half].iter().sum();
    let second: f64 = values[n - half..].iter().sum();

    if first == 0.0 {
        return if second > 0.0 { Trend::Up } else { Trend::Stable };
    }

    let change = (second - first) / first;
    if change > tolerance {
        Trend::Up
    } else if change < -tolerance {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Bucket `records` by hour of day and derive summary statistics.
///
/// With no observed hours every derived field stays at its zero/`None`
/// sentinel; see [`HourlyStats::has_sufficient_data`].
pub fn bucket_by_hour(
    records: &[SeriesRecord],
    options: &HourlyOptions,
) -> Result<HourlyStats, HourParseError> {
    let active = options.active_metric.as_ref();
    let averaged = active.map(|a| a.averaged).unwrap_or(false);
    let mut stats = HourlyStats::empty(averaged);

    for (index, record) in records.iter().enumerate() {
        let hour = match hour_of_record(record, index, &options.utc_offset) {
            Ok(hour) => hour,
            Err(e) if options.unparseable == UnparseablePolicy::Midnight => {
                log::warn!("{}; bucketing into hour 0", e);
                stats.defaulted_records.push(index);
                0
            }
            Err(e) => return Err(e),
        };
        accumulate(&mut stats.buckets[hour as usize], record, active);
    }

    let observed: Vec<(u8, f64)> = stats
        .buckets
        .iter()
        .filter(|b| b.occurrence_count > 0)
        .map(|b| (b.hour, b.metric_value(averaged)))
        .collect();

    stats.observed_hours = observed.len();
    if observed.is_empty() {
        return Ok(stats);
    }

    // Strict comparisons keep the earliest hour on ties
    let mut peak = observed[0];
    for &(hour, value) in &observed[1..] {
        if value > peak.1 {
            peak = (hour, value);
        }
    }
    stats.peak_hour = Some(peak.0);
    stats.peak_value = peak.1;

    let mut lowest: Option<(u8, f64)> = None;
    for &(hour, value) in observed.iter().filter(|(_, v)| *v > 0.0) {
        if lowest.map_or(true, |(_, low)| value < low) {
            lowest = Some((hour, value));
        }
    }
    if let Some((hour, value)) = lowest {
        stats.lowest_hour = Some(hour);
        stats.lowest_value = value;
    }

    let values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
    stats.average_per_hour = values.iter().sum::<f64>() / values.len() as f64;
    stats.trend = detect_trend(&values, options.trend_tolerance);

    log::debug!(
        "Bucketed {} records into {} hours (peak {:?}, trend {})",
        records.len(),
        stats.observed_hours,
        stats.peak_hour,
        stats.trend
    );

    Ok(stats)
}
