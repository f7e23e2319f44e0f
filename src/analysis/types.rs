//! Core data types for dashboard analysis.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as delivered by the event data service
pub type EpochMillis = i64;

/// One observed occurrence or one pre-aggregated count bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: String,
    /// Event that directly followed, when transition data is available
    #[serde(default)]
    pub next_event_id: Option<String>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub timestamp: Option<EpochMillis>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub success: Option<f64>,
    #[serde(default)]
    pub fail: Option<f64>,
    #[serde(default)]
    pub avg_delay: Option<f64>,
}

impl EventRecord {
    pub fn new(event_id: impl Into<String>, count: u64) -> Self {
        Self {
            event_id: event_id.into(),
            count,
            ..Self::default()
        }
    }

    pub fn transition(
        event_id: impl Into<String>,
        next_event_id: impl Into<String>,
        count: u64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            next_event_id: Some(next_event_id.into()),
            count,
            ..Self::default()
        }
    }
}

/// A named bucket of events representing one step in a funnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// JSON datasets may use the camelCase name
    #[serde(default, alias = "eventIds")]
    pub event_ids: Vec<String>,
}

impl Stage {
    pub fn new(id: impl Into<String>, event_ids: &[&str]) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            event_ids: event_ids.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Event identifiers in declaration order with duplicates removed
    pub fn unique_event_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.event_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Input to the flow aggregator. The caller decides which shape of data it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", content = "records", rename_all = "snake_case")]
pub enum FlowInput {
    /// Records carry `next_event_id`; links are measured transitions
    Transitions(Vec<EventRecord>),
    /// Only per-event totals are known; links are proportional estimates
    TotalsOnly(Vec<EventRecord>),
}

impl FlowInput {
    pub fn records(&self) -> &[EventRecord] {
        match self {
            FlowInput::Transitions(records) | FlowInput::TotalsOnly(records) => records,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, FlowInput::TotalsOnly(_))
    }
}

/// A rendering-ready flow vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// Stage-qualified name, e.g. "Checkout (S2)"
    pub name: String,
    pub event_id: String,
    /// Zero-based stage position
    pub stage_index: usize,
    /// Rendered magnitude, floored at the minimum visible value
    pub value: f64,
    /// True accumulated magnitude
    pub display_value: f64,
    /// Magnitude accumulated from incoming links
    pub inflow: f64,
    /// Magnitude accumulated from outgoing links
    pub outflow: f64,
    pub color: String,
}

/// A directed edge between two nodes by index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowLink {
    pub source: usize,
    pub target: usize,
    pub value: f64,
    pub color: String,
}

/// Data the aggregator dropped or could not match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDiagnostics {
    /// Stage event identifiers with no label in the event catalog
    pub unknown_stage_events: Vec<String>,
    /// Transitions rejected for not moving exactly one stage forward
    pub dropped_transitions: usize,
    /// Estimated links below the noise threshold
    pub dropped_links: usize,
    /// Ids of stages without any event identifiers
    pub empty_stages: Vec<String>,
}

/// Node/link graph ready for a flow diagram
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub links: Vec<FlowLink>,
    /// True when link values are proportional estimates rather than measured traffic
    pub estimated: bool,
    pub diagnostics: FlowDiagnostics,
}

impl FlowGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Sum of link values entering the node at `index`
    pub fn incoming_total(&self, index: usize) -> f64 {
        self.links
            .iter()
            .filter(|l| l.target == index)
            .map(|l| l.value)
            .sum()
    }
}

/// Per-series metric kinds embedded in time-series records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Count,
    Success,
    Fail,
    AvgDelay,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Count => write!(f, "count"),
            Metric::Success => write!(f, "success"),
            Metric::Fail => write!(f, "fail"),
            Metric::AvgDelay => write!(f, "avgDelay"),
        }
    }
}

pub type MetricValues = BTreeMap<Metric, f64>;

/// One graph-ready time-series point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesRecord {
    #[serde(default)]
    pub timestamp: Option<EpochMillis>,
    /// Display label such as "Mar 3, 9 AM" or "2024-03-03 14:00"
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub count: f64,
    #[serde(default)]
    pub success_count: f64,
    #[serde(default)]
    pub fail_count: f64,
    /// Per-event metrics keyed by event key
    #[serde(default)]
    pub metrics: HashMap<String, MetricValues>,
}

impl SeriesRecord {
    pub fn metric(&self, event_key: &str, metric: Metric) -> Option<f64> {
        self.metrics.get(event_key).and_then(|m| m.get(&metric)).copied()
    }

    /// Human-readable label for tooltips and percentage series
    pub fn label(&self) -> String {
        match (&self.date, self.timestamp) {
            (Some(date), _) => date.clone(),
            (None, Some(ts)) => chrono::DateTime::from_timestamp_millis(ts)
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| ts.to_string()),
            (None, None) => String::new(),
        }
    }
}

/// Aggregated statistics for one hour of the day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u8,
    pub total: f64,
    pub success: f64,
    pub fail: f64,
    pub occurrence_count: usize,
    pub avg_delay_sum: f64,
    pub delay_count: usize,
}

impl HourBucket {
    pub fn new(hour: u8) -> Self {
        Self {
            hour,
            ..Self::default()
        }
    }

    pub fn average_delay(&self) -> f64 {
        if self.delay_count == 0 {
            0.0
        } else {
            self.avg_delay_sum / self.delay_count as f64
        }
    }

    /// Value used for ranking: the averaged delay for latency metrics, the sum otherwise
    pub fn metric_value(&self, averaged: bool) -> f64 {
        if averaged {
            self.average_delay()
        } else {
            self.total
        }
    }
}

/// Coarse direction of change across the observed hour range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Hour-of-day histogram with derived summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStats {
    /// Always 24 entries, index == hour
    pub buckets: Vec<HourBucket>,
    /// Whether bucket ranking uses averaged delay
    pub averaged: bool,
    pub peak_hour: Option<u8>,
    pub peak_value: f64,
    pub lowest_hour: Option<u8>,
    pub lowest_value: f64,
    pub average_per_hour: f64,
    pub observed_hours: usize,
    pub trend: Trend,
    /// Indices of records bucketed into hour 0 because their date could not be read
    pub defaulted_records: Vec<usize>,
}

impl HourlyStats {
    pub fn empty(averaged: bool) -> Self {
        Self {
            buckets: (0..24).map(HourBucket::new).collect(),
            averaged,
            peak_hour: None,
            peak_value: 0.0,
            lowest_hour: None,
            lowest_value: 0.0,
            average_per_hour: 0.0,
            observed_hours: 0,
            trend: Trend::Stable,
            defaulted_records: Vec::new(),
        }
    }

    /// False when no hour was observed; callers show "insufficient data"
    pub fn has_sufficient_data(&self) -> bool {
        self.observed_hours > 0
    }

    pub fn bucket(&self, hour: u8) -> &HourBucket {
        &self.buckets[hour as usize % 24]
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub dataset: String,
    pub record_count: usize,
    pub stage_count: usize,
}

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub metadata: ReportMetadata,
    pub flow: Option<FlowGraph>,
    pub hourly: Option<HourlyStats>,
}
