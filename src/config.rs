use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::flow_graph::{FlowSettings, DEFAULT_LINK_THRESHOLD, DEFAULT_MIN_VISIBLE_VALUE};
use crate::analysis::hourly::{ActiveMetric, HourlyOptions, UnparseablePolicy, DEFAULT_TREND_TOLERANCE};
use crate::analysis::types::Stage;

/// Match: "+05:30", "-0800"
static UTC_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("Invalid utc_offset regex")
});

/// Dashboard analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub hourly: HourlyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Ordered funnel stages
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.general.utc_offset()?;

        let flow = &self.flow;
        if !flow.min_visible_value.is_finite() || flow.min_visible_value < 0.0 {
            return Err(ValidationError::InvalidFlow(format!(
                "min_visible_value must be a non-negative number, got {}",
                flow.min_visible_value
            )));
        }
        if !flow.link_threshold.is_finite() || flow.link_threshold < 0.0 {
            return Err(ValidationError::InvalidFlow(format!(
                "link_threshold must be a non-negative number, got {}",
                flow.link_threshold
            )));
        }

        if !self.hourly.trend_tolerance.is_finite() || self.hourly.trend_tolerance < 0.0 {
            return Err(ValidationError::InvalidHourly(format!(
                "trend_tolerance must be a non-negative number, got {}",
                self.hourly.trend_tolerance
            )));
        }

        if self.cache.ttl < Duration::from_millis(1) {
            return Err(ValidationError::InvalidCache(format!(
                "ttl must be at least 1ms, got {:?}",
                self.cache.ttl
            )));
        }

        let mut ids = HashSet::new();
        for stage in &self.stages {
            if stage.id.trim().is_empty() {
                return Err(ValidationError::InvalidStage(
                    "stage id cannot be empty".to_string(),
                ));
            }
            if !ids.insert(stage.id.as_str()) {
                return Err(ValidationError::InvalidStage(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
        }

        Ok(())
    }

    /// Check `stages` against the known event ids when `flow.strict_stage_events` is set.
    ///
    /// With the flag off, or nothing known to check against, this only logs.
    pub fn enforce_stage_events(
        &self,
        stages: &[Stage],
        known_event_ids: &HashSet<String>,
    ) -> Result<(), ValidationError> {
        if !self.flow.strict_stage_events {
            return Ok(());
        }
        if known_event_ids.is_empty() {
            log::warn!("strict_stage_events is set but there are no known events to check against");
            return Ok(());
        }
        validate_stage_events(stages, known_event_ids)
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            min_visible_value: self.flow.min_visible_value,
            link_threshold: self.flow.link_threshold,
        }
    }

    /// Bucketing options for the given series selection
    pub fn hourly_options(
        &self,
        active_metric: Option<ActiveMetric>,
    ) -> Result<HourlyOptions, ValidationError> {
        Ok(HourlyOptions {
            active_metric,
            utc_offset: self.general.utc_offset()?,
            unparseable: self.hourly.unparseable_dates,
            trend_tolerance: self.hourly.trend_tolerance,
        })
    }
}

/// Shared general configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Offset used as local time for hour extraction, e.g. "+02:00"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset: Option<String>,
}

impl GeneralConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset, ValidationError> {
        match self.utc_offset.as_deref() {
            None => Ok(Utc.fix()),
            Some(raw) => parse_utc_offset(raw),
        }
    }
}

/// Parse "+HH:MM", "-HHMM", "Z" or "UTC"
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ValidationError> {
    let raw = raw.trim();
    let invalid = || ValidationError::InvalidGeneral(format!("invalid utc_offset '{}'", raw));

    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let caps = UTC_OFFSET.captures(raw).ok_or_else(invalid)?;
    let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
    let minutes: i32 = caps[3].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    let seconds = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}

/// Flow graph settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FlowConfig {
    #[serde(default = "default_min_visible_value")]
    pub min_visible_value: f64,
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f64,
    /// Reject stages that reference events missing from the event catalog
    #[serde(default)]
    pub strict_stage_events: bool,
}

fn default_min_visible_value() -> f64 {
    DEFAULT_MIN_VISIBLE_VALUE
}

fn default_link_threshold() -> f64 {
    DEFAULT_LINK_THRESHOLD
}

/// Hourly statistics settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HourlyConfig {
    #[serde(default)]
    pub unparseable_dates: UnparseablePolicy,
    #[serde(default = "default_trend_tolerance")]
    pub trend_tolerance: f64,
}

fn default_trend_tolerance() -> f64 {
    DEFAULT_TREND_TOLERANCE
}

/// Cache settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

/// Check that every stage event exists in the event catalog.
///
/// This is the configuration-time counterpart of the unknown-event
/// diagnostics the flow aggregator reports.
pub fn validate_stage_events(
    stages: &[Stage],
    catalog_ids: &HashSet<String>,
) -> Result<(), ValidationError> {
    for stage in stages {
        let missing: Vec<String> = stage
            .unique_event_ids()
            .into_iter()
            .filter(|id| !catalog_ids.contains(*id))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::UnknownStageEvents {
                stage: stage.id.clone(),
                events: missing,
            });
        }
    }
    Ok(())
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid flow configuration: {0}")]
    InvalidFlow(String),
    #[error("Invalid hourly configuration: {0}")]
    InvalidHourly(String),
    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),
    #[error("Invalid stage configuration: {0}")]
    InvalidStage(String),
    #[error("Stage '{stage}' references events missing from the catalog: {}", .events.join(", "))]
    UnknownStageEvents { stage: String, events: Vec<String> },
}

/// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            utc_offset: None,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_visible_value: DEFAULT_MIN_VISIBLE_VALUE,
            link_threshold: DEFAULT_LINK_THRESHOLD,
            strict_stage_events: false,
        }
    }
}

impl Default for HourlyConfig {
    fn default() -> Self {
        Self {
            unparseable_dates: UnparseablePolicy::default(),
            trend_tolerance: DEFAULT_TREND_TOLERANCE,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            path: None,
        }
    }
}
