//! Data exchanged with the external profile, event and sync services.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::filters::PanelFilters;

/// Product area a dashboard belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureScope(pub String);

impl FeatureScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }
}

impl fmt::Display for FeatureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which instrumentation an event comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    /// Product events with platform/POS/source dimensions
    Regular,
    /// API/network events with status-code/cache-status dimensions
    Api,
}

/// One entry of the event catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCatalogEntry {
    pub event_id: String,
    pub name: String,
    #[serde(default)]
    pub is_api_event: bool,
    /// Magnitude is an averaged quantity (delay, amount) rather than a tally
    #[serde(default)]
    pub is_avg_event: bool,
}

impl EventCatalogEntry {
    pub fn class(&self) -> EventClass {
        if self.is_api_event {
            EventClass::Api
        } else {
            EventClass::Regular
        }
    }
}

/// Chart kinds a panel can render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    TimeSeries,
    Funnel,
    Percentage,
    UserFlow,
    Pie,
}

/// Reference from a panel to a catalog event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub event_id: String,
    #[serde(default)]
    pub is_api_event: bool,
}

/// One visualization within a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub panel_id: String,
    pub chart: ChartKind,
    #[serde(default)]
    pub filters: PanelFilters,
    #[serde(default)]
    pub events: Vec<EventRef>,
}

/// A saved named collection of panels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub profile_id: String,
    pub name: String,
    #[serde(default)]
    pub panels: Vec<Panel>,
}

impl Profile {
    /// Distinct event ids referenced by any panel, in first-seen order
    pub fn event_ids(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.panels
            .iter()
            .flat_map(|p| p.events.iter())
            .map(|e| e.event_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileList {
    pub success: bool,
    #[serde(default)]
    pub items: Vec<Profile>,
}

/// Inclusive calendar date range for alert queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }
}
