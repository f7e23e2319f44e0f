//! Panel filter model.
//!
//! Regular events are filtered by platform, POS and source; API events by
//! status code and cache status. Changes never mutate the current filters,
//! they produce a new value.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::services::{DateRange, EventClass};

/// A filterable dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Platform,
    Pos,
    Source,
    StatusCode,
    CacheStatus,
}

impl Dimension {
    pub fn applies_to(&self, class: EventClass) -> bool {
        match self {
            Dimension::Platform | Dimension::Pos | Dimension::Source => class == EventClass::Regular,
            Dimension::StatusCode | Dimension::CacheStatus => class == EventClass::Api,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Platform => write!(f, "platform"),
            Dimension::Pos => write!(f, "pos"),
            Dimension::Source => write!(f, "source"),
            Dimension::StatusCode => write!(f, "status_code"),
            Dimension::CacheStatus => write!(f, "cache_status"),
        }
    }
}

/// One requested filter mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterChange {
    Include { dimension: Dimension, value: String },
    Exclude { dimension: Dimension, value: String },
    Clear { dimension: Dimension },
    SetDateRange { range: DateRange },
    ClearDateRange,
    ResetAll,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Dimension '{dimension}' does not apply to {class:?} events")]
    NotApplicable { dimension: Dimension, class: EventClass },
    #[error("Invalid status code '{0}'")]
    InvalidStatusCode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelFilters {
    #[serde(default)]
    pub platforms: BTreeSet<String>,
    #[serde(default)]
    pub pos: BTreeSet<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub status_codes: BTreeSet<u16>,
    #[serde(default)]
    pub cache_statuses: BTreeSet<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

impl PanelFilters {
    pub fn is_empty(&self) -> bool {
        self == &PanelFilters::default()
    }

    fn strings_mut(&mut self, dimension: Dimension) -> Option<&mut BTreeSet<String>> {
        match dimension {
            Dimension::Platform => Some(&mut self.platforms),
            Dimension::Pos => Some(&mut self.pos),
            Dimension::Source => Some(&mut self.sources),
            Dimension::CacheStatus => Some(&mut self.cache_statuses),
            Dimension::StatusCode => None,
        }
    }

    fn parse_status(value: &str) -> Result<u16, FilterError> {
        value
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|code| (100..=599).contains(code))
            .ok_or_else(|| FilterError::InvalidStatusCode(value.to_string()))
    }

    /// Apply `change` for a panel showing `class` events, returning the new filters
    pub fn apply(&self, change: &FilterChange, class: EventClass) -> Result<PanelFilters, FilterError> {
        let mut next = self.clone();

        match change {
            FilterChange::Include { dimension, value } | FilterChange::Exclude { dimension, value } => {
                if !dimension.applies_to(class) {
                    return Err(FilterError::NotApplicable {
                        dimension: *dimension,
                        class,
                    });
                }
                let include = matches!(change, FilterChange::Include { .. });
                match next.strings_mut(*dimension) {
                    Some(set) if include => {
                        set.insert(value.trim().to_string());
                    }
                    Some(set) => {
                        set.remove(value.trim());
                    }
                    None => {
                        let code = Self::parse_status(value)?;
                        if include {
                            next.status_codes.insert(code);
                        } else {
                            next.status_codes.remove(&code);
                        }
                    }
                }
            }
            FilterChange::Clear { dimension } => match next.strings_mut(*dimension) {
                Some(set) => set.clear(),
                None => next.status_codes.clear(),
            },
            FilterChange::SetDateRange { range } => next.date_range = Some(*range),
            FilterChange::ClearDateRange => next.date_range = None,
            FilterChange::ResetAll => next = PanelFilters::default(),
        }

        Ok(next)
    }

    /// Apply several changes in order, stopping at the first failure
    pub fn apply_all(&self, changes: &[FilterChange], class: EventClass) -> Result<PanelFilters, FilterError> {
        changes
            .iter()
            .try_fold(self.clone(), |filters, change| filters.apply(change, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn include(dimension: Dimension, value: &str) -> FilterChange {
        FilterChange::Include {
            dimension,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_apply_does_not_mutate() {
        let filters = PanelFilters::default();
        let next = filters
            .apply(&include(Dimension::Platform, "ios"), EventClass::Regular)
            .unwrap();
        assert!(filters.is_empty());
        assert!(next.platforms.contains("ios"));
    }

    #[test]
    fn test_dimension_must_match_event_class() {
        let filters = PanelFilters::default();
        let err = filters
            .apply(&include(Dimension::StatusCode, "500"), EventClass::Regular)
            .unwrap_err();
        assert!(matches!(err, FilterError::NotApplicable { .. }));

        let err = filters
            .apply(&include(Dimension::Platform, "web"), EventClass::Api)
            .unwrap_err();
        assert!(matches!(err, FilterError::NotApplicable { .. }));
    }

    #[test]
    fn test_status_codes() {
        let filters = PanelFilters::default()
            .apply_all(
                &[include(Dimension::StatusCode, "500"), include(Dimension::StatusCode, " 404 ")],
                EventClass::Api,
            )
            .unwrap();
        assert_eq!(filters.status_codes.iter().copied().collect::<Vec<_>>(), vec![404, 500]);

        let err = filters
            .apply(&include(Dimension::StatusCode, "abc"), EventClass::Api)
            .unwrap_err();
        assert_eq!(err, FilterError::InvalidStatusCode("abc".to_string()));
        assert!(filters
            .apply(&include(Dimension::StatusCode, "999"), EventClass::Api)
            .is_err());
    }

    #[test]
    fn test_exclude_clear_and_reset() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let filters = PanelFilters::default()
            .apply_all(
                &[
                    include(Dimension::Source, "email"),
                    include(Dimension::Source, "ads"),
                    FilterChange::Exclude {
                        dimension: Dimension::Source,
                        value: "ads".to_string(),
                    },
                    FilterChange::SetDateRange {
                        range: DateRange::new(end, start),
                    },
                ],
                EventClass::Regular,
            )
            .unwrap();
        assert_eq!(filters.sources.len(), 1);
        assert_eq!(filters.date_range.unwrap().start, start);

        let cleared = filters
            .apply(&FilterChange::Clear { dimension: Dimension::Source }, EventClass::Regular)
            .unwrap();
        assert!(cleared.sources.is_empty());
        assert!(cleared.date_range.is_some());

        let reset = filters.apply(&FilterChange::ResetAll, EventClass::Regular).unwrap();
        assert!(reset.is_empty());
    }
}
