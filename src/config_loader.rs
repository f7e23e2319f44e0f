use crate::analysis::types::{FlowInput, SeriesRecord, Stage};
use crate::cache::{CacheService, LogoCache, SystemClock, TtlCache};
use crate::config::{CacheConfig, Config};
use crate::services::EventCatalogEntry;
use color_eyre::eyre::Context;
use color_eyre::Result;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Flow dataset as exported from the event data service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDataset {
    /// Display names keyed by event id
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Stages overriding the configured ones when non-empty
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub input: FlowInput,
}

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {}", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

    config.validate()?;

    if config.stages.is_empty() {
        warn!("No stages configured; flow graphs will be empty unless the dataset supplies stages");
    } else {
        info!("Loaded {} stages", config.stages.len());
    }

    Ok(config)
}

fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {} {}", what, path.display()))
}

/// Load a flow dataset (labels, optional stages and records)
pub fn load_flow_dataset(path: &Path) -> Result<FlowDataset> {
    let dataset: FlowDataset = load_json(path, "flow dataset")?;
    info!(
        "Loaded {} {} records from {}",
        dataset.input.records().len(),
        if dataset.input.is_estimated() { "totals-only" } else { "transition" },
        path.display()
    );
    Ok(dataset)
}

/// Load graph-ready time-series records
pub fn load_series_records(path: &Path) -> Result<Vec<SeriesRecord>> {
    let records: Vec<SeriesRecord> = load_json(path, "series records")?;
    info!("Loaded {} series records from {}", records.len(), path.display());
    Ok(records)
}

/// Load an event catalog export
pub fn load_catalog(path: &Path) -> Result<Vec<EventCatalogEntry>> {
    let catalog: Vec<EventCatalogEntry> = load_json(path, "event catalog")?;
    info!("Loaded {} catalog events from {}", catalog.len(), path.display());
    Ok(catalog)
}

/// Open the logo cache described by the `cache` section.
///
/// Without a `path` the cache lives in memory only.
pub fn load_logo_cache(cache: &CacheConfig) -> Result<LogoCache> {
    let inner = match cache.path.as_deref() {
        Some(path) => TtlCache::load(path, cache.ttl, SystemClock)
            .with_context(|| format!("Failed to load cache file {}", path.display()))?,
        None => TtlCache::new(cache.ttl),
    };
    info!(
        "Logo cache ready: {} live entries, ttl {:?}",
        inner.len(),
        cache.ttl
    );
    Ok(LogoCache::new(inner))
}

/// Write the logo cache back to `cache.path`, if one is configured
pub fn save_logo_cache(logos: &LogoCache, cache: &CacheConfig) -> Result<()> {
    let Some(path) = cache.path.as_deref() else {
        return Ok(());
    };
    logos
        .save(path)
        .with_context(|| format!("Failed to save cache file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::hourly::UnparseablePolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_load_config() {
        let yaml = r#"
general:
  utc_offset: "+02:00"
hourly:
  unparseable_dates: midnight
stages:
  - id: browse
    label: Browse
    event_ids: [view_item]
  - id: buy
    label: Buy
    event_ids: [checkout]
"#;
        let temp_file = temp_with(yaml);
        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.hourly.unparseable_dates, UnparseablePolicy::Midnight);
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let temp_file = temp_with("cache:\n  ttl: 0s\n");
        assert!(load_config(temp_file.path()).is_err());

        let temp_file = temp_with("stages: [not, a, stage]\n");
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_flow_dataset() {
        let json = r#"{
  "labels": {"view_item": "View Item", "checkout": "Checkout"},
  "input": {
    "mode": "transitions",
    "records": [
      {"eventId": "view_item", "nextEventId": "checkout", "count": 12}
    ]
  }
}"#;
        let temp_file = temp_with(json);
        let dataset = load_flow_dataset(temp_file.path()).unwrap();
        assert!(!dataset.input.is_estimated());
        assert!(dataset.stages.is_empty());
        assert_eq!(dataset.labels["checkout"], "Checkout");
        let records = dataset.input.records();
        assert_eq!(records[0].next_event_id.as_deref(), Some("checkout"));
        assert_eq!(records[0].count, 12);
    }

    #[test]
    fn test_load_series_and_catalog() {
        let series = temp_with(
            r#"[{"date": "Mar 3, 9 AM", "count": 4, "successCount": 3, "failCount": 1,
                 "metrics": {"login": {"count": 4, "avgDelay": 120.5}}}]"#,
        );
        let records = load_series_records(series.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].metric("login", crate::analysis::types::Metric::AvgDelay),
            Some(120.5)
        );

        let catalog = temp_with(r#"[{"eventId": "login", "name": "Login", "isApiEvent": false}]"#);
        let catalog = load_catalog(catalog.path()).unwrap();
        assert_eq!(catalog[0].name, "Login");
        assert!(!catalog[0].is_avg_event);
    }

    #[test]
    fn test_dataset_stages_accept_camel_case() {
        let json = r#"{
  "stages": [
    {"id": "browse", "label": "Browse", "eventIds": ["view_item"]},
    {"id": "buy", "label": "Buy", "event_ids": ["checkout"]}
  ],
  "input": {"mode": "totals_only", "records": [{"eventId": "view_item", "count": 5}]}
}"#;
        let temp_file = temp_with(json);
        let dataset = load_flow_dataset(temp_file.path()).unwrap();
        assert_eq!(dataset.stages[0].event_ids, vec!["view_item".to_string()]);
        assert_eq!(dataset.stages[1].event_ids, vec!["checkout".to_string()]);
    }

    #[test]
    fn test_logo_cache_from_config_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("logos.cache");
        let yaml = format!("cache:\n  ttl: 500ms\n  path: {}\n", cache_path.display());
        let temp_file = temp_with(&yaml);
        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.cache.ttl, std::time::Duration::from_millis(500));

        let mut logos = load_logo_cache(&config.cache).unwrap();
        assert!(logos.cache().is_empty());
        logos.store_logo("Acme", "https://cdn.example/acme.png");
        // a sub-second ttl must not expire the entry on insert
        assert_eq!(logos.logo("acme").as_deref(), Some("https://cdn.example/acme.png"));
        save_logo_cache(&logos, &config.cache).unwrap();
        assert!(cache_path.exists());

        let reloaded = load_logo_cache(&config.cache).unwrap();
        assert!(reloaded.cache().len() <= 1);
    }

    #[test]
    fn test_logo_cache_without_path_is_memory_only() {
        let config = Config::default();
        let mut logos = load_logo_cache(&config.cache).unwrap();
        logos.store_logo("Globex", "globex.png");
        save_logo_cache(&logos, &config.cache).unwrap();
        assert_eq!(logos.logo("GLOBEX").as_deref(), Some("globex.png"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_series_records(Path::new("/nonexistent/series.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("series records"));
    }
}
