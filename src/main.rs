//! Dashboard analysis CLI.
//!
//! Builds flow graphs and hourly statistics from exported event data and
//! writes JSON and text reports.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Context, Result};
use env_logger::Env;
use log::{info, warn};

use dashflow::analysis::{
    self, build_flow_graph, bucket_by_hour, ActiveMetric, DashboardReport, ReportMetadata,
};
use dashflow::config::{validate_stage_events, Config};
use dashflow::config_loader;

#[derive(Parser, Debug)]
#[command(name = "dashflow")]
#[command(about = "Flow graphs and hourly statistics for event-analytics dashboards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the dashboard configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for reports
    #[arg(short, long, default_value = "dashflow_output")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides general.log_level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a flow graph over the configured stages
    Flow {
        /// Flow dataset JSON (labels, optional stages, records)
        #[arg(short, long)]
        dataset: PathBuf,
    },

    /// Bucket time-series records by hour of day
    Hourly {
        /// Series records JSON
        #[arg(short, long)]
        records: PathBuf,

        /// Event key whose metrics to use instead of the generic counts
        #[arg(short, long)]
        metric: Option<String>,

        /// Rank hours by average delay
        #[arg(long, requires = "metric")]
        averaged: bool,
    },

    /// Look up, or store, a brand logo in the persisted logo cache
    Logo {
        /// Brand name (case-insensitive)
        brand: String,

        /// Logo URL to cache for the brand
        #[arg(long)]
        url: Option<String>,
    },

    /// Validate the configuration, optionally against an event catalog
    Validate {
        /// Event catalog JSON
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = config_loader::load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str())).init();

    info!("Configuration file: {:?}", cli.config);

    match cli.command {
        Commands::Flow { ref dataset } => run_flow(&config, dataset, &cli.output),
        Commands::Hourly {
            ref records,
            ref metric,
            averaged,
        } => {
            let active = metric.as_ref().map(|key| ActiveMetric {
                event_key: key.clone(),
                averaged,
            });
            run_hourly(&config, records, active, &cli.output)
        }
        Commands::Logo { ref brand, ref url } => run_logo(&config, brand, url.as_deref()),
        Commands::Validate { ref catalog } => run_validate(&config, catalog.as_deref()),
    }
}

fn create_output_dir(output: &Path) -> Result<()> {
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))
}

fn metadata(dataset: &Path, record_count: usize, stage_count: usize) -> ReportMetadata {
    ReportMetadata {
        generated_at: chrono::Utc::now().to_rfc3339(),
        dataset: dataset.display().to_string(),
        record_count,
        stage_count,
    }
}

fn write_reports(report: &DashboardReport, output: &Path, stem: &str) -> Result<()> {
    create_output_dir(output)?;
    analysis::generate_json_report(report, &output.join(format!("{}_report.json", stem)))?;
    analysis::generate_text_report(report, &output.join(format!("{}_report.txt", stem)))?;
    analysis::report::print_summary(report);
    Ok(())
}

fn run_flow(config: &Config, dataset_path: &Path, output: &Path) -> Result<()> {
    let dataset = config_loader::load_flow_dataset(dataset_path)?;

    let stages = if dataset.stages.is_empty() {
        &config.stages
    } else {
        info!("Using {} stages from the dataset", dataset.stages.len());
        &dataset.stages
    };

    let known: HashSet<String> = dataset.labels.keys().cloned().collect();
    config.enforce_stage_events(stages, &known)?;

    let graph = build_flow_graph(&dataset.input, stages, &dataset.labels, &config.flow_settings());
    if graph.estimated {
        info!("Link values are proportional estimates from per-event totals");
    }

    let report = DashboardReport {
        metadata: metadata(dataset_path, dataset.input.records().len(), stages.len()),
        flow: Some(graph),
        hourly: None,
    };
    write_reports(&report, output, "flow")
}

fn run_hourly(
    config: &Config,
    records_path: &Path,
    active: Option<ActiveMetric>,
    output: &Path,
) -> Result<()> {
    let records = config_loader::load_series_records(records_path)?;
    let options = config.hourly_options(active)?;

    let stats = bucket_by_hour(&records, &options)
        .with_context(|| format!("Failed to bucket records from {}", records_path.display()))?;
    if !stats.has_sufficient_data() {
        warn!("No hours observed in {}", records_path.display());
    }

    let report = DashboardReport {
        metadata: metadata(records_path, records.len(), config.stages.len()),
        flow: None,
        hourly: Some(stats),
    };
    write_reports(&report, output, "hourly")
}

fn run_logo(config: &Config, brand: &str, url: Option<&str>) -> Result<()> {
    let mut logos = config_loader::load_logo_cache(&config.cache)?;
    let evicted = logos.evict_expired();
    if evicted > 0 {
        info!("Evicted {} expired logo(s)", evicted);
    }

    if let Some(url) = url {
        logos.store_logo(brand, url);
    }
    match logos.logo(brand) {
        Some(url) => println!("{}: {}", brand, url),
        None => println!("{}: no cached logo", brand),
    }

    if config.cache.path.is_none() {
        warn!("cache.path is not configured; the logo cache is not persisted");
    }
    config_loader::save_logo_cache(&logos, &config.cache)
}

fn run_validate(config: &Config, catalog_path: Option<&Path>) -> Result<()> {
    let empty: Vec<&str> = config
        .stages
        .iter()
        .filter(|s| s.unique_event_ids().is_empty())
        .map(|s| s.id.as_str())
        .collect();
    if !empty.is_empty() {
        warn!("Stages without events: {}", empty.join(", "));
    }

    if let Some(path) = catalog_path {
        let catalog = config_loader::load_catalog(path)?;
        if catalog.is_empty() {
            bail!("Event catalog {} is empty", path.display());
        }
        let known: HashSet<String> = catalog.into_iter().map(|e| e.event_id).collect();
        validate_stage_events(&config.stages, &known)?;
        info!("All stage events found in the catalog");
    }

    println!("Configuration OK: {} stages", config.stages.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "dashflow",
            "--config",
            "dash.yaml",
            "flow",
            "--dataset",
            "flow.json",
        ]);

        assert_eq!(cli.config, PathBuf::from("dash.yaml"));
        assert_eq!(cli.output, PathBuf::from("dashflow_output"));
        assert!(cli.log_level.is_none());
        assert!(matches!(cli.command, Commands::Flow { .. }));
    }

    #[test]
    fn test_hourly_args() {
        let cli = Cli::parse_from([
            "dashflow",
            "-c",
            "dash.yaml",
            "--log-level",
            "debug",
            "hourly",
            "--records",
            "series.json",
            "--metric",
            "login",
            "--averaged",
        ]);

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Hourly { metric, averaged, .. } => {
                assert_eq!(metric.as_deref(), Some("login"));
                assert!(averaged);
            }
            other => panic!("Expected hourly command, got {:?}", other),
        }
    }

    #[test]
    fn test_logo_args() {
        let cli = Cli::parse_from([
            "dashflow",
            "-c",
            "dash.yaml",
            "logo",
            "Acme",
            "--url",
            "https://cdn.example/acme.png",
        ]);
        match cli.command {
            Commands::Logo { brand, url } => {
                assert_eq!(brand, "Acme");
                assert_eq!(url.as_deref(), Some("https://cdn.example/acme.png"));
            }
            other => panic!("Expected logo command, got {:?}", other),
        }
    }

    #[test]
    fn test_averaged_requires_metric() {
        let result = Cli::try_parse_from([
            "dashflow",
            "-c",
            "dash.yaml",
            "hourly",
            "--records",
            "series.json",
            "--averaged",
        ]);
        assert!(result.is_err());
    }
}
