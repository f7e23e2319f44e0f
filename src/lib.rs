//! # Dashflow - Flow graphs and hourly statistics for event-analytics dashboards
//!
//! This library reshapes event data that has already been aggregated by
//! upstream services into chart-ready structures, and models the state of
//! the dashboard that displays them.
//!
//! ## Overview
//!
//! Two transformations carry most of the logic:
//!
//! - **Flow graphs**: events grouped into ordered stages become a node/link
//!   graph for a Sankey-style diagram. Exact transition data yields measured
//!   links; per-event totals yield proportional estimates that are marked as
//!   such.
//! - **Hourly statistics**: time-series records are bucketed by hour of day
//!   to find peak and quietest hours, the per-hour average and a coarse trend.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `analysis`: flow graph aggregation, hourly bucketing, success-rate
//!   series, colors and report generation
//! - `config`: Typed YAML configuration and validation
//! - `config_loader`: Loading configuration and JSON datasets from disk
//! - `services`: Contracts of the external profile, event and sync services
//! - `dashboard`: Orchestration over those services
//! - `sidebar`: Profile list state, deletion flow and alert totals
//! - `filters`: Panel filter model
//! - `voice`: Voice command status tracking
//! - `cache`: TTL cache service with on-disk persistence
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::path::Path;
//! use dashflow::analysis::{build_flow_graph, FlowInput, EventRecord};
//! use dashflow::config_loader;
//!
//! let config = config_loader::load_config(Path::new("dash.yaml"))?;
//! let input = FlowInput::Transitions(vec![
//!     EventRecord::transition("view_item", "checkout", 40),
//! ]);
//! let graph = build_flow_graph(&input, &config.stages, &HashMap::new(), &config.flow_settings());
//! println!("{} nodes, {} links", graph.nodes.len(), graph.links.len());
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   log_level: info
//!   utc_offset: "+02:00"
//!
//! flow:
//!   min_visible_value: 1.0
//!   link_threshold: 0.1
//!
//! hourly:
//!   unparseable_dates: reject   # or midnight
//!
//! cache:
//!   ttl: 24h
//!
//! stages:
//!   - id: browse
//!     label: Browse
//!     event_ids: [view_item, search]
//!   - id: buy
//!     label: Buy
//!     event_ids: [checkout]
//! ```
//!
//! ## Error Handling
//!
//! Domain errors are `thiserror` enums next to the code that raises them.
//! Loading and report functions return `color_eyre::Result` with context.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod config_loader;
pub mod dashboard;
pub mod filters;
pub mod services;
pub mod sidebar;
pub mod voice;
