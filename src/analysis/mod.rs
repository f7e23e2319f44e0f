//! Client-side reshaping of event-analytics data for dashboard charts.
//!
//! This module builds stage-based flow graphs, hour-of-day statistics and
//! percentage series from data already aggregated by the event services.

pub mod types;
pub mod palette;
pub mod flow_graph;
pub mod hourly;
pub mod percentage;
pub mod report;

pub use types::*;
pub use flow_graph::{build_flow_graph, consolidate_links, FlowSettings};
pub use hourly::{bucket_by_hour, ActiveMetric, HourParseError, HourlyOptions, UnparseablePolicy};
pub use percentage::success_rate_series;
pub use report::{generate_json_report, generate_text_report};
