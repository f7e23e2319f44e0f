//! Report generation for dashboard analysis.
//!
//! Generates both JSON and human-readable text reports.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};

use super::types::*;

/// Generate JSON report
pub fn generate_json_report(report: &DashboardReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Tooltip text for a flow node. Shows the true magnitude, not the floored one.
pub fn format_node_tooltip(node: &FlowNode, estimated: bool) -> String {
    let qualifier = if estimated { "~" } else { "" };
    format!(
        "{}: {}{} (in {}{}, out {}{})",
        node.name,
        qualifier,
        format_magnitude(node.display_value),
        qualifier,
        format_magnitude(node.inflow),
        qualifier,
        format_magnitude(node.outflow)
    )
}

/// Whole numbers print without decimals, everything else with one
pub fn format_magnitude(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

fn hour_label(hour: Option<u8>) -> String {
    match hour {
        Some(h) => format!("{:02}:00", h),
        None => "n/a".to_string(),
    }
}

/// Render the human-readable report body
pub fn render_text_report(report: &DashboardReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                         DASHBOARD FLOW ANALYSIS".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    lines.push(format!("Generated: {}", report.metadata.generated_at));
    lines.push(format!("Dataset: {}", report.metadata.dataset));
    lines.push(format!("Records: {}", report.metadata.record_count));
    lines.push(format!("Stages: {}", report.metadata.stage_count));
    lines.push(String::new());

    if let Some(ref flow) = report.flow {
        lines.push("=".repeat(80));
        lines.push("                               USER FLOW".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());

        if flow.estimated {
            lines.push("NOTE: Link values are proportional estimates derived from per-event".to_string());
            lines.push("totals, assuming independent mixing between stages. They are not".to_string());
            lines.push("measured transitions.".to_string());
            lines.push(String::new());
        }

        if flow.is_empty() {
            lines.push("No flow between the configured stages.".to_string());
        } else {
            lines.push(format!("Nodes: {}  Links: {}", flow.nodes.len(), flow.links.len()));
            lines.push(String::new());
            lines.push("Nodes:".to_string());
            for node in &flow.nodes {
                lines.push(format!("  {}", format_node_tooltip(node, flow.estimated)));
            }
            lines.push(String::new());
            lines.push("Links:".to_string());
            for link in &flow.links {
                lines.push(format!(
                    "  {} -> {}: {}",
                    flow.nodes[link.source].name,
                    flow.nodes[link.target].name,
                    format_magnitude(link.value)
                ));
            }
        }
        lines.push(String::new());

        let diag = &flow.diagnostics;
        if diag.dropped_transitions > 0 {
            lines.push(format!(
                "Dropped transitions (not between adjacent stages): {}",
                diag.dropped_transitions
            ));
        }
        if diag.dropped_links > 0 {
            lines.push(format!("Dropped noise links: {}", diag.dropped_links));
        }
        if !diag.empty_stages.is_empty() {
            lines.push(format!("Empty stages: {}", diag.empty_stages.join(", ")));
        }
        if !diag.unknown_stage_events.is_empty() {
            lines.push(format!(
                "Stage events missing from catalog: {}",
                diag.unknown_stage_events.join(", ")
            ));
        }
        lines.push(String::new());
    }

    if let Some(ref hourly) = report.hourly {
        lines.push("=".repeat(80));
        lines.push("                            HOURLY ACTIVITY".to_string());
        lines.push("=".repeat(80));
        lines.push(String::new());

        if !hourly.has_sufficient_data() {
            lines.push("Insufficient data: no hours observed.".to_string());
        } else {
            let unit = if hourly.averaged { "avg delay" } else { "total" };
            lines.push(format!(
                "Peak hour: {} ({} {})",
                hour_label(hourly.peak_hour),
                format_magnitude(hourly.peak_value),
                unit
            ));
            lines.push(format!(
                "Lowest active hour: {} ({} {})",
                hour_label(hourly.lowest_hour),
                format_magnitude(hourly.lowest_value),
                unit
            ));
            lines.push(format!("Average per observed hour: {:.1}", hourly.average_per_hour));
            lines.push(format!("Observed hours: {}", hourly.observed_hours));
            lines.push(format!("Trend: {}", hourly.trend));
            lines.push(String::new());

            lines.push("Hour   Records      Value    Success       Fail".to_string());
            for bucket in hourly.buckets.iter().filter(|b| b.occurrence_count > 0) {
                lines.push(format!(
                    "{:02}:00  {:>7}  {:>9}  {:>9}  {:>9}",
                    bucket.hour,
                    bucket.occurrence_count,
                    format_magnitude(bucket.metric_value(hourly.averaged)),
                    format_magnitude(bucket.success),
                    format_magnitude(bucket.fail)
                ));
            }
        }
        if !hourly.defaulted_records.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "WARNING: {} record(s) had unreadable dates and were counted at 00:00",
                hourly.defaulted_records.len()
            ));
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("=".repeat(80));

    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &DashboardReport, output_path: &Path) -> Result<()> {
    let content = render_text_report(report);
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a summary to stdout
pub fn print_summary(report: &DashboardReport) {
    println!("\n=== DASHBOARD ANALYSIS SUMMARY ===\n");
    println!("Records: {}", report.metadata.record_count);
    println!("Stages: {}", report.metadata.stage_count);

    if let Some(ref flow) = report.flow {
        println!("\nUser Flow{}:", if flow.estimated { " (estimated)" } else { "" });
        println!("  Nodes: {}", flow.nodes.len());
        println!("  Links: {}", flow.links.len());
        println!("  Dropped transitions: {}", flow.diagnostics.dropped_transitions);
    }

    if let Some(ref hourly) = report.hourly {
        println!("\nHourly Activity:");
        println!("  Peak: {}", hour_label(hourly.peak_hour));
        println!("  Lowest: {}", hour_label(hourly.lowest_hour));
        println!("  Trend: {}", hourly.trend);
    }

    println!();
}
