//! Stage-based flow graph aggregation.
//!
//! Turns a flat event log plus an ordered list of stages into a multistage
//! node/link graph for a flow (Sankey) diagram. Links only ever connect a
//! stage to the one directly after it.
//!
//! Two input shapes are supported:
//! - measured transitions, where each record names the event that followed it
//! - per-event totals, where each stage's targets are apportioned to the
//!   previous stage's sources by their share of that stage's volume. This
//!   assumes independent mixing between stages and is an estimate, not
//!   observed traffic.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::palette::color_for;
use super::types::*;

/// Smallest rendered node value so tiny flows stay visible
pub const DEFAULT_MIN_VISIBLE_VALUE: f64 = 1.0;

/// Estimated links below this magnitude are dropped as noise
pub const DEFAULT_LINK_THRESHOLD: f64 = 0.1;

/// Tuning for graph construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default = "default_min_visible_value")]
    pub min_visible_value: f64,
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f64,
}

fn default_min_visible_value() -> f64 {
    DEFAULT_MIN_VISIBLE_VALUE
}

fn default_link_threshold() -> f64 {
    DEFAULT_LINK_THRESHOLD
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            min_visible_value: DEFAULT_MIN_VISIBLE_VALUE,
            link_threshold: DEFAULT_LINK_THRESHOLD,
        }
    }
}

/// Stage-qualified node name, e.g. `"Checkout (S2)"` for stage index 1
pub fn node_name(label: &str, stage_index: usize) -> String {
    format!("{} (S{})", label, stage_index + 1)
}

/// Nodes looked up by name, indexed in first-seen order
struct NodeTable<'a> {
    labels: &'a HashMap<String, String>,
    nodes: Vec<FlowNode>,
    by_name: HashMap<String, usize>,
}

impl<'a> NodeTable<'a> {
    fn new(labels: &'a HashMap<String, String>) -> Self {
        Self {
            labels,
            nodes: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    fn label_of<'b>(&'b self, event_id: &'b str) -> &'b str {
        self.labels.get(event_id).map(String::as_str).unwrap_or(event_id)
    }

    fn get_or_create(&mut self, event_id: &str, stage_index: usize) -> usize {
        let label = self.label_of(event_id).to_string();
        let name = node_name(&label, stage_index);
        if let Some(&index) = self.by_name.get(&name) {
            return index;
        }

        let index = self.nodes.len();
        self.nodes.push(FlowNode {
            name: name.clone(),
            event_id: event_id.to_string(),
            stage_index,
            value: 0.0,
            display_value: 0.0,
            inflow: 0.0,
            outflow: 0.0,
            color: color_for(&label).to_string(),
        });
        self.by_name.insert(name, index);
        index
    }

    /// Record a link and accumulate its magnitude into both endpoints
    fn link(
        &mut self,
        links: &mut Vec<FlowLink>,
        (source_event, source_stage): (&str, usize),
        (target_event, target_stage): (&str, usize),
        value: f64,
    ) {
        let source = self.get_or_create(source_event, source_stage);
        let target = self.get_or_create(target_event, target_stage);

        self.nodes[source].outflow += value;
        self.nodes[source].display_value += value;
        self.nodes[target].inflow += value;
        self.nodes[target].display_value += value;

        links.push(FlowLink {
            source,
            target,
            value,
            color: self.nodes[source].color.clone(),
        });
    }
}

/// Map each event identifier to every stage position it belongs to
fn event_stage_positions(stages: &[Stage]) -> HashMap<&str, Vec<usize>> {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, stage) in stages.iter().enumerate() {
        for event_id in stage.unique_event_ids() {
            positions.entry(event_id).or_default().push(index);
        }
    }
    positions
}

/// Lowest source stage `i` such that the target belongs to stage `i + 1`
fn adjacent_stage(source: &[usize], target: &[usize]) -> Option<usize> {
    source
        .iter()
        .copied()
        .find(|i| target.contains(&(i + 1)))
}

fn build_from_transitions(
    records: &[EventRecord],
    stages: &[Stage],
    table: &mut NodeTable<'_>,
    links: &mut Vec<FlowLink>,
    diagnostics: &mut FlowDiagnostics,
) {
    let positions = event_stage_positions(stages);

    for record in records {
        let Some(next_event_id) = record.next_event_id.as_deref() else {
            continue;
        };

        let accepted = match (
            positions.get(record.event_id.as_str()),
            positions.get(next_event_id),
        ) {
            (Some(source), Some(target)) => adjacent_stage(source, target),
            _ => None,
        };

        match accepted {
            Some(stage_index) => table.link(
                links,
                (record.event_id.as_str(), stage_index),
                (next_event_id, stage_index + 1),
                record.count as f64,
            ),
            None => {
                log::trace!(
                    "Dropping transition {} -> {}: not between adjacent stages",
                    record.event_id,
                    next_event_id
                );
                diagnostics.dropped_transitions += 1;
            }
        }
    }
}

fn build_from_totals<'r>(
    records: &'r [EventRecord],
    stages: &'r [Stage],
    settings: &FlowSettings,
    table: &mut NodeTable<'_>,
    links: &mut Vec<FlowLink>,
    diagnostics: &mut FlowDiagnostics,
) {
    let mut event_totals: HashMap<&str, f64> = HashMap::new();
    for record in records {
        *event_totals.entry(record.event_id.as_str()).or_default() += record.count as f64;
    }
    let positive = |ids: Vec<&'r str>| -> Vec<(&'r str, f64)> {
        ids.into_iter()
            .map(|id| (id, event_totals.get(id).copied().unwrap_or(0.0)))
            .filter(|(_, total)| *total > 0.0)
            .collect()
    };

    for (stage_index, pair) in stages.windows(2).enumerate() {
        let sources = positive(pair[0].unique_event_ids());
        let targets = positive(pair[1].unique_event_ids());

        let stage_source_total: f64 = sources.iter().map(|(_, total)| total).sum();
        if stage_source_total <= 0.0 {
            continue;
        }

        for &(target, target_total) in &targets {
            for &(source, source_total) in &sources {
                let value = target_total * (source_total / stage_source_total);
                if value < settings.link_threshold {
                    diagnostics.dropped_links += 1;
                    continue;
                }
                table.link(
                    links,
                    (source, stage_index),
                    (target, stage_index + 1),
                    value,
                );
            }
        }
    }
}

/// Merge links sharing a (source, target) pair by summing their values.
///
/// First-seen order of pairs is preserved; running this on its own output
/// returns the same links.
pub fn consolidate_links(links: Vec<FlowLink>) -> Vec<FlowLink> {
    let mut merged: Vec<FlowLink> = Vec::with_capacity(links.len());
    let mut by_pair: HashMap<(usize, usize), usize> = HashMap::new();

    for link in links {
        match by_pair.get(&(link.source, link.target)) {
            Some(&index) => merged[index].value += link.value,
            None => {
                by_pair.insert((link.source, link.target), merged.len());
                merged.push(link);
            }
        }
    }

    merged
}

/// Set each node's rendered value to `max(display_value, min_visible)`
pub fn apply_visual_floor(nodes: &mut [FlowNode], min_visible: f64) {
    for node in nodes {
        node.value = node.display_value.max(min_visible);
    }
}

/// Stage event identifiers that have no entry in `labels`
fn unknown_stage_events(stages: &[Stage], labels: &HashMap<String, String>) -> Vec<String> {
    let mut seen = HashSet::new();
    stages
        .iter()
        .flat_map(|s| s.unique_event_ids())
        .filter(|id| !labels.contains_key(*id) && seen.insert(*id))
        .map(String::from)
        .collect()
}

/// Build a flow graph from `input` over the ordered `stages`.
///
/// `labels` maps event identifiers to display names; missing entries fall
/// back to the identifier. An empty stage list yields an empty graph.
pub fn build_flow_graph(
    input: &FlowInput,
    stages: &[Stage],
    labels: &HashMap<String, String>,
    settings: &FlowSettings,
) -> FlowGraph {
    let mut graph = FlowGraph {
        estimated: input.is_estimated(),
        ..FlowGraph::default()
    };
    if stages.is_empty() {
        return graph;
    }

    let mut diagnostics = FlowDiagnostics {
        empty_stages: stages
            .iter()
            .filter(|s| s.unique_event_ids().is_empty())
            .map(|s| s.id.clone())
            .collect(),
        ..FlowDiagnostics::default()
    };
    if !labels.is_empty() {
        diagnostics.unknown_stage_events = unknown_stage_events(stages, labels);
        if !diagnostics.unknown_stage_events.is_empty() {
            log::warn!(
                "{} stage event(s) not found in the event catalog: {}",
                diagnostics.unknown_stage_events.len(),
                diagnostics.unknown_stage_events.join(", ")
            );
        }
    }

    let mut table = NodeTable::new(labels);
    let mut links = Vec::new();
    match input {
        FlowInput::Transitions(records) => {
            build_from_transitions(records, stages, &mut table, &mut links, &mut diagnostics)
        }
        FlowInput::TotalsOnly(records) => build_from_totals(
            records,
            stages,
            settings,
            &mut table,
            &mut links,
            &mut diagnostics,
        ),
    }

    let mut nodes = table.nodes;
    apply_visual_floor(&mut nodes, settings.min_visible_value);

    log::debug!(
        "Built flow graph: {} nodes, {} raw links, {} dropped transitions",
        nodes.len(),
        links.len(),
        diagnostics.dropped_transitions
    );

    graph.nodes = nodes;
    graph.links = consolidate_links(links);
    graph.diagnostics = diagnostics;
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stages() -> Vec<Stage> {
        vec![Stage::new("s1", &["A"]), Stage::new("s2", &["B"])]
    }

    fn no_labels() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_single_transition() {
        let input = FlowInput::Transitions(vec![EventRecord::transition("A", "B", 10)]);
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &FlowSettings::default());

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.nodes[0].name, "A (S1)");
        assert_eq!(graph.nodes[1].name, "B (S2)");
        assert_eq!(graph.links[0].value, 10.0);
        assert_eq!(graph.nodes[0].display_value, 10.0);
        assert_eq!(graph.nodes[1].display_value, 10.0);
        assert_eq!(graph.links[0].color, graph.nodes[0].color);
        assert!(!graph.estimated);
    }

    #[test]
    fn test_labels_used_in_node_names() {
        let labels: HashMap<String, String> = [
            ("A".to_string(), "Landing".to_string()),
            ("B".to_string(), "Signup".to_string()),
        ]
        .into_iter()
        .collect();
        let input = FlowInput::Transitions(vec![EventRecord::transition("A", "B", 3)]);
        let graph = build_flow_graph(&input, &two_stages(), &labels, &FlowSettings::default());

        assert!(graph.node("Landing (S1)").is_some());
        assert!(graph.node("Signup (S2)").is_some());
        assert!(graph.diagnostics.unknown_stage_events.is_empty());
    }

    #[test]
    fn test_skipping_and_same_stage_transitions_dropped() {
        let stages = vec![
            Stage::new("s1", &["A", "A2"]),
            Stage::new("s2", &["B"]),
            Stage::new("s3", &["C"]),
        ];
        let input = FlowInput::Transitions(vec![
            EventRecord::transition("A", "C", 5),  // skips a stage
            EventRecord::transition("A", "A2", 5), // same stage
            EventRecord::transition("C", "B", 5),  // backwards
            EventRecord::transition("A", "X", 5),  // unknown target
            EventRecord::transition("B", "C", 7),
        ]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.diagnostics.dropped_transitions, 4);
        for link in &graph.links {
            let source = &graph.nodes[link.source];
            let target = &graph.nodes[link.target];
            assert_eq!(source.stage_index + 1, target.stage_index);
        }
    }

    #[test]
    fn test_records_without_next_event_ignored_in_transition_mode() {
        let input = FlowInput::Transitions(vec![
            EventRecord::new("A", 100),
            EventRecord::transition("A", "B", 4),
        ]);
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &FlowSettings::default());
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].value, 4.0);
        assert_eq!(graph.diagnostics.dropped_transitions, 0);
    }

    #[test]
    fn test_event_in_multiple_stages_gets_node_per_stage() {
        let stages = vec![
            Stage::new("s1", &["A"]),
            Stage::new("s2", &["B"]),
            Stage::new("s3", &["A"]),
        ];
        let input = FlowInput::Transitions(vec![
            EventRecord::transition("A", "B", 6),
            EventRecord::transition("B", "A", 2),
        ]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        assert!(graph.node("A (S1)").is_some());
        assert!(graph.node("A (S3)").is_some());
        let middle = graph.node("B (S2)").unwrap();
        assert_eq!(middle.inflow, 6.0);
        assert_eq!(middle.outflow, 2.0);
        assert_eq!(middle.display_value, 8.0);
    }

    #[test]
    fn test_duplicate_transitions_consolidated() {
        let input = FlowInput::Transitions(vec![
            EventRecord::transition("A", "B", 10),
            EventRecord::transition("A", "B", 5),
        ]);
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &FlowSettings::default());
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].value, 15.0);
        assert_eq!(graph.incoming_total(1), graph.nodes[1].inflow);
    }

    #[test]
    fn test_totals_single_source_gets_full_share() {
        let input = FlowInput::TotalsOnly(vec![EventRecord::new("A", 100), EventRecord::new("B", 40)]);
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &FlowSettings::default());

        assert!(graph.estimated);
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].value, 40.0);
    }

    #[test]
    fn test_totals_apportioned_by_source_share() {
        let stages = vec![Stage::new("s1", &["A", "B"]), Stage::new("s2", &["C"])];
        let input = FlowInput::TotalsOnly(vec![
            EventRecord::new("A", 75),
            EventRecord::new("B", 25),
            EventRecord::new("C", 40),
        ]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        let a = graph.node("A (S1)").unwrap();
        let b = graph.node("B (S1)").unwrap();
        assert!((a.outflow - 30.0).abs() < 1e-9);
        assert!((b.outflow - 10.0).abs() < 1e-9);
        let c = graph.node("C (S2)").unwrap();
        assert!((c.inflow - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_zero_source_stage_skipped() {
        let input = FlowInput::TotalsOnly(vec![EventRecord::new("B", 40)]);
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &FlowSettings::default());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_totals_noise_links_dropped() {
        let stages = vec![Stage::new("s1", &["A", "B"]), Stage::new("s2", &["C"])];
        let input = FlowInput::TotalsOnly(vec![
            EventRecord::new("A", 9999),
            EventRecord::new("B", 1),
            EventRecord::new("C", 10),
        ]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        // B's share of C is 10 * 1/10000 = 0.001
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.diagnostics.dropped_links, 1);
        assert!(graph.node("B (S1)").is_none());
    }

    #[test]
    fn test_empty_stage_blocks_chain() {
        let stages = vec![
            Stage::new("s1", &["A"]),
            Stage::new("s2", &[]),
            Stage::new("s3", &["C"]),
        ];
        let input = FlowInput::TotalsOnly(vec![EventRecord::new("A", 5), EventRecord::new("C", 5)]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());
        assert!(graph.links.is_empty());
        assert_eq!(graph.diagnostics.empty_stages, vec!["s2".to_string()]);
    }

    #[test]
    fn test_empty_stages_yield_empty_graph() {
        let input = FlowInput::Transitions(vec![EventRecord::transition("A", "B", 1)]);
        let graph = build_flow_graph(&input, &[], &no_labels(), &FlowSettings::default());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_visual_floor() {
        let input = FlowInput::Transitions(vec![EventRecord::transition("A", "B", 0)]);
        let settings = FlowSettings {
            min_visible_value: 2.5,
            ..FlowSettings::default()
        };
        let graph = build_flow_graph(&input, &two_stages(), &no_labels(), &settings);
        for node in &graph.nodes {
            assert_eq!(node.display_value, 0.0);
            assert_eq!(node.value, 2.5);
        }
    }

    #[test]
    fn test_consolidation_idempotent() {
        let link = |s, t, v| FlowLink {
            source: s,
            target: t,
            value: v,
            color: String::new(),
        };
        let once = consolidate_links(vec![link(0, 1, 1.0), link(0, 2, 2.0), link(0, 1, 3.0)]);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].value, 4.0);
        let twice = consolidate_links(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_stage_events_reported() {
        let labels: HashMap<String, String> =
            [("A".to_string(), "Landing".to_string())].into_iter().collect();
        let input = FlowInput::Transitions(Vec::new());
        let graph = build_flow_graph(&input, &two_stages(), &labels, &FlowSettings::default());
        assert_eq!(graph.diagnostics.unknown_stage_events, vec!["B".to_string()]);
    }

    #[test]
    fn test_duplicate_stage_events_counted_once_in_totals() {
        let stages = vec![Stage::new("s1", &["A", "A", "C"]), Stage::new("s2", &["B", "B"])];
        let input = FlowInput::TotalsOnly(vec![
            EventRecord::new("A", 60),
            EventRecord::new("C", 40),
            EventRecord::new("B", 50),
        ]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        assert_eq!(graph.links.len(), 2);
        let a = graph.node("A (S1)").unwrap();
        let c = graph.node("C (S1)").unwrap();
        assert!((a.outflow - 30.0).abs() < 1e-9);
        assert!((c.outflow - 20.0).abs() < 1e-9);
        let b = graph.node("B (S2)").unwrap();
        assert!((b.inflow - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_stage_events_in_transitions() {
        let stages = vec![Stage::new("s1", &["A", "A"]), Stage::new("s2", &["B", "B"])];
        let input = FlowInput::Transitions(vec![EventRecord::transition("A", "B", 10)]);
        let graph = build_flow_graph(&input, &stages, &no_labels(), &FlowSettings::default());

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].value, 10.0);
    }
}
