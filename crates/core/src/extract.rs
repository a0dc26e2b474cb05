//! Bounded extraction of entity graphs from IFC text
//!
//! IFC files written in STEP physical format put one entity record per
//! line:
//!
//! ```text
//! #12 = IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',#5,'Wall-001',$,$,#18,#21,$);
//! ```
//!
//! This module scans those lines with two regular expressions and never
//! builds a full document model. Schema validation and geometry belong to
//! the CAD-processing service; the graph here only feeds the viewer.
//!
//! # Two-Pass Scan
//!
//! - **Pass 1**: collect entity definitions (`#id = TYPE(`) in order until
//!   the node cap is reached.
//! - **Pass 2**: restart from the first line and, for each line that
//!   defines a collected entity, emit an edge to every other collected id
//!   referenced on that line, until the edge cap is reached.
//!
//! Restricting edges to ids gathered in pass 1 means an edge can never
//! point at an entity the caller did not receive.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::IfcGraph;

/// Default maximum number of nodes returned for a single file
pub const DEFAULT_MAX_NODES: usize = 800;

/// Default maximum number of edges returned for a single file
pub const DEFAULT_MAX_EDGES: usize = 2000;

/// Caps bounding extraction work and output size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractLimits {
    pub max_nodes: usize,
    pub max_edges: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
        }
    }
}

fn definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // #12 = IFCWALL(
        Regex::new(r"^\s*(#\d+)\s*=\s*([A-Z0-9_]+)\(").expect("definition pattern is valid")
    })
}

fn source_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(#\d+)\s*=").expect("source pattern is valid"))
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\d+").expect("reference pattern is valid"))
}

/// Split on `\r\n`, `\n` or a lone `\r`
///
/// `\r\n` yields an extra empty segment, which matches nothing.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
}

/// Extract a capped entity graph from IFC text
///
/// Lines that do not look like entity records are skipped without error.
/// Reaching either cap ends the corresponding pass early and the partial
/// graph is returned as a normal result.
///
/// # Example
/// ```
/// use asset_graph_core::extract::{extract_graph, ExtractLimits};
///
/// let text = "#1 = IFCWALL(...);\n#2 = IFCDOOR(#1);\n";
/// let graph = extract_graph(text, ExtractLimits::default());
///
/// assert_eq!(graph.node_count(), 2);
/// assert_eq!(graph.edge_count(), 1);
/// ```
pub fn extract_graph(text: &str, limits: ExtractLimits) -> IfcGraph {
    let mut graph = IfcGraph::new();

    collect_nodes(text, limits.max_nodes, &mut graph);
    collect_edges(text, limits.max_edges, &mut graph);

    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        max_nodes = limits.max_nodes,
        max_edges = limits.max_edges,
        "extracted ifc graph"
    );

    graph
}

fn collect_nodes(text: &str, max_nodes: usize, graph: &mut IfcGraph) {
    let definition = definition_regex();

    for line in split_lines(text) {
        if graph.node_count() >= max_nodes {
            tracing::debug!(max_nodes, "node cap reached, stopping node scan");
            break;
        }
        if let Some(caps) = definition.captures(line) {
            graph.upsert_node(&caps[1], &caps[2]);
        }
    }
}

fn collect_edges(text: &str, max_edges: usize, graph: &mut IfcGraph) {
    let source = source_regex();
    let reference = reference_regex();

    for line in split_lines(text) {
        if graph.edge_count() >= max_edges {
            break;
        }

        let Some(caps) = source.captures(line) else {
            continue;
        };
        let from = caps[1].to_string();
        if !graph.contains(&from) {
            continue;
        }

        for token in reference.find_iter(line) {
            if graph.edge_count() >= max_edges {
                tracing::debug!(max_edges, "edge cap reached mid-line");
                return;
            }
            let to = token.as_str();
            if to != from && graph.contains(to) {
                graph.add_edge(&from, to);
            }
        }
    }
}
