//! Graph data structures for IFC entity visualization
//!
//! Uses `petgraph::StableGraph` so node and edge indices follow insertion
//! order. The node sequence therefore matches the order in which entity
//! ids were first seen in the source text, which is the order the viewer
//! lays them out in.

use std::collections::HashMap;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};

/// An IFC entity record, e.g. `#12 = IFCWALL(...)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    /// Entity identifier token including the leading `#`
    pub id: String,
    /// Upper-case entity type token (e.g. "IFCWALL")
    #[serde(rename = "type")]
    pub ifc_type: String,
}

/// A directed reference from one entity record to another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Node and edge totals carried alongside the export
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counts {
    pub nodes: usize,
    pub edges: usize,
}

/// JSON shape handed to the viewer: `{ nodes, edges, counts }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphExport {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub counts: Counts,
}

/// The entity reference graph
///
/// Nodes are unique by id. Edges may repeat but can only be added between
/// ids that are already present, so an edge never dangles.
#[derive(Debug, Clone)]
pub struct IfcGraph {
    /// The underlying stable graph (private to enforce encapsulation)
    inner: StableGraph<Node, Edge>,
    /// Id to index lookup so repeated ids resolve in O(1)
    index: HashMap<String, NodeIndex>,
}

impl IfcGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Insert a node, or overwrite the type of an existing one
    ///
    /// A repeated id keeps its original position in the node sequence.
    /// Returns `true` when the id was new.
    pub fn upsert_node(&mut self, id: &str, ifc_type: &str) -> bool {
        if let Some(&idx) = self.index.get(id) {
            if let Some(node) = self.inner.node_weight_mut(idx) {
                node.ifc_type = ifc_type.to_string();
            }
            return false;
        }

        let idx = self.inner.add_node(Node {
            id: id.to_string(),
            ifc_type: ifc_type.to_string(),
        });
        self.index.insert(id.to_string(), idx);
        true
    }

    /// Whether a node with this id has been recorded
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Get the recorded type for an id
    pub fn type_of(&self, id: &str) -> Option<&str> {
        self.index
            .get(id)
            .and_then(|&idx| self.inner.node_weight(idx))
            .map(|n| n.ifc_type.as_str())
    }

    /// Add a directed edge between two known ids
    ///
    /// Returns `None` without modifying the graph if either endpoint is
    /// unknown.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Option<EdgeIndex> {
        let source = *self.index.get(from)?;
        let target = *self.index.get(to)?;
        Some(self.inner.add_edge(
            source,
            target,
            Edge {
                from: from.to_string(),
                to: to.to_string(),
            },
        ))
    }

    /// Get the number of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Get the number of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over nodes in first-seen order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner.node_weights()
    }

    /// Iterate over edges in emission order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner.edge_weights()
    }

    /// Edge endpoints as node indices, for wiring checks in tests
    pub fn edge_endpoints(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &Edge)> {
        self.inner
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    /// Node index for an id
    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Build the serializable `{ nodes, edges, counts }` view
    pub fn to_export(&self) -> GraphExport {
        let nodes: Vec<Node> = self.nodes().cloned().collect();
        let edges: Vec<Edge> = self.edges().cloned().collect();
        GraphExport {
            counts: Counts {
                nodes: nodes.len(),
                edges: edges.len(),
            },
            nodes,
            edges,
        }
    }
}

impl Default for IfcGraph {
    fn default() -> Self {
        Self::new()
    }
}
