//! Asset Graph Core Library
//!
//! This library provides bounded entity-graph extraction from IFC text and
//! allow-listed access to the stored files of the 3D asset pipeline
//! (uploads, processed IFC, GLB models, job status files).

pub mod config;
pub mod error;
pub mod extract;
pub mod graph;
pub mod guard;
pub mod layout;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::AccessError;
pub use extract::{extract_graph, ExtractLimits};
pub use graph::{Edge, GraphExport, IfcGraph, Node};
pub use guard::AllowList;
pub use layout::{FileKind, StorageLayout};
pub use storage::Storage;
