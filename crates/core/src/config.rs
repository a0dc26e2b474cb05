//! Configuration loading.
//! Reads assetgraph.toml from the current directory, the path in the
//! ASSETGRAPH_CONFIG env var, or an explicitly given path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extract::{ExtractLimits, DEFAULT_MAX_EDGES, DEFAULT_MAX_NODES};
use crate::guard::AllowList;
use crate::layout::StorageLayout;
use crate::storage::Storage;

pub const CONFIG_ENV: &str = "ASSETGRAPH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "assetgraph.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Additional permitted roots beyond the layout's served directories
    #[serde(default)]
    pub extra_roots: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            extra_roots: Vec::new(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("file_storage")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_max_edges")]
    pub max_edges: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_edges: default_max_edges(),
        }
    }
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

fn default_max_edges() -> usize {
    DEFAULT_MAX_EDGES
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path (argument or `ASSETGRAPH_CONFIG`) must exist. The
    /// default `assetgraph.toml` is optional and defaults apply without it.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = explicit.map(Path::to_path_buf).or(from_env);

        match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::from_file(&path)
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn limits(&self) -> ExtractLimits {
        ExtractLimits {
            max_nodes: self.graph.max_nodes,
            max_edges: self.graph.max_edges,
        }
    }

    /// Storage layout with a relative `base_dir` anchored at `cwd`
    pub fn layout(&self, cwd: &Path) -> StorageLayout {
        StorageLayout::new(cwd.join(&self.storage.base_dir))
    }

    /// Allow-list for this configuration, relative paths resolved against `cwd`
    pub fn allow_list(&self, cwd: &Path) -> AllowList {
        self.layout(cwd).allow_list(cwd, &self.storage.extra_roots)
    }

    pub fn storage(&self, cwd: &Path) -> Storage {
        Storage::new(self.allow_list(cwd))
    }
}
