use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use asset_graph_core::layout::{self, StorageLayout};
use asset_graph_core::{AccessError, Config, Storage};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// assetgraph - Guarded access to stored 3D assets and IFC entity graphs
#[derive(Parser, Debug)]
#[command(name = "assetgraph")]
#[command(version)] // Auto-pull version from Cargo.toml
#[command(about = "Serve stored CAD assets and extract IFC entity graphs", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to ./assetgraph.toml when present)
    #[arg(short, long, env = "ASSETGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the storage base directory
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Additional permitted root (repeatable)
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the entity graph of a stored IFC file as JSON
    Graph {
        path: PathBuf,

        /// Maximum number of nodes
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Maximum number of edges
        #[arg(long)]
        max_edges: Option<usize>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check whether a path is inside the permitted roots
    Check { path: PathBuf },

    /// Write a stored file to stdout
    Cat { path: PathBuf },

    /// List files under a stored directory
    #[command(alias = "ls")]
    List {
        dir: PathBuf,

        /// Glob pattern relative to the directory (repeatable)
        #[arg(short, long)]
        pattern: Vec<String>,
    },

    /// Copy a local file into the uploads directory
    Upload { file: PathBuf },

    /// Show file counts and sizes across the permitted roots
    Stats,

    /// Create the storage directory layout
    Init,
}

/// Process exit status for a failed command
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AccessError>() {
        Some(AccessError::Denied(_)) => 2,
        Some(AccessError::NotFound(_)) => 3,
        _ => 1,
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(base_dir) = &cli.base_dir {
        config.storage.base_dir = base_dir.clone();
    }
    config.storage.extra_roots.extend(cli.roots.iter().cloned());
    Ok(config)
}

fn write_json<T: serde::Serialize>(
    out: &mut impl Write,
    value: &T,
    pretty: bool,
) -> anyhow::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

fn run(cli: &Cli, cwd: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let config = resolve_config(cli)?;
    let storage: Storage = config.storage(cwd);
    tracing::debug!(roots = ?storage.allow_list().roots(), "storage allow-list");

    match &cli.command {
        Commands::Graph {
            path,
            max_nodes,
            max_edges,
            pretty,
        } => {
            let mut limits = config.limits();
            if let Some(max_nodes) = max_nodes {
                limits.max_nodes = *max_nodes;
            }
            if let Some(max_edges) = max_edges {
                limits.max_edges = *max_edges;
            }
            let graph = storage.graph_for(path, limits)?;
            write_json(out, &graph.to_export(), *pretty)
        }
        Commands::Check { path } => {
            let resolved = storage.allow_list().check(path)?;
            writeln!(out, "allowed {}", resolved.display())?;
            Ok(())
        }
        Commands::Cat { path } => {
            let bytes = storage.read_bytes(path)?;
            out.write_all(&bytes)?;
            Ok(())
        }
        Commands::List { dir, pattern } => {
            let patterns: Vec<&str> = pattern.iter().map(String::as_str).collect();
            for file in storage.list_dir(dir, &patterns)? {
                writeln!(out, "{}", file.display())?;
            }
            Ok(())
        }
        Commands::Upload { file } => {
            let bytes = std::fs::read(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                anyhow::anyhow!("Upload path has no usable file name: {}", file.display())
            })?;
            let layout: StorageLayout = config.layout(cwd);
            let stored = layout.save_upload(storage.allow_list(), &bytes, name)?;
            write_json(out, &stored, false)
        }
        Commands::Stats => {
            let stats = layout::storage_stats(&storage)?;
            write_json(out, &stats, true)
        }
        Commands::Init => {
            let layout = config.layout(cwd);
            layout.ensure()?;
            for root in storage.allow_list().roots() {
                writeln!(out, "{}", root.display())?;
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = std::env::current_dir()
        .context("Failed to determine working directory")
        .and_then(|cwd| {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            run(&cli, &cwd, &mut out)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["assetgraph"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("file_storage"));
        layout.ensure().unwrap();
        fs::write(
            layout.processed.join("unit-1.ifc"),
            "#1 = IFCWALL(...);\n#2 = IFCDOOR(#1);\n",
        )
        .unwrap();
        fs::write(dir.path().join("outside.ifc"), "#1 = IFCWALL($);\n").unwrap();
        dir
    }

    fn run_in(dir: &TempDir, args: &[&str]) -> (anyhow::Result<()>, Vec<u8>) {
        let mut out = Vec::new();
        let mut argv = vec!["--base-dir", "file_storage"];
        argv.extend_from_slice(args);
        let cli = cli(&argv);
        let result = run(&cli, dir.path(), &mut out);
        (result, out)
    }

    #[test]
    fn test_graph_command_outputs_export() {
        let dir = workspace();
        let (result, out) = run_in(&dir, &["graph", "file_storage/processed/unit-1.ifc"]);
        result.unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["counts"]["nodes"], 2);
        assert_eq!(json["edges"][0]["from"], "#2");
        assert_eq!(json["edges"][0]["to"], "#1");
    }

    #[test]
    fn test_graph_command_honours_caps() {
        let dir = workspace();
        let (result, out) = run_in(
            &dir,
            &["graph", "file_storage/processed/unit-1.ifc", "--max-nodes", "1", "--max-edges", "0"],
        );
        result.unwrap();

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["counts"]["nodes"], 1);
        assert_eq!(json["counts"]["edges"], 0);
    }

    #[test]
    fn test_graph_outside_roots_exits_denied() {
        let dir = workspace();
        let (result, out) = run_in(&dir, &["graph", "outside.ifc"]);
        let err = result.unwrap_err();

        assert_eq!(exit_code_for(&err), 2);
        assert!(out.is_empty());
    }

    #[test]
    fn test_cat_missing_exits_not_found() {
        let dir = workspace();
        let (result, _) = run_in(&dir, &["cat", "file_storage/models/missing.glb"]);
        assert_eq!(exit_code_for(&result.unwrap_err()), 3);
    }

    #[test]
    fn test_check_command() {
        let dir = workspace();
        let (result, out) = run_in(&dir, &["check", "file_storage/models/../models/a.glb"]);
        result.unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("allowed "));
        assert!(line.trim_end().ends_with("file_storage/models/a.glb"));

        let (result, _) = run_in(&dir, &["check", "file_storage/workspace/a.glb"]);
        assert_eq!(exit_code_for(&result.unwrap_err()), 2);
    }

    #[test]
    fn test_extra_root_flag() {
        let dir = workspace();
        let root = dir.path().to_str().unwrap().to_string();
        let (result, out) = run_in(&dir, &["--root", &root, "cat", "outside.ifc"]);
        result.unwrap();
        assert_eq!(out, b"#1 = IFCWALL($);\n");
    }

    #[test]
    fn test_upload_then_list() {
        let dir = workspace();
        let source = dir.path().join("plan.ifc");
        fs::write(&source, "#1 = IFCSITE($);\n").unwrap();

        let (result, out) = run_in(&dir, &["upload", source.to_str().unwrap()]);
        result.unwrap();
        let stored: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(stored["kind"], "ifc");

        let (result, out) = run_in(&dir, &["list", "file_storage/uploads", "-p", "*.ifc"]);
        result.unwrap();
        let listing = String::from_utf8(out).unwrap();
        assert_eq!(listing.lines().count(), 1);
        assert!(listing.trim_end().ends_with("_plan.ifc"));
    }

    #[test]
    fn test_stats_command() {
        let dir = workspace();
        let (result, out) = run_in(&dir, &["stats"]);
        result.unwrap();

        let stats: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(stats["total_files"], 1);
        assert_eq!(stats["by_kind"]["ifc"]["count"], 1);
    }

    #[test]
    fn test_exit_code_for_other_errors() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&err), 1);
    }
}
