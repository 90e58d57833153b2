//! Dependency-graph CLI: render a manifest's dependency graph to an image
//! via graphviz. A read-only consumer of the manifest.
//!
//! Exit codes: `0` success, `1` failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use process_pilot::export::{export_graph, GraphFormat};
use process_pilot::ProcessManifest;

#[derive(Parser)]
#[command(
    name = "process-graph",
    about = "Render a process manifest's dependency graph",
    version
)]
struct Args {
    /// Path to the process manifest (JSON or YAML).
    manifest_path: PathBuf,

    /// Output image format.
    #[arg(long, value_enum, default_value_t = GraphFormat::Png)]
    format: GraphFormat,

    /// Directory to write the graph into (default: current directory).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Include per-node tooltips (honored only for svg).
    #[arg(long)]
    detailed: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let manifest = match ProcessManifest::from_path(&args.manifest_path) {
        Ok(m) => m,
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            return ExitCode::from(1);
        }
    };
    if let Err(e) = manifest.validate() {
        error!(label = e.as_label(), "{e}");
        return ExitCode::from(1);
    }

    match export_graph(
        &manifest,
        args.format,
        args.output_dir.as_deref(),
        args.detailed,
    ) {
        Ok(path) => {
            println!("Generated dependency graph: {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("error generating graph: {e:#}");
            ExitCode::from(1)
        }
    }
}
