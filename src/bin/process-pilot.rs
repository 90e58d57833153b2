//! Supervisor CLI: load a manifest, start the fleet, supervise until an
//! operator signal or a `shutdown_everything` exit.
//!
//! Exit codes: `0` clean stop, `1` manifest validation failure, `2` startup
//! failure, `3` unexpected internal error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use process_pilot::{PilotConfig, PilotError, ProcessManifest, ProcessPilot};

#[derive(Parser)]
#[command(
    name = "process-pilot",
    about = "Manifest-driven process supervisor",
    version
)]
struct Args {
    /// Path to the process manifest (JSON or YAML).
    manifest_path: PathBuf,

    /// Directory to discover plugins in.
    ///
    /// Accepted for interface compatibility; this build only supports
    /// plugins registered through the library API.
    #[arg(long)]
    plugins: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    ExitCode::from(run(args).await)
}

async fn run(args: Args) -> u8 {
    if let Some(dir) = &args.plugins {
        warn!(
            dir = %dir.display(),
            "dynamic plugin discovery is not supported; register plugins via the library API"
        );
    }

    let manifest = match ProcessManifest::from_path(&args.manifest_path) {
        Ok(m) => m,
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            return 1;
        }
    };

    let pilot = match ProcessPilot::new(manifest, PilotConfig::default()) {
        Ok(p) => p,
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            return 1;
        }
    };

    if let Err(e) = pilot.start().await {
        error!(label = e.as_label(), "{e}");
        return match e {
            PilotError::Manifest(_) => 1,
            PilotError::Startup { .. } | PilotError::Plugin { .. } => 2,
            _ => 3,
        };
    }

    match pilot.wait_terminated().await {
        Ok(()) => 0,
        Err(e) => {
            error!(label = e.as_label(), "{e}");
            3
        }
    }
}
