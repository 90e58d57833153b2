//! # Dependency-graph export.
//!
//! Renders a manifest's dependency graph to Graphviz DOT and, via the
//! external `dot` tool, to an image. A read-only consumer of the manifest:
//! nothing here touches supervision state.
//!
//! Nodes are colored by readiness strategy (tcp lightblue, file lightgreen,
//! pipe lightyellow, none white); edges run `dependency → dependent`.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;

use crate::manifest::ProcessManifest;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GraphFormat {
    Png,
    Svg,
    Pdf,
}

impl GraphFormat {
    /// The `dot -T` argument / file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphFormat::Png => "png",
            GraphFormat::Svg => "svg",
            GraphFormat::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn fill_color(strategy: Option<&str>) -> &'static str {
    match strategy {
        Some("tcp") => "lightblue",
        Some("file") => "lightgreen",
        Some("pipe") => "lightyellow",
        _ => "white",
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Renders the manifest to DOT source.
///
/// `detailed` adds per-node tooltips; tooltips only survive in svg output,
/// so callers honor the flag for that format alone.
pub fn render_dot(manifest: &ProcessManifest, detailed: bool) -> String {
    let mut out = String::from("digraph process_dependencies {\n    rankdir=LR;\n");
    for spec in &manifest.processes {
        let mut attrs = format!(
            "style=filled, fillcolor={}",
            fill_color(spec.ready_strategy.as_deref())
        );
        if detailed {
            let tooltip = format!(
                "Path: {}\nReady Strategy: {}\nTimeout: {}s",
                spec.path.display(),
                spec.ready_strategy.as_deref().unwrap_or("none"),
                spec.ready_timeout_sec.unwrap_or(0.0),
            );
            attrs.push_str(&format!(", tooltip={}", quote(&tooltip)));
        }
        out.push_str(&format!("    {} [{attrs}];\n", quote(&spec.name)));
        for dep in &spec.dependencies {
            out.push_str(&format!("    {} -> {};\n", quote(dep), quote(&spec.name)));
        }
    }
    out.push_str("}\n");
    out
}

/// Writes the DOT source and invokes `dot` to produce the image.
///
/// Returns the image path (`process_dependencies.<format>` under
/// `output_dir`, default the current directory).
pub fn export_graph(
    manifest: &ProcessManifest,
    format: GraphFormat,
    output_dir: Option<&Path>,
    detailed: bool,
) -> anyhow::Result<PathBuf> {
    let detailed = detailed && format == GraphFormat::Svg;
    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create output directory {}", dir.display()))?;

    let dot_path = dir.join("process_dependencies.dot");
    let image_path = dir.join(format!("process_dependencies.{format}"));
    std::fs::write(&dot_path, render_dot(manifest, detailed))
        .with_context(|| format!("cannot write {}", dot_path.display()))?;

    let status = Command::new("dot")
        .arg(format!("-T{format}"))
        .arg(&dot_path)
        .arg("-o")
        .arg(&image_path)
        .status()
        .context("graphviz 'dot' not found on PATH")?;
    anyhow::ensure!(status.success(), "dot exited with {status}");

    Ok(image_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ProcessManifest {
        ProcessManifest::from_json(
            r#"{
                "processes": [
                    {
                        "name": "db", "path": "/usr/bin/postgres",
                        "ready_strategy": "tcp", "ready_timeout_sec": 5.0,
                        "ready_params": {"port": 5432}
                    },
                    {"name": "api", "path": "/usr/bin/api", "dependencies": ["db"]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn dot_output_carries_nodes_edges_and_colors() {
        let dot = render_dot(&manifest(), false);
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("\"db\" [style=filled, fillcolor=lightblue]"));
        assert!(dot.contains("\"api\" [style=filled, fillcolor=white]"));
        assert!(dot.contains("\"db\" -> \"api\";"));
        assert!(!dot.contains("tooltip"));
    }

    #[test]
    fn detailed_rendering_adds_tooltips() {
        let dot = render_dot(&manifest(), true);
        assert!(dot.contains("tooltip"));
        assert!(dot.contains("Ready Strategy: tcp"));
    }

    #[test]
    fn node_names_are_quoted() {
        let m = ProcessManifest::from_json(
            r#"{"processes": [{"name": "we\"ird", "path": "/bin/true"}]}"#,
        )
        .unwrap();
        let dot = render_dot(&m, false);
        assert!(dot.contains("\"we\\\"ird\""));
    }
}
