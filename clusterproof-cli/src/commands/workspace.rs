//! `clusterproof workspace` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use clusterproof_core::error::HarnessError;
use clusterproof_core::workspace::Workspace;

use crate::cli::{WorkspaceAction, WorkspaceArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `workspace` command.
pub fn execute(args: WorkspaceArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        WorkspaceAction::Show { path } => {
            let report = show(&path)?;
            writer.render(&report)
        }
        WorkspaceAction::Clean { path } => {
            let report = clean(&path)?;
            writer.render(&report)
        }
    }
}

/// Read every persisted artifact of a workspace.
pub fn show(path: &Path) -> Result<WorkspaceReport, CliError> {
    let workspace = Workspace::open(path).map_err(HarnessError::from)?;
    let mut artifacts = BTreeMap::new();
    for key in workspace.keys().map_err(HarnessError::from)? {
        let value = workspace
            .try_load::<serde_json::Value>(&key)
            .map_err(HarnessError::from)?
            .unwrap_or(serde_json::Value::Null);
        artifacts.insert(key, value);
    }

    Ok(WorkspaceReport {
        workspace: workspace.dir().display().to_string(),
        root: workspace.root().display().to_string(),
        artifacts,
    })
}

/// Remove a workspace and its copied tree.
pub fn clean(path: &Path) -> Result<CleanReport, CliError> {
    let workspace = Workspace::open(path).map_err(HarnessError::from)?;
    let root = workspace.root().display().to_string();
    workspace.cleanup().map_err(HarnessError::from)?;
    info!(root = %root, "workspace removed");
    Ok(CleanReport { removed: root })
}

/// Persisted state of one workspace.
#[derive(Debug, Serialize)]
pub struct WorkspaceReport {
    pub workspace: String,
    pub root: String,
    pub artifacts: BTreeMap<String, serde_json::Value>,
}

impl Render for WorkspaceReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Workspace: {}", self.workspace.bold())?;
        writeln!(w, "  Copied tree: {}", self.root)?;
        if self.artifacts.is_empty() {
            writeln!(w, "  {}", "no persisted artifacts".yellow())?;
            return Ok(());
        }
        for (key, value) in &self.artifacts {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writeln!(w, "  {:<12} {}", key.cyan(), rendered)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct CleanReport {
    pub removed: String,
}

impl Render for CleanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Removed {}", self.removed)
    }
}
