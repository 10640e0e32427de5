//! Terraform adapter.
//!
//! Input variables are written to [`VAR_FILE`] inside the IaC directory and
//! passed explicitly with `-var-file`, so a resumed run (or a manual
//! `terraform destroy` from the kept workspace) sees the same values.

use std::path::PathBuf;

use tracing::info;

use clusterproof_core::error::ToolError;
use clusterproof_core::provider::IacEngine;
use clusterproof_core::types::IacOptions;

use crate::process::ToolCommand;

const TOOL: &str = "terraform";

/// Generated variable file name.
pub const VAR_FILE: &str = "clusterproof.auto.tfvars.json";

/// Drives the `terraform` binary.
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: String,
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new(TOOL)
    }
}

impl Terraform {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// `terraform <subcommand> -no-color ...` in the IaC directory.
    fn command(&self, options: &IacOptions, subcommand: &str) -> ToolCommand {
        ToolCommand::new(TOOL, &self.binary)
            .current_dir(&options.dir)
            .args([subcommand, "-no-color"])
    }

    /// Write `options.vars` as the JSON var file and return its path.
    pub async fn write_var_file(&self, options: &IacOptions) -> Result<PathBuf, ToolError> {
        let path = options.dir.join(VAR_FILE);
        let body = serde_json::to_vec_pretty(&options.vars).map_err(|e| ToolError::Output {
            tool: TOOL.to_owned(),
            reason: format!("cannot encode variables: {e}"),
        })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ToolError::Output {
                tool: TOOL.to_owned(),
                reason: format!("cannot write {}: {e}", path.display()),
            })?;
        Ok(path)
    }
}

impl IacEngine for Terraform {
    async fn init_and_apply(&self, options: &IacOptions) -> Result<(), ToolError> {
        let var_file = self.write_var_file(options).await?;
        let var_arg = format!("-var-file={}", var_file.display());

        self.command(options, "init")
            .arg("-input=false")
            .run("init")
            .await?;

        self.command(options, "apply")
            .args(["-auto-approve", "-input=false"])
            .arg(var_arg)
            .run("apply")
            .await?;

        info!(dir = %options.dir.display(), "terraform apply complete");
        Ok(())
    }

    async fn output(&self, options: &IacOptions, name: &str) -> Result<String, ToolError> {
        let out = self
            .command(options, "output")
            .args(["-raw", name])
            .run("output")
            .await?;
        parse_output(name, &out.stdout)
    }

    async fn destroy(&self, options: &IacOptions) -> Result<(), ToolError> {
        let var_file = self.write_var_file(options).await?;

        self.command(options, "destroy")
            .args(["-auto-approve", "-input=false"])
            .arg(format!("-var-file={}", var_file.display()))
            .run("destroy")
            .await?;

        info!(dir = %options.dir.display(), "terraform destroy complete");
        Ok(())
    }
}

fn parse_output(name: &str, stdout: &str) -> Result<String, ToolError> {
    let value = stdout.trim();
    if value.is_empty() {
        return Err(ToolError::Output {
            tool: TOOL.to_owned(),
            reason: format!("output '{name}' is empty"),
        });
    }
    Ok(value.to_owned())
}
