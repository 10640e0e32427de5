//! Packer adapter.
//!
//! Builds run with `-machine-readable`, which prints one CSV record per line:
//!
//! ```text
//! <timestamp>,<target>,<type>,<data>...
//! 1571234567,ubuntu-18-image,artifact,0,id,consul-ubuntu-18-01dg5sq8
//! ```
//!
//! The image identifier is the data of the last `artifact,0,id` record of the
//! requested build. Commas inside data are escaped as `%!(PACKER_COMMA)`.

use tracing::info;

use clusterproof_core::error::ToolError;
use clusterproof_core::provider::ImageBuilder;
use clusterproof_core::types::ImageBuildRequest;

use crate::process::ToolCommand;

const TOOL: &str = "packer";
const COMMA_ESCAPE: &str = "%!(PACKER_COMMA)";

/// Drives the `packer` binary.
#[derive(Debug, Clone)]
pub struct Packer {
    binary: String,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new(TOOL)
    }
}

impl Packer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, request: &ImageBuildRequest) -> ToolCommand {
        let mut cmd = ToolCommand::new(TOOL, &self.binary)
            .args(["build", "-machine-readable"])
            .arg(format!("-only={}", request.build_name));
        for (name, value) in &request.vars {
            cmd = cmd.arg("-var").arg(format!("{name}={value}"));
        }
        cmd.arg(request.template_path.display().to_string())
    }
}

impl ImageBuilder for Packer {
    async fn build(&self, request: &ImageBuildRequest) -> Result<String, ToolError> {
        let out = self.command(request).run("build").await?;

        let image_id =
            parse_artifact_id(&out.stdout, &request.build_name).ok_or_else(|| ToolError::Output {
                tool: TOOL.to_owned(),
                reason: format!("no artifact id reported for build '{}'", request.build_name),
            })?;

        info!(build = %request.build_name, image = %image_id, "image built");
        Ok(image_id)
    }
}

/// Artifact id of `build_name` in machine-readable output, if any.
pub fn parse_artifact_id(stdout: &str, build_name: &str) -> Option<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim_end_matches('\r').splitn(6, ',');
            let _timestamp = fields.next()?;
            let target = fields.next()?;
            let kind = fields.next()?;
            let index = fields.next()?;
            let key = fields.next()?;
            let data = fields.next()?;
            (target == build_name && kind == "artifact" && index == "0" && key == "id")
                .then(|| data.replace(COMMA_ESCAPE, ","))
        })
        .last()
}
