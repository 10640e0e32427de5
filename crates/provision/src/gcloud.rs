//! Google Cloud adapter on top of the `gcloud` CLI.
//!
//! Instance group addresses take two steps: list the managed group's
//! instances, then read the external NAT address of each running one.
//! Instances still booting have no address yet and are left out, so an
//! empty result is normal right after deploy.

use serde::Deserialize;
use tracing::debug;

use clusterproof_core::error::{CloudError, ToolError};
use clusterproof_core::provider::CloudProvider;

use crate::process::ToolCommand;

const TOOL: &str = "gcloud";

/// Drives the `gcloud` binary.
#[derive(Debug, Clone)]
pub struct Gcloud {
    binary: String,
}

impl Default for Gcloud {
    fn default() -> Self {
        Self::new(TOOL)
    }
}

impl Gcloud {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn compute(&self, project: &str) -> ToolCommand {
        ToolCommand::new(TOOL, &self.binary)
            .arg("compute")
            .arg(format!("--project={project}"))
            .arg("--quiet")
    }
}

fn api_error(err: ToolError) -> CloudError {
    CloudError::Api(err.to_string())
}

impl CloudProvider for Gcloud {
    async fn zones(&self, project: &str, region: &str) -> Result<Vec<String>, CloudError> {
        let out = self
            .compute(project)
            .args(["zones", "list"])
            .arg(format!("--filter=region:{region}"))
            .arg("--format=value(name)")
            .run("zones list")
            .await
            .map_err(api_error)?;
        Ok(parse_lines(&out.stdout))
    }

    async fn instance_group_addresses(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<String>, CloudError> {
        let out = self
            .compute(project)
            .args(["instance-groups", "managed", "list-instances", group])
            .arg(format!("--zone={zone}"))
            .arg("--format=json")
            .run("list-instances")
            .await
            .map_err(api_error)?;
        let instances = parse_running_instances(&out.stdout)?;
        debug!(group, running = instances.len(), "listed instance group");

        let mut addresses = Vec::with_capacity(instances.len());
        for instance in instances {
            let out = self
                .compute(project)
                .args(["instances", "describe", instance.as_str()])
                .arg(format!("--zone={zone}"))
                .arg("--format=value(networkInterfaces[0].accessConfigs[0].natIP)")
                .run("instances describe")
                .await
                .map_err(api_error)?;
            addresses.extend(parse_lines(&out.stdout).into_iter().take(1));
        }
        Ok(addresses)
    }

    async fn delete_image(&self, project: &str, image: &str) -> Result<(), CloudError> {
        self.compute(project)
            .args(["images", "delete", image])
            .run("images delete")
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

/// Non-empty trimmed lines.
fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagedInstance {
    /// Full resource URL of the instance.
    instance: String,
    #[serde(default)]
    instance_status: Option<String>,
}

/// Names of the `RUNNING` instances in `list-instances` JSON output.
fn parse_running_instances(stdout: &str) -> Result<Vec<String>, CloudError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let instances: Vec<ManagedInstance> = serde_json::from_str(stdout)
        .map_err(|e| CloudError::Api(format!("invalid list-instances output: {e}")))?;
    Ok(instances
        .into_iter()
        .filter(|i| i.instance_status.as_deref() == Some("RUNNING"))
        .filter_map(|i| i.instance.rsplit('/').next().map(str::to_owned))
        .filter(|name| !name.is_empty())
        .collect())
}
