//! Recording mock collaborators shared by the harness integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use clusterproof_core::config::{HarnessConfig, ScenarioConfig};
use clusterproof_core::error::{CloudError, ClusterError, ToolError};
use clusterproof_core::provider::{
    CloudProvider, ClusterClient, ClusterConnector, IacEngine, ImageBuilder,
};
use clusterproof_core::types::{ClusterEndpoint, IacOptions, ImageBuildRequest};
use clusterproof_harness::Toolset;

/// Ordered record of every collaborator call.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }
}

fn tool_failure(tool: &str, action: &str) -> ToolError {
    ToolError::Failed {
        tool: tool.to_owned(),
        action: action.to_owned(),
        status: "exit status: 1".to_owned(),
        stderr: format!("{action} refused"),
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockIac {
    pub log: CallLog,
    pub fail_apply: bool,
    pub panic_apply: bool,
    pub fail_destroy: bool,
}

impl IacEngine for MockIac {
    async fn init_and_apply(&self, options: &IacOptions) -> Result<(), ToolError> {
        self.log.push(format!("apply {}", options.dir.display()));
        if self.panic_apply {
            panic!("terraform state lock poisoned");
        }
        if self.fail_apply {
            return Err(tool_failure("terraform", "apply"));
        }
        Ok(())
    }

    async fn output(&self, _options: &IacOptions, name: &str) -> Result<String, ToolError> {
        self.log.push(format!("output {name}"));
        Ok(format!("{name}-value"))
    }

    async fn destroy(&self, options: &IacOptions) -> Result<(), ToolError> {
        self.log.push(format!("destroy {}", options.dir.display()));
        if self.fail_destroy {
            return Err(tool_failure("terraform", "destroy"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockImages {
    pub log: CallLog,
    pub fail: bool,
}

impl ImageBuilder for MockImages {
    async fn build(&self, request: &ImageBuildRequest) -> Result<String, ToolError> {
        self.log.push(format!("build {}", request.build_name));
        if self.fail {
            return Err(tool_failure("packer", "build"));
        }
        Ok(format!("image-{}", request.build_name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockCloud {
    pub log: CallLog,
    pub fail_delete: bool,
}

impl CloudProvider for MockCloud {
    async fn zones(&self, _project: &str, region: &str) -> Result<Vec<String>, CloudError> {
        self.log.push(format!("zones {region}"));
        Ok(vec![format!("{region}-b")])
    }

    async fn instance_group_addresses(
        &self,
        _project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<String>, CloudError> {
        self.log.push(format!("addresses {zone} {group}"));
        Ok(vec!["10.0.0.5".to_owned()])
    }

    async fn delete_image(&self, _project: &str, image: &str) -> Result<(), CloudError> {
        self.log.push(format!("delete_image {image}"));
        if self.fail_delete {
            return Err(CloudError::Api("image in use".to_owned()));
        }
        Ok(())
    }
}

/// Connects to a cluster that always reports `members` members and `leader`.
#[derive(Debug, Clone)]
pub struct MockConnector {
    pub log: CallLog,
    pub members: usize,
    pub leader: String,
}

pub struct MockClient {
    members: usize,
    leader: String,
}

impl ClusterConnector for MockConnector {
    type Client = MockClient;

    fn connect(&self, endpoint: &ClusterEndpoint) -> Result<MockClient, ClusterError> {
        self.log.push(format!("connect {endpoint}"));
        Ok(MockClient {
            members: self.members,
            leader: self.leader.clone(),
        })
    }
}

impl ClusterClient for MockClient {
    async fn members(&self) -> Result<Vec<String>, ClusterError> {
        Ok((0..self.members).map(|i| format!("node-{i}")).collect())
    }

    async fn leader(&self) -> Result<String, ClusterError> {
        Ok(self.leader.clone())
    }
}

pub type MockTools = Toolset<MockIac, MockImages, MockCloud, MockConnector>;

/// Healthy collaborators sharing one call log.
pub fn tools(log: &CallLog) -> MockTools {
    Toolset {
        iac: MockIac {
            log: log.clone(),
            ..MockIac::default()
        },
        images: MockImages {
            log: log.clone(),
            ..MockImages::default()
        },
        cloud: MockCloud {
            log: log.clone(),
            ..MockCloud::default()
        },
        cluster: MockConnector {
            log: log.clone(),
            members: 7,
            leader: "10.0.0.5:8300".to_owned(),
        },
    }
}

/// Config with fast retry policies and workspaces under `temp`.
pub fn config(temp: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.general.temp_dir = temp.display().to_string();
    config.gcp.project = "proj".to_owned();
    config.gcp.region = "us-east1".to_owned();
    config.retry.membership_attempts = 2;
    config.retry.membership_interval_secs = 0;
    config.retry.convergence_attempts = 2;
    config.retry.convergence_interval_secs = 0;
    config
}

/// Minimal source tree with a Terraform example and a Packer template.
pub fn source_tree() -> tempfile::TempDir {
    let src = tempfile::tempdir().unwrap();
    let example = src.path().join("examples/root-example");
    std::fs::create_dir_all(&example).unwrap();
    std::fs::write(example.join("main.tf"), "# cluster\n").unwrap();
    let image = src.path().join("examples/consul-image");
    std::fs::create_dir_all(&image).unwrap();
    std::fs::write(image.join("consul.json"), "{}").unwrap();
    src
}

pub fn scenario(source: &Path, name: &str) -> ScenarioConfig {
    ScenarioConfig {
        name: name.to_owned(),
        source_root: source.to_path_buf(),
        example_dir: "examples/root-example".into(),
        packer_template: "examples/consul-image/consul.json".into(),
        build_name: "ubuntu-18-image".to_owned(),
    }
}
