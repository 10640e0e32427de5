//! Per-run state: the workspace, the resolved config and the run identity.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use clusterproof_core::config::{HarnessConfig, ScenarioConfig};
use clusterproof_core::error::{HarnessError, WorkspaceError};
use clusterproof_core::types::DeployArtifacts;
use clusterproof_core::workspace::{KEY_ZONE, Workspace};

/// Length of the id appended to cloud resource names.
const UNIQUE_ID_LEN: usize = 6;

/// One scenario run. Each concurrently running scenario owns its own context,
/// so nothing here is shared or locked.
#[derive(Debug)]
pub struct TestContext {
    run_id: Uuid,
    config: Arc<HarnessConfig>,
    scenario: ScenarioConfig,
    workspace: Workspace,
    resumed: bool,
}

impl TestContext {
    /// Start a fresh run in a new workspace copied from the scenario source.
    pub fn create(config: Arc<HarnessConfig>, scenario: ScenarioConfig) -> Result<Self, HarnessError> {
        let workspace = Workspace::create(
            &scenario.source_root,
            &scenario.example_dir,
            &config.general.temp_root(),
        )?;
        Ok(Self::with_workspace(config, scenario, workspace, false))
    }

    /// Continue a run whose workspace an earlier invocation left behind.
    pub fn resume(
        config: Arc<HarnessConfig>,
        scenario: ScenarioConfig,
        dir: impl AsRef<Path>,
    ) -> Result<Self, HarnessError> {
        let workspace = Workspace::open(dir.as_ref())?;
        Ok(Self::with_workspace(config, scenario, workspace, true))
    }

    fn with_workspace(
        config: Arc<HarnessConfig>,
        scenario: ScenarioConfig,
        workspace: Workspace,
        resumed: bool,
    ) -> Self {
        let run_id = Uuid::new_v4();
        info!(
            scenario = %scenario.name,
            run_id = %run_id,
            workspace = %workspace.dir().display(),
            resumed,
            "test context ready"
        );
        Self {
            run_id,
            config,
            scenario,
            workspace,
            resumed,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.scenario
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Whether the workspace came from an earlier invocation.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Short lowercase id for cloud resource names; some GCP resources
    /// reject upper case. A new value on every call.
    pub fn unique_id() -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(UNIQUE_ID_LEN);
        id
    }

    /// `<prefix>-<role>-cluster-<id>`
    pub fn cluster_name(&self, role: &str, unique_id: &str) -> String {
        format!("{}-{role}-cluster-{unique_id}", self.config.cluster.name_prefix)
    }

    /// Everything `deploy` persisted, for `validate` and `teardown`.
    pub fn deploy_artifacts(&self) -> Result<DeployArtifacts, WorkspaceError> {
        Ok(DeployArtifacts {
            image_id: self.workspace.load_artifact_id()?,
            zone: self.workspace.load_string(KEY_ZONE)?,
            iac: self.workspace.load_iac_options()?,
        })
    }

    /// Remove the workspace unless it should be kept for inspection or
    /// another invocation. Returns the path when kept.
    pub fn finish(self, remove: bool) -> Option<std::path::PathBuf> {
        if !remove || self.config.general.keep_workspace {
            info!(workspace = %self.workspace.dir().display(), "keeping workspace");
            return Some(self.workspace.dir().to_path_buf());
        }
        let dir = self.workspace.dir().to_path_buf();
        if let Err(e) = self.workspace.cleanup() {
            warn!(error = %e, "failed to remove workspace");
            return Some(dir);
        }
        None
    }
}
