//! Staged cluster test: build an image, deploy it, validate the cluster,
//! tear everything down.
//!
//! Stages only communicate through the workspace. Each one loads what it
//! needs from the persisted keys instead of from memory, which is what makes
//! `setup_image` and `deploy` skippable when a later invocation reopens the
//! workspace.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{Instrument, info, info_span};

use clusterproof_cluster::{resolve_endpoint, validate_cluster};
use clusterproof_core::error::{CloudError, HarnessError, StageError};
use clusterproof_core::provider::{CloudProvider, ClusterConnector, IacEngine, ImageBuilder};
use clusterproof_core::stage::{
    STAGE_DEPLOY, STAGE_SETUP_IMAGE, STAGE_TEARDOWN, STAGE_VALIDATE, StageRecord, StageRunner,
    StageStatus,
};
use clusterproof_core::types::{ClusterEndpoint, IacOptions, ImageBuildRequest, outputs, vars};
use clusterproof_core::workspace::KEY_ZONE;

use crate::context::TestContext;
use crate::lifecycle::TeardownGuard;

/// Instance group outputs checked by `validate`, in order.
pub const VALIDATED_OUTPUTS: [&str; 2] = [outputs::SERVER_INSTANCE_GROUP, outputs::CLIENT_INSTANCE_GROUP];

/// The external collaborators a scenario drives.
#[derive(Debug, Clone)]
pub struct Toolset<I, B, C, K> {
    pub iac: I,
    pub images: B,
    pub cloud: C,
    pub cluster: K,
}

/// One validated instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedGroup {
    pub group: String,
    pub endpoint: String,
    pub leader: String,
}

/// Result of one scenario run.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario: String,
    pub stages: Vec<StageRecord>,
    pub validated: Vec<ValidatedGroup>,
    /// First stage failure, if any.
    pub error: Option<StageError>,
    /// Teardown failure; reported separately so it never hides `error`.
    pub teardown_error: Option<StageError>,
}

impl ScenarioOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.teardown_error.is_none()
    }

    /// Every stage ran to completion, none skipped.
    pub fn ran_every_stage(&self) -> bool {
        self.stages.iter().all(|r| r.status == StageStatus::Ran)
    }

    /// Status of the named stage, if it was reached.
    pub fn status(&self, stage: &str) -> Option<&StageStatus> {
        self.stages.iter().find(|r| r.name == stage).map(|r| &r.status)
    }
}

/// Image → deploy → validate → teardown for one cluster example.
#[derive(Debug)]
pub struct ClusterScenario<I, B, C, K> {
    tools: Toolset<I, B, C, K>,
}

impl<I, B, C, K> ClusterScenario<I, B, C, K>
where
    I: IacEngine,
    B: ImageBuilder,
    C: CloudProvider,
    K: ClusterConnector,
{
    pub fn new(tools: Toolset<I, B, C, K>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &Toolset<I, B, C, K> {
        &self.tools
    }

    /// Run every stage against `ctx`.
    ///
    /// Never returns early once the teardown guard is held: the guard is
    /// released after `validate` whatever happened before.
    pub async fn run(&self, ctx: &TestContext) -> ScenarioOutcome {
        let span = info_span!("scenario", name = %ctx.scenario().name, run_id = %ctx.run_id());
        self.run_stages(ctx).instrument(span).await
    }

    async fn run_stages(&self, ctx: &TestContext) -> ScenarioOutcome {
        let mut runner = StageRunner::new(ctx.config().stage_config());
        let mut error = None;
        let mut validated = Vec::new();

        let image_ready = match runner
            .run_stage(STAGE_SETUP_IMAGE, self.setup_image(ctx))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error = Some(e);
                false
            }
        };

        let guard = image_ready.then(|| TeardownGuard::register(ctx));

        if let Err(e) = runner.run_stage(STAGE_DEPLOY, self.deploy(ctx)).await {
            error.get_or_insert(e);
        }
        if let Err(e) = runner
            .run_stage(STAGE_VALIDATE, self.validate(ctx, &mut validated))
            .await
        {
            error.get_or_insert(e);
        }

        let teardown_error = match guard {
            Some(guard) => guard
                .release(&mut runner, ctx, &self.tools.iac, &self.tools.cloud)
                .await
                .err(),
            None => {
                info!(stage = STAGE_TEARDOWN, "no image was built, nothing to tear down");
                None
            }
        };

        let outcome = ScenarioOutcome {
            scenario: ctx.scenario().name.clone(),
            stages: runner.into_records(),
            validated,
            error,
            teardown_error,
        };
        info!(success = outcome.is_success(), "scenario finished");
        outcome
    }

    /// Pick a zone, build the image, persist both.
    async fn setup_image(&self, ctx: &TestContext) -> Result<(), HarnessError> {
        let config = ctx.config();
        let project = config.gcp.require_project()?;

        let zones = if config.gcp.zones.is_empty() {
            let region = config.gcp.require_region()?;
            self.tools.cloud.zones(project, region).await?
        } else {
            config.gcp.zones.clone()
        };
        let zone = pick_zone(&zones).ok_or_else(|| {
            CloudError::Api(format!("no zones available in region '{}'", config.gcp.region))
        })?;
        ctx.workspace().save_string(KEY_ZONE, &zone)?;
        info!(zone = %zone, "selected zone");

        let scenario = ctx.scenario();
        let request = ImageBuildRequest {
            template_path: ctx.workspace().root().join(&scenario.packer_template),
            build_name: scenario.build_name.clone(),
            vars: BTreeMap::from([
                ("project_id".to_owned(), project.to_owned()),
                ("zone".to_owned(), zone),
            ]),
        };
        let image = self.tools.images.build(&request).await?;
        ctx.workspace().save_artifact_id(&image)?;
        Ok(())
    }

    /// Generate the IaC variables, persist them, apply.
    async fn deploy(&self, ctx: &TestContext) -> Result<(), HarnessError> {
        let config = ctx.config();
        let workspace = ctx.workspace();
        let project = config.gcp.require_project()?;
        let region = config.gcp.require_region()?;
        let zone = workspace.load_string(KEY_ZONE)?;
        let image = workspace.load_artifact_id()?;

        let unique_id = TestContext::unique_id();
        let server_cluster = ctx.cluster_name("server", &unique_id);
        let client_cluster = ctx.cluster_name("client", &unique_id);
        info!(server = %server_cluster, client = %client_cluster, "deploying cluster");

        let cluster = &config.cluster;
        let options = IacOptions::new(workspace.dir())
            .var(vars::PROJECT, project)
            .var(vars::REGION, region)
            .var(vars::ZONE, zone)
            .var(vars::SERVER_CLUSTER_NAME, server_cluster.as_str())
            .var(vars::CLIENT_CLUSTER_NAME, client_cluster.as_str())
            .var(vars::SERVER_CLUSTER_TAG_NAME, server_cluster.as_str())
            .var(vars::CLIENT_CLUSTER_TAG_NAME, client_cluster.as_str())
            .var(vars::SERVER_SOURCE_IMAGE, image.as_str())
            .var(vars::CLIENT_SOURCE_IMAGE, image.as_str())
            .var(vars::SERVER_CLUSTER_SIZE, cluster.server_size)
            .var(vars::CLIENT_CLUSTER_SIZE, cluster.client_size)
            .var(
                vars::ALLOWED_INBOUND_CIDR_HTTP_API,
                cluster.allowed_inbound_cidr_blocks_http_api.clone(),
            )
            .var(
                vars::ALLOWED_INBOUND_CIDR_DNS,
                cluster.allowed_inbound_cidr_blocks_dns.clone(),
            );

        // Persist before apply so teardown can destroy a half-applied deploy.
        workspace.save_iac_options(&options)?;
        self.tools.iac.init_and_apply(&options).await?;
        Ok(())
    }

    /// Check the server group, then the client group.
    async fn validate(
        &self,
        ctx: &TestContext,
        validated: &mut Vec<ValidatedGroup>,
    ) -> Result<(), HarnessError> {
        let config = ctx.config();
        let project = config.gcp.require_project()?;
        let artifacts = ctx.deploy_artifacts()?;
        let membership = config.retry.membership_policy()?;
        let convergence = config.retry.convergence_policy()?;
        // Sizes come from the deploy that created the cluster, which may
        // have been an earlier invocation with different settings.
        let expected = artifacts.iac.deployed_members()?;

        for output in VALIDATED_OUTPUTS {
            let group = self.tools.iac.output(&artifacts.iac, output).await?;
            let endpoint: ClusterEndpoint = resolve_endpoint(
                &self.tools.cloud,
                project,
                &artifacts.zone,
                &group,
                config.cluster.query_port,
                membership,
            )
            .await?;
            let leader =
                validate_cluster(&self.tools.cluster, &endpoint, expected, convergence).await?;

            validated.push(ValidatedGroup {
                group,
                endpoint: endpoint.to_string(),
                leader,
            });
        }
        Ok(())
    }
}

fn pick_zone(zones: &[String]) -> Option<String> {
    zones.choose(&mut rand::thread_rng()).cloned()
}
