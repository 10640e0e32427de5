//! Lifecycle manager -- guaranteed teardown of deployed resources.
//!
//! The guard is acquired once the image exists and before anything is
//! deployed. Releasing it runs the `teardown` stage, which destroys the
//! infrastructure first and deletes the image second. The image deletion is
//! attempted even when the destroy step fails, and every failure is reported.
//!
//! Async cleanup cannot run from `Drop`, so release is an explicit call on
//! every exit path. Stage panics are caught by the runner, so only a
//! cancelled task drops a guard unreleased. That only logs; the workspace
//! keeps what is needed to tear down by hand.
//!
//! An artifact that was never persisted means the step that creates the
//! resource never ran, so teardown has nothing to remove for it.

use tracing::{error, info, warn};

use clusterproof_core::error::{HarnessError, StageError, TeardownError, WorkspaceError};
use clusterproof_core::provider::{CloudProvider, IacEngine};
use clusterproof_core::stage::{STAGE_TEARDOWN, StageOutcome, StageRunner};

use crate::context::TestContext;

/// Pending teardown of one scenario run.
#[must_use = "a teardown guard must be released"]
#[derive(Debug)]
pub struct TeardownGuard {
    scenario: String,
    released: bool,
}

impl TeardownGuard {
    /// Register the teardown for `ctx`'s scenario.
    pub fn register(ctx: &TestContext) -> Self {
        info!(scenario = %ctx.scenario().name, "teardown registered");
        Self {
            scenario: ctx.scenario().name.clone(),
            released: false,
        }
    }

    /// Consume the guard and run the `teardown` stage on `runner`.
    ///
    /// The stage still honours the skip configuration: a skipped teardown
    /// releases the guard without touching any resource.
    pub async fn release<I, C>(
        mut self,
        runner: &mut StageRunner,
        ctx: &TestContext,
        iac: &I,
        cloud: &C,
    ) -> Result<StageOutcome, StageError>
    where
        I: IacEngine,
        C: CloudProvider,
    {
        self.released = true;
        runner
            .run_stage(STAGE_TEARDOWN, teardown(ctx, iac, cloud))
            .await
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if !self.released {
            error!(
                scenario = %self.scenario,
                "teardown guard dropped without release; deployed resources may be left behind"
            );
        }
    }
}

/// Destroy the infrastructure, then delete the image.
///
/// # Errors
///
/// [`HarnessError::Teardown`] listing every step that failed, in order.
pub async fn teardown<I, C>(ctx: &TestContext, iac: &I, cloud: &C) -> Result<(), HarnessError>
where
    I: IacEngine,
    C: CloudProvider,
{
    let workspace = ctx.workspace();
    let mut failures = Vec::new();

    match workspace.load_iac_options() {
        Ok(options) => match iac.destroy(&options).await {
            Ok(()) => info!(dir = %options.dir.display(), "infrastructure destroyed"),
            Err(e) => {
                warn!(error = %e, "destroy failed");
                failures.push(format!("destroy: {e}"));
            }
        },
        Err(WorkspaceError::MissingArtifact { key, .. }) => {
            info!(key = %key, "nothing deployed, skipping destroy");
        }
        Err(e) => {
            warn!(error = %e, "cannot destroy");
            failures.push(format!("destroy: {e}"));
        }
    }

    let image = ctx
        .config()
        .gcp
        .require_project()
        .map_err(HarnessError::from)
        .and_then(|project| {
            workspace
                .load_artifact_id()
                .map(|image| (project.to_owned(), image))
                .map_err(HarnessError::from)
        });
    match image {
        Ok((project, image)) => match cloud.delete_image(&project, &image).await {
            Ok(()) => info!(image = %image, "image deleted"),
            Err(e) => {
                warn!(image = %image, error = %e, "image deletion failed");
                failures.push(format!("delete image: {e}"));
            }
        },
        Err(HarnessError::Workspace(WorkspaceError::MissingArtifact { key, .. })) => {
            info!(key = %key, "no image recorded, skipping image deletion");
        }
        Err(e) => {
            warn!(error = %e, "cannot delete image");
            failures.push(format!("delete image: {e}"));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TeardownError { failures }.into())
    }
}
