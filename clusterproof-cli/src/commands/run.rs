//! `clusterproof run` command handler
//!
//! Every selected scenario runs as its own task in its own workspace; the
//! report is rendered once all of them have finished.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};

use clusterproof_cluster::ConsulConnector;
use clusterproof_core::config::{HarnessConfig, ScenarioConfig};
use clusterproof_core::provider::{CloudProvider, ClusterConnector, IacEngine, ImageBuilder};
use clusterproof_core::stage::{STAGE_NAMES, StageRecord, StageStatus};
use clusterproof_harness::{ClusterScenario, ScenarioOutcome, TestContext, Toolset, ValidatedGroup};
use clusterproof_provision::Toolchain;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    config: HarnessConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let toolchain = Toolchain::from_config(&config.tools);
    let scenario = ClusterScenario::new(Toolset {
        iac: toolchain.terraform,
        images: toolchain.packer,
        cloud: toolchain.gcloud,
        cluster: ConsulConnector::new(),
    });

    let report = run_scenarios(args, config, Arc::new(scenario)).await?;
    writer.render(&report)?;
    report.into_result()
}

/// Apply the command-line overrides, then run every selected scenario
/// concurrently.
///
/// # Errors
///
/// Returns `CliError::Command` for an unknown scenario or stage name, or when
/// `--workspace` is combined with anything but exactly one scenario.
pub async fn run_scenarios<I, B, C, K>(
    args: RunArgs,
    mut config: HarnessConfig,
    scenario: Arc<ClusterScenario<I, B, C, K>>,
) -> Result<RunReport, CliError>
where
    I: IacEngine + 'static,
    B: ImageBuilder + 'static,
    C: CloudProvider + 'static,
    K: ClusterConnector + 'static,
{
    for stage in &args.skip {
        if !STAGE_NAMES.contains(&stage.as_str()) {
            return Err(CliError::Command(format!(
                "unknown stage: {} (expected: {})",
                stage,
                STAGE_NAMES.join(", ")
            )));
        }
    }
    config.stages.skip.extend(args.skip);
    config.general.keep_workspace |= args.keep_workspace;

    let selected = select_scenarios(&config, &args.scenarios)?;
    if args.workspace.is_some() && selected.len() != 1 {
        return Err(CliError::Command(format!(
            "--workspace reopens a single run, but {} scenarios were selected",
            selected.len()
        )));
    }

    let config = Arc::new(config);
    let mut tasks = JoinSet::new();
    for scenario_cfg in selected {
        let config = Arc::clone(&config);
        let scenario = Arc::clone(&scenario);
        let resume = args.workspace.clone();
        tasks.spawn(run_one(scenario, config, scenario_cfg, resume));
    }

    let mut scenarios = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => scenarios.push(report),
            Err(e) => {
                error!(error = %e, "scenario task did not complete");
                return Err(CliError::Command(format!("scenario task did not complete: {e}")));
            }
        }
    }
    scenarios.sort_by(|a, b| a.scenario.cmp(&b.scenario));

    Ok(RunReport { scenarios })
}

fn select_scenarios(
    config: &HarnessConfig,
    names: &[String],
) -> Result<Vec<ScenarioConfig>, CliError> {
    if config.scenarios.is_empty() {
        return Err(CliError::Command(
            "no scenarios configured (add a [[scenarios]] table)".to_owned(),
        ));
    }
    if names.is_empty() {
        return Ok(config.scenarios.clone());
    }
    names
        .iter()
        .map(|name| {
            config.scenario(name).cloned().ok_or_else(|| {
                let known: Vec<&str> = config.scenarios.iter().map(|s| s.name.as_str()).collect();
                CliError::Command(format!(
                    "unknown scenario: {} (configured: {})",
                    name,
                    known.join(", ")
                ))
            })
        })
        .collect()
}

async fn run_one<I, B, C, K>(
    scenario: Arc<ClusterScenario<I, B, C, K>>,
    config: Arc<HarnessConfig>,
    scenario_cfg: ScenarioConfig,
    resume: Option<PathBuf>,
) -> ScenarioReport
where
    I: IacEngine,
    B: ImageBuilder,
    C: CloudProvider,
    K: ClusterConnector,
{
    let name = scenario_cfg.name.clone();
    let ctx = match resume {
        Some(dir) => TestContext::resume(config, scenario_cfg, dir),
        None => TestContext::create(config, scenario_cfg),
    };
    let ctx = match ctx {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(scenario = %name, error = %e, "failed to prepare workspace");
            return ScenarioReport::not_started(name, e.to_string());
        }
    };

    let outcome = scenario.run(&ctx).await;
    let dir = ctx.workspace().dir().display().to_string();
    let remove = outcome.is_success() && outcome.ran_every_stage();
    let kept = ctx.finish(remove).is_some();
    if kept {
        info!(scenario = %name, workspace = %dir, "workspace kept");
    }
    ScenarioReport::from_outcome(outcome, dir, kept)
}

/// Result of `clusterproof run`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    /// Map the report onto the command result.
    ///
    /// Teardown failures take precedence because they leave cloud resources
    /// behind.
    pub fn into_result(self) -> Result<(), CliError> {
        let leaked: Vec<&str> = self
            .scenarios
            .iter()
            .filter(|s| s.teardown_error.is_some())
            .map(|s| s.scenario.as_str())
            .collect();
        if !leaked.is_empty() {
            return Err(CliError::Teardown(format!(
                "teardown failed for: {}",
                leaked.join(", ")
            )));
        }

        let failed: Vec<&str> = self
            .scenarios
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.scenario.as_str())
            .collect();
        if !failed.is_empty() {
            return Err(CliError::Stage(format!(
                "scenarios failed: {}",
                failed.join(", ")
            )));
        }

        Ok(())
    }
}

/// One scenario in the run report.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub success: bool,
    pub stages: Vec<StageRecord>,
    pub validated: Vec<ValidatedGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    /// Workspace the run used; absent when it could not be prepared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// The workspace is still on disk.
    pub workspace_kept: bool,
}

impl ScenarioReport {
    fn from_outcome(outcome: ScenarioOutcome, workspace: String, kept: bool) -> Self {
        Self {
            success: outcome.is_success(),
            scenario: outcome.scenario,
            stages: outcome.stages,
            validated: outcome.validated,
            error: outcome.error.map(|e| e.to_string()),
            teardown_error: outcome.teardown_error.map(|e| e.to_string()),
            workspace: Some(workspace),
            workspace_kept: kept,
        }
    }

    fn not_started(scenario: String, error: String) -> Self {
        Self {
            scenario,
            success: false,
            stages: Vec::new(),
            validated: Vec::new(),
            error: Some(error),
            teardown_error: None,
            workspace: None,
            workspace_kept: false,
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for (i, s) in self.scenarios.iter().enumerate() {
            if i > 0 {
                writeln!(w)?;
            }
            let verdict = if s.success {
                "PASSED".green().bold()
            } else {
                "FAILED".red().bold()
            };
            writeln!(w, "Scenario {}: {}", s.scenario.bold(), verdict)?;

            for record in &s.stages {
                let status = match &record.status {
                    StageStatus::Ran => record.status.to_string().green(),
                    StageStatus::Skipped => record.status.to_string().yellow(),
                    StageStatus::Failed { .. } | StageStatus::Aborted => {
                        record.status.to_string().red()
                    }
                };
                writeln!(
                    w,
                    "  {:<12} {:<8} {:>8.1}s",
                    record.name,
                    status,
                    record.duration_ms as f64 / 1000.0
                )?;
            }

            for group in &s.validated {
                writeln!(
                    w,
                    "  {} {} via {} (leader {})",
                    "converged".green(),
                    group.group,
                    group.endpoint,
                    group.leader
                )?;
            }

            if let Some(err) = &s.error {
                writeln!(w, "  Error: {}", err.red())?;
            }
            if let Some(err) = &s.teardown_error {
                writeln!(w, "  Teardown: {}", err.red().bold())?;
            }
            if let Some(dir) = &s.workspace {
                if s.workspace_kept {
                    writeln!(w, "  Workspace kept: {}", dir)?;
                } else {
                    writeln!(w, "  Workspace removed: {}", dir)?;
                }
            }
        }

        Ok(())
    }
}
