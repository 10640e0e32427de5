//! Stage runner -- named, skippable, strictly sequential test stages.
//!
//! A test run is a fixed sequence of stages:
//!
//! ```text
//! setup_image → (teardown registered) → deploy → validate → teardown
//! ```
//!
//! Each stage can be skipped through [`StageConfig`], which lets a developer
//! deploy once and then iterate on `validate` in later invocations that
//! reopen the same workspace. Skip decisions come from the config value
//! handed to [`StageRunner::new`]; the runner never reads the environment.
//!
//! After a non-teardown stage fails, every later non-teardown stage is
//! recorded as aborted without running. The `teardown` stage is exempt: it
//! runs after any failure unless it was explicitly skipped.
//!
//! A panicking stage body is caught and recorded as a failure like any
//! other, so the caller always gets control back to run teardown.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{HarnessError, StageError};

pub const STAGE_SETUP_IMAGE: &str = "setup_image";
pub const STAGE_DEPLOY: &str = "deploy";
pub const STAGE_VALIDATE: &str = "validate";
pub const STAGE_TEARDOWN: &str = "teardown";

/// Every stage, in execution order.
pub const STAGE_NAMES: [&str; 4] = [STAGE_SETUP_IMAGE, STAGE_DEPLOY, STAGE_VALIDATE, STAGE_TEARDOWN];

/// Which stages to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageConfig {
    skip: BTreeSet<String>,
}

impl StageConfig {
    pub fn new(skip: impl IntoIterator<Item = String>) -> Self {
        Self {
            skip: skip.into_iter().collect(),
        }
    }

    /// Run every stage.
    pub fn run_all() -> Self {
        Self::default()
    }

    /// Add one more stage to skip.
    pub fn skip(mut self, stage: &str) -> Self {
        self.skip.insert(stage.to_owned());
        self
    }

    pub fn is_skipped(&self, stage: &str) -> bool {
        self.skip.contains(stage)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.skip.iter().map(String::as_str)
    }
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Ran,
    Skipped,
    Failed { reason: String },
    Aborted,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ran => write!(f, "ran"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed { .. } => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of running a stage that was not refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran,
    Skipped,
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub name: String,
    #[serde(flatten)]
    pub status: StageStatus,
    pub duration_ms: u64,
}

/// Sequences stages and records their outcome.
#[derive(Debug)]
pub struct StageRunner {
    config: StageConfig,
    records: Vec<StageRecord>,
    failed: Option<String>,
}

impl StageRunner {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
            failed: None,
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Run `body` as stage `name`.
    ///
    /// `body` is a lazy future: when the stage is skipped or aborted it is
    /// dropped without being polled, so it has no side effects.
    ///
    /// # Errors
    ///
    /// - [`StageError::Failed`] when the body fails or panics
    /// - [`StageError::Aborted`] when an earlier non-teardown stage failed
    /// - [`StageError::AlreadyRun`] when `name` was already run on this runner
    pub async fn run_stage<Fut>(&mut self, name: &str, body: Fut) -> Result<StageOutcome, StageError>
    where
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        if self.records.iter().any(|r| r.name == name) {
            return Err(StageError::AlreadyRun {
                stage: name.to_owned(),
            });
        }

        if self.config.is_skipped(name) {
            info!(stage = name, "skipping stage");
            self.record(name, StageStatus::Skipped, 0);
            return Ok(StageOutcome::Skipped);
        }

        if name != STAGE_TEARDOWN {
            if let Some(failed) = self.failed.clone() {
                warn!(stage = name, failed_stage = %failed, "not running stage after earlier failure");
                self.record(name, StageStatus::Aborted, 0);
                return Err(StageError::Aborted {
                    stage: name.to_owned(),
                    failed,
                });
            }
        }

        info!(stage = name, "running stage");
        let started = Instant::now();
        let result = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HarnessError::Panicked(panic_message(&*payload))),
        };
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                info!(stage = name, duration_ms = elapsed, "stage completed");
                self.record(name, StageStatus::Ran, elapsed);
                Ok(StageOutcome::Ran)
            }
            Err(e) => {
                error!(stage = name, duration_ms = elapsed, error = %e, "stage failed");
                self.record(
                    name,
                    StageStatus::Failed {
                        reason: e.to_string(),
                    },
                    elapsed,
                );
                if name != STAGE_TEARDOWN && self.failed.is_none() {
                    self.failed = Some(name.to_owned());
                }
                Err(StageError::Failed {
                    stage: name.to_owned(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Name of the first failed non-teardown stage, if any.
    pub fn failed_stage(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StageRecord> {
        self.records
    }

    fn record(&mut self, name: &str, status: StageStatus, duration_ms: u64) {
        self.records.push(StageRecord {
            name: name.to_owned(),
            status,
            duration_ms,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
