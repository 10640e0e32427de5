//! Shared building blocks of the clusterproof acceptance harness.
//!
//! - [`retry`]: bounded-retry poller for eventually consistent state
//! - [`workspace`]: per-run config copy and persisted artifact store
//! - [`stage`]: named, skippable, sequential stages
//! - [`provider`]: traits for the external tools the harness drives
//! - [`config`], [`error`], [`types`]: configuration, error taxonomy, domain types

pub mod config;
pub mod error;
pub mod provider;
pub mod retry;
pub mod stage;
pub mod types;
pub mod workspace;

// Errors
pub use error::{
    CloudError, ClusterError, ConfigError, HarnessError, RetryError, StageError, TeardownError,
    ToolError, WorkspaceError,
};

// Config
pub use config::HarnessConfig;

// Building blocks
pub use provider::{ClusterClient, ClusterConnector, CloudProvider, IacEngine, ImageBuilder};
pub use retry::{CONVERGENCE_POLICY, MEMBERSHIP_POLICY, PollError, RetryPolicy, do_with_retry};
pub use stage::{StageConfig, StageOutcome, StageRecord, StageRunner, StageStatus};
pub use types::{ClusterEndpoint, ClusterSnapshot, DeployArtifacts, IacOptions, ImageBuildRequest};
pub use workspace::Workspace;
