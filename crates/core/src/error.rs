//! Error types -- one enum per concern, folded into [`HarnessError`].
//!
//! The split mirrors the failure taxonomy of an acceptance run:
//! fatal precondition failures (config, missing workspace artifacts,
//! malformed endpoints), transient conditions that the retry poller
//! absorbs until its budget is spent, and external tool failures that
//! fail the enclosing stage immediately.

/// Top-level harness error.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration loading or validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Workspace creation or persisted artifact access.
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Retry budget exhausted or aborted.
    #[error("{0}")]
    Retry(#[from] RetryError),

    /// External tool (terraform, packer, gcloud) failed.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Cloud provider API failure.
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Cluster protocol client failure.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// A stage failed or was refused by the runner.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// One or more teardown steps failed.
    #[error("{0}")]
    Teardown(#[from] TeardownError),

    /// A stage body panicked; carries the panic message.
    #[error("panicked: {0}")]
    Panicked(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML could not be parsed.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds a value outside its allowed range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A value required at run time was neither configured nor found in the environment.
    #[error("missing required value '{field}': {hint}")]
    Missing { field: String, hint: String },
}

/// Workspace store errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The subtree to copy does not exist in the source tree.
    #[error("source path does not exist: {path}")]
    SourceNotFound { path: String },

    /// `open` was given a path that is not a workspace directory.
    #[error("workspace not found: {path}")]
    NotFound { path: String },

    /// A later stage needs an artifact an earlier stage never saved.
    #[error("missing persisted artifact '{key}' in workspace {workspace}")]
    MissingArtifact { key: String, workspace: String },

    /// Key contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid artifact key '{key}'")]
    InvalidKey { key: String },

    /// Stored value could not be (de)serialized.
    #[error("artifact '{key}' is corrupt: {reason}")]
    Serde { key: String, reason: String },

    /// Filesystem failure while copying or persisting.
    #[error("workspace io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Retry poller terminal errors.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Every attempt failed; carries the error of the last attempt.
    #[error("'{description}' unsuccessful after {attempts} attempts: {last_error}")]
    Exhausted {
        description: String,
        attempts: u32,
        last_error: String,
    },

    /// The operation reported a non-retryable failure.
    #[error("'{description}' aborted on attempt {attempt}: {reason}")]
    Aborted {
        description: String,
        attempt: u32,
        reason: String,
    },
}

impl RetryError {
    /// Description string passed to the failing poll.
    pub fn description(&self) -> &str {
        match self {
            Self::Exhausted { description, .. } | Self::Aborted { description, .. } => description,
        }
    }
}

/// External process failures.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The binary could not be started.
    #[error("failed to spawn {tool}: {reason}")]
    Spawn { tool: String, reason: String },

    /// The process exited unsuccessfully.
    #[error("{tool} {action} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        action: String,
        status: String,
        stderr: String,
    },

    /// The process succeeded but its output was not understood.
    #[error("unexpected {tool} output: {reason}")]
    Output { tool: String, reason: String },
}

/// Cloud provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloudError {
    /// The API call failed.
    #[error("cloud api error: {0}")]
    Api(String),

    /// The instance group has no reachable instance yet.
    #[error("no reachable instances in group '{group}'")]
    NoInstances { group: String },
}

/// Cluster protocol client errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterError {
    /// Client could not be constructed for the endpoint.
    #[error("failed to create cluster client for {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Transport or HTTP failure during a query.
    #[error("cluster query failed: {0}")]
    Transport(String),

    /// Membership count does not match yet.
    #[error("expected the cluster to have {expected} members, but found {found}")]
    MemberCount { expected: usize, found: usize },

    /// Leader query returned an empty identifier.
    #[error("cluster returned an empty leader response, so a leader must not have been elected yet")]
    NoLeader,
}

/// Stage runner errors.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage body returned an error.
    #[error("stage '{stage}' failed: {source}")]
    Failed {
        stage: String,
        #[source]
        source: Box<HarnessError>,
    },

    /// An earlier non-teardown stage failed, so this one was not run.
    #[error("stage '{stage}' not run: stage '{failed}' failed earlier")]
    Aborted { stage: String, failed: String },

    /// The same stage name was run twice on one runner.
    #[error("stage '{stage}' already ran in this invocation")]
    AlreadyRun { stage: String },
}

impl StageError {
    /// Name of the stage this error is about.
    pub fn stage(&self) -> &str {
        match self {
            Self::Failed { stage, .. } | Self::Aborted { stage, .. } | Self::AlreadyRun { stage } => {
                stage
            }
        }
    }
}

/// Teardown failures, all of them.
#[derive(Debug, thiserror::Error)]
#[error("teardown failed: {}", .failures.join("; "))]
pub struct TeardownError {
    /// One entry per failed step, in execution order.
    pub failures: Vec<String>,
}
