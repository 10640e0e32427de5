//! CLI-specific error types and exit code mapping

use clusterproof_core::error::HarnessError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// At least one scenario stage failed.
    #[error("{0}")]
    Stage(String),

    /// Teardown left resources behind.
    #[error("{0}")]
    Teardown(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error.
    #[error("{0}")]
    Harness(#[from] HarnessError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | Command or stage failure         |
    /// | 2    | Configuration error              |
    /// | 3    | Teardown failure                 |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Teardown(_) => 3,
            Self::Io(_) => 10,
            Self::Harness(e) => match e {
                HarnessError::Config(_) => 2,
                HarnessError::Teardown(_) => 3,
                HarnessError::Io(_) => 10,
                _ => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) | Self::Stage(_) => 1,
        }
    }
}
