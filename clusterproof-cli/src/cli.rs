//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// clusterproof -- staged acceptance tests for deployed Consul clusters.
///
/// Use `clusterproof <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "clusterproof", version, about, long_about = None)]
pub struct Cli {
    /// Path to the clusterproof.toml configuration file.
    #[arg(short, long, default_value = "clusterproof.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build, deploy, validate and tear down the configured scenarios.
    Run(RunArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Inspect or remove a kept workspace.
    Workspace(WorkspaceArgs),
}

// ---- run ----

/// Run one or more scenarios.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario to run (repeatable). Default: every configured scenario.
    #[arg(short, long = "scenario")]
    pub scenarios: Vec<String>,

    /// Reopen the workspace left by an earlier run instead of creating one.
    /// Requires exactly one scenario.
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Stage to skip (repeatable): setup_image, deploy, validate, teardown.
    #[arg(long = "skip")]
    pub skip: Vec<String>,

    /// Keep the workspace even when every stage ran and succeeded.
    #[arg(long)]
    pub keep_workspace: bool,
}

// ---- config ----

/// Manage clusterproof configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, gcp, cluster, retry, stages, tools, scenarios).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- workspace ----

/// Inspect kept workspaces.
#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub action: WorkspaceAction,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceAction {
    /// List the artifacts persisted in a workspace.
    Show {
        /// Workspace directory printed by `run`.
        path: PathBuf,
    },
    /// Delete a workspace and the copied tree around it.
    Clean {
        /// Workspace directory printed by `run`.
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_repeated_scenarios_and_skips() {
        let cli = Cli::try_parse_from([
            "clusterproof",
            "run",
            "--scenario",
            "root-example",
            "-s",
            "consul-cluster",
            "--skip",
            "teardown",
            "--skip",
            "validate",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scenarios, vec!["root-example", "consul-cluster"]);
        assert_eq!(args.skip, vec!["teardown", "validate"]);
        assert!(args.workspace.is_none());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "clusterproof",
            "-c",
            "/etc/clusterproof.toml",
            "config",
            "show",
            "--section",
            "retry",
            "--output",
            "json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/clusterproof.toml"));
        assert!(matches!(cli.output, OutputFormat::Json));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn workspace_show_requires_path() {
        assert!(Cli::try_parse_from(["clusterproof", "workspace", "show"]).is_err());
    }
}
