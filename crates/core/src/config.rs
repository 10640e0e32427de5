//! Configuration -- `clusterproof.toml` parsing and run-time settings.
//!
//! [`HarnessConfig`] is the top-level structure; each component reads only
//! its own section.
//!
//! # Load order
//! 1. CLI flags (highest)
//! 2. Environment variables (`CLUSTERPROOF_GCP_PROJECT=my-project` style)
//! 3. Config file (`clusterproof.toml`)
//! 4. Defaults (`Default` impls)
//!
//! Environment variables are read exactly once, in [`HarnessConfig::apply_env_overrides`].
//! Everything downstream (stage skipping included) receives plain values.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), clusterproof_core::error::HarnessError> {
//! use clusterproof_core::config::HarnessConfig;
//!
//! let config = HarnessConfig::load("clusterproof.toml").await?;
//! let config = HarnessConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, HarnessError};
use crate::retry::{CONVERGENCE_POLICY, MEMBERSHIP_POLICY, RetryPolicy};
use crate::stage::{STAGE_NAMES, StageConfig};

/// Env vars consulted for the project id when `gcp.project` is empty.
pub const PROJECT_ENV_VARS: [&str; 3] = [
    "GOOGLE_CLOUD_PROJECT_ID",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_PROJECT",
];

/// Env var consulted for the region when `gcp.region` is empty.
pub const REGION_ENV_VAR: &str = "GOOGLE_CLOUD_REGION";

/// Unified harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Scenario definitions. Each one is an independent test run.
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

impl HarnessConfig {
    /// Load a TOML file, apply environment overrides, then validate.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HarnessError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, HarnessError> {
        toml::from_str(toml_str).map_err(|e| {
            HarnessError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Override values from the environment.
    ///
    /// Naming rule: `CLUSTERPROOF_{SECTION}_{FIELD}`. Stage skipping also
    /// honours `SKIP_<stage>` for any known stage name, the convention
    /// used by staged infrastructure tests.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CLUSTERPROOF_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CLUSTERPROOF_GENERAL_LOG_FORMAT");
        override_bool(
            &mut self.general.keep_workspace,
            "CLUSTERPROOF_GENERAL_KEEP_WORKSPACE",
        );
        override_string(&mut self.general.temp_dir, "CLUSTERPROOF_GENERAL_TEMP_DIR");

        // GCP
        override_string(&mut self.gcp.project, "CLUSTERPROOF_GCP_PROJECT");
        override_string(&mut self.gcp.region, "CLUSTERPROOF_GCP_REGION");
        override_csv(&mut self.gcp.zones, "CLUSTERPROOF_GCP_ZONES");
        if self.gcp.project.is_empty() {
            for key in PROJECT_ENV_VARS {
                if let Ok(val) = std::env::var(key) {
                    if !val.is_empty() {
                        self.gcp.project = val;
                        break;
                    }
                }
            }
        }
        if self.gcp.region.is_empty() {
            override_string(&mut self.gcp.region, REGION_ENV_VAR);
        }

        // Cluster
        override_string(
            &mut self.cluster.name_prefix,
            "CLUSTERPROOF_CLUSTER_NAME_PREFIX",
        );
        override_usize(
            &mut self.cluster.server_size,
            "CLUSTERPROOF_CLUSTER_SERVER_SIZE",
        );
        override_usize(
            &mut self.cluster.client_size,
            "CLUSTERPROOF_CLUSTER_CLIENT_SIZE",
        );
        override_u16(&mut self.cluster.query_port, "CLUSTERPROOF_CLUSTER_QUERY_PORT");

        // Retry
        override_u32(
            &mut self.retry.membership_attempts,
            "CLUSTERPROOF_RETRY_MEMBERSHIP_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.membership_interval_secs,
            "CLUSTERPROOF_RETRY_MEMBERSHIP_INTERVAL_SECS",
        );
        override_u32(
            &mut self.retry.convergence_attempts,
            "CLUSTERPROOF_RETRY_CONVERGENCE_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.convergence_interval_secs,
            "CLUSTERPROOF_RETRY_CONVERGENCE_INTERVAL_SECS",
        );

        // Stages
        if let Ok(val) = std::env::var("CLUSTERPROOF_STAGES_SKIP") {
            self.stages.skip.extend(
                val.split(',')
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty()),
            );
        }
        for stage in STAGE_NAMES {
            if std::env::var_os(format!("SKIP_{stage}")).is_some() {
                self.stages.skip.insert(stage.to_owned());
            }
        }

        // Tools
        override_string(&mut self.tools.terraform, "CLUSTERPROOF_TOOLS_TERRAFORM");
        override_string(&mut self.tools.packer, "CLUSTERPROOF_TOOLS_PACKER");
        override_string(&mut self.tools.gcloud, "CLUSTERPROOF_TOOLS_GCLOUD");
    }

    /// Check every value for range and consistency.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.cluster.server_size == 0 {
            return Err(invalid("cluster.server_size", "must be at least 1"));
        }
        if self.cluster.query_port == 0 {
            return Err(invalid("cluster.query_port", "must not be 0"));
        }
        if self.cluster.name_prefix.is_empty()
            || !self
                .cluster
                .name_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(
                "cluster.name_prefix",
                "must be non-empty lowercase letters, digits or '-'",
            ));
        }

        if self.retry.membership_attempts == 0 {
            return Err(invalid("retry.membership_attempts", "must be at least 1"));
        }
        if self.retry.convergence_attempts == 0 {
            return Err(invalid("retry.convergence_attempts", "must be at least 1"));
        }

        for name in &self.stages.skip {
            if !STAGE_NAMES.contains(&name.as_str()) {
                return Err(invalid(
                    "stages.skip",
                    format!("unknown stage '{name}', expected one of: {}", STAGE_NAMES.join(", ")),
                ));
            }
        }

        let mut seen = BTreeSet::new();
        for scenario in &self.scenarios {
            if scenario.name.is_empty() {
                return Err(invalid("scenarios.name", "must not be empty"));
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(invalid(
                    "scenarios.name",
                    format!("duplicate scenario '{}'", scenario.name),
                ));
            }
            if scenario.example_dir.as_os_str().is_empty() {
                return Err(invalid(
                    "scenarios.example_dir",
                    format!("scenario '{}' has no example_dir", scenario.name),
                ));
            }
            if scenario.build_name.is_empty() {
                return Err(invalid(
                    "scenarios.build_name",
                    format!("scenario '{}' has no build_name", scenario.name),
                ));
            }
        }

        Ok(())
    }

    /// Stage skip configuration as the explicit value handed to the stage runner.
    pub fn stage_config(&self) -> StageConfig {
        StageConfig::new(self.stages.skip.iter().cloned())
    }

    /// Look up a scenario by name.
    pub fn scenario(&self, name: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> HarnessError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn, error
    pub log_level: String,
    /// json, pretty
    pub log_format: String,
    /// Leave the copied workspace on disk after the run.
    pub keep_workspace: bool,
    /// Parent directory for workspaces; empty means the system temp dir.
    pub temp_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            keep_workspace: false,
            temp_dir: String::new(),
        }
    }
}

impl GeneralConfig {
    /// Workspace parent directory.
    pub fn temp_root(&self) -> PathBuf {
        if self.temp_dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.temp_dir)
        }
    }
}

/// GCP settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Project id; falls back to the `GOOGLE_*` project env vars.
    pub project: String,
    /// Region; falls back to `GOOGLE_CLOUD_REGION`.
    pub region: String,
    /// Candidate zones. Empty means "ask the cloud provider for the region's zones".
    pub zones: Vec<String>,
}

impl GcpConfig {
    /// Project id, or a `Missing` error naming the env vars that were tried.
    pub fn require_project(&self) -> Result<&str, ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::Missing {
                field: "gcp.project".to_owned(),
                hint: format!("set it in the config or via {}", PROJECT_ENV_VARS.join(" / ")),
            });
        }
        Ok(&self.project)
    }

    /// Region, or a `Missing` error.
    pub fn require_region(&self) -> Result<&str, ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::Missing {
                field: "gcp.region".to_owned(),
                hint: format!("set it in the config or via {REGION_ENV_VAR}"),
            });
        }
        Ok(&self.region)
    }
}

/// Shape of the cluster under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Prefix of generated cluster names.
    pub name_prefix: String,
    pub server_size: usize,
    pub client_size: usize,
    /// Port of the cluster HTTP API on every node.
    pub query_port: u16,
    pub allowed_inbound_cidr_blocks_http_api: Vec<String>,
    pub allowed_inbound_cidr_blocks_dns: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name_prefix: "consul".to_owned(),
            server_size: 3,
            client_size: 4,
            query_port: 8500,
            allowed_inbound_cidr_blocks_http_api: vec!["0.0.0.0/0".to_owned()],
            allowed_inbound_cidr_blocks_dns: vec!["0.0.0.0/0".to_owned()],
        }
    }
}

impl ClusterConfig {
    /// Every server and client agent joins the same gossip pool.
    pub fn expected_members(&self) -> usize {
        self.server_size + self.client_size
    }
}

/// Retry budgets. Defaults equal the fixed policies in [`crate::retry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub membership_attempts: u32,
    pub membership_interval_secs: u64,
    pub convergence_attempts: u32,
    pub convergence_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            membership_attempts: MEMBERSHIP_POLICY.max_attempts(),
            membership_interval_secs: MEMBERSHIP_POLICY.interval().as_secs(),
            convergence_attempts: CONVERGENCE_POLICY.max_attempts(),
            convergence_interval_secs: CONVERGENCE_POLICY.interval().as_secs(),
        }
    }
}

impl RetryConfig {
    /// Policy for waiting on instance group boot.
    pub fn membership_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(
            self.membership_attempts,
            Duration::from_secs(self.membership_interval_secs),
        )
    }

    /// Policy for waiting on gossip convergence and leader election.
    pub fn convergence_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(
            self.convergence_attempts,
            Duration::from_secs(self.convergence_interval_secs),
        )
    }
}

/// Stage skip list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub skip: BTreeSet<String>,
}

/// External tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub terraform: String,
    pub packer: String,
    pub gcloud: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            terraform: "terraform".to_owned(),
            packer: "packer".to_owned(),
            gcloud: "gcloud".to_owned(),
        }
    }
}

/// One example configuration to provision and validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    /// Root of the tree copied into the workspace.
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
    /// Terraform directory, relative to `source_root`.
    pub example_dir: PathBuf,
    /// Packer template, relative to `source_root`.
    pub packer_template: PathBuf,
    /// Packer build to run (`-only`).
    pub build_name: String,
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
