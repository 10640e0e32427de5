//! Domain types shared by every crate.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::workspace::KEY_IAC_OPTIONS;

/// IaC input variable names.
pub mod vars {
    pub const PROJECT: &str = "gcp_project";
    pub const REGION: &str = "gcp_region";
    pub const ZONE: &str = "gcp_zone";
    pub const SERVER_CLUSTER_NAME: &str = "consul_server_cluster_name";
    pub const CLIENT_CLUSTER_NAME: &str = "consul_client_cluster_name";
    pub const SERVER_CLUSTER_TAG_NAME: &str = "consul_server_cluster_tag_name";
    pub const CLIENT_CLUSTER_TAG_NAME: &str = "consul_client_cluster_tag_name";
    pub const SERVER_SOURCE_IMAGE: &str = "consul_server_source_image";
    pub const CLIENT_SOURCE_IMAGE: &str = "consul_client_source_image";
    pub const SERVER_CLUSTER_SIZE: &str = "consul_server_cluster_size";
    pub const CLIENT_CLUSTER_SIZE: &str = "consul_client_cluster_size";
    pub const ALLOWED_INBOUND_CIDR_HTTP_API: &str = "allowed_inbound_cidr_blocks_http_api";
    pub const ALLOWED_INBOUND_CIDR_DNS: &str = "allowed_inbound_cidr_blocks_dns";
}

/// IaC output variable names.
pub mod outputs {
    pub const SERVER_INSTANCE_GROUP: &str = "instance_group_name";
    pub const CLIENT_INSTANCE_GROUP: &str = "client_instance_group_name";
}

/// Address of one cluster node's query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub address: String,
    pub port: u16,
}

impl ClusterEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Membership and leadership as observed by one poll attempt.
///
/// Built fresh on every attempt and never carried over to the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    pub members: Vec<String>,
    pub leader: Option<String>,
}

impl ClusterSnapshot {
    /// Converged when the member count matches and a leader is known.
    pub fn is_converged(&self, expected_members: usize) -> bool {
        self.members.len() == expected_members && self.leader.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Input of an IaC apply/destroy, persisted between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IacOptions {
    /// Directory holding the IaC configuration (the workspace).
    pub dir: PathBuf,
    /// Input variables, ordered for stable var files.
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl IacOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Builder-style variable insert.
    pub fn var(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.to_owned(), value.into());
        self
    }

    /// String value of a variable, if present and a string.
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(|v| v.as_str())
    }

    /// Non-negative integer value of a variable, if present and one.
    pub fn var_usize(&self, name: &str) -> Option<usize> {
        self.vars
            .get(name)
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    /// Member count of the deployed cluster: server plus client size as
    /// they were handed to the IaC tool.
    ///
    /// # Errors
    ///
    /// [`WorkspaceError::Serde`] when either size is missing or not an integer.
    pub fn deployed_members(&self) -> Result<usize, WorkspaceError> {
        let size = |name: &str| {
            self.var_usize(name).ok_or_else(|| WorkspaceError::Serde {
                key: KEY_IAC_OPTIONS.to_owned(),
                reason: format!("variable '{name}' is missing or not an integer"),
            })
        };
        Ok(size(vars::SERVER_CLUSTER_SIZE)? + size(vars::CLIENT_CLUSTER_SIZE)?)
    }
}

/// What to hand the image builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildRequest {
    pub template_path: PathBuf,
    pub build_name: String,
    pub vars: BTreeMap<String, String>,
}

/// Everything deploy leaves behind for validate and teardown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployArtifacts {
    pub image_id: String,
    pub zone: String,
    pub iac: IacOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_appends_port() {
        assert_eq!(ClusterEndpoint::new("10.0.0.4", 8500).to_string(), "10.0.0.4:8500");
        assert_eq!(ClusterEndpoint::new("fe80::1", 8500).to_string(), "[fe80::1]:8500");
    }

    #[test]
    fn deployed_members_sums_persisted_sizes() {
        let options = IacOptions::new("/tmp/ws")
            .var(vars::SERVER_CLUSTER_SIZE, 5)
            .var(vars::CLIENT_CLUSTER_SIZE, 2);
        assert_eq!(options.deployed_members().unwrap(), 7);
    }

    #[test]
    fn deployed_members_rejects_missing_or_non_integer_size() {
        let missing = IacOptions::new("/tmp/ws").var(vars::SERVER_CLUSTER_SIZE, 3);
        let err = missing.deployed_members().unwrap_err();
        assert!(err.to_string().contains(vars::CLIENT_CLUSTER_SIZE), "{err}");

        let text = IacOptions::new("/tmp/ws")
            .var(vars::SERVER_CLUSTER_SIZE, "3")
            .var(vars::CLIENT_CLUSTER_SIZE, 4);
        assert!(matches!(
            text.deployed_members(),
            Err(WorkspaceError::Serde { ref key, .. }) if key == KEY_IAC_OPTIONS
        ));
    }

    #[test]
    fn snapshot_requires_both_conditions() {
        let members: Vec<String> = (0..7).map(|i| format!("node-{i}")).collect();

        let no_leader = ClusterSnapshot {
            members: members.clone(),
            leader: Some(String::new()),
        };
        assert!(!no_leader.is_converged(7));

        let short = ClusterSnapshot {
            members: members[..5].to_vec(),
            leader: Some("node-1".to_owned()),
        };
        assert!(!short.is_converged(7));

        let ok = ClusterSnapshot {
            members,
            leader: Some("node-1".to_owned()),
        };
        assert!(ok.is_converged(7));
    }

    #[test]
    fn iac_options_builder_keeps_values() {
        let options = IacOptions::new("/tmp/ws")
            .var(vars::ZONE, "us-east1-b")
            .var(vars::SERVER_CLUSTER_SIZE, 3);
        assert_eq!(options.var_str(vars::ZONE), Some("us-east1-b"));
        assert_eq!(options.vars[vars::SERVER_CLUSTER_SIZE], serde_json::json!(3));
        assert_eq!(options.var_str(vars::SERVER_CLUSTER_SIZE), None);
    }
}
