//! Consul agent HTTP API client.
//!
//! Only the two read-only endpoints the convergence check needs are used:
//!
//! - `GET /v1/agent/members` -- LAN members known to the agent
//! - `GET /v1/status/leader` -- Raft leader address, `""` while none is elected

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use clusterproof_core::error::ClusterError;
use clusterproof_core::provider::{ClusterClient, ClusterConnector};
use clusterproof_core::types::ClusterEndpoint;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds [`ConsulClient`]s.
#[derive(Debug, Clone)]
pub struct ConsulConnector {
    timeout: Duration,
}

impl Default for ConsulConnector {
    fn default() -> Self {
        Self {
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ConsulConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ClusterConnector for ConsulConnector {
    type Client = ConsulClient;

    fn connect(&self, endpoint: &ClusterEndpoint) -> Result<ConsulClient, ClusterError> {
        let connect_err = |reason: String| ClusterError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        if endpoint.address.trim().is_empty() {
            return Err(connect_err("empty address".to_owned()));
        }
        let base = Url::parse(&format!("http://{endpoint}/")).map_err(|e| connect_err(e.to_string()))?;
        if base.host_str().is_none() {
            return Err(connect_err("endpoint has no host".to_owned()));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| connect_err(e.to_string()))?;

        debug!(base = %base, "created consul client");
        Ok(ConsulClient { http, base })
    }
}

/// Client bound to one Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    base: Url,
}

impl ConsulClient {
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, ClusterError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

impl ClusterClient for ConsulClient {
    async fn members(&self) -> Result<Vec<String>, ClusterError> {
        let body = self.get("v1/agent/members").await?;
        decode_members(&body)
    }

    async fn leader(&self) -> Result<String, ClusterError> {
        let body = self.get("v1/status/leader").await?;
        decode_leader(&body)
    }
}

#[derive(Debug, Deserialize)]
struct AgentMember {
    #[serde(rename = "Name")]
    name: String,
}

fn decode_members(body: &[u8]) -> Result<Vec<String>, ClusterError> {
    let members: Vec<AgentMember> = serde_json::from_slice(body)
        .map_err(|e| ClusterError::Transport(format!("invalid members response: {e}")))?;
    Ok(members.into_iter().map(|m| m.name).collect())
}

fn decode_leader(body: &[u8]) -> Result<String, ClusterError> {
    serde_json::from_slice(body)
        .map_err(|e| ClusterError::Transport(format!("invalid leader response: {e}")))
}
