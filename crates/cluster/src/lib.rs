//! Cluster-side checks of an acceptance run.
//!
//! - [`membership`]: find a reachable node in a cloud instance group
//! - [`convergence`]: poll a node until membership and leadership converge
//! - [`consul`]: Consul agent HTTP API client behind the `ClusterConnector` seam

pub mod consul;
pub mod convergence;
pub mod membership;

pub use consul::{ConsulClient, ConsulConnector};
pub use convergence::{CHECK_MEMBERS, poll_convergence, validate_cluster};
pub use membership::{find_reachable_endpoint, resolve_endpoint};
