//! Collaborator traits -- the seams to external tooling.
//!
//! The harness never talks to Terraform, Packer, the cloud API or the
//! cluster directly. It goes through these traits so that production code
//! uses the process/HTTP adapters while tests plug in scripted mocks.
//!
//! ```text
//!              ┌──────────────┐
//!              │   Scenario   │
//!              └──────┬───────┘
//!     ┌───────────┬───┴──────────┬────────────────┐
//!     ▼           ▼              ▼                ▼
//! IacEngine  ImageBuilder  CloudProvider  ClusterConnector
//! (terraform)  (packer)      (gcloud)       (consul http)
//! ```

use std::future::Future;

use crate::error::{CloudError, ClusterError, ToolError};
use crate::types::{ClusterEndpoint, IacOptions, ImageBuildRequest};

/// Infrastructure-as-code engine.
pub trait IacEngine: Send + Sync + 'static {
    /// Initialise the working directory and apply.
    fn init_and_apply(
        &self,
        options: &IacOptions,
    ) -> impl Future<Output = Result<(), ToolError>> + Send;

    /// Read one output variable after apply. Empty output is an error.
    fn output(
        &self,
        options: &IacOptions,
        name: &str,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;

    /// Destroy everything the options describe.
    fn destroy(&self, options: &IacOptions) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Machine image builder.
pub trait ImageBuilder: Send + Sync + 'static {
    /// Build the image and return its identifier.
    fn build(
        &self,
        request: &ImageBuildRequest,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Cloud provider API used around the cluster.
pub trait CloudProvider: Send + Sync + 'static {
    /// Zones available in `region`.
    fn zones(
        &self,
        project: &str,
        region: &str,
    ) -> impl Future<Output = Result<Vec<String>, CloudError>> + Send;

    /// Publicly reachable addresses of the running instances in a group.
    ///
    /// An empty list is a valid answer while the group scales up from zero.
    fn instance_group_addresses(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> impl Future<Output = Result<Vec<String>, CloudError>> + Send;

    /// Delete a machine image.
    fn delete_image(
        &self,
        project: &str,
        image: &str,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
}

/// Builds protocol clients for a cluster endpoint.
pub trait ClusterConnector: Send + Sync + 'static {
    type Client: ClusterClient;

    /// Construct a client. Failure means the endpoint itself is malformed.
    fn connect(&self, endpoint: &ClusterEndpoint) -> Result<Self::Client, ClusterError>;
}

/// Membership and leadership queries against one node.
pub trait ClusterClient: Send + Sync {
    /// Names of the members the node currently knows about.
    fn members(&self) -> impl Future<Output = Result<Vec<String>, ClusterError>> + Send;

    /// Current leader identifier; empty while no leader is elected.
    fn leader(&self) -> impl Future<Output = Result<String, ClusterError>> + Send;
}
