//! Process adapters for the external tools a cluster test drives.
//!
//! - [`terraform::Terraform`] implements [`IacEngine`](clusterproof_core::IacEngine)
//! - [`packer::Packer`] implements [`ImageBuilder`](clusterproof_core::ImageBuilder)
//! - [`gcloud::Gcloud`] implements [`CloudProvider`](clusterproof_core::CloudProvider)
//!
//! All of them shell out through [`process::ToolCommand`]; none retries.

pub mod gcloud;
pub mod packer;
pub mod process;
pub mod terraform;

pub use gcloud::Gcloud;
pub use packer::{Packer, parse_artifact_id};
pub use process::{ToolCommand, ToolOutput};
pub use terraform::{Terraform, VAR_FILE};

use clusterproof_core::config::ToolsConfig;

/// The three production adapters, built from `[tools]`.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub terraform: Terraform,
    pub packer: Packer,
    pub gcloud: Gcloud,
}

impl Toolchain {
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            terraform: Terraform::new(&tools.terraform),
            packer: Packer::new(&tools.packer),
            gcloud: Gcloud::new(&tools.gcloud),
        }
    }
}
