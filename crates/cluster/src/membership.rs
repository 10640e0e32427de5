//! Membership resolver -- wait for an instance group to expose a reachable node.
//!
//! A managed instance group starts at zero instances and scales up, so an
//! empty group is a transient condition, not an error. Once one or more
//! instances answer, any of them will do: the pick is uniformly random so
//! no instance is favoured by index or age.

use rand::seq::SliceRandom;
use tracing::info;

use clusterproof_core::error::{CloudError, RetryError};
use clusterproof_core::provider::CloudProvider;
use clusterproof_core::retry::{PollError, RetryPolicy, do_with_retry};
use clusterproof_core::types::ClusterEndpoint;

/// Poll `group` until it has at least one reachable instance and return the
/// address of one of them.
///
/// Cloud API errors and empty groups are both retried.
pub async fn find_reachable_endpoint<C: CloudProvider>(
    cloud: &C,
    project: &str,
    zone: &str,
    group: &str,
    policy: RetryPolicy,
) -> Result<String, RetryError> {
    let description = format!("Waiting for instances in group {group}");

    let address = do_with_retry(&description, policy, move || async move {
        let addresses = cloud
            .instance_group_addresses(project, zone, group)
            .await
            .map_err(PollError::retry)?;
        pick_random(&addresses).ok_or_else(|| {
            PollError::retry(CloudError::NoInstances {
                group: group.to_owned(),
            })
        })
    })
    .await?;

    info!(group, address = %address, "found reachable instance");
    Ok(address)
}

/// [`find_reachable_endpoint`] plus the cluster query port.
pub async fn resolve_endpoint<C: CloudProvider>(
    cloud: &C,
    project: &str,
    zone: &str,
    group: &str,
    port: u16,
    policy: RetryPolicy,
) -> Result<ClusterEndpoint, RetryError> {
    let address = find_reachable_endpoint(cloud, project, zone, group, policy).await?;
    Ok(ClusterEndpoint::new(address, port))
}

fn pick_random(addresses: &[String]) -> Option<String> {
    addresses.choose(&mut rand::thread_rng()).cloned()
}
