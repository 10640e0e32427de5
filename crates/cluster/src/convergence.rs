//! Convergence validator -- turn membership and leader queries into a verdict.
//!
//! A cluster counts as converged when, within one poll attempt, the node
//! reports exactly the expected number of members and a non-empty leader.
//! Each attempt queries from scratch; nothing observed in an earlier attempt
//! is reused.
//!
//! | Condition                          | Handling  |
//! |------------------------------------|-----------|
//! | client construction fails          | fatal     |
//! | members query transport error      | retryable |
//! | member count != expected           | retryable |
//! | leader query transport error       | retryable |
//! | empty leader                       | retryable |

use tracing::{debug, info};

use clusterproof_core::error::{ClusterError, HarnessError};
use clusterproof_core::provider::{ClusterClient, ClusterConnector};
use clusterproof_core::retry::{PollError, RetryPolicy, do_with_retry};
use clusterproof_core::types::{ClusterEndpoint, ClusterSnapshot};

/// Retry description of the convergence poll.
pub const CHECK_MEMBERS: &str = "Check cluster members";

/// Connect to `endpoint` and poll until the cluster has `expected_members`
/// members and an elected leader. Returns the leader identifier.
///
/// # Errors
///
/// - [`HarnessError::Cluster`] when no client can be built for `endpoint`
/// - [`HarnessError::Retry`] when the cluster does not converge within `policy`
pub async fn validate_cluster<K: ClusterConnector>(
    connector: &K,
    endpoint: &ClusterEndpoint,
    expected_members: usize,
    policy: RetryPolicy,
) -> Result<String, HarnessError> {
    let client = connector.connect(endpoint)?;

    let leader = do_with_retry(CHECK_MEMBERS, policy, || {
        poll_convergence(&client, expected_members)
    })
    .await?;

    info!(
        endpoint = %endpoint,
        members = expected_members,
        leader = %leader,
        "cluster is properly deployed and has elected a leader"
    );
    Ok(leader)
}

/// One poll attempt. Succeeds with the leader id only when both conditions
/// hold in this attempt.
pub async fn poll_convergence<C: ClusterClient>(
    client: &C,
    expected_members: usize,
) -> Result<String, PollError> {
    let mut snapshot = ClusterSnapshot {
        members: client.members().await.map_err(PollError::retry)?,
        leader: None,
    };

    if snapshot.members.len() != expected_members {
        return Err(PollError::retry(ClusterError::MemberCount {
            expected: expected_members,
            found: snapshot.members.len(),
        }));
    }

    snapshot.leader = Some(client.leader().await.map_err(PollError::retry)?);
    debug!(?snapshot, "cluster snapshot");

    if !snapshot.is_converged(expected_members) {
        return Err(PollError::retry(ClusterError::NoLeader));
    }
    Ok(snapshot.leader.unwrap_or_default())
}
