//! Node readiness waits and node deletion.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::NgcError;
use crate::k8s::cluster::ClusterApi;
use crate::readiness::{ReadinessSnapshot, aggregate, is_node_ready};
use crate::retry::{self, AttemptPolicy};

pub const WAIT_POLICY: AttemptPolicy = AttemptPolicy::new(100, 20);
pub const DELETE_POLICY: AttemptPolicy = AttemptPolicy::new(45, 10);

/// Label selector picking the nodes of one NodeGroup.
pub fn group_selector(group_label: &str, group: &str) -> String {
    format!("{}={}", group_label, group)
}

/// Block until the named node reports `Ready=True`.
///
/// A missing node is an ordinary failed attempt. All waits stop between
/// attempts once `token` is cancelled.
pub async fn wait_for_node_ready<C>(
    cluster: &C,
    name: &str,
    token: &CancellationToken,
) -> Result<(), NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Waiting for {} to become Ready", name);

    retry::run_until_cancelled(&label, &WAIT_POLICY, token, || async move {
        let node = cluster.get_node(name).await?;
        if is_node_ready(&node) {
            info!("Node {:?} is Ready", name);
            Ok(())
        } else {
            Err(NgcError::NodeNotReady(name.to_string()))
        }
    })
    .await
}

/// Block until at least `desired` nodes of `group` are Ready.
///
/// Returns the satisfied snapshot. While unsatisfied, each failed attempt
/// carries the readiness summary as its error.
pub async fn wait_for_group_ready<C>(
    cluster: &C,
    group_label: &str,
    group: &str,
    desired: usize,
    token: &CancellationToken,
) -> Result<ReadinessSnapshot, NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Waiting for NodeGroup {} to become Ready", group);
    let selector = group_selector(group_label, group);
    let selector = selector.as_str();

    retry::run_until_cancelled(&label, &WAIT_POLICY, token, || async move {
        let nodes = cluster.list_nodes(selector).await?;
        check(ReadinessSnapshot::from_nodes(&nodes, desired))
    })
    .await
}

/// Block until every node in `names` is Ready.
///
/// Nodes are fetched one by one in the given order; a failed fetch fails
/// the whole attempt.
pub async fn wait_for_nodes_ready<C>(
    cluster: &C,
    names: &[String],
    token: &CancellationToken,
) -> Result<ReadinessSnapshot, NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Waiting for {} nodes to become Ready", names.len());

    retry::run_until_cancelled(&label, &WAIT_POLICY, token, || async move {
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            nodes.push(cluster.get_node(name).await?);
        }
        check(ReadinessSnapshot::from_nodes(&nodes, names.len()))
    })
    .await
}

fn check(snapshot: ReadinessSnapshot) -> Result<ReadinessSnapshot, NgcError> {
    let (satisfied, summary) = aggregate(&snapshot.observed, snapshot.desired_count);
    if satisfied {
        info!("{}", summary);
        Ok(snapshot)
    } else {
        Err(NgcError::NodesNotReady(summary))
    }
}

/// Delete the node. An already absent node counts as deleted.
pub async fn delete_node<C>(cluster: &C, name: &str) -> Result<(), NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Delete Node {}", name);

    retry::run(&label, &DELETE_POLICY, || async move {
        match cluster.delete_node(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Node {:?} has already been deleted", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await
}
