//! NodeGroup reconciliation: upsert, delete and template listing.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::NgcError;
use crate::k8s::cluster::ClusterApi;
use crate::k8s::nodegroup::NodeGroup;
use crate::retry::{self, AttemptPolicy};

pub const UPSERT_POLICY: AttemptPolicy = AttemptPolicy::new(45, 15);
pub const DELETE_POLICY: AttemptPolicy = AttemptPolicy::new(45, 10);
pub const TEMPLATES_POLICY: AttemptPolicy = AttemptPolicy::new(10, 5);

/// Node templates keyed by NodeGroup name. `None` when a group has no template.
pub type NodeTemplates = BTreeMap<String, Option<Value>>;

/// Create the NodeGroup, or merge-patch it if it already exists.
///
/// No read happens first: a concurrent creator of the same name simply
/// turns our create into a patch.
pub async fn upsert_node_group<C>(cluster: &C, group: &NodeGroup) -> Result<(), NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Create NodeGroup {:?}", group.name());

    retry::run(&label, &UPSERT_POLICY, || async move {
        match cluster.create_node_group(group).await {
            Ok(created) => {
                info!("NodeGroup {:?} created", created.name());
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!("NodeGroup {:?} already exists, updating", group.name());
                let patch = group.merge_patch()?;
                cluster.patch_node_group(group.name(), &patch).await?;
                info!("NodeGroup {:?} updated", group.name());
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await
}

/// Delete the NodeGroup. An already absent NodeGroup counts as deleted.
pub async fn delete_node_group<C>(cluster: &C, name: &str) -> Result<(), NgcError>
where
    C: ClusterApi + ?Sized,
{
    let label = format!("Delete NodeGroup {}", name);

    retry::run(&label, &DELETE_POLICY, || async move {
        match cluster.delete_node_group(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("NodeGroup {:?} has already been deleted", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await
}

/// Collect `spec.nodeTemplate` of every NodeGroup in the cluster.
pub async fn list_node_templates<C>(cluster: &C) -> Result<NodeTemplates, NgcError>
where
    C: ClusterApi + ?Sized,
{
    retry::run(
        "Get NodeGroups node template settings",
        &TEMPLATES_POLICY,
        || async move {
            let groups = cluster.list_node_groups().await?;
            let templates: NodeTemplates = groups
                .iter()
                .map(|g| (g.name().to_string(), g.node_template().cloned()))
                .collect();
            Ok::<_, NgcError>(templates)
        },
    )
    .await
}
