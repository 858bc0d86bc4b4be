//! Cluster API collaborator used by the convergence routines.
//!
//! [`ClusterApi`] is the narrow surface ngc needs from the API server.
//! [`KubeCluster`] implements it with kube-rs; tests use an in-memory fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Secret};
use kube::Api;
use kube::api::{DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use serde_json::Value;
use tracing::debug;

use super::nodegroup::{self, NodeGroup};
use crate::error::NgcError;

const FIELD_MANAGER: &str = "ngc";

/// Operations on cluster objects consumed by the convergence routines.
///
/// Implementations report a missing object as [`NgcError::NotFound`] and a
/// duplicate create as [`NgcError::AlreadyExists`].
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, NgcError>;

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, NgcError>;

    async fn delete_node(&self, name: &str) -> Result<(), NgcError>;

    async fn create_node_group(&self, group: &NodeGroup) -> Result<NodeGroup, NgcError>;

    async fn patch_node_group(&self, name: &str, merge_patch: &Value)
    -> Result<NodeGroup, NgcError>;

    async fn list_node_groups(&self) -> Result<Vec<NodeGroup>, NgcError>;

    async fn delete_node_group(&self, name: &str) -> Result<(), NgcError>;

    /// Secret data keyed by entry name.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, NgcError>;
}

/// [`ClusterApi`] backed by a kube-rs client.
#[derive(Clone)]
pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    pub const fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn node_groups(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &nodegroup::nodegroup_api_resource())
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_node(&self, name: &str) -> Result<Node, NgcError> {
        self.nodes()
            .get(name)
            .await
            .map_err(|e| NgcError::kube("Node", name, e))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, NgcError> {
        let list = self
            .nodes()
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| NgcError::KubernetesApi(format!("Failed to list Nodes: {}", e)))?;

        debug!(
            "Found {} Nodes matching selector {:?}",
            list.items.len(),
            label_selector
        );
        Ok(list.items)
    }

    async fn delete_node(&self, name: &str) -> Result<(), NgcError> {
        self.nodes()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| NgcError::kube("Node", name, e))?;
        Ok(())
    }

    async fn create_node_group(&self, group: &NodeGroup) -> Result<NodeGroup, NgcError> {
        let obj = group.to_dynamic()?;
        let created = self
            .node_groups()
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| NgcError::kube(nodegroup::KIND, group.name(), e))?;
        NodeGroup::from_dynamic(created)
    }

    async fn patch_node_group(
        &self,
        name: &str,
        merge_patch: &Value,
    ) -> Result<NodeGroup, NgcError> {
        debug!("Patching NodeGroup '{}' with patch: {:?}", name, merge_patch);

        let patched = self
            .node_groups()
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(merge_patch),
            )
            .await
            .map_err(|e| NgcError::kube(nodegroup::KIND, name, e))?;
        NodeGroup::from_dynamic(patched)
    }

    async fn list_node_groups(&self) -> Result<Vec<NodeGroup>, NgcError> {
        let list = self
            .node_groups()
            .list(&ListParams::default())
            .await
            .map_err(|e| NgcError::KubernetesApi(format!("Failed to list NodeGroups: {}", e)))?;

        debug!("Found {} NodeGroup resources", list.items.len());

        list.items.into_iter().map(NodeGroup::from_dynamic).collect()
    }

    async fn delete_node_group(&self, name: &str) -> Result<(), NgcError> {
        self.node_groups()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| NgcError::kube(nodegroup::KIND, name, e))?;
        Ok(())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, NgcError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get(name)
            .await
            .map_err(|e| NgcError::kube("Secret", &format!("{}/{}", namespace, name), e))?;

        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect())
    }
}
