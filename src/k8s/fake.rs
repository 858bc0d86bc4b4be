//! In-memory [`ClusterApi`] for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde_json::Value;

use super::cluster::ClusterApi;
use super::nodegroup::{self, NodeGroup};
use crate::error::NgcError;
use crate::readiness::tests::ready_node;

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    /// Nodes that turn Ready after being observed this many more times.
    ready_after: HashMap<String, u32>,
    node_groups: BTreeMap<String, Value>,
    secrets: BTreeMap<(String, String), BTreeMap<String, Vec<u8>>>,
    failures: HashMap<&'static str, VecDeque<NgcError>>,
    calls: HashMap<&'static str, u32>,
    patches: Vec<(String, Value)>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, name: &str, ready: bool, labels: &[(&str, &str)]) {
        let mut node = ready_node(name, ready);
        if !labels.is_empty() {
            node.metadata.labels = Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        }
        self.lock().nodes.insert(name.to_string(), node);
    }

    /// Flip `name` to Ready after it has been observed `observations` times.
    pub fn ready_after(&self, name: &str, observations: u32) {
        self.lock()
            .ready_after
            .insert(name.to_string(), observations);
    }

    pub fn add_node_group(&self, value: Value) {
        let name = value["metadata"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.lock().node_groups.insert(name, value);
    }

    pub fn add_secret(&self, namespace: &str, name: &str, data: &[(&str, &[u8])]) {
        self.lock().secrets.insert(
            (namespace.to_string(), name.to_string()),
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        );
    }

    /// Make the next call to `op` fail with `err`. Queued errors are used in order.
    pub fn fail_next(&self, op: &'static str, err: NgcError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    pub fn calls(&self, op: &'static str) -> u32 {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn node_group(&self, name: &str) -> Option<Value> {
        self.lock().node_groups.get(name).cloned()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.lock().nodes.contains_key(name)
    }

    pub fn patches(&self) -> Vec<(String, Value)> {
        self.lock().patches.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Count the call and pop a scripted failure, if any.
    fn enter(&self, op: &'static str) -> Result<std::sync::MutexGuard<'_, State>, NgcError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

impl State {
    fn observe(&mut self, name: &str) {
        if let Some(remaining) = self.ready_after.get_mut(name) {
            if *remaining <= 1 {
                self.ready_after.remove(name);
                if let Some(node) = self.nodes.get_mut(name) {
                    let labels = node.metadata.labels.clone();
                    *node = ready_node(name, true);
                    node.metadata.labels = labels;
                }
            } else {
                *remaining -= 1;
            }
        }
    }
}

/// RFC 7396 JSON merge patch.
pub fn json_merge_patch(target: &mut Value, patch: &Value) {
    let Some(patch_obj) = patch.as_object() else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let Some(target_obj) = target.as_object_mut() {
        for (key, value) in patch_obj {
            if value.is_null() {
                target_obj.remove(key);
            } else if value.is_object() {
                let entry = target_obj
                    .entry(key.clone())
                    .or_insert(serde_json::json!({}));
                json_merge_patch(entry, value);
            } else {
                target_obj.insert(key.clone(), value.clone());
            }
        }
    }
}

fn matches_selector(node: &Node, selector: &str) -> bool {
    let labels = node.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|actual| actual == v),
            None => labels.contains_key(term),
        })
}

fn not_found(kind: &str, name: &str) -> NgcError {
    NgcError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_node(&self, name: &str) -> Result<Node, NgcError> {
        let mut state = self.enter("get_node")?;
        state.observe(name);
        state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("Node", name))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, NgcError> {
        let mut state = self.enter("list_nodes")?;
        let names: Vec<String> = state.nodes.keys().cloned().collect();
        for name in &names {
            state.observe(name);
        }
        Ok(state
            .nodes
            .values()
            .filter(|n| matches_selector(n, label_selector))
            .cloned()
            .collect())
    }

    async fn delete_node(&self, name: &str) -> Result<(), NgcError> {
        let mut state = self.enter("delete_node")?;
        state
            .nodes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("Node", name))
    }

    async fn create_node_group(&self, group: &NodeGroup) -> Result<NodeGroup, NgcError> {
        let mut state = self.enter("create_node_group")?;
        if state.node_groups.contains_key(group.name()) {
            return Err(NgcError::AlreadyExists {
                kind: nodegroup::KIND.to_string(),
                name: group.name().to_string(),
            });
        }
        state
            .node_groups
            .insert(group.name().to_string(), serde_json::to_value(group)?);
        Ok(group.clone())
    }

    async fn patch_node_group(
        &self,
        name: &str,
        merge_patch: &Value,
    ) -> Result<NodeGroup, NgcError> {
        let mut state = self.enter("patch_node_group")?;
        state.patches.push((name.to_string(), merge_patch.clone()));
        let current = state
            .node_groups
            .get_mut(name)
            .ok_or_else(|| not_found(nodegroup::KIND, name))?;
        json_merge_patch(current, merge_patch);
        NodeGroup::from_value(current.clone())
    }

    async fn list_node_groups(&self) -> Result<Vec<NodeGroup>, NgcError> {
        let state = self.enter("list_node_groups")?;
        state
            .node_groups
            .values()
            .cloned()
            .map(NodeGroup::from_value)
            .collect()
    }

    async fn delete_node_group(&self, name: &str) -> Result<(), NgcError> {
        let mut state = self.enter("delete_node_group")?;
        state
            .node_groups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(nodegroup::KIND, name))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, NgcError> {
        let state = self.enter("get_secret")?;
        state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("Secret", &format!("{}/{}", namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_merge_patch_removes_null_and_merges_objects() {
        let mut target = serde_json::json!({
            "spec": {"a": 1, "b": {"c": 2, "d": 3}},
            "keep": true
        });
        let patch = serde_json::json!({
            "spec": {"a": null, "b": {"c": 20}}
        });

        json_merge_patch(&mut target, &patch);

        assert_eq!(
            target,
            serde_json::json!({"spec": {"b": {"c": 20, "d": 3}}, "keep": true})
        );
    }

    #[test]
    fn test_matches_selector() {
        let mut node = ready_node("n", true);
        node.metadata.labels = Some(
            [("node.deckhouse.io/group".to_string(), "worker".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(matches_selector(&node, "node.deckhouse.io/group=worker"));
        assert!(!matches_selector(&node, "node.deckhouse.io/group=master"));
        assert!(matches_selector(&node, ""));
    }
}
