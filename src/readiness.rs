//! Node readiness aggregation.
//!
//! Pure functions turning observed nodes into a ready/not-ready verdict and
//! the summary text shown while waiting.

use k8s_openapi::api::core::v1::Node;

/// Readiness of a single observed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReadiness {
    pub name: String,
    pub ready: bool,
}

impl NodeReadiness {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
        }
    }

    /// Derive readiness from the node's `Ready` condition.
    ///
    /// A node without a `Ready` condition is not ready.
    pub fn from_node(node: &Node) -> Self {
        let name = node.metadata.name.clone().unwrap_or_default();
        Self::new(name, is_node_ready(node))
    }
}

/// Returns true if the node reports condition `Ready=True`.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}

/// Observed node set against a desired ready count.
#[derive(Debug, Clone)]
pub struct ReadinessSnapshot {
    pub observed: Vec<NodeReadiness>,
    pub desired_count: usize,
}

impl ReadinessSnapshot {
    pub fn from_nodes(nodes: &[Node], desired_count: usize) -> Self {
        Self {
            observed: nodes.iter().map(NodeReadiness::from_node).collect(),
            desired_count,
        }
    }

    pub fn ready_count(&self) -> usize {
        ready_count(&self.observed)
    }

    pub fn is_satisfied(&self) -> bool {
        self.ready_count() >= self.desired_count
    }

    /// `Nodes Ready <ready> of <desired>` followed by one line per node,
    /// in observation order.
    #[cfg(test)]
    pub fn summary(&self) -> String {
        render_summary(&self.observed, self.desired_count)
    }
}

fn ready_count(records: &[NodeReadiness]) -> usize {
    records.iter().filter(|r| r.ready).count()
}

fn render_summary(records: &[NodeReadiness], desired_count: usize) -> String {
    let mut message = format!("Nodes Ready {} of {}", ready_count(records), desired_count);
    for record in records {
        let condition = if record.ready { "Ready" } else { "NotReady" };
        message.push_str(&format!("\n* {} | {}", record.name, condition));
    }
    message
}

/// Aggregate readiness records into `(satisfied, summary)`.
pub fn aggregate(records: &[NodeReadiness], desired_count: usize) -> (bool, String) {
    (
        ready_count(records) >= desired_count,
        render_summary(records, desired_count),
    )
}
