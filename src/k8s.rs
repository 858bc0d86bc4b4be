//! Kubernetes access: client construction, the cluster collaborator and
//! the NodeGroup document type.

pub mod client;
pub mod cluster;
pub mod logs;
pub mod nodegroup;

#[cfg(test)]
pub mod fake;
