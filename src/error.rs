//! Custom error types for ngc.

use thiserror::Error;

/// Errors that can occur during node group convergence.
///
/// Every variant is retried by the executor until the attempt budget runs
/// out. Only `AlreadyExists` (on create) and `NotFound` (on delete) are
/// recovered from, and that happens inside the attempt closures.
#[derive(Error, Debug)]
pub enum NgcError {
    #[error("Kubernetes API error: {0}")]
    KubernetesApi(String),

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("node {0:?} is not Ready yet")]
    NodeNotReady(String),

    /// Rendered readiness summary, shown verbatim.
    #[error("{0}")]
    NodesNotReady(String),

    #[error("secret {secret:?} has no {key:?} key")]
    MissingSecretKey { secret: String, key: String },

    #[error("Invalid node group declaration: {0}")]
    InvalidDeclaration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("{0} was cancelled")]
    Cancelled(String),
}

impl NgcError {
    /// Classify a kube-rs error for an operation on `kind`/`name`.
    ///
    /// HTTP 404 maps to `NotFound`, HTTP 409 with reason `AlreadyExists`
    /// maps to `AlreadyExists`. Anything else is a generic API error.
    pub fn kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
            }
            _ => Self::KubernetesApi(format!("{kind} {name:?}: {err}")),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for NgcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
