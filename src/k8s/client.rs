//! Kubernetes client construction.

use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::debug;

use crate::error::NgcError;

/// Build a Kubernetes client.
///
/// With a context, that kubeconfig context is used. Otherwise the config is
/// inferred: `KUBECONFIG`/`~/.kube/config` first, then the in-cluster
/// service account.
pub async fn build_client(context: Option<&str>) -> Result<kube::Client, NgcError> {
    let config = match context {
        Some(ctx) => {
            debug!("Using kubeconfig context: {}", ctx);
            let options = KubeConfigOptions {
                context: Some(ctx.to_string()),
                ..Default::default()
            };
            kube::Config::from_kubeconfig(&options)
                .await
                .map_err(|e| NgcError::Kubeconfig(format!("context '{}': {}", ctx, e)))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| NgcError::Kubeconfig(e.to_string()))?,
    };

    debug!("Connecting to API server {}", config.cluster_url);
    kube::Client::try_from(config).map_err(|e| NgcError::Kubeconfig(e.to_string()))
}

/// Name of the context in use, for display.
pub fn current_context(context: Option<&str>) -> String {
    match context {
        Some(ctx) => ctx.to_string(),
        None => Kubeconfig::read()
            .ok()
            .and_then(|kc| kc.current_context)
            .unwrap_or_else(|| "in-cluster".to_string()),
    }
}
