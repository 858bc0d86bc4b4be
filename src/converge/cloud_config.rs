//! Bootstrap cloud-config retrieval.
//!
//! The bootstrap secret is produced by the cluster controller once the
//! NodeGroup is reconciled. While polling for it the controller's own
//! output is relayed as progress.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::error::NgcError;
use crate::k8s::cluster::ClusterApi;
use crate::progress::{DEFAULT_FETCH_PAUSE, ProgressSource, ProgressStreamer};
use crate::retry::{self, AttemptPolicy};

pub const CLOUD_CONFIG_POLICY: AttemptPolicy = AttemptPolicy::new(45, 5).silent();

pub const BOOTSTRAP_SECRET_PREFIX: &str = "manual-bootstrap-for-";
pub const CLOUD_CONFIG_KEY: &str = "cloud-config";

pub fn bootstrap_secret_name(node_group: &str) -> String {
    format!("{}{}", BOOTSTRAP_SECRET_PREFIX, node_group)
}

/// Wait for the bootstrap secret of `node_group` and return its
/// `cloud-config` entry as standard base64 text.
///
/// `progress` is streamed for the duration of the wait and stopped before
/// returning, whatever the outcome.
pub async fn get_cloud_config<C, S>(
    cluster: &C,
    namespace: &str,
    node_group: &str,
    progress: S,
) -> Result<String, NgcError>
where
    C: ClusterApi + ?Sized,
    S: ProgressSource + 'static,
{
    let label = format!("Waiting for {} cloud config", node_group);
    let secret_name = bootstrap_secret_name(node_group);
    let secret_name = secret_name.as_str();

    info!("Waiting for bootstrap secret {}/{}", namespace, secret_name);
    let streamer = ProgressStreamer::spawn(progress, DEFAULT_FETCH_PAUSE, |line: &str| {
        info!(target: "ngc::progress", "{}", line);
    });

    let result = retry::run(&label, &CLOUD_CONFIG_POLICY, || async move {
        let data = cluster.get_secret(namespace, secret_name).await?;
        let payload = data
            .get(CLOUD_CONFIG_KEY)
            .ok_or_else(|| NgcError::MissingSecretKey {
                secret: secret_name.to_string(),
                key: CLOUD_CONFIG_KEY.to_string(),
            })?;
        Ok::<_, NgcError>(STANDARD.encode(payload))
    })
    .await;

    streamer.stop().await;

    let cloud_config = result?;
    info!("Cloud configuration found!");
    Ok(cloud_config)
}
