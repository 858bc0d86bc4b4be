//! Controller pod logs as a progress source.
//!
//! While ngc waits for the bootstrap secret, the cluster controller is the
//! component doing the work. Its log is polled incrementally and relayed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::{ListParams, LogParams};

use crate::error::NgcError;
use crate::progress::ProgressSource;

/// Lines taken from the log on the first fetch.
const INITIAL_TAIL_LINES: i64 = 20;

/// Incremental reader of the logs of the first running pod matching a selector.
pub struct PodLogSource {
    pods: Api<Pod>,
    selector: String,
    last_fetch: Option<DateTime<Utc>>,
}

impl PodLogSource {
    pub fn new(client: kube::Client, namespace: &str, selector: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            selector: selector.to_string(),
            last_fetch: None,
        }
    }

    async fn running_pod(&self) -> Result<String, NgcError> {
        let list = self
            .pods
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(|e| NgcError::KubernetesApi(format!("Failed to list Pods: {}", e)))?;

        list.items
            .iter()
            .find(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .and_then(|pod| pod.metadata.name.clone())
            .ok_or_else(|| NgcError::NotFound {
                kind: "Pod".to_string(),
                name: self.selector.clone(),
            })
    }

    fn log_params(&self, now: DateTime<Utc>) -> LogParams {
        match self.last_fetch {
            Some(last) => LogParams {
                since_seconds: Some(seconds_since(last, now)),
                ..Default::default()
            },
            None => LogParams {
                tail_lines: Some(INITIAL_TAIL_LINES),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ProgressSource for PodLogSource {
    async fn fetch(&mut self) -> Result<Vec<String>, NgcError> {
        let pod = self.running_pod().await?;
        let now = Utc::now();
        let params = self.log_params(now);

        let text = self
            .pods
            .logs(&pod, &params)
            .await
            .map_err(|e| NgcError::kube("Pod", &pod, e))?;
        self.last_fetch = Some(now);

        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(format_log_line)
            .collect())
    }
}

/// Whole seconds elapsed since `last`, rounded up and at least one.
///
/// Rounding up may replay a line at the window edge but never skips one.
fn seconds_since(last: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - last).num_milliseconds();
    ((millis + 999) / 1000).max(1)
}

/// Render a controller log line.
///
/// JSON lines become `[module] msg` (or just `msg`); anything else is
/// passed through unchanged.
pub fn format_log_line(line: &str) -> String {
    let Ok(serde_json::Value::Object(entry)) = serde_json::from_str::<serde_json::Value>(line)
    else {
        return line.to_string();
    };

    let Some(msg) = entry.get("msg").and_then(|v| v.as_str()) else {
        return line.to_string();
    };

    match entry.get("module").and_then(|v| v.as_str()) {
        Some(module) => format!("[{}] {}", module, msg),
        None => msg.to_string(),
    }
}
