// ABOUTME: Reads the node agent's stats summary and converts it to usage samples.
// ABOUTME: Only the "app" role's container stats are reported per pod.

use super::{ContainerMetrics, MetricsSource, TelemetryError};
use crate::http::Endpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::Method;
use serde::Deserialize;
use std::collections::HashMap;

const SUMMARY_PATH: &str = "/stats/summary";
const APP_CONTAINER: &str = "app";

/// The subset of the node stats summary this crate reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub pods: Vec<PodStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStats {
    pub pod_ref: PodReference,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub containers: Vec<ContainerStats>,
    #[serde(default)]
    pub network: Option<NetworkStats>,
    #[serde(default, rename = "ephemeral-storage")]
    pub ephemeral_storage: Option<FsStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStats {
    pub name: String,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub usage_core_nano_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub working_set_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsStats {
    pub used_bytes: Option<u64>,
}

/// Convert a summary into samples for the requested handles, measured at `now`.
///
/// Pods that are not requested, or that lack an "app" container, are skipped.
/// Missing counters are reported as zero.
pub fn to_container_metrics(
    summary: &Summary,
    handles: &[String],
    now: DateTime<Utc>,
) -> HashMap<String, ContainerMetrics> {
    let mut out = HashMap::with_capacity(handles.len());

    for pod in &summary.pods {
        let name = &pod.pod_ref.name;
        if !handles.iter().any(|h| h == name) {
            tracing::trace!("skipping pod {} not in handle list", name);
            continue;
        }

        let Some(app) = pod.containers.iter().find(|c| c.name == APP_CONTAINER) else {
            tracing::info!("skipping pod {}: no app container stats", name);
            continue;
        };

        let age_nanoseconds = pod
            .start_time
            .and_then(|start| (now - start).num_nanoseconds())
            .map(|ns| ns.max(0) as u64)
            .unwrap_or(0);

        let cpu_nanoseconds = app.cpu.as_ref().and_then(|c| c.usage_core_nano_seconds);
        if cpu_nanoseconds.is_none() {
            tracing::debug!("pod {} has no cpu usage", name);
        }
        let memory_usage_bytes = app.memory.as_ref().and_then(|m| m.working_set_bytes);
        if memory_usage_bytes.is_none() {
            tracing::debug!("pod {} has no memory usage", name);
        }
        let disk_usage_bytes = pod.ephemeral_storage.as_ref().and_then(|d| d.used_bytes);
        if disk_usage_bytes.is_none() {
            tracing::debug!("pod {} has no ephemeral storage usage", name);
        }

        out.insert(
            name.clone(),
            ContainerMetrics {
                memory_usage_bytes: memory_usage_bytes.unwrap_or(0),
                disk_usage_bytes: disk_usage_bytes.unwrap_or(0),
                cpu_nanoseconds: cpu_nanoseconds.unwrap_or(0),
                age_nanoseconds,
                rx_bytes: pod.network.as_ref().and_then(|n| n.rx_bytes),
                tx_bytes: pod.network.as_ref().and_then(|n| n.tx_bytes),
            },
        );
    }

    out
}

/// Telemetry client for the node agent's read-only stats endpoint.
#[derive(Debug, Clone)]
pub struct KubeletClient {
    endpoint: Endpoint,
}

impl KubeletClient {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            endpoint: Endpoint::from_host_port(address, port),
        }
    }

    pub async fn summary(&self) -> Result<Summary, TelemetryError> {
        let resp = self
            .endpoint
            .send(Method::GET, SUMMARY_PATH, None)
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        if !resp.status.is_success() {
            return Err(TelemetryError::Status(resp.status.as_u16()));
        }

        serde_json::from_slice(&resp.body).map_err(|e| TelemetryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MetricsSource for KubeletClient {
    async fn metrics(
        &self,
        handles: &[String],
    ) -> Result<HashMap<String, ContainerMetrics>, TelemetryError> {
        let summary = self.summary().await?;
        Ok(to_container_metrics(&summary, handles, Utc::now()))
    }
}
