// ABOUTME: Node telemetry seam: point-in-time usage samples keyed by sandbox name.
// ABOUTME: MetricsSource trait plus the node stats summary implementation.

mod kubelet;

pub use kubelet::{KubeletClient, Summary, to_container_metrics};

use async_trait::async_trait;
use std::collections::HashMap;

/// One usage sample for a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerMetrics {
    pub memory_usage_bytes: u64,
    pub disk_usage_bytes: u64,
    pub cpu_nanoseconds: u64,
    /// Time since the sandbox started, at sampling time.
    pub age_nanoseconds: u64,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
}

/// Source of usage samples.
///
/// Implementations may return entries for handles that were not asked for.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn metrics(
        &self,
        handles: &[String],
    ) -> Result<HashMap<String, ContainerMetrics>, TelemetryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("request failed, status: {0}")]
    Status(u16),

    #[error("failed to decode summary: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),
}
