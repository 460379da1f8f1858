// ABOUTME: Task engine trait: liveness, image pull/delete, and task loading.
// ABOUTME: The node-side half of sandbox execution, behind a cluster pod.

use super::shared_types::{PulledImage, RegistryAuth};
use super::task::Task;
use crate::cluster::ContainerStatus;
use crate::types::{ImageId, ImageRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Runtime task handles keyed by role name ("app", "sidecar").
pub type TaskMap = HashMap<String, Arc<dyn Task>>;

/// Image and task operations against the node's runtime.
#[async_trait]
pub trait TaskEngine: Send + Sync {
    /// Whether the runtime daemon is up and answering.
    async fn is_serving(&self) -> bool;

    /// Pull an image and report its unpacked size.
    async fn pull(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<PulledImage, EngineError>;

    async fn delete_image(&self, id: &ImageId) -> Result<(), EngineError>;

    /// Resolve a task handle for every container status that carries a
    /// runtime id. Statuses without one are skipped.
    async fn load_tasks(&self, statuses: &[ContainerStatus]) -> Result<TaskMap, EngineError>;
}

/// Errors from the runtime engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("runtime is not serving: {0}")]
    NotServing(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("exec failed: {0}")]
    ExecFailed(String),

    #[error("I/O failed: {0}")]
    Io(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
