// ABOUTME: Cluster orchestration API seam and its object model.
// ABOUTME: Defines ClusterApi (pod CRUD + node read) and its HTTP implementation.

mod apiserver;
mod model;
mod quantity;

pub use apiserver::ApiServerClient;
pub use model::*;
pub use quantity::Quantity;

use async_trait::async_trait;

/// Options for deleting a pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// `Some(0)` deletes immediately without a graceful shutdown.
    pub grace_period_seconds: Option<i64>,
}

impl DeleteOptions {
    pub fn immediate() -> Self {
        Self {
            grace_period_seconds: Some(0),
        }
    }
}

/// Field and label selectors for listing pods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSelector {
    /// e.g. `metadata.name=h1`
    pub field: Option<String>,
    /// e.g. `cloudfoundry.org/owner-name=executor`
    pub label: Option<String>,
}

impl ListSelector {
    pub fn by_name(name: &str) -> Self {
        Self {
            field: Some(format!("metadata.name={}", name)),
            label: None,
        }
    }
}

/// Object CRUD against the cluster.
///
/// Reads are eventually consistent: a pod returned by `create_pod` may not
/// reflect status changes on the next `get_pod`.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError>;

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        opts: DeleteOptions,
    ) -> Result<(), ClusterError>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &ListSelector,
    ) -> Result<Vec<Pod>, ClusterError>;
}

/// Errors from cluster API calls.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode cluster response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
