// ABOUTME: Error types for the container-lifecycle API with SNAFU context selectors.
// ABOUTME: GardenError wraps collaborator failures; MultiError joins several causes.

use crate::cluster::ClusterError;
use crate::identity::IdentityError;
use crate::properties::NoSuchProperty;
use crate::runtime::EngineError;
use crate::stream::CopyError;
use crate::telemetry::TelemetryError;
use snafu::Snafu;
use std::fmt;

/// Several causes reported as one error, one message per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError {
    causes: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cause: impl fmt::Display) {
        self.causes.push(cause.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.causes.join("\n"))
    }
}

impl std::error::Error for MultiError {}

/// Errors returned by the container-lifecycle API.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GardenError {
    #[snafu(display("Handle '{handle}' already in use"))]
    AlreadyExists { handle: String },

    #[snafu(display("unknown handle: {handle}"))]
    NotFound { handle: String },

    #[snafu(display("{source}"))]
    PropertyNotFound { source: NoSuchProperty },

    #[snafu(display(
        "insufficient host ports: requested {requested}, {available} available"
    ))]
    ResourceExhausted { requested: usize, available: usize },

    #[snafu(display("{source}"))]
    DiskLimitExceeded { source: MultiError },

    #[snafu(display("timed out waiting for pod to be running"))]
    CreateTimeout { handle: String },

    #[snafu(display("timed out waiting for pod {handle} to be deleted"))]
    DeleteTimeout { handle: String },

    #[snafu(display("get user {user:?}: {source}"))]
    UserLookupFailed { user: String, source: IdentityError },

    #[snafu(display("{direction}: nstar: {source}"))]
    StreamFailed {
        direction: &'static str,
        source: CopyError,
    },

    #[snafu(display("failed to get container {handle} for metrics"))]
    ContainerNotFound { handle: String },

    #[snafu(display("container {handle} has no {role} task attached"))]
    TasksNotAttached { handle: String, role: String },

    #[snafu(display("process {id} has not been started"))]
    NotStarted { id: String },

    #[snafu(display("process {id} failed:\n{source}"))]
    ProcessFailed {
        id: String,
        /// Exit code, when the process reported one.
        exit_code: Option<i32>,
        source: MultiError,
    },

    #[snafu(display("{operation} is not implemented"))]
    Unsupported { operation: &'static str },

    #[snafu(display("invalid container spec: {message}"))]
    InvalidSpec { message: String },

    #[snafu(display("{operation}: {source}"))]
    Cluster {
        operation: String,
        source: ClusterError,
    },

    #[snafu(display("{operation}: {source}"))]
    Engine {
        operation: String,
        source: EngineError,
    },

    #[snafu(display("failed to get metrics: {source}"))]
    Telemetry { source: TelemetryError },

    #[snafu(display("runtime is not serving"))]
    NotServing,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GardenErrorKind {
    AlreadyExists,
    NotFound,
    PropertyNotFound,
    ResourceExhausted,
    DiskLimitExceeded,
    CreateTimeout,
    DeleteTimeout,
    UserLookupFailed,
    StreamFailed,
    ContainerNotFound,
    TasksNotAttached,
    NotStarted,
    ProcessFailed,
    Unsupported,
    InvalidSpec,
    Cluster,
    Engine,
    Telemetry,
    NotServing,
}

impl GardenError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> GardenErrorKind {
        match self {
            GardenError::AlreadyExists { .. } => GardenErrorKind::AlreadyExists,
            GardenError::NotFound { .. } => GardenErrorKind::NotFound,
            GardenError::PropertyNotFound { .. } => GardenErrorKind::PropertyNotFound,
            GardenError::ResourceExhausted { .. } => GardenErrorKind::ResourceExhausted,
            GardenError::DiskLimitExceeded { .. } => GardenErrorKind::DiskLimitExceeded,
            GardenError::CreateTimeout { .. } => GardenErrorKind::CreateTimeout,
            GardenError::DeleteTimeout { .. } => GardenErrorKind::DeleteTimeout,
            GardenError::UserLookupFailed { .. } => GardenErrorKind::UserLookupFailed,
            GardenError::StreamFailed { .. } => GardenErrorKind::StreamFailed,
            GardenError::ContainerNotFound { .. } => GardenErrorKind::ContainerNotFound,
            GardenError::TasksNotAttached { .. } => GardenErrorKind::TasksNotAttached,
            GardenError::NotStarted { .. } => GardenErrorKind::NotStarted,
            GardenError::ProcessFailed { .. } => GardenErrorKind::ProcessFailed,
            GardenError::Unsupported { .. } => GardenErrorKind::Unsupported,
            GardenError::InvalidSpec { .. } => GardenErrorKind::InvalidSpec,
            GardenError::Cluster { .. } => GardenErrorKind::Cluster,
            GardenError::Engine { .. } => GardenErrorKind::Engine,
            GardenError::Telemetry { .. } => GardenErrorKind::Telemetry,
            GardenError::NotServing => GardenErrorKind::NotServing,
        }
    }

    /// Exit code a failed process still reported.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GardenError::ProcessFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}
