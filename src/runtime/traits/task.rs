// ABOUTME: Task and process traits for executing inside a running sandbox.
// ABOUTME: A Task is one role's container; a RuntimeProcess is one exec in it.

use super::engine::EngineError;
use super::shared_types::{ExitStatus, ProcessIo, ProcessSpec, Signal};
use crate::types::{ContainerId, ExecId};
use async_trait::async_trait;
use std::sync::Arc;

/// A running container of one pod role.
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> &ContainerId;

    /// Host pid of the task's init process.
    fn pid(&self) -> u32;

    /// Create (but do not start) a process in this task.
    async fn exec(
        &self,
        exec_id: &ExecId,
        spec: &ProcessSpec,
        io: ProcessIo,
    ) -> Result<Arc<dyn RuntimeProcess>, EngineError>;
}

/// One process created through `Task::exec`.
#[async_trait]
pub trait RuntimeProcess: Send + Sync {
    fn id(&self) -> &ExecId;

    async fn start(&self) -> Result<(), EngineError>;

    /// Resolves once the process has exited.
    async fn wait(&self) -> Result<ExitStatus, EngineError>;

    async fn kill(&self, signal: Signal) -> Result<(), EngineError>;

    /// Drain buffered output and release the caller's streams.
    async fn close_io(&self) -> Result<(), EngineError>;

    /// Release the runtime's process resource.
    async fn delete(&self) -> Result<(), EngineError>;
}
