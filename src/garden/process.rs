// ABOUTME: One requested execution inside a running container.
// ABOUTME: The runtime process is created lazily on the first wait.

use super::error::{EngineSnafu, GardenError, MultiError};
use crate::runtime::{ProcessIo, ProcessSpec, RuntimeProcess, Signal, Task};
use crate::types::ExecId;
use parking_lot::Mutex;
use snafu::ResultExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Terminal result of a process run.
#[derive(Debug, Clone)]
struct Outcome {
    /// Absent when the process never reported an exit status.
    code: Option<i32>,
    causes: MultiError,
}

enum ProcessState {
    /// Spec resolved; nothing exists in the runtime yet.
    Built,
    /// A runner owns the runtime process and publishes the outcome here.
    Running(watch::Receiver<Option<Outcome>>),
}

impl ProcessState {
    fn name(&self) -> &'static str {
        match self {
            ProcessState::Built => "built",
            ProcessState::Running(outcome) => match &*outcome.borrow() {
                None => "started",
                Some(Outcome {
                    code: Some(_),
                    causes,
                }) if causes.is_empty() => "exited",
                Some(_) => "failed",
            },
        }
    }
}

pub struct Process {
    id: ExecId,
    role: String,
    spec: ProcessSpec,
    task: Arc<dyn Task>,
    io: Mutex<Option<ProcessIo>>,
    state: Mutex<ProcessState>,
    runtime: Arc<Mutex<Option<Arc<dyn RuntimeProcess>>>>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state.lock().name())
            .finish()
    }
}

impl Process {
    pub(crate) fn new(
        id: ExecId,
        role: &str,
        spec: ProcessSpec,
        task: Arc<dyn Task>,
        io: ProcessIo,
    ) -> Self {
        Self {
            id,
            role: role.to_string(),
            spec,
            task,
            io: Mutex::new(Some(io)),
            state: Mutex::new(ProcessState::Built),
            runtime: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &ExecId {
        &self.id
    }

    /// Pod role whose task runs this process.
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Deliver a signal. Fails with `NotStarted` until `wait` has created
    /// the runtime process.
    pub async fn signal(&self, signal: Signal) -> Result<(), GardenError> {
        let Some(process) = self.runtime.lock().clone() else {
            return Err(GardenError::NotStarted {
                id: self.id.to_string(),
            });
        };

        tracing::debug!("signalling process {} with {:?}", self.id, signal);
        process.kill(signal).await.context(EngineSnafu {
            operation: format!("failed to signal process {}", self.id),
        })
    }

    /// Create and start the runtime process on first call, then block until
    /// it exits. Every caller, concurrent or later, sees the same outcome.
    ///
    /// The process runs on its own task: dropping this future stops waiting
    /// but the process is still reaped and its outcome recorded.
    ///
    /// A failed run still carries the exit code when the process reported
    /// one; see [`GardenError::exit_code`].
    pub async fn wait(&self) -> Result<i32, GardenError> {
        let mut outcome = {
            let mut state = self.state.lock();
            match &*state {
                ProcessState::Running(outcome) => outcome.clone(),
                ProcessState::Built => {
                    let (tx, rx) = watch::channel(None);
                    let runner = Runner {
                        id: self.id.clone(),
                        role: self.role.clone(),
                        spec: self.spec.clone(),
                        task: Arc::clone(&self.task),
                        runtime: Arc::clone(&self.runtime),
                    };
                    let io = self.io.lock().take().unwrap_or_default();
                    tokio::spawn(async move {
                        let outcome = runner.run(io).await;
                        tx.send_replace(Some(outcome));
                    });
                    *state = ProcessState::Running(rx.clone());
                    rx
                }
            }
        };

        let finished = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone());
        let outcome = finished.unwrap_or_else(|| {
            let mut causes = MultiError::new();
            causes.push("process runner stopped without an outcome");
            Outcome { code: None, causes }
        });

        match outcome {
            Outcome {
                code: Some(code),
                causes,
            } if causes.is_empty() => Ok(code),
            Outcome { code, causes } => Err(GardenError::ProcessFailed {
                id: self.id.to_string(),
                exit_code: code,
                source: causes,
            }),
        }
    }
}

/// Owns one run of the process from exec to delete.
struct Runner {
    id: ExecId,
    role: String,
    spec: ProcessSpec,
    task: Arc<dyn Task>,
    runtime: Arc<Mutex<Option<Arc<dyn RuntimeProcess>>>>,
}

impl Runner {
    async fn run(self, io: ProcessIo) -> Outcome {
        let mut causes = MultiError::new();

        let process = match self.task.exec(&self.id, &self.spec, io).await {
            Ok(process) => process,
            Err(e) => {
                causes.push(format!("exec: {}", e));
                tracing::warn!("process {} failed: {}", self.id, causes);
                return Outcome { code: None, causes };
            }
        };
        *self.runtime.lock() = Some(Arc::clone(&process));
        tracing::info!("process {} started in {} task {}", self.id, self.role, self.task.id());

        let mut code = None;
        match process.start().await {
            Ok(()) => match process.wait().await {
                Ok(status) => {
                    code = Some(status.code);
                    if let Some(error) = status.error {
                        causes.push(error);
                    }
                }
                Err(e) => causes.push(format!("wait: {}", e)),
            },
            Err(e) => causes.push(format!("start: {}", e)),
        }

        // Daemonised children can hold output open past the main command.
        if let Err(e) = process.close_io().await {
            causes.push(format!("close io: {}", e));
        }
        if let Err(e) = process.delete().await {
            tracing::warn!("failed to delete process {}: {}", self.id, e);
        }

        match code {
            Some(code) if causes.is_empty() => {
                tracing::info!("process {} exited with {}", self.id, code)
            }
            _ => tracing::warn!("process {} failed (exit code {:?}): {}", self.id, code, causes),
        }
        Outcome { code, causes }
    }
}
