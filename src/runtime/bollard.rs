// ABOUTME: Bollard-based task engine over the node's Docker-compatible socket.
// ABOUTME: Pulls and sizes images, resolves role tasks, and bridges exec I/O.

use crate::cluster::ContainerStatus;
use crate::runtime::traits::{
    EngineError, ExitStatus, ProcessIo, ProcessSpec, PulledImage, RegistryAuth, RuntimeProcess,
    Signal, Task, TaskEngine, TaskMap,
};
use crate::types::{ContainerId, ExecId, ImageId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::query_parameters::{CreateImageOptions, InspectContainerOptions, RemoveImageOptions};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;

const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> EngineError {
    EngineError::PullFailed(format!("{}: {}", image_name, e))
}

fn map_image_error(e: bollard::errors::Error, image_name: &str) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            EngineError::ImageNotFound(image_name.to_string())
        }
        _ => EngineError::Runtime(format!("{}: {}", image_name, e)),
    }
}

fn map_task_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => EngineError::TaskNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => EngineError::ExecFailed(message.clone()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_exec_not_found_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => EngineError::ProcessNotFound(message.clone()),
        _ => EngineError::Runtime(e.to_string()),
    }
}

fn map_io_error(e: std::io::Error) -> EngineError {
    EngineError::Io(e.to_string())
}

/// Observed container ids carry the runtime as a URI scheme.
fn strip_runtime_scheme(container_id: &str) -> &str {
    container_id
        .split_once("://")
        .map(|(_, id)| id)
        .unwrap_or(container_id)
}

// =============================================================================
// BollardEngine
// =============================================================================

/// Task engine talking to the node runtime through bollard.
pub struct BollardEngine {
    client: Docker,
}

impl BollardEngine {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the runtime's unix socket.
    pub fn connect(socket_path: &str) -> Result<Self, EngineError> {
        let client = Docker::connect_with_unix(socket_path, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| EngineError::NotServing(e.to_string()))?;
        Ok(Self::new(client))
    }

    async fn load_task(&self, container_id: &str) -> Result<BollardTask, EngineError> {
        let details = self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(map_task_error)?;

        let pid = details
            .state
            .as_ref()
            .and_then(|s| s.pid)
            .filter(|pid| *pid > 0)
            .ok_or_else(|| EngineError::TaskNotFound(format!("{} is not running", container_id)))?;

        Ok(BollardTask {
            client: self.client.clone(),
            id: ContainerId::new(container_id),
            pid: pid as u32,
        })
    }
}

#[async_trait]
impl TaskEngine for BollardEngine {
    async fn is_serving(&self) -> bool {
        match self.client.ping().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("runtime ping failed: {}", e);
                false
            }
        }
    }

    async fn pull(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<PulledImage, EngineError> {
        let image_name = reference.qualified();

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: reference.registry().map(str::to_string),
            ..Default::default()
        });

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, &image_name))?;
        }

        let details = self
            .client
            .inspect_image(&image_name)
            .await
            .map_err(|e| map_image_error(e, &image_name))?;

        let id = details
            .id
            .ok_or_else(|| EngineError::Runtime(format!("{} has no image id", image_name)))?;

        tracing::debug!("pulled {} ({})", image_name, id);

        Ok(PulledImage {
            name: image_name,
            id: ImageId::new(id),
            size: details.size.unwrap_or(0).max(0) as u64,
            env: details.config.and_then(|c| c.env).unwrap_or_default(),
        })
    }

    async fn delete_image(&self, id: &ImageId) -> Result<(), EngineError> {
        let opts = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        self.client
            .remove_image(id.as_str(), Some(opts), None)
            .await
            .map_err(|e| map_image_error(e, id.as_str()))?;

        Ok(())
    }

    async fn load_tasks(&self, statuses: &[ContainerStatus]) -> Result<TaskMap, EngineError> {
        let mut tasks = TaskMap::new();
        for status in statuses {
            let Some(container_id) = status.container_id.as_deref() else {
                continue;
            };
            let task = self.load_task(strip_runtime_scheme(container_id)).await?;
            tracing::debug!("loaded task {} for role {}", task.id, status.name);
            tasks.insert(status.name.clone(), Arc::new(task) as Arc<dyn Task>);
        }
        Ok(tasks)
    }
}

// =============================================================================
// Tasks and processes
// =============================================================================

struct BollardTask {
    client: Docker,
    id: ContainerId,
    pid: u32,
}

#[async_trait]
impl Task for BollardTask {
    fn id(&self) -> &ContainerId {
        &self.id
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    async fn exec(
        &self,
        exec_id: &ExecId,
        spec: &ProcessSpec,
        io: ProcessIo,
    ) -> Result<Arc<dyn RuntimeProcess>, EngineError> {
        let opts = bollard::models::ExecConfig {
            cmd: Some(spec.args.clone()),
            env: Some(spec.env.clone()),
            working_dir: Some(spec.cwd.clone()),
            user: Some(format!("{}:{}", spec.user.uid, spec.user.gid)),
            attach_stdin: Some(io.stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            privileged: Some(false),
            ..Default::default()
        };

        let response = self
            .client
            .create_exec(self.id.as_str(), opts)
            .await
            .map_err(map_task_error)?;

        tracing::debug!("created exec {} ({}) in {}", exec_id, response.id, self.id);

        Ok(Arc::new(BollardProcess {
            client: self.client.clone(),
            id: exec_id.clone(),
            instance: response.id,
            io: Mutex::new(Some(io)),
            bridge: Mutex::new(None),
        }))
    }
}

struct BollardProcess {
    client: Docker,
    id: ExecId,
    /// The runtime's own exec instance id.
    instance: String,
    io: Mutex<Option<ProcessIo>>,
    bridge: Mutex<Option<JoinHandle<Result<(), EngineError>>>>,
}

impl BollardProcess {
    async fn host_pid(&self) -> Result<i32, EngineError> {
        let details = self
            .client
            .inspect_exec(&self.instance)
            .await
            .map_err(map_exec_not_found_error)?;

        details
            .pid
            .filter(|pid| *pid > 0)
            .map(|pid| pid as i32)
            .ok_or_else(|| EngineError::ProcessNotFound(self.id.to_string()))
    }
}

/// Pump the caller's stdin into the exec and split its output stream into
/// the caller's writers until the runtime closes the stream.
async fn bridge_io(
    mut output: std::pin::Pin<
        Box<dyn futures::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send>,
    >,
    mut input: std::pin::Pin<Box<dyn tokio::io::AsyncWrite + Send>>,
    io: ProcessIo,
) -> Result<(), EngineError> {
    let ProcessIo {
        stdin,
        stdout,
        stderr,
    } = io;

    let pump_in = async move {
        if let Some(mut reader) = stdin {
            if let Err(e) = tokio::io::copy(&mut reader, &mut input).await {
                tracing::debug!("stdin copy ended: {}", e);
            }
        }
        let _ = input.shutdown().await;
    };

    let pump_out = async move {
        let mut stdout = stdout.map(BufWriter::new);
        let mut stderr = stderr.map(BufWriter::new);

        while let Some(item) = output.next().await {
            match item.map_err(|e| EngineError::Io(e.to_string()))? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    if let Some(w) = stdout.as_mut() {
                        w.write_all(&message).await.map_err(map_io_error)?;
                    }
                }
                LogOutput::StdErr { message } => {
                    if let Some(w) = stderr.as_mut() {
                        w.write_all(&message).await.map_err(map_io_error)?;
                    }
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        if let Some(w) = stdout.as_mut() {
            w.flush().await.map_err(map_io_error)?;
        }
        if let Some(w) = stderr.as_mut() {
            w.flush().await.map_err(map_io_error)?;
        }
        Ok(())
    };

    let ((), result) = tokio::join!(pump_in, pump_out);
    result
}

#[async_trait]
impl RuntimeProcess for BollardProcess {
    fn id(&self) -> &ExecId {
        &self.id
    }

    async fn start(&self) -> Result<(), EngineError> {
        let io = self
            .io
            .lock()
            .take()
            .ok_or_else(|| EngineError::ExecFailed(format!("{} already started", self.id)))?;

        let opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let result = self
            .client
            .start_exec(&self.instance, Some(opts))
            .await
            .map_err(map_exec_not_found_error)?;

        match result {
            StartExecResults::Attached { output, input } => {
                let handle = tokio::spawn(bridge_io(output, input, io));
                *self.bridge.lock() = Some(handle);
                Ok(())
            }
            StartExecResults::Detached => Err(EngineError::ExecFailed(format!(
                "{} started detached",
                self.id
            ))),
        }
    }

    async fn wait(&self) -> Result<ExitStatus, EngineError> {
        loop {
            let details = self
                .client
                .inspect_exec(&self.instance)
                .await
                .map_err(map_exec_not_found_error)?;

            // An exec that has not begun yet reports neither running nor an exit code.
            if !details.running.unwrap_or(false) {
                if let Some(code) = details.exit_code {
                    return Ok(ExitStatus::code(code as i32));
                }
            }

            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    }

    async fn kill(&self, signal: Signal) -> Result<(), EngineError> {
        let pid = self.host_pid().await?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal.platform())
            .map_err(|e| EngineError::Runtime(format!("failed to signal {}: {}", self.id, e)))
    }

    async fn close_io(&self) -> Result<(), EngineError> {
        let handle = self.bridge.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| EngineError::Io(format!("I/O bridge for {} failed: {}", self.id, e)))?,
            None => Ok(()),
        }
    }

    async fn delete(&self) -> Result<(), EngineError> {
        // The runtime garbage-collects finished exec instances itself.
        if let Some(handle) = self.bridge.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}
