// ABOUTME: Per-sandbox facade joining the cached pod, role tasks, and properties.
// ABOUTME: Runs processes, streams files, and exposes info and property access.

use super::error::{GardenError, PropertyNotFoundSnafu, StreamFailedSnafu, UserLookupFailedSnafu};
use super::pod_builder::{APP_ROLE, SIDECAR_ROLE};
use super::process::Process;
use super::spec::{
    ContainerInfo, Limits, Metrics, NetOutRule, PortMapping, ProcessRequest, StreamInSpec,
    StreamOutSpec,
};
use crate::cluster::Pod;
use crate::identity::{UserLookup, process_root};
use crate::properties::{Properties, PropertyManager};
use crate::runtime::{BoxedReader, ProcessIo, ProcessSpec, ProcessUser, Task, TaskMap};
use crate::stream::BulkCopy;
use crate::types::ExecId;
use parking_lot::RwLock;
use snafu::ResultExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const STATE_PROPERTY: &str = "garden.state";
pub const STATE_CREATED: &str = "created";
pub const STATE_ALL: &str = "all";
pub const GRACE_TIME_PROPERTY: &str = "garden.grace-time";

const ROOT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const USER_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Bounding and inheritable capabilities of every process.
pub const CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_RAW",
    "CAP_SYS_CHROOT",
    "CAP_MKNOD",
    "CAP_AUDIT_WRITE",
    "CAP_SETFCAP",
];

/// Process environment: base, then `USER`, then a default `PATH` when
/// nothing sets one, then the request's own entries.
fn process_env(base: &[String], user: &str, uid: u32, request: &[String]) -> Vec<String> {
    let mut env = base.to_vec();
    if !user.is_empty() {
        env.push(format!("USER={}", user));
    }
    let has_path = env.iter().chain(request).any(|e| e.starts_with("PATH="));
    if !has_path {
        let path = if uid == 0 { ROOT_PATH } else { USER_PATH };
        env.push(format!("PATH={}", path));
    }
    env.extend(request.iter().cloned());
    env
}

/// Shared collaborators every container uses.
#[derive(Clone)]
pub(crate) struct ContainerDeps {
    pub properties: Arc<PropertyManager>,
    pub users: Arc<dyn UserLookup>,
    pub copier: Arc<dyn BulkCopy>,
}

pub struct Container {
    handle: String,
    pod: RwLock<Pod>,
    env: Vec<String>,
    cpu_share: f64,
    rootfs_size: u64,
    tasks: RwLock<TaskMap>,
    deps: ContainerDeps,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("handle", &self.handle)
            .field("cpu_share", &self.cpu_share)
            .field("rootfs_size", &self.rootfs_size)
            .field("tasks", &self.tasks.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Container {
    pub(crate) fn new(
        pod: Pod,
        env: Vec<String>,
        cpu_share: f64,
        rootfs_size: u64,
        deps: ContainerDeps,
    ) -> Self {
        Self {
            handle: pod.name().to_string(),
            pod: RwLock::new(pod),
            env,
            cpu_share,
            rootfs_size,
            tasks: RwLock::new(TaskMap::new()),
            deps,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Cached view of the pod; may be stale.
    pub fn pod(&self) -> Pod {
        self.pod.read().clone()
    }

    pub(crate) fn update_pod(&self, pod: Pod) {
        *self.pod.write() = pod;
    }

    pub fn env(&self) -> &[String] {
        &self.env
    }

    pub fn cpu_share(&self) -> f64 {
        self.cpu_share
    }

    pub fn rootfs_size(&self) -> u64 {
        self.rootfs_size
    }

    pub(crate) fn attach_tasks(&self, tasks: TaskMap) {
        *self.tasks.write() = tasks;
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.read().is_empty()
    }

    fn task(&self, role: &str) -> Result<Arc<dyn Task>, GardenError> {
        self.tasks
            .read()
            .get(role)
            .cloned()
            .ok_or_else(|| GardenError::TasksNotAttached {
                handle: self.handle.clone(),
                role: role.to_string(),
            })
    }

    /// State is always "active".
    pub fn info(&self) -> ContainerInfo {
        let pod = self.pod.read();
        let mapped_ports = pod
            .spec
            .containers
            .iter()
            .flat_map(|c| c.ports.iter())
            .map(|p| PortMapping {
                host_port: p.host_port.unwrap_or(0),
                container_port: p.container_port,
            })
            .collect();

        ContainerInfo {
            state: "active".to_string(),
            host_ip: pod.status.host_ip.clone(),
            container_ip: pod.status.pod_ip.clone(),
            external_ip: pod.status.host_ip.clone(),
            mapped_ports,
        }
    }

    /// Resolve a process against the role's task. Nothing runs until
    /// `Process::wait`.
    pub async fn run(&self, request: ProcessRequest, io: ProcessIo) -> Result<Process, GardenError> {
        let role = if request.image.is_empty() {
            APP_ROLE
        } else {
            SIDECAR_ROLE
        };
        let task = self.task(role)?;

        let user = self
            .deps
            .users
            .lookup(&process_root(task.pid()), &request.user)
            .await
            .context(UserLookupFailedSnafu {
                user: request.user.clone(),
            })?;

        let cwd = if request.dir.is_empty() {
            user.home.clone()
        } else {
            request.dir.clone()
        };

        let mut args = Vec::with_capacity(request.args.len() + 1);
        args.push(request.path.clone());
        args.extend(request.args.iter().cloned());

        let spec = ProcessSpec {
            args,
            env: process_env(&self.env, &request.user, user.uid, &request.env),
            cwd,
            user: ProcessUser {
                uid: user.uid,
                gid: user.gid,
                username: request.user.clone(),
            },
            capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        };

        let id = request
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::info!(handle = %self.handle, role, "running process {} ({})", id, request.path);
        Ok(Process::new(ExecId::new(id), role, spec, task, io))
    }

    pub async fn stream_in(&self, spec: StreamInSpec) -> Result<(), GardenError> {
        let pid = self.task(APP_ROLE)?.pid();
        tracing::info!(handle = %self.handle, "stream-in to {} as {}", spec.path, spec.user);

        self.deps
            .copier
            .stream_in(pid, &spec.path, &spec.user, spec.tar)
            .await
            .context(StreamFailedSnafu {
                direction: "stream-in",
            })
    }

    pub async fn stream_out(&self, spec: StreamOutSpec) -> Result<BoxedReader, GardenError> {
        let pid = self.task(APP_ROLE)?.pid();
        tracing::info!(handle = %self.handle, "stream-out of {} as {}", spec.path, spec.user);

        self.deps
            .copier
            .stream_out(pid, &spec.path, &spec.user)
            .await
            .context(StreamFailedSnafu {
                direction: "stream-out",
            })
    }

    pub fn properties(&self) -> Properties {
        self.deps.properties.all(&self.handle)
    }

    pub fn property(&self, name: &str) -> Result<String, GardenError> {
        self.deps
            .properties
            .get(&self.handle, name)
            .ok_or_else(|| crate::properties::NoSuchProperty {
                name: name.to_string(),
            })
            .context(PropertyNotFoundSnafu)
    }

    pub fn set_property(&self, name: &str, value: &str) {
        self.deps.properties.set(&self.handle, name, value);
    }

    /// Succeeds whether or not the property existed.
    pub fn remove_property(&self, name: &str) {
        let _ = self.deps.properties.remove(&self.handle, name);
    }

    /// Recorded as nanoseconds; not enforced.
    pub fn set_grace_time(&self, grace: Duration) {
        self.set_property(GRACE_TIME_PROPERTY, &grace.as_nanos().to_string());
    }

    pub fn attach(&self, _process_id: &str, _io: ProcessIo) -> Result<Process, GardenError> {
        Err(GardenError::Unsupported { operation: "attach" })
    }

    pub fn bulk_net_out(&self, _rules: &[NetOutRule]) -> Result<(), GardenError> {
        Err(GardenError::Unsupported {
            operation: "bulk net out",
        })
    }

    pub fn net_out(&self, _rule: &NetOutRule) -> Result<(), GardenError> {
        Err(GardenError::Unsupported {
            operation: "net out",
        })
    }

    pub fn net_in(&self, _host_port: u16, _container_port: u16) -> Result<PortMapping, GardenError> {
        Err(GardenError::Unsupported { operation: "net in" })
    }

    pub fn current_limits(&self) -> Result<Limits, GardenError> {
        Err(GardenError::Unsupported {
            operation: "current limits",
        })
    }

    pub fn metrics(&self) -> Result<Metrics, GardenError> {
        Err(GardenError::Unsupported {
            operation: "container metrics",
        })
    }

    pub fn stop(&self, _kill: bool) -> Result<(), GardenError> {
        Err(GardenError::Unsupported { operation: "stop" })
    }

    pub fn set_tty(&self, _process_id: &str, _rows: u16, _columns: u16) -> Result<(), GardenError> {
        Err(GardenError::Unsupported {
            operation: "tty resize",
        })
    }
}
