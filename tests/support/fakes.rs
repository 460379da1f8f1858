// ABOUTME: In-memory fakes of every garden collaborator.
// ABOUTME: Cluster, runtime engine, telemetry, user lookup, and bulk copy.

use async_trait::async_trait;
use parking_lot::Mutex;
use podgarden::cluster::{
    ClusterApi, ClusterError, ContainerStatus, DeleteOptions, ListSelector, Node, NodeStatus,
    Pod, PodPhase, Quantity, RESOURCE_CPU, RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY,
    RESOURCE_PODS,
};
use podgarden::config::GardenConfig;
use podgarden::garden::{Collaborators, GardenClient, GardenError};
use podgarden::identity::{ExecUser, IdentityError, UserLookup};
use podgarden::runtime::{
    BoxedReader, EngineError, ExitStatus, ProcessIo, ProcessSpec, PulledImage, RegistryAuth,
    RuntimeProcess, Signal, Task, TaskEngine, TaskMap,
};
use podgarden::stream::{BulkCopy, CopyError};
use podgarden::telemetry::{ContainerMetrics, MetricsSource, TelemetryError};
use podgarden::types::{ContainerId, ExecId, ImageId, ImageRef};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub const GIB: u64 = 1024 * 1024 * 1024;
pub const TASK_PID: u32 = 4242;

/// 4 cores, 8 GiB, 100 GiB disk, 110 pods.
pub fn node(name: &str) -> Node {
    let capacity = BTreeMap::from([
        (RESOURCE_CPU.to_string(), Quantity::new("4")),
        (RESOURCE_MEMORY.to_string(), Quantity::new("8Gi")),
        (RESOURCE_EPHEMERAL_STORAGE.to_string(), Quantity::new("100Gi")),
        (RESOURCE_PODS.to_string(), Quantity::new("110")),
    ]);
    let allocatable = BTreeMap::from([
        (RESOURCE_CPU.to_string(), Quantity::new("3800m")),
        (RESOURCE_MEMORY.to_string(), Quantity::new("7Gi")),
        (RESOURCE_EPHEMERAL_STORAGE.to_string(), Quantity::new("90Gi")),
        (RESOURCE_PODS.to_string(), Quantity::new("110")),
    ]);

    let mut node = Node {
        status: NodeStatus {
            capacity,
            allocatable,
        },
        ..Default::default()
    };
    node.metadata.name = name.to_string();
    node
}

/// Mark a pod running with one observed runtime container per role.
pub fn mark_running(pod: &mut Pod) {
    pod.status.phase = Some(PodPhase::Running);
    pod.status.host_ip = "10.0.0.1".to_string();
    pod.status.pod_ip = "10.1.0.5".to_string();
    pod.status.container_statuses = pod
        .spec
        .containers
        .iter()
        .map(|c| ContainerStatus {
            name: c.name.clone(),
            container_id: Some(format!("containerd://{}-{}", pod.metadata.name, c.name)),
        })
        .collect();
}

#[derive(Default)]
pub struct FakeCluster {
    nodes: Mutex<HashMap<String, Node>>,
    pods: Mutex<BTreeMap<String, Pod>>,
    /// Pods stay pending after creation.
    pub hold_pending: AtomicBool,
    /// Deleted pods stay visible.
    pub linger_on_delete: AtomicBool,
    pub delete_error: Mutex<Option<String>>,
    pub created: Mutex<Vec<Pod>>,
    pub deletes: Mutex<Vec<(String, DeleteOptions)>>,
}

impl FakeCluster {
    pub fn with_node(name: &str) -> Self {
        let cluster = Self::default();
        cluster.nodes.lock().insert(name.to_string(), node(name));
        cluster
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.pods.lock().insert(pod.name().to_string(), pod);
    }

    /// Drop a pod behind the client's back.
    pub fn remove_pod(&self, name: &str) -> Option<Pod> {
        self.pods.lock().remove(name)
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.pods.lock().get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.pods.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.nodes
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "node",
                name: name.to_string(),
            })
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        self.pod(name).ok_or_else(|| ClusterError::NotFound {
            kind: "pod",
            name: name.to_string(),
        })
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        let mut pods = self.pods.lock();
        if pods.contains_key(pod.name()) {
            return Err(ClusterError::AlreadyExists {
                kind: "pod",
                name: pod.name().to_string(),
            });
        }

        self.created.lock().push(pod.clone());
        let mut stored = pod.clone();
        stored.status.phase = Some(PodPhase::Pending);
        if !self.hold_pending.load(Ordering::SeqCst) {
            mark_running(&mut stored);
        }
        pods.insert(stored.name().to_string(), stored);
        Ok(pod.clone())
    }

    async fn delete_pod(
        &self,
        _namespace: &str,
        name: &str,
        opts: DeleteOptions,
    ) -> Result<(), ClusterError> {
        self.deletes.lock().push((name.to_string(), opts));
        if let Some(message) = self.delete_error.lock().clone() {
            return Err(ClusterError::Api {
                status: 500,
                message,
            });
        }

        let mut pods = self.pods.lock();
        if !pods.contains_key(name) {
            return Err(ClusterError::NotFound {
                kind: "pod",
                name: name.to_string(),
            });
        }
        if !self.linger_on_delete.load(Ordering::SeqCst) {
            pods.remove(name);
        }
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _selector: &ListSelector,
    ) -> Result<Vec<Pod>, ClusterError> {
        Ok(self
            .pods
            .lock()
            .values()
            .filter(|p| p.namespace() == namespace)
            .cloned()
            .collect())
    }
}

/// Scripted outcome of every process the fake engine runs.
#[derive(Default)]
pub struct ProcessScript {
    pub exit_code: Mutex<i32>,
    pub exec_error: Mutex<Option<String>>,
    pub start_error: Mutex<Option<String>>,
    pub wait_error: Mutex<Option<String>>,
    pub status_error: Mutex<Option<String>>,
    pub close_error: Mutex<Option<String>>,
    /// How long `wait` blocks before reporting the exit.
    pub run_for: Mutex<Duration>,
    pub execs: Mutex<Vec<(ContainerId, ProcessSpec)>>,
    pub signals: Mutex<Vec<Signal>>,
    pub deleted: Mutex<Vec<ExecId>>,
}

pub struct FakeTask {
    id: ContainerId,
    script: Arc<ProcessScript>,
}

impl FakeTask {
    pub fn new(id: &str, script: Arc<ProcessScript>) -> Self {
        Self {
            id: ContainerId::new(id),
            script,
        }
    }
}

#[async_trait]
impl Task for FakeTask {
    fn id(&self) -> &ContainerId {
        &self.id
    }

    fn pid(&self) -> u32 {
        TASK_PID
    }

    async fn exec(
        &self,
        exec_id: &ExecId,
        spec: &ProcessSpec,
        _io: ProcessIo,
    ) -> Result<Arc<dyn RuntimeProcess>, EngineError> {
        if let Some(e) = self.script.exec_error.lock().clone() {
            return Err(EngineError::ExecFailed(e));
        }
        self.script
            .execs
            .lock()
            .push((self.id.clone(), spec.clone()));
        Ok(Arc::new(FakeProcess {
            id: exec_id.clone(),
            script: Arc::clone(&self.script),
        }))
    }
}

pub struct FakeProcess {
    id: ExecId,
    script: Arc<ProcessScript>,
}

#[async_trait]
impl RuntimeProcess for FakeProcess {
    fn id(&self) -> &ExecId {
        &self.id
    }

    async fn start(&self) -> Result<(), EngineError> {
        match self.script.start_error.lock().clone() {
            Some(e) => Err(EngineError::Runtime(e)),
            None => Ok(()),
        }
    }

    async fn wait(&self) -> Result<ExitStatus, EngineError> {
        let run_for = *self.script.run_for.lock();
        if !run_for.is_zero() {
            tokio::time::sleep(run_for).await;
        }
        if let Some(e) = self.script.wait_error.lock().clone() {
            return Err(EngineError::Runtime(e));
        }
        Ok(ExitStatus {
            code: *self.script.exit_code.lock(),
            error: self.script.status_error.lock().clone(),
        })
    }

    async fn kill(&self, signal: Signal) -> Result<(), EngineError> {
        self.script.signals.lock().push(signal);
        Ok(())
    }

    async fn close_io(&self) -> Result<(), EngineError> {
        match self.script.close_error.lock().clone() {
            Some(e) => Err(EngineError::Io(e)),
            None => Ok(()),
        }
    }

    async fn delete(&self) -> Result<(), EngineError> {
        self.script.deleted.lock().push(self.id.clone());
        Ok(())
    }
}

pub struct FakeEngine {
    pub serving: AtomicBool,
    pub image_size: AtomicU64,
    pub image_env: Mutex<Vec<String>>,
    pub fail_load: AtomicBool,
    pub delete_image_error: Mutex<Option<String>>,
    pub pulls: Mutex<Vec<(String, Option<RegistryAuth>)>>,
    pub deleted_images: Mutex<Vec<ImageId>>,
    pub script: Arc<ProcessScript>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            serving: AtomicBool::new(true),
            image_size: AtomicU64::new(GIB / 4),
            image_env: Mutex::new(Vec::new()),
            fail_load: AtomicBool::new(false),
            delete_image_error: Mutex::new(None),
            pulls: Mutex::new(Vec::new()),
            deleted_images: Mutex::new(Vec::new()),
            script: Arc::new(ProcessScript::default()),
        }
    }
}

#[async_trait]
impl TaskEngine for FakeEngine {
    async fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    async fn pull(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<PulledImage, EngineError> {
        self.pulls
            .lock()
            .push((reference.qualified(), auth.cloned()));
        Ok(PulledImage {
            name: reference.qualified(),
            id: ImageId::new(format!("sha256:{}", reference.name())),
            size: self.image_size.load(Ordering::SeqCst),
            env: self.image_env.lock().clone(),
        })
    }

    async fn delete_image(&self, id: &ImageId) -> Result<(), EngineError> {
        self.deleted_images.lock().push(id.clone());
        match self.delete_image_error.lock().clone() {
            Some(e) => Err(EngineError::Runtime(e)),
            None => Ok(()),
        }
    }

    async fn load_tasks(&self, statuses: &[ContainerStatus]) -> Result<TaskMap, EngineError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::TaskNotFound("fake".to_string()));
        }
        let mut tasks = TaskMap::new();
        for status in statuses {
            if let Some(id) = &status.container_id {
                let task: Arc<dyn Task> = Arc::new(FakeTask::new(id, Arc::clone(&self.script)));
                tasks.insert(status.name.clone(), task);
            }
        }
        Ok(tasks)
    }
}

#[derive(Default)]
pub struct FakeTelemetry {
    pub samples: Mutex<HashMap<String, ContainerMetrics>>,
}

#[async_trait]
impl MetricsSource for FakeTelemetry {
    async fn metrics(
        &self,
        _handles: &[String],
    ) -> Result<HashMap<String, ContainerMetrics>, TelemetryError> {
        Ok(self.samples.lock().clone())
    }
}

pub struct FakeUsers {
    pub users: Mutex<HashMap<String, ExecUser>>,
    pub roots: Mutex<Vec<PathBuf>>,
}

impl Default for FakeUsers {
    fn default() -> Self {
        let users = HashMap::from([
            (
                "root".to_string(),
                ExecUser {
                    uid: 0,
                    gid: 0,
                    home: "/root".to_string(),
                },
            ),
            (
                "vcap".to_string(),
                ExecUser {
                    uid: 2000,
                    gid: 2000,
                    home: "/home/vcap".to_string(),
                },
            ),
        ]);
        Self {
            users: Mutex::new(users),
            roots: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl UserLookup for FakeUsers {
    async fn lookup(&self, root: &Path, username: &str) -> Result<ExecUser, IdentityError> {
        self.roots.lock().push(root.to_path_buf());
        let username = if username.is_empty() { "root" } else { username };
        self.users
            .lock()
            .get(username)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownUser {
                username: username.to_string(),
            })
    }
}

#[derive(Default)]
pub struct FakeCopier {
    pub fail: Mutex<Option<String>>,
    pub streamed_in: Mutex<Vec<(u32, String, String, Vec<u8>)>>,
    pub archive: Mutex<Vec<u8>>,
}

#[async_trait]
impl BulkCopy for FakeCopier {
    async fn stream_in(
        &self,
        pid: u32,
        path: &str,
        user: &str,
        mut tar: BoxedReader,
    ) -> Result<(), CopyError> {
        if let Some(stderr) = self.fail.lock().clone() {
            return Err(CopyError::Failed {
                code: Some(1),
                stderr,
            });
        }
        let mut bytes = Vec::new();
        tar.read_to_end(&mut bytes)
            .await
            .map_err(|e| CopyError::Input {
                message: e.to_string(),
                stderr: String::new(),
            })?;
        self.streamed_in
            .lock()
            .push((pid, path.to_string(), user.to_string(), bytes));
        Ok(())
    }

    async fn stream_out(
        &self,
        _pid: u32,
        _path: &str,
        _user: &str,
    ) -> Result<BoxedReader, CopyError> {
        if let Some(stderr) = self.fail.lock().clone() {
            return Err(CopyError::Failed {
                code: Some(1),
                stderr,
            });
        }
        Ok(Box::new(std::io::Cursor::new(self.archive.lock().clone())))
    }
}

/// Every fake, shared with the client under test.
pub struct Fakes {
    pub cluster: Arc<FakeCluster>,
    pub engine: Arc<FakeEngine>,
    pub telemetry: Arc<FakeTelemetry>,
    pub users: Arc<FakeUsers>,
    pub copier: Arc<FakeCopier>,
}

pub const NODE_NAME: &str = "node-1";

impl Fakes {
    pub fn new() -> Self {
        Self {
            cluster: Arc::new(FakeCluster::with_node(NODE_NAME)),
            engine: Arc::new(FakeEngine::default()),
            telemetry: Arc::new(FakeTelemetry::default()),
            users: Arc::new(FakeUsers::default()),
            copier: Arc::new(FakeCopier::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            cluster: self.cluster.clone(),
            engine: self.engine.clone(),
            telemetry: self.telemetry.clone(),
            users: self.users.clone(),
            copier: self.copier.clone(),
        }
    }

    pub fn config() -> GardenConfig {
        GardenConfig {
            node_name: Some(NODE_NAME.to_string()),
            sidecar_image: "sidecar:latest".to_string(),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    pub async fn client(&self) -> Result<GardenClient, GardenError> {
        GardenClient::connect(self.collaborators(), Self::config()).await
    }
}
