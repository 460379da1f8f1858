// ABOUTME: Top-level coordinator of the container-lifecycle API.
// ABOUTME: Drives create/destroy/recovery across the cluster API and runtime engine.

use super::container::{Container, ContainerDeps, STATE_ALL, STATE_CREATED, STATE_PROPERTY};
use super::error::{ClusterSnafu, EngineSnafu, GardenError, MultiError, TelemetrySnafu};
use super::pod_builder::{OWNER_NAME_LABEL, OWNER_PROPERTY, PodBuilder, PodResources, cpu_share};
use super::ports::PortPool;
use super::registry::Registry;
use super::spec::{Capacity, ContainerInfo, ContainerSpec, Metrics, NetworkStat};
use crate::cluster::{
    ClusterApi, ContainerPort, DeleteOptions, ListSelector, Node, Pod, RESOURCE_CPU,
    RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY, RESOURCE_PODS, ResourceList,
};
use crate::config::GardenConfig;
use crate::identity::UserLookup;
use crate::properties::{Properties, PropertyManager};
use crate::runtime::{RegistryAuth, TaskEngine};
use crate::stream::BulkCopy;
use crate::telemetry::MetricsSource;
use crate::types::{Handle, RootfsUri};
use snafu::ResultExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// The external systems the client drives.
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterApi>,
    pub engine: Arc<dyn TaskEngine>,
    pub telemetry: Arc<dyn MetricsSource>,
    pub users: Arc<dyn UserLookup>,
    pub copier: Arc<dyn BulkCopy>,
}

fn resource_value(list: &ResourceList, name: &str) -> u64 {
    list.get(name)
        .and_then(|q| q.value())
        .map(|v| v.max(0) as u64)
        .unwrap_or(0)
}

/// Image, environment and rootfs size resolved for a new container.
struct ResolvedImage {
    name: String,
    env: Vec<String>,
    rootfs_size: u64,
}

pub struct GardenClient {
    cluster: Arc<dyn ClusterApi>,
    engine: Arc<dyn TaskEngine>,
    telemetry: Arc<dyn MetricsSource>,
    deps: ContainerDeps,
    config: GardenConfig,
    node_name: String,
    node: Node,
    node_cpu: f64,
    node_memory_bytes: f64,
    registry: Registry<Container>,
    ports: PortPool,
}

impl GardenClient {
    /// Read the node once, then rebuild the registry from the pods already
    /// present in the managed namespace.
    pub async fn connect(
        collaborators: Collaborators,
        config: GardenConfig,
    ) -> Result<Self, GardenError> {
        let node_name = config.resolved_node_name();
        let node = collaborators
            .cluster
            .get_node(&node_name)
            .await
            .context(ClusterSnafu {
                operation: format!("failed to get node {}", node_name),
            })?;

        let node_cpu = node
            .status
            .capacity
            .get(RESOURCE_CPU)
            .and_then(|q| q.as_f64())
            .unwrap_or(0.0);
        let node_memory_bytes = node
            .status
            .capacity
            .get(RESOURCE_MEMORY)
            .and_then(|q| q.as_f64())
            .unwrap_or(0.0);

        tracing::info!(
            node = %node_name,
            "node capacity: {} cpu, {} bytes memory",
            node_cpu,
            node_memory_bytes
        );

        let client = Self {
            cluster: collaborators.cluster,
            engine: collaborators.engine,
            telemetry: collaborators.telemetry,
            deps: ContainerDeps {
                properties: Arc::new(PropertyManager::new()),
                users: collaborators.users,
                copier: collaborators.copier,
            },
            config,
            node_name,
            node,
            node_cpu,
            node_memory_bytes,
            registry: Registry::new(),
            ports: PortPool::new(),
        };

        client.recover().await?;
        Ok(client)
    }

    async fn recover(&self) -> Result<(), GardenError> {
        let pods = self
            .cluster
            .list_pods(&self.config.namespace, &ListSelector::default())
            .await
            .context(ClusterSnafu {
                operation: "failed to list existing pods",
            })?;

        for pod in pods {
            let handle = pod.name().to_string();
            let owner = pod
                .metadata
                .labels
                .get(OWNER_NAME_LABEL)
                .cloned()
                .unwrap_or_default();
            self.deps.properties.set(&handle, OWNER_PROPERTY, &owner);
            self.deps
                .properties
                .set(&handle, STATE_PROPERTY, STATE_CREATED);

            for port in pod.host_ports() {
                self.ports.reserve(port);
            }

            let running = pod.is_running();
            let statuses = pod.status.container_statuses.clone();
            let container = Arc::new(Container::new(pod, Vec::new(), 0.0, 0, self.deps.clone()));

            if running {
                match self.engine.load_tasks(&statuses).await {
                    Ok(tasks) => container.attach_tasks(tasks),
                    Err(e) => {
                        tracing::warn!(handle = %handle, "failed to re-attach tasks: {}", e)
                    }
                }
            }

            self.registry.add(&handle, container)?;
            tracing::info!(handle = %handle, "recovered container");
        }

        Ok(())
    }

    pub fn config(&self) -> &GardenConfig {
        &self.config
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn ports(&self) -> &PortPool {
        &self.ports
    }

    /// Create with the configured readiness timeout.
    pub async fn create(&self, spec: ContainerSpec) -> Result<Arc<Container>, GardenError> {
        let deadline = Instant::now() + self.config.create_timeout;
        self.create_until(spec, deadline).await
    }

    /// Create a container, waiting until `deadline` for its pod to run.
    ///
    /// Any error after the handle was registered leaves it registered; call
    /// `destroy` to clean up.
    pub async fn create_until(
        &self,
        spec: ContainerSpec,
        deadline: Instant,
    ) -> Result<Arc<Container>, GardenError> {
        Handle::new(&spec.handle).map_err(|e| GardenError::InvalidSpec {
            message: format!("handle {:?}: {}", spec.handle, e),
        })?;

        if self.registry.exists(&spec.handle) {
            return Err(GardenError::AlreadyExists {
                handle: spec.handle.clone(),
            });
        }

        tracing::info!(handle = %spec.handle, "creating container");

        let share = cpu_share(
            spec.limits.memory_bytes,
            self.node_cpu,
            self.node_memory_bytes,
        );

        // Explicit ports inside the pool range are claimed like allocated ones.
        let mut claimed: Vec<u16> = Vec::new();
        for port in spec.net_in.iter().map(|n| n.host_port).filter(|p| *p != 0) {
            if self.ports.contains(port) {
                if !self.ports.reserve(port) {
                    claimed.iter().for_each(|p| self.ports.release(*p));
                    return Err(GardenError::InvalidSpec {
                        message: format!("host port {} is already in use", port),
                    });
                }
                claimed.push(port);
            }
        }

        let missing = spec.net_in.iter().filter(|n| n.host_port == 0).count();
        let allocated = match self.ports.allocate(missing) {
            Ok(ports) => ports,
            Err(e) => {
                claimed.iter().for_each(|p| self.ports.release(*p));
                return Err(GardenError::ResourceExhausted {
                    requested: e.requested,
                    available: e.available,
                });
            }
        };
        claimed.extend(allocated.iter().copied());

        let mut allocated = allocated.into_iter();
        let ports: Vec<ContainerPort> = spec
            .net_in
            .iter()
            .map(|n| {
                let host_port = match n.host_port {
                    0 => allocated.next().unwrap_or_default(),
                    port => port,
                };
                ContainerPort::tcp(n.container_port, host_port)
            })
            .collect();
        let release_fresh = || claimed.iter().for_each(|p| self.ports.release(*p));

        let image = match self.resolve_image(&spec).await {
            Ok(image) => image,
            Err(e) => {
                release_fresh();
                return Err(e);
            }
        };

        let builder = PodBuilder {
            config: &self.config,
            node_name: &self.node_name,
        };
        let pod = builder.build(
            &spec,
            &image.name,
            ports,
            PodResources {
                cpu_share: share,
                rootfs_size: image.rootfs_size,
            },
        );

        let container = Arc::new(Container::new(
            pod.clone(),
            image.env,
            share,
            image.rootfs_size,
            self.deps.clone(),
        ));
        if let Err(e) = self.registry.add(&spec.handle, Arc::clone(&container)) {
            release_fresh();
            return Err(e);
        }

        // Stored after registration so a losing racer cannot overwrite the
        // winner's properties.
        for (name, value) in &spec.properties {
            self.deps.properties.set(&spec.handle, name, value);
        }

        self.cluster.create_pod(&pod).await.context(ClusterSnafu {
            operation: "failed to create pod",
        })?;

        match tokio::time::timeout_at(deadline, self.poll_until_running(&container)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(handle = %spec.handle, "pod did not become running in time");
                if let Err(e) = self
                    .cluster
                    .delete_pod(pod.namespace(), pod.name(), DeleteOptions::immediate())
                    .await
                {
                    tracing::warn!(handle = %spec.handle, "failed to delete timed-out pod: {}", e);
                }
                return Err(GardenError::CreateTimeout {
                    handle: spec.handle.clone(),
                });
            }
        }

        let statuses = container.pod().status.container_statuses;
        let tasks = self
            .engine
            .load_tasks(&statuses)
            .await
            .context(EngineSnafu {
                operation: "failed to load runtime tasks",
            })?;
        container.attach_tasks(tasks);
        container.set_property(STATE_PROPERTY, STATE_CREATED);

        tracing::info!(handle = %spec.handle, "container created");
        Ok(container)
    }

    async fn resolve_image(&self, spec: &ContainerSpec) -> Result<ResolvedImage, GardenError> {
        let uri = RootfsUri::parse(&spec.image.uri).map_err(|e| GardenError::InvalidSpec {
            message: format!("image {:?}: {}", spec.image.uri, e),
        })?;

        let reference = match uri {
            RootfsUri::Preloaded(name) => {
                return Ok(ResolvedImage {
                    name,
                    env: spec.env.clone(),
                    rootfs_size: 0,
                });
            }
            RootfsUri::Managed(reference) => reference,
        };

        let auth = RegistryAuth::from_parts(&spec.image.username, &spec.image.password);
        let pulled = self
            .engine
            .pull(&reference, auth.as_ref())
            .await
            .context(EngineSnafu {
                operation: format!("failed to pull image {}", reference),
            })?;

        let limit = spec.limits.disk_byte_hard;
        if pulled.size >= limit {
            let mut causes = MultiError::new();
            causes.push(format!(
                "image size {} exceeds container disk limit {}",
                pulled.size, limit
            ));
            if let Err(e) = self.engine.delete_image(&pulled.id).await {
                causes.push(e);
            }
            return Err(GardenError::DiskLimitExceeded { source: causes });
        }

        let mut env = pulled.env;
        env.extend(spec.env.iter().cloned());
        Ok(ResolvedImage {
            name: pulled.name,
            env,
            rootfs_size: pulled.size,
        })
    }

    async fn poll_until_running(&self, container: &Container) -> Result<(), GardenError> {
        let namespace = &self.config.namespace;
        loop {
            match self.cluster.get_pod(namespace, container.handle()).await {
                Ok(pod) => {
                    let running = pod.is_running();
                    let phase = pod.status.phase;
                    container.update_pod(pod);
                    if running {
                        return Ok(());
                    }
                    tracing::debug!(handle = %container.handle(), ?phase, "waiting for pod to be running");
                }
                // Not yet visible after create.
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(e).context(ClusterSnafu {
                        operation: "failed to get pod after creation",
                    });
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Destroy with the configured deletion timeout.
    pub async fn destroy(&self, handle: &str) -> Result<(), GardenError> {
        let deadline = Instant::now() + self.config.delete_timeout;
        self.destroy_until(handle, deadline).await
    }

    /// Delete the pod and forget the container.
    ///
    /// Once the delete request is accepted, ports, registry entry and
    /// properties are released even if waiting for the pod to disappear
    /// fails.
    pub async fn destroy_until(&self, handle: &str, deadline: Instant) -> Result<(), GardenError> {
        let container = self.registry.get(handle)?;
        let pod = container.pod();
        tracing::info!(handle, "destroying container");

        let requested = tokio::time::timeout_at(
            deadline,
            self.cluster
                .delete_pod(pod.namespace(), pod.name(), DeleteOptions::default()),
        )
        .await;

        let wait = match requested {
            Err(_) => {
                return Err(GardenError::DeleteTimeout {
                    handle: handle.to_string(),
                });
            }
            Ok(Err(e)) if e.is_not_found() => Ok(()),
            Ok(Err(e)) => {
                return Err(e).context(ClusterSnafu {
                    operation: "failed to delete pod",
                });
            }
            Ok(Ok(())) => {
                match tokio::time::timeout_at(deadline, self.poll_until_deleted(&pod)).await {
                    Ok(result) => result,
                    Err(_) => Err(GardenError::DeleteTimeout {
                        handle: handle.to_string(),
                    }),
                }
            }
        };

        self.forget(handle, &pod);
        wait
    }

    async fn poll_until_deleted(&self, pod: &Pod) -> Result<(), GardenError> {
        loop {
            match self.cluster.get_pod(pod.namespace(), pod.name()).await {
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => {
                    return Err(e).context(ClusterSnafu {
                        operation: "failed to get pod during deletion",
                    });
                }
                Ok(_) => tracing::debug!(handle = %pod.name(), "waiting for pod deletion"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn forget(&self, handle: &str, pod: &Pod) {
        for port in pod.host_ports() {
            self.ports.release(port);
        }
        self.registry.remove(handle);
        self.deps.properties.destroy_key_space(handle);
    }

    pub fn lookup(&self, handle: &str) -> Result<Arc<Container>, GardenError> {
        self.registry.get(handle)
    }

    /// Containers whose properties match every filter entry.
    ///
    /// Without a `garden.state` entry only created containers match;
    /// `garden.state = all` lifts that default.
    pub fn containers(&self, filter: Properties) -> Vec<Arc<Container>> {
        let mut filter = filter;
        match filter.get(STATE_PROPERTY).map(String::as_str) {
            None => {
                filter.insert(STATE_PROPERTY.to_string(), STATE_CREATED.to_string());
            }
            Some(STATE_ALL) => {
                filter.remove(STATE_PROPERTY);
            }
            Some(_) => {}
        }

        self.registry
            .list()
            .into_iter()
            .filter(|c| self.deps.properties.matches_all(c.handle(), &filter))
            .collect()
    }

    /// Node capacity as read at startup.
    pub fn capacity(&self) -> Capacity {
        let status = &self.node.status;
        Capacity {
            memory_in_bytes: resource_value(&status.allocatable, RESOURCE_MEMORY),
            disk_in_bytes: resource_value(&status.capacity, RESOURCE_EPHEMERAL_STORAGE),
            schedulable_disk_in_bytes: resource_value(
                &status.allocatable,
                RESOURCE_EPHEMERAL_STORAGE,
            ),
            max_containers: resource_value(&status.capacity, RESOURCE_PODS),
        }
    }

    pub async fn bulk_metrics(
        &self,
        handles: &[String],
    ) -> Result<HashMap<String, Metrics>, GardenError> {
        let samples = self
            .telemetry
            .metrics(handles)
            .await
            .context(TelemetrySnafu)?;

        let mut out = HashMap::with_capacity(samples.len());
        for (handle, sample) in samples {
            let container =
                self.registry
                    .get(&handle)
                    .map_err(|_| GardenError::ContainerNotFound {
                        handle: handle.clone(),
                    })?;

            let network = match (sample.rx_bytes, sample.tx_bytes) {
                (Some(rx_bytes), Some(tx_bytes)) => Some(NetworkStat { rx_bytes, tx_bytes }),
                _ => None,
            };

            out.insert(
                handle,
                Metrics {
                    memory_usage_bytes: sample.memory_usage_bytes,
                    disk_usage_bytes: sample.disk_usage_bytes + container.rootfs_size(),
                    cpu_usage_ns: sample.cpu_nanoseconds,
                    cpu_entitlement_ns: (container.cpu_share() * sample.age_nanoseconds as f64)
                        as u64,
                    age_ns: sample.age_nanoseconds,
                    network,
                },
            );
        }
        Ok(out)
    }

    pub async fn ping(&self) -> Result<(), GardenError> {
        if self.engine.is_serving().await {
            Ok(())
        } else {
            Err(GardenError::NotServing)
        }
    }

    pub fn bulk_info(
        &self,
        _handles: &[String],
    ) -> Result<HashMap<String, ContainerInfo>, GardenError> {
        Err(GardenError::Unsupported {
            operation: "bulk info",
        })
    }
}
