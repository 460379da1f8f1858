// ABOUTME: Request and report types of the container-lifecycle API.
// ABOUTME: Container and process specs, info, capacity, and metrics entries.

use crate::properties::Properties;
use crate::runtime::BoxedReader;
use serde::Serialize;
use std::fmt;

/// Rootfs image and optional registry credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ImageSpec {
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl ImageSpec {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uri.is_empty()
    }
}

impl fmt::Debug for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSpec")
            .field("uri", &self.uri)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A host directory mounted read-only into every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub src_path: String,
    pub dst_path: String,
}

/// A published container port. A zero host port is allocated from the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetIn {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub memory_bytes: u64,
    /// Managed images must be smaller than this. Zero leaves the pod without
    /// an ephemeral-storage limit, so only preloaded images fit.
    pub disk_byte_hard: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub handle: String,
    pub image: ImageSpec,
    pub env: Vec<String>,
    pub bind_mounts: Vec<BindMount>,
    pub net_in: Vec<NetIn>,
    pub limits: Limits,
    pub properties: Properties,
}

/// A process to run inside a container.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    /// Generated when absent.
    pub id: Option<String>,
    pub path: String,
    pub args: Vec<String>,
    pub env: Vec<String>,
    /// Defaults to the user's home directory when empty.
    pub dir: String,
    pub user: String,
    /// A non-empty image selects the sidecar role.
    pub image: ImageSpec,
}

pub struct StreamInSpec {
    pub path: String,
    pub user: String,
    pub tar: BoxedReader,
}

impl fmt::Debug for StreamInSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamInSpec")
            .field("path", &self.path)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOutSpec {
    pub path: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub state: String,
    pub host_ip: String,
    pub container_ip: String,
    pub external_ip: String,
    pub mapped_ports: Vec<PortMapping>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub memory_in_bytes: u64,
    pub disk_in_bytes: u64,
    pub schedulable_disk_in_bytes: u64,
    pub max_containers: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStat {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Usage of one container as reported by `bulk_metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub memory_usage_bytes: u64,
    /// Sampled disk usage plus the rootfs size.
    pub disk_usage_bytes: u64,
    pub cpu_usage_ns: u64,
    /// CPU share multiplied by the container's age.
    pub cpu_entitlement_ns: u64,
    pub age_ns: u64,
    pub network: Option<NetworkStat>,
}

/// Egress rule accepted by `Container::net_out`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetOutRule {
    pub protocol: String,
    pub networks: Vec<String>,
    pub ports: Vec<u16>,
}
