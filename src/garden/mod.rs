// ABOUTME: Container-lifecycle API backed by cluster pods and runtime tasks.
// ABOUTME: Client, container and process facades plus their supporting pieces.

mod client;
mod container;
mod error;
mod pod_builder;
mod ports;
mod process;
mod registry;
mod spec;

pub use client::{Collaborators, GardenClient};
pub use container::{
    CAPABILITIES, Container, GRACE_TIME_PROPERTY, STATE_ALL, STATE_CREATED, STATE_PROPERTY,
};
pub use error::{GardenError, GardenErrorKind, MultiError};
pub use pod_builder::{
    APP_GUID_LABEL, APP_ROLE, OWNER_NAME_LABEL, OWNER_PROPERTY, ORG_GUID_LABEL, PodBuilder,
    PodResources, SIDECAR_ROLE, SPACE_GUID_LABEL, WORKLOAD_PROPERTY, WORKLOAD_TYPE_LABEL,
    cpu_share, pod_labels,
};
pub use ports::{PORT_RANGE_END, PORT_RANGE_START, PortPool, PortsExhausted};
pub use process::Process;
pub use registry::Registry;
pub use spec::{
    BindMount, Capacity, ContainerInfo, ContainerSpec, ImageSpec, Limits, Metrics, NetIn,
    NetOutRule, NetworkStat, PortMapping, ProcessRequest, StreamInSpec, StreamOutSpec,
};
