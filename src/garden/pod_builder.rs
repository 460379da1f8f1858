// ABOUTME: Builds the pod object submitted for a container spec.
// ABOUTME: Init-binary roles, scratch and bind volumes, resources, and labels.

use super::spec::ContainerSpec;
use crate::cluster::{
    Container, ContainerPort, ObjectMeta, Pod, PodSpec, Quantity, RESOURCE_CPU,
    RESOURCE_EPHEMERAL_STORAGE, RESOURCE_MEMORY, ResourceRequirements, Volume, VolumeMount,
};
use crate::config::GardenConfig;
use crate::properties::Properties;
use std::collections::BTreeMap;

pub const APP_ROLE: &str = "app";
pub const SIDECAR_ROLE: &str = "sidecar";

pub const OWNER_PROPERTY: &str = "executor:owner";
pub const WORKLOAD_PROPERTY: &str = "network.container_workload";

pub const APP_GUID_LABEL: &str = "cloudfoundry.org/app-guid";
pub const ORG_GUID_LABEL: &str = "cloudfoundry.org/org-guid";
pub const SPACE_GUID_LABEL: &str = "cloudfoundry.org/space-guid";
pub const WORKLOAD_TYPE_LABEL: &str = "cloudfoundry.org/workload-type";
pub const OWNER_NAME_LABEL: &str = "cloudfoundry.org/owner-name";

const LABELLED_PROPERTIES: &[(&str, &str)] = &[
    ("network.app_id", APP_GUID_LABEL),
    ("network.org_id", ORG_GUID_LABEL),
    ("network.space_id", SPACE_GUID_LABEL),
    (WORKLOAD_PROPERTY, WORKLOAD_TYPE_LABEL),
    (OWNER_PROPERTY, OWNER_NAME_LABEL),
];

const INIT_PATH: &str = "/tmp/garden-init";
const TMP_VOLUME: &str = "tmp";
const INIT_VOLUME: &str = "init-bin";

const MIB: f64 = 1024.0 * 1024.0;

/// Pod labels for the recognised property keys.
pub fn pod_labels(properties: &Properties) -> BTreeMap<String, String> {
    LABELLED_PROPERTIES
        .iter()
        .filter_map(|(property, label)| {
            properties
                .get(*property)
                .map(|value| (label.to_string(), value.clone()))
        })
        .collect()
}

/// Fractional cores for `memory_bytes`, proportional to the node's
/// cores per MiB of memory.
pub fn cpu_share(memory_bytes: u64, node_cpu: f64, node_memory_bytes: f64) -> f64 {
    if node_memory_bytes <= 0.0 {
        return 0.0;
    }
    let cpu_per_mib = node_cpu / (node_memory_bytes / MIB);
    (memory_bytes as f64 / MIB) * cpu_per_mib
}

/// Resource figures computed before the pod is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodResources {
    pub cpu_share: f64,
    pub rootfs_size: u64,
}

pub struct PodBuilder<'a> {
    pub config: &'a GardenConfig,
    pub node_name: &'a str,
}

impl PodBuilder<'_> {
    fn init_mount() -> VolumeMount {
        VolumeMount {
            name: INIT_VOLUME.to_string(),
            mount_path: INIT_PATH.to_string(),
            read_only: true,
        }
    }

    fn app_container(
        &self,
        spec: &ContainerSpec,
        image: &str,
        ports: Vec<ContainerPort>,
        resources: PodResources,
    ) -> Container {
        let mut limits = BTreeMap::new();
        if spec.limits.disk_byte_hard > 0 {
            limits.insert(
                RESOURCE_EPHEMERAL_STORAGE.to_string(),
                Quantity::from_units(
                    spec.limits
                        .disk_byte_hard
                        .saturating_sub(resources.rootfs_size),
                ),
            );
        }

        Container {
            name: APP_ROLE.to_string(),
            image: image.to_string(),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: vec![INIT_PATH.to_string()],
            ports,
            volume_mounts: vec![
                VolumeMount {
                    name: TMP_VOLUME.to_string(),
                    mount_path: "/tmp".to_string(),
                    read_only: false,
                },
                Self::init_mount(),
            ],
            resources: ResourceRequirements {
                requests: BTreeMap::new(),
                limits,
            },
        }
    }

    fn sidecar_container(&self) -> Container {
        Container {
            name: SIDECAR_ROLE.to_string(),
            image: self.config.sidecar_image.clone(),
            command: vec![INIT_PATH.to_string()],
            volume_mounts: vec![Self::init_mount()],
            ..Default::default()
        }
    }

    fn bind_volume(&self, index: usize, src_path: &str) -> Volume {
        let name = format!("bind-mount-{}", index);
        match self.config.trusted_certs_dir.as_deref() {
            Some(dir) if dir == src_path => {
                Volume::config_map(&name, &self.config.trusted_certs_config_map)
            }
            _ => Volume::host_path(&name, src_path),
        }
    }

    pub fn build(
        &self,
        spec: &ContainerSpec,
        image: &str,
        ports: Vec<ContainerPort>,
        resources: PodResources,
    ) -> Pod {
        let cpu_millis = (resources.cpu_share * 1000.0) as u64;
        let pod_resources = ResourceRequirements {
            requests: BTreeMap::from([(
                RESOURCE_CPU.to_string(),
                Quantity::from_millis(cpu_millis),
            )]),
            limits: BTreeMap::from([(
                RESOURCE_MEMORY.to_string(),
                Quantity::from_units(spec.limits.memory_bytes),
            )]),
        };

        let mut containers = vec![self.app_container(spec, image, ports, resources)];

        if spec.properties.get(WORKLOAD_PROPERTY).map(String::as_str) == Some(APP_ROLE) {
            let mut sidecar = self.sidecar_container();
            if self.config.enable_container_proxy {
                // The proxy in the sidecar takes the traffic.
                sidecar.ports = std::mem::take(&mut containers[0].ports);
            }
            containers.push(sidecar);
        }

        let mut volumes = vec![
            Volume::empty_dir(TMP_VOLUME),
            Volume::host_path(INIT_VOLUME, &self.config.init_binary),
        ];

        for (index, mount) in spec.bind_mounts.iter().enumerate() {
            let volume = self.bind_volume(index, &mount.src_path);
            for container in &mut containers {
                container.volume_mounts.push(VolumeMount {
                    name: volume.name.clone(),
                    mount_path: mount.dst_path.clone(),
                    read_only: true,
                });
            }
            volumes.push(volume);
        }

        Pod::new(
            ObjectMeta {
                name: spec.handle.clone(),
                namespace: self.config.namespace.clone(),
                labels: pod_labels(&spec.properties),
            },
            PodSpec {
                automount_service_account_token: Some(false),
                enable_service_links: Some(false),
                node_name: Some(self.node_name.to_string()),
                termination_grace_period_seconds: Some(
                    self.config.termination_grace_period.as_secs() as i64,
                ),
                host_users: Some(true),
                restart_policy: Some("Never".to_string()),
                resources: Some(pod_resources),
                volumes,
                containers,
            },
        )
    }
}
