// ABOUTME: Configuration types and parsing for podgarden.yml.
// ABOUTME: Handles YAML parsing, defaults, discovery, and node name resolution.

mod endpoints;

pub use endpoints::{ClusterConfig, KubeletConfig, RuntimeConfig, StreamConfig};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "podgarden.yml";
pub const CONFIG_FILENAME_ALT: &str = "podgarden.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".podgarden/config.yml";

pub const NODE_NAME_ENV: &str = "NODE_NAME";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GardenConfig {
    /// Namespace holding every managed pod.
    pub namespace: String,

    /// Node to read capacity from and pin pods to.
    pub node_name: Option<String>,

    pub sidecar_image: String,

    /// Bind-mount source replaced by the trusted certificates config map.
    pub trusted_certs_dir: Option<String>,

    pub trusted_certs_config_map: String,

    pub enable_container_proxy: bool,

    /// Host path of the init binary mounted into every role.
    pub init_binary: String,

    #[serde(with = "humantime_serde")]
    pub create_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub delete_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub termination_grace_period: Duration,

    pub cluster: ClusterConfig,

    pub runtime: RuntimeConfig,

    pub kubelet: KubeletConfig,

    pub stream: StreamConfig,
}

impl Default for GardenConfig {
    fn default() -> Self {
        Self {
            namespace: "cf-workloads".to_string(),
            node_name: None,
            sidecar_image: String::new(),
            trusted_certs_dir: None,
            trusted_certs_config_map: "trusted-system-certs".to_string(),
            enable_container_proxy: false,
            init_binary: "/var/lib/rep/bin/init".to_string(),
            create_timeout: Duration::from_secs(120),
            delete_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            termination_grace_period: Duration::from_secs(5),
            cluster: ClusterConfig::default(),
            runtime: RuntimeConfig::default(),
            kubelet: KubeletConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl GardenConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("namespace cannot be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured node name, then `NODE_NAME`, then the machine hostname.
    pub fn resolved_node_name(&self) -> String {
        if let Some(name) = self.node_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }

        match std::env::var(NODE_NAME_ENV) {
            Ok(name) if !name.is_empty() => name,
            _ => gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}
