// ABOUTME: Configuration sections for the node-local collaborators.
// ABOUTME: Cluster API, runtime socket, telemetry endpoint, and copy helpers.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Plain-HTTP endpoint, usually an API proxy on the node.
    pub api_url: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub socket: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KubeletConfig {
    pub address: String,
    pub port: u16,
}

impl Default for KubeletConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 10255,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub nstar_bin: String,
    pub tar_bin: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nstar_bin: "/var/lib/rep/bin/nstar".to_string(),
            tar_bin: "/var/lib/rep/bin/tar".to_string(),
        }
    }
}
