// ABOUTME: Integration tests for configuration loading and discovery.
// ABOUTME: Tests YAML files on disk, discovery order, and parse errors.

use podgarden::config::*;
use podgarden::error::Error;
use std::fs;
use std::time::Duration;

mod discovery {
    use super::*;

    #[test]
    fn finds_primary_filename() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "namespace: primary\n").unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME_ALT), "namespace: alt\n").unwrap();

        let config = GardenConfig::discover(dir.path()).unwrap();
        assert_eq!(config.namespace, "primary");
    }

    #[test]
    fn falls_back_to_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".podgarden")).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME_DIR),
            "delete_timeout: 30s\n",
        )
        .unwrap();

        let config = GardenConfig::discover(dir.path()).unwrap();
        assert_eq!(config.delete_timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = GardenConfig::discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}

mod loading {
    use super::*;

    #[test]
    fn load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garden.yml");
        fs::write(
            &path,
            r#"
namespace: cf-workloads
node_name: worker-3
sidecar_image: envoy:1.29
trusted_certs_dir: /etc/cf-system-certificates
trusted_certs_config_map: certs
enable_container_proxy: true
init_binary: /opt/init
create_timeout: 1m 30s
termination_grace_period: 10s
runtime:
  socket: /run/containerd/docker.sock
kubelet:
  address: 10.0.0.4
"#,
        )
        .unwrap();

        let config = GardenConfig::load(&path).unwrap();
        assert_eq!(config.node_name.as_deref(), Some("worker-3"));
        assert_eq!(config.trusted_certs_config_map, "certs");
        assert!(config.enable_container_proxy);
        assert_eq!(config.init_binary, "/opt/init");
        assert_eq!(config.create_timeout, Duration::from_secs(90));
        assert_eq!(config.termination_grace_period, Duration::from_secs(10));
        assert_eq!(config.runtime.socket, "/run/containerd/docker.sock");
        assert_eq!(config.kubelet.address, "10.0.0.4");
        assert_eq!(config.kubelet.port, 10255);
        assert_eq!(config.cluster.api_url, "http://127.0.0.1:8001");
    }

    #[test]
    fn bad_duration_is_a_yaml_error() {
        let err = GardenConfig::from_yaml("create_timeout: soon").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn empty_namespace_is_invalid() {
        let err = GardenConfig::from_yaml("namespace: \"\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GardenConfig::load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
