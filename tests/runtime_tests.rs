//! Tests for the runtime contract and data model.
//!
//! Validates state serialization, descriptor defaults, and the
//! NotSupported defaults backends inherit for optional operations.

use async_trait::async_trait;
use skiffrun::{
    Container, ContainerConfig, ContainerDetails, ContainerRuntime, ContainerState,
    ContainerStats, Error, LogOptions, LogStream, RestartPolicy, Result, RuntimeKind,
};

// =============================================================================
// State Model Tests
// =============================================================================

#[test]
fn test_container_state_display() {
    assert_eq!(ContainerState::Created.to_string(), "created");
    assert_eq!(ContainerState::Running.to_string(), "running");
    assert_eq!(ContainerState::Paused.to_string(), "paused");
    assert_eq!(ContainerState::Restarting.to_string(), "restarting");
    assert_eq!(ContainerState::Exited.to_string(), "exited");
    assert_eq!(ContainerState::Dead.to_string(), "dead");
}

#[test]
fn test_container_state_serde_is_lowercase() {
    let json = serde_json::to_string(&ContainerState::Restarting).unwrap();
    assert_eq!(json, "\"restarting\"");

    let state: ContainerState = serde_json::from_str("\"dead\"").unwrap();
    assert_eq!(state, ContainerState::Dead);
}

#[test]
fn test_runtime_kind_names() {
    assert_eq!(RuntimeKind::Docker.as_str(), "docker");
    assert_eq!(RuntimeKind::Proxmox.as_str(), "proxmox");
}

// =============================================================================
// Descriptor Tests
// =============================================================================

#[test]
fn test_descriptor_defaults_mean_backend_defaults() {
    let config = ContainerConfig::default();
    assert_eq!(config.memory, 0);
    assert_eq!(config.memory_swap, 0);
    assert_eq!(config.cpus, 0.0);
    assert_eq!(config.restart_policy, RestartPolicy::No);
    assert!(!config.privileged);
    assert!(config.volumes.is_empty());
    assert!(config.health_check.is_none());
}

#[test]
fn test_descriptor_deserializes_sparse_json() {
    // A platform config file only names what it cares about.
    let config: ContainerConfig = serde_json::from_str(
        r#"{"name": "gitea", "image": "local:vztmpl/debian-12.tar.zst"}"#,
    )
    .unwrap();

    assert_eq!(config.name, "gitea");
    assert!(config.labels.is_empty());
    assert_eq!(config.restart_policy, RestartPolicy::No);
}

#[test]
fn test_restart_policy_wire_names() {
    let policy: RestartPolicy = serde_json::from_str("\"unless-stopped\"").unwrap();
    assert_eq!(policy, RestartPolicy::UnlessStopped);
    let policy: RestartPolicy = serde_json::from_str("\"on-failure\"").unwrap();
    assert_eq!(policy, RestartPolicy::OnFailure);
}

// =============================================================================
// Optional Operation Defaults
// =============================================================================

/// Minimal backend that implements only the required operations, so the
/// trait's NotSupported defaults are what answer everything optional.
struct BareRuntime;

#[async_trait]
impl ContainerRuntime for BareRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Docker
    }

    async fn version(&self) -> String {
        "unknown".to_string()
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn create(&self, _config: &ContainerConfig) -> Result<String> {
        Ok("0".to_string())
    }

    async fn start(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn restart(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn recreate(&self, _id: &str, _config: &ContainerConfig) -> Result<String> {
        Ok("0".to_string())
    }

    async fn list(&self) -> Result<Vec<Container>> {
        Ok(Vec::new())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        Err(Error::NotSupported(format!("inspect {}", id)))
    }

    async fn logs(&self, _id: &str, _opts: &LogOptions) -> Result<LogStream> {
        Ok(Box::new(std::io::Cursor::new(Vec::new())))
    }

    async fn stats(&self, _id: &str) -> Result<ContainerStats> {
        Ok(ContainerStats::default())
    }

    async fn stats_all(&self) -> Result<Vec<ContainerStats>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_optional_operations_default_to_not_supported() {
    let runtime = BareRuntime;

    assert!(matches!(
        runtime.create_network(&Default::default()).await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.list_networks().await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.connect_network("0", "net").await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.create_volume(&Default::default()).await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.list_volumes().await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.pull_image("alpine:3.19").await,
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        runtime.remove_image("alpine:3.19").await,
        Err(Error::NotSupported(_))
    ));
}

#[tokio::test]
async fn test_trait_is_object_safe() {
    let runtime: Box<dyn ContainerRuntime> = Box::new(BareRuntime);
    assert_eq!(runtime.kind(), RuntimeKind::Docker);
    assert!(runtime.list().await.unwrap().is_empty());
}
