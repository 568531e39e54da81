//! Runtime contract - the backend-agnostic container interface.
//!
//! This trait defines the operation set every virtualization backend
//! implements:
//! - connection lifecycle: `connect` / `is_connected` / `close`
//! - entity lifecycle: `create` / `start` / `stop` / `restart` / `remove` /
//!   `recreate`
//! - introspection: `list` / `inspect` / `logs` / `stats` / `stats_all`
//! - network, volume, and image operations
//!
//! # Heterogeneous Backends
//!
//! The data model is runtime-agnostic: a single [`ContainerConfig`] is
//! submitted regardless of whether the active backend drives Docker
//! containers or Proxmox LXC instances. Each backend performs a one-way,
//! possibly lossy translation - fields it cannot express are silently
//! dropped, a documented capability gap, never a hard error.
//!
//! # No Orchestration Semantics
//!
//! This trait intentionally excludes orchestration concerns (routing,
//! health-driven restarts, deployment ordering). Those live in the
//! platform layers that consume this contract.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Runtime Identity
// =============================================================================

/// Identifies a container runtime backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker engine (native labels, image-based).
    Docker,
    /// Proxmox VE LXC (numeric VMIDs, template-based).
    Proxmox,
}

impl RuntimeKind {
    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Proxmox => "proxmox",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Container State
// =============================================================================

/// Lifecycle state of a managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Currently running.
    Running,
    /// Execution suspended.
    Paused,
    /// In the middle of a restart.
    Restarting,
    /// Stopped after running.
    Exited,
    /// Unresponsive or in an unknown terminal state.
    Dead,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

// =============================================================================
// Entity Descriptor
// =============================================================================

/// Restart behavior requested for an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart automatically.
    #[default]
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart only on non-zero exit.
    OnFailure,
}

/// Port exposure definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_ip: String,
    pub host_port: String,
    pub container_port: String,
    /// `tcp` or `udp`.
    pub protocol: String,
}

/// Kind of a volume mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host path mounted into the entity.
    Bind,
    /// Named volume managed by the backend.
    Volume,
    /// Ephemeral in-memory filesystem.
    Tmpfs,
}

/// Storage mount definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub kind: MountKind,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Health probe definition.
///
/// Intervals are in seconds; backends that monitor health natively
/// translate these, others drop them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub test: Vec<String>,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub retries: u32,
    pub start_period_secs: u64,
}

/// Generic entity creation descriptor.
///
/// Immutable once submitted to [`ContainerRuntime::create`]; the runtime
/// never retains the caller's struct. Backends translate this one-way into
/// their native configuration - see the individual backend documentation
/// for which fields survive the translation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Caller-assigned name, unique per backend instance.
    pub name: String,
    /// Docker image reference or LXC template volume id.
    pub image: String,
    /// Hostname inside the entity; defaults to `name` when empty.
    #[serde(default)]
    pub hostname: String,
    /// Entrypoint override.
    #[serde(default)]
    pub entrypoint: Vec<String>,
    /// Command arguments.
    #[serde(default)]
    pub command: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Caller-supplied labels, stored alongside the entity.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Port exposures.
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    /// Storage mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Networks to attach, by name.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Memory limit in bytes; 0 means backend default.
    #[serde(default)]
    pub memory: u64,
    /// Memory+swap limit in bytes; 0 means backend default.
    #[serde(default)]
    pub memory_swap: u64,
    /// CPU allotment; 0.0 means backend default.
    #[serde(default)]
    pub cpus: f64,
    /// Restart behavior.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Run without privilege reduction.
    #[serde(default)]
    pub privileged: bool,
    /// Health probe, if any.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

// =============================================================================
// Query Projections
// =============================================================================
//
// Read-only views returned by the introspection operations. Never mutated
// independently - always recomputed from current backend state joined with
// side-car metadata.
// =============================================================================

/// Summary of a managed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    /// Opaque identifier issued by [`ContainerRuntime::create`].
    pub id: String,
    /// Caller-assigned name, recovered from backend state or metadata.
    pub name: String,
    /// Image or template the entity was created from, when known.
    #[serde(default)]
    pub image: String,
    pub state: ContainerState,
    /// Raw status string as reported by the backend.
    pub status: String,
    /// Creation time as Unix seconds; 0 when the backend does not report it.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Full inspection data for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub container: Container,
    /// Reconstructed descriptor. Fields the backend does not track are
    /// left at their zero value.
    pub config: ContainerConfig,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
}

/// Resource usage snapshot for one entity.
///
/// Fields the backend omits are left at zero rather than failing the call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
}

// =============================================================================
// Network / Volume / Image Model
// =============================================================================

/// Network creation definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// An attachable network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Named volume creation definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A storage volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A container image or LXC template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Creation time as Unix seconds; 0 when unknown.
    #[serde(default)]
    pub created: i64,
}

/// Options for retrieving entity logs.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub follow: bool,
    pub timestamps: bool,
    /// Number of trailing lines, if bounded.
    pub tail: Option<String>,
    /// Lower time bound, backend-specific format.
    pub since: Option<String>,
}

/// Byte stream of entity log output.
pub type LogStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

// =============================================================================
// Runtime Contract
// =============================================================================

/// The operation set every virtualization backend implements.
///
/// One backend instance is shared by arbitrarily many concurrent callers;
/// every operation must be safe under concurrent invocation. All mutating
/// operations fail with [`Error::NotConnected`] until a successful
/// [`connect`](Self::connect).
///
/// # Lifecycle
///
/// ```text
/// connect() → create(cfg) → start(id) → ... → stop(id) → remove(id) → close()
/// ```
///
/// # Implementations
///
/// - `ProxmoxRuntime`: LXC instances via the Proxmox VE management API
/// - Docker: pass-through over the Docker SDK (ships with the platform,
///   not with this crate)
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the backend kind.
    fn kind(&self) -> RuntimeKind;

    /// Returns the backend version, or `"unknown"` when unavailable.
    async fn version(&self) -> String;

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    /// Establishes the connection to the backend.
    ///
    /// May be retried after failure. On success all other operations
    /// become available.
    async fn connect(&self) -> Result<()>;

    /// Returns whether a successful `connect` is in effect.
    fn is_connected(&self) -> bool;

    /// Tears the connection down, flushing any pending backend state.
    ///
    /// Idempotent: closing an already-closed runtime is a no-op.
    async fn close(&self) -> Result<()>;

    // =========================================================================
    // Entity Lifecycle
    // =========================================================================

    /// Creates an entity from the descriptor, without starting it.
    ///
    /// Returns an opaque identifier, unique per this backend's allocation
    /// discipline, valid in all subsequent calls.
    async fn create(&self, config: &ContainerConfig) -> Result<String>;

    /// Starts a created or stopped entity.
    async fn start(&self, id: &str) -> Result<()>;

    /// Stops a running entity.
    async fn stop(&self, id: &str) -> Result<()>;

    /// Restarts an entity: best-effort stop, then start.
    async fn restart(&self, id: &str) -> Result<()>;

    /// Removes an entity and its backend-side state.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Removes `id`, then creates a replacement from `config`.
    ///
    /// A `remove` failure propagates to the caller and the replacement is
    /// not created, so a half-completed recreation is always detectable.
    async fn recreate(&self, id: &str, config: &ContainerConfig) -> Result<String>;

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Lists all entities managed by this backend.
    async fn list(&self) -> Result<Vec<Container>>;

    /// Returns full inspection data for one entity.
    async fn inspect(&self, id: &str) -> Result<ContainerDetails>;

    /// Returns the entity's log output as a byte stream.
    async fn logs(&self, id: &str, opts: &LogOptions) -> Result<LogStream>;

    /// Returns a resource usage snapshot for one entity.
    async fn stats(&self, id: &str) -> Result<ContainerStats>;

    /// Returns resource usage for all entities.
    ///
    /// Entities whose individual query fails are skipped rather than
    /// aborting the batch.
    async fn stats_all(&self) -> Result<Vec<ContainerStats>>;

    // =========================================================================
    // Network Operations
    // =========================================================================
    //
    // Optional: backends without a network concept inherit the NotSupported
    // defaults.
    // =========================================================================

    /// Creates an attachable network.
    async fn create_network(&self, config: &NetworkConfig) -> Result<String> {
        let _ = config;
        Err(Error::NotSupported(format!(
            "network creation not supported by {} runtime",
            self.kind()
        )))
    }

    /// Removes a network.
    async fn remove_network(&self, id: &str) -> Result<()> {
        let _ = id;
        Err(Error::NotSupported(format!(
            "network removal not supported by {} runtime",
            self.kind()
        )))
    }

    /// Lists attachable networks.
    async fn list_networks(&self) -> Result<Vec<Network>> {
        Err(Error::NotSupported(format!(
            "network listing not supported by {} runtime",
            self.kind()
        )))
    }

    /// Attaches an entity to a network.
    async fn connect_network(&self, id: &str, network_id: &str) -> Result<()> {
        let _ = (id, network_id);
        Err(Error::NotSupported(format!(
            "network attachment not supported by {} runtime",
            self.kind()
        )))
    }

    /// Detaches an entity from a network.
    async fn disconnect_network(&self, id: &str, network_id: &str) -> Result<()> {
        let _ = (id, network_id);
        Err(Error::NotSupported(format!(
            "network detachment not supported by {} runtime",
            self.kind()
        )))
    }

    // =========================================================================
    // Volume Operations
    // =========================================================================

    /// Creates a named volume.
    async fn create_volume(&self, config: &VolumeConfig) -> Result<String> {
        let _ = config;
        Err(Error::NotSupported(format!(
            "volume creation not supported by {} runtime",
            self.kind()
        )))
    }

    /// Removes a named volume.
    async fn remove_volume(&self, id: &str) -> Result<()> {
        let _ = id;
        Err(Error::NotSupported(format!(
            "volume removal not supported by {} runtime",
            self.kind()
        )))
    }

    /// Lists named volumes.
    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        Err(Error::NotSupported(format!(
            "volume listing not supported by {} runtime",
            self.kind()
        )))
    }

    // =========================================================================
    // Image Operations
    // =========================================================================

    /// Pulls an image or template into backend-local storage.
    async fn pull_image(&self, reference: &str) -> Result<()> {
        let _ = reference;
        Err(Error::NotSupported(format!(
            "image pulling not supported by {} runtime",
            self.kind()
        )))
    }

    /// Lists locally available images or templates.
    async fn list_images(&self) -> Result<Vec<Image>> {
        Err(Error::NotSupported(format!(
            "image listing not supported by {} runtime",
            self.kind()
        )))
    }

    /// Removes a locally stored image or template.
    async fn remove_image(&self, id: &str) -> Result<()> {
        let _ = id;
        Err(Error::NotSupported(format!(
            "image removal not supported by {} runtime",
            self.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_display() {
        assert_eq!(RuntimeKind::Docker.to_string(), "docker");
        assert_eq!(RuntimeKind::Proxmox.to_string(), "proxmox");
    }

    #[test]
    fn test_container_state_serialization() {
        let json = serde_json::to_string(&ContainerState::Running).unwrap();
        assert_eq!(json, "\"running\"");

        let state: ContainerState = serde_json::from_str("\"exited\"").unwrap();
        assert_eq!(state, ContainerState::Exited);
    }

    #[test]
    fn test_container_config_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.memory, 0);
        assert_eq!(config.restart_policy, RestartPolicy::No);
        assert!(!config.privileged);
        assert!(config.health_check.is_none());
    }

    #[test]
    fn test_restart_policy_serde_shape() {
        let json = serde_json::to_string(&RestartPolicy::UnlessStopped).unwrap();
        assert_eq!(json, "\"unless-stopped\"");
    }
}
