//! Backend selection and per-backend settings.
//!
//! Configuration *loading* is owned by the platform's config layer; this
//! module only defines the validated shapes handed to the runtime factory.
//! [`RuntimeConfig`] is a tagged union selecting exactly one backend
//! variant - the discriminant and the payload cannot disagree by
//! construction.

use crate::error::{Error, Result};
use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};

/// Backend selection plus the matching settings payload.
///
/// Serialized with an explicit `type` tag, so a platform configuration
/// file reads as:
///
/// ```json
/// {
///   "type": "proxmox",
///   "host": "pve.example.net:8006",
///   "node": "pve",
///   "token_id": "skiff@pve!orchestrator",
///   "token_secret": "...",
///   "storage": "local-lvm",
///   "vmid_start": 200,
///   "vmid_end": 300
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeConfig {
    /// Docker engine backend.
    Docker(DockerConfig),
    /// Proxmox VE LXC backend.
    Proxmox(ProxmoxConfig),
}

impl RuntimeConfig {
    /// Returns the kind selected by this configuration.
    pub fn kind(&self) -> RuntimeKind {
        match self {
            Self::Docker(_) => RuntimeKind::Docker,
            Self::Proxmox(_) => RuntimeKind::Proxmox,
        }
    }
}

/// Settings for the Docker backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Daemon address, e.g. `unix:///var/run/docker.sock` or
    /// `tcp://host:2376`. Empty means the SDK's environment defaults.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub tls_verify: bool,
    #[serde(default)]
    pub cert_path: String,
}

/// Settings for the Proxmox VE LXC backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxmoxConfig {
    /// Management endpoint, `host:port` (e.g. `pve.local:8006`).
    pub host: String,
    /// Cluster node that owns the managed containers.
    pub node: String,
    /// API token id, `user@realm!tokenid`.
    pub token_id: String,
    /// API token secret.
    pub token_secret: String,
    /// Storage pool for root filesystems and templates.
    pub storage: String,
    /// First VMID this backend instance may allocate (inclusive).
    pub vmid_start: u32,
    /// End of the VMID range (exclusive).
    pub vmid_end: u32,
    /// Skip TLS certificate verification (self-signed deployments).
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl ProxmoxConfig {
    /// Validates that every required field is populated.
    ///
    /// Called by the backend constructor; a failure here is fatal to
    /// startup and precedes any remote call.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("proxmox host is required".into()));
        }
        if self.node.is_empty() {
            return Err(Error::Config("proxmox node is required".into()));
        }
        if self.token_id.is_empty() || self.token_secret.is_empty() {
            return Err(Error::Config("proxmox API token is required".into()));
        }
        if self.storage.is_empty() {
            return Err(Error::Config("proxmox storage pool is required".into()));
        }
        if self.vmid_start >= self.vmid_end {
            return Err(Error::Config(format!(
                "invalid VMID range {}..{}",
                self.vmid_start, self.vmid_end
            )));
        }
        Ok(())
    }
}
