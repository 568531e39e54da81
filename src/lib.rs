//! # skiffrun
//!
//! **Container Runtime Abstraction Layer for the Skiff Platform**
//!
//! This crate provides one uniform contract for creating and managing
//! compute units - containers or lightweight VMs - against
//! interchangeable virtualization backends, plus the concrete backend
//! that drives a Proxmox VE cluster's management API.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            skiffrun                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                  ContainerRuntime Trait                     │    │
//! │  │   connect() → create(cfg) → start(id) → stop(id) → ...      │    │
//! │  │        list() / inspect(id) / stats(id) / logs(id)          │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                  Runtime Factory                          │      │
//! │  │  RuntimeConfig (tagged union) → one backend, chosen once  │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │                                      │
//! ├──────────────────────────────┼──────────────────────────────────────┤
//! │                       Runtime Backends                              │
//! │  ┌────────────────────────────────────┐  ┌──────────────────┐       │
//! │  │           ProxmoxRuntime           │  │  Docker backend  │       │
//! │  │  JSON/HTTPS ─ API token auth       │  │  (platform crate,│       │
//! │  │  ┌──────────────┐ ┌─────────────┐  │  │   not built here)│       │
//! │  │  │ VmidAllocator│ │MetadataStore│  │  └──────────────────┘       │
//! │  │  │ [start, end) │ │ id → labels │  │                             │
//! │  │  └──────────────┘ └─────────────┘  │                             │
//! │  └────────────────────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # The Proxmox Gap
//!
//! Proxmox LXC addresses containers by numeric VMID, has no label or
//! name concept, and takes LXC-style rather than image-style
//! configuration. The backend closes those gaps with:
//!
//! - a [`VmidAllocator`](vmid::VmidAllocator) issuing unique VMIDs from a
//!   bounded range, recomputed from live inventory on every connect;
//! - a [`MetadataStore`](metadata::MetadataStore) persisting an
//!   id-to-labels table as one JSON document, with a queued background
//!   flush and a synchronous flush at close;
//! - a one-way, lossy translation from the generic descriptor into LXC
//!   configuration keys.
//!
//! # Concurrency Model
//!
//! One backend instance is shared by arbitrarily many concurrent
//! callers. The allocator and the metadata table are guarded by their
//! own locks; composite operations take each lock only for its own
//! step, so there is no atomic transaction spanning both. Exactly one
//! live backend process manages a given VMID range and metadata path -
//! concurrent processes can race the allocator and overwrite each
//! other's metadata document.
//!
//! # Example
//!
//! ```rust,ignore
//! use skiffrun::{RuntimeConfig, new_runtime};
//!
//! #[tokio::main]
//! async fn main() -> skiffrun::Result<()> {
//!     let config: RuntimeConfig = load_platform_config()?;
//!     let runtime = new_runtime(&config)?;
//!
//!     runtime.connect().await?;
//!     for container in runtime.list().await? {
//!         println!("{} [{}]", container.name, container.state);
//!     }
//!     runtime.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod runtime;
pub mod vmid;

pub mod runtimes;

// Re-exports
pub use config::{DockerConfig, ProxmoxConfig, RuntimeConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use metadata::{MetadataStore, NameIndex};
pub use runtime::{
    Container, ContainerConfig, ContainerDetails, ContainerRuntime, ContainerState,
    ContainerStats, HealthCheckConfig, Image, LogOptions, LogStream, MountKind, Network,
    NetworkConfig, PortMapping, RestartPolicy, RuntimeKind, Volume, VolumeConfig, VolumeMount,
};
pub use runtimes::{ProxmoxRuntime, new_runtime};
pub use vmid::VmidAllocator;
