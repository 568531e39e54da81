//! # Runtime Layer Constants
//!
//! Translation defaults, timeouts, and persistence paths shared across the
//! runtime layer. These constants are the single source of truth for the
//! values the Proxmox translation bakes into LXC configurations.
//!
//! ## Used By
//!
//! - [`crate::runtimes::proxmox`]: translation defaults and settle delay
//! - [`crate::metadata`]: persistence location and the synthesized name label

use std::time::Duration;

// =============================================================================
// Translation Defaults
// =============================================================================
//
// Applied when the generic descriptor leaves a resource limit unset. The
// Proxmox API rejects containers without a memory figure, so zero is not a
// usable passthrough.
// =============================================================================

/// Default container memory limit in MiB.
pub const DEFAULT_MEMORY_MIB: u64 = 512;

/// Default container swap limit in MiB.
pub const DEFAULT_SWAP_MIB: u64 = 512;

/// Default number of CPU cores.
pub const DEFAULT_CORES: u32 = 1;

/// Root filesystem size in GiB, carved from the configured storage pool.
///
/// The generic descriptor has no rootfs-size field; every translated
/// container gets this fixed allocation.
pub const ROOTFS_SIZE_GIB: u32 = 8;

/// LXC network interface definition pinned to the platform's default bridge.
///
/// Address assignment is delegated to the platform (DHCP). The descriptor's
/// explicit network list is not consulted; see the translation notes in
/// [`crate::runtimes::proxmox`].
pub const LXC_DEFAULT_NET0: &str = "name=eth0,bridge=vmbr0,ip=dhcp";

/// LXC feature flags applied to every translated container.
///
/// Nesting stays enabled so workloads that run their own containers keep
/// working after migration from the Docker backend.
pub const LXC_FEATURES: &str = "nesting=1";

/// Length of the generated root password.
pub const ROOT_PASSWORD_LEN: usize = 16;

// =============================================================================
// Timing
// =============================================================================

/// Client-level timeout applied to every management API round trip.
///
/// No operation supports caller-initiated cancellation beyond this bound.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle delay between a best-effort stop and the next lifecycle step.
///
/// Proxmox reports stop success before the container has fully torn down;
/// starting or deleting immediately afterwards races the teardown.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

// =============================================================================
// Metadata Persistence
// =============================================================================

/// Default directory for the Proxmox side-car metadata document.
pub const METADATA_DIR: &str = "/var/lib/skiff/proxmox";

/// File name of the single JSON document holding the VMID-to-labels table.
pub const METADATA_FILE: &str = "containers.json";

/// Synthesized label carrying the caller-assigned entity name.
///
/// Proxmox has no native name field for LXC containers; the backend stores
/// the name under this key in the metadata table and recovers it on every
/// inventory join.
pub const NAME_LABEL: &str = "skiff-name";
