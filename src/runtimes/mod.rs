//! Runtime backend implementations.
//!
//! Each backend translates the generic [`ContainerRuntime`] contract into
//! one virtualization technology. The factory is the single place that
//! maps a configuration variant to a concrete backend; everything past it
//! goes through the trait object, with no further dispatch on runtime
//! kind.

pub mod proxmox;

pub use self::proxmox::ProxmoxRuntime;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;

/// Constructs the backend selected by the configuration.
///
/// The returned runtime is disconnected; callers invoke
/// [`connect`](ContainerRuntime::connect) before issuing lifecycle
/// operations. Construct once at startup and share the handle - backends
/// are safe for arbitrarily many concurrent callers.
///
/// The Docker backend is a thin pass-through over the Docker SDK and
/// ships with the platform rather than with this crate; selecting it here
/// reports [`Error::RuntimeUnavailable`].
pub fn new_runtime(config: &RuntimeConfig) -> Result<Box<dyn ContainerRuntime>> {
    match config {
        RuntimeConfig::Proxmox(proxmox) => {
            Ok(Box::new(ProxmoxRuntime::new(proxmox.clone())?))
        }
        RuntimeConfig::Docker(_) => Err(Error::RuntimeUnavailable {
            runtime: "docker".to_string(),
            reason: "the Docker backend ships with the platform server, not this crate"
                .to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DockerConfig, ProxmoxConfig};
    use crate::runtime::RuntimeKind;

    #[test]
    fn test_factory_builds_proxmox() {
        let config = RuntimeConfig::Proxmox(ProxmoxConfig {
            host: "pve.local:8006".into(),
            node: "pve".into(),
            token_id: "skiff@pve!orchestrator".into(),
            token_secret: "secret".into(),
            storage: "local-lvm".into(),
            vmid_start: 200,
            vmid_end: 300,
            skip_tls_verify: true,
        });

        let runtime = new_runtime(&config).unwrap();
        assert_eq!(runtime.kind(), RuntimeKind::Proxmox);
        assert!(!runtime.is_connected());
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = RuntimeConfig::Proxmox(ProxmoxConfig::default());
        assert!(matches!(new_runtime(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_reports_docker_unavailable() {
        let config = RuntimeConfig::Docker(DockerConfig::default());
        assert!(matches!(
            new_runtime(&config),
            Err(Error::RuntimeUnavailable { .. })
        ));
    }
}
