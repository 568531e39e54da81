//! # Proxmox VE LXC Backend
//!
//! Implements the [`ContainerRuntime`] trait against the Proxmox VE
//! management API (`https://<host>:8006/api2/json`), bridging three gaps
//! between the generic contract and the hypervisor:
//!
//! | Gap | Bridge |
//! |-----|--------|
//! | Entities are addressed by numeric VMID | [`VmidAllocator`] over the configured range |
//! | No native label or name concept | [`MetadataStore`] side-car document |
//! | LXC-style, not image-style, configuration | one-way lossy translation in `create` |
//!
//! ## Authentication
//!
//! Every request carries a static API token header
//! (`Authorization: PVEAPIToken=<id>=<secret>`); no session or ticket
//! handling is involved. Self-signed deployments set `skip_tls_verify` in
//! the configuration.
//!
//! ## Wire Format
//!
//! Responses arrive as `{"data": <payload>}` envelopes. Each endpoint has
//! an explicit schema type; a payload that does not match decodes into
//! [`Error::Decode`] instead of being silently probed. Fields the API
//! omits stay at their documented zero values, so a sparse response never
//! fails a whole query.
//!
//! ## Translation Gaps
//!
//! The descriptor-to-LXC translation is deliberately lossy. Ports,
//! environment variables, entrypoint/command, health checks, restart
//! policies, and the explicit network list are dropped: networking is
//! pinned to the default bridge with platform-assigned addresses, and the
//! root filesystem is a fixed-size carve from the configured storage
//! pool. These are capability gaps, not errors.
//!
//! ## Composite Operations
//!
//! `restart` and `remove` run a best-effort stop first: a stop failure is
//! logged and swallowed, the composite proceeds after a settle delay, and
//! only the final step's failure propagates. No compensating rollback is
//! attempted - remote state stays exactly as the last successful sub-step
//! left it. `recreate` is the exception: its `remove` step must succeed
//! before the replacement is created, so a half-completed recreation is
//! always visible to the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use skiffrun::config::{ProxmoxConfig, RuntimeConfig};
//! use skiffrun::runtimes::new_runtime;
//!
//! #[tokio::main]
//! async fn main() -> skiffrun::Result<()> {
//!     let runtime = new_runtime(&RuntimeConfig::Proxmox(ProxmoxConfig {
//!         host: "pve.local:8006".into(),
//!         node: "pve".into(),
//!         token_id: "skiff@pve!orchestrator".into(),
//!         token_secret: std::env::var("PVE_TOKEN").unwrap(),
//!         storage: "local-lvm".into(),
//!         vmid_start: 200,
//!         vmid_end: 300,
//!         skip_tls_verify: false,
//!     }))?;
//!
//!     runtime.connect().await?;
//!     let id = runtime.create(&Default::default()).await?;
//!     runtime.start(&id).await?;
//!     runtime.close().await?;
//!     Ok(())
//! }
//! ```

use crate::config::ProxmoxConfig;
use crate::constants::{
    API_TIMEOUT, DEFAULT_CORES, DEFAULT_MEMORY_MIB, DEFAULT_SWAP_MIB, LXC_DEFAULT_NET0,
    LXC_FEATURES, METADATA_DIR, NAME_LABEL, ROOTFS_SIZE_GIB, ROOT_PASSWORD_LEN, SETTLE_DELAY,
};
use crate::error::{Error, Result};
use crate::metadata::{MetadataStore, NameIndex};
use crate::runtime::{
    Container, ContainerConfig, ContainerDetails, ContainerRuntime, ContainerState,
    ContainerStats, Image, LogOptions, LogStream, Network, RuntimeKind,
};
use crate::vmid::VmidAllocator;
use async_trait::async_trait;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

// =============================================================================
// Transport
// =============================================================================

/// One authenticated round trip to the management API.
///
/// The seam between lifecycle logic and the wire: production uses the
/// reqwest-backed [`HttpTransport`], tests script a fake to assert call
/// order and counts.
#[async_trait]
trait ApiTransport: Send + Sync {
    /// Sends a request and returns the decoded `data` payload.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;
}

/// Envelope wrapping every management API response.
#[derive(Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    data: Value,
}

/// HTTPS transport with static API-token authentication.
struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl HttpTransport {
    fn new(config: &ProxmoxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .timeout(API_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://{}/api2/json", config.host),
            auth_header: format!(
                "PVEAPIToken={}={}",
                config.token_id, config.token_secret
            ),
        })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", &self.auth_header);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // Surface the raw body verbatim as error detail.
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiEnvelope = response.json().await?;
        Ok(envelope.data)
    }
}

// =============================================================================
// Endpoint Schemas
// =============================================================================

/// `GET /version`
#[derive(Debug, Deserialize)]
struct VersionData {
    version: String,
}

/// One entry of `GET /nodes/{node}/lxc`.
#[derive(Debug, Deserialize)]
struct LxcSummary {
    vmid: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// `GET /nodes/{node}/lxc/{vmid}/config`
#[derive(Debug, Default, Deserialize)]
struct LxcConfigData {
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    ostemplate: Option<String>,
    /// Memory limit in MiB.
    #[serde(default)]
    memory: Option<u64>,
    /// Swap limit in MiB.
    #[serde(default)]
    swap: Option<u64>,
    #[serde(default)]
    cores: Option<u32>,
    #[serde(default)]
    unprivileged: Option<u8>,
}

/// `GET /nodes/{node}/lxc/{vmid}/status/current`
#[derive(Debug, Default, Deserialize)]
struct LxcStatusData {
    #[serde(default)]
    status: Option<String>,
    /// CPU load as a 0..1 fraction.
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    mem: u64,
    #[serde(default)]
    maxmem: u64,
    #[serde(default)]
    netin: u64,
    #[serde(default)]
    netout: u64,
    #[serde(default)]
    diskread: u64,
    #[serde(default)]
    diskwrite: u64,
}

/// One entry of `GET /nodes/{node}/storage/{storage}/content`.
#[derive(Debug, Deserialize)]
struct StorageContent {
    volid: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    ctime: i64,
}

/// `POST /nodes/{node}/lxc` request body.
#[derive(Debug, Serialize)]
struct LxcCreateRequest {
    vmid: u32,
    hostname: String,
    ostemplate: String,
    storage: String,
    password: String,
    unprivileged: bool,
    start: bool,
    /// MiB.
    memory: u64,
    /// MiB.
    swap: u64,
    cores: u32,
    net0: String,
    rootfs: String,
    features: String,
    /// `mp0`, `mp1`, ... mount point entries.
    #[serde(flatten)]
    mounts: BTreeMap<String, String>,
}

fn decode<T: DeserializeOwned>(endpoint: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Decode {
        endpoint: endpoint.to_string(),
        source: e,
    })
}

// =============================================================================
// Runtime
// =============================================================================

/// Proxmox VE LXC container runtime.
///
/// One instance manages the VMID range and metadata document it was
/// configured with; the design assumes exactly one live backend process
/// per range and metadata path. All operations are safe under concurrent
/// invocation within that process.
pub struct ProxmoxRuntime {
    config: ProxmoxConfig,
    node: String,
    transport: RwLock<Option<Arc<dyn ApiTransport>>>,
    allocator: VmidAllocator,
    metadata: MetadataStore,
    names: NameIndex,
}

impl ProxmoxRuntime {
    /// Creates a disconnected runtime after validating the configuration.
    ///
    /// Metadata lives at the platform default location; embedders that
    /// relocate state use [`with_metadata_root`](Self::with_metadata_root).
    pub fn new(config: ProxmoxConfig) -> Result<Self> {
        Self::with_metadata_root(config, METADATA_DIR)
    }

    /// Creates a disconnected runtime with a custom metadata directory.
    pub fn with_metadata_root(
        config: ProxmoxConfig,
        metadata_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            node: config.node.clone(),
            allocator: VmidAllocator::new(config.vmid_start, config.vmid_end),
            metadata: MetadataStore::new(metadata_root),
            names: NameIndex::new(),
            transport: RwLock::new(None),
            config,
        })
    }

    /// Resolves a caller-assigned name to its VMID.
    ///
    /// Checks the name index first (populated by `create` within this
    /// process), then falls back to a metadata scan for entities created
    /// by an earlier process lifetime.
    pub fn resolve_name(&self, name: &str) -> Result<Option<u32>> {
        if let Some(vmid) = self.names.id_for(name) {
            return Ok(Some(vmid));
        }
        self.metadata.find_by_name(name)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transport(&self) -> Result<Arc<dyn ApiTransport>> {
        self.transport
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?
            .clone()
            .ok_or(Error::NotConnected("proxmox"))
    }

    async fn api<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let transport = self.transport()?;
        let data = transport.request(method, path, body).await?;
        decode(path, data)
    }

    fn parse_vmid(&self, id: &str) -> Result<u32> {
        id.parse().map_err(|_| Error::InvalidEntityId {
            id: id.to_string(),
            reason: "not a numeric VMID".to_string(),
        })
    }

    /// Recomputes the VMID cursor from the node's live inventory.
    async fn refresh_allocator(&self, transport: &dyn ApiTransport) -> Result<()> {
        let path = format!("/nodes/{}/lxc", self.node);
        let data = transport.request(Method::GET, &path, None).await?;
        let inventory: Vec<LxcSummary> = decode(&path, data)?;
        self.allocator.rebase(inventory.iter().map(|c| c.vmid));
        Ok(())
    }

    fn container_from_summary(&self, summary: &LxcSummary) -> Result<Container> {
        // Caller-assigned name from metadata wins; the hostname Proxmox
        // reports is only a fallback for containers created out-of-band.
        let name = match self.metadata.get_label(summary.vmid, NAME_LABEL)? {
            Some(name) => name,
            None => summary.name.clone().unwrap_or_default(),
        };

        Ok(Container {
            id: summary.vmid.to_string(),
            name,
            image: String::new(),
            state: map_state(summary.status.as_deref()),
            status: summary
                .status
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            created: 0,
            labels: self.metadata.get(summary.vmid)?.unwrap_or_default(),
            ports: Vec::new(),
            networks: Vec::new(),
        })
    }
}

/// Maps a Proxmox status string onto the generic state model.
fn map_state(status: Option<&str>) -> ContainerState {
    match status {
        Some("running") => ContainerState::Running,
        Some("stopped") => ContainerState::Exited,
        Some("paused") => ContainerState::Paused,
        _ => ContainerState::Dead,
    }
}

/// Translates the generic descriptor into an LXC creation request.
///
/// See the module documentation for the fields this translation drops.
fn build_lxc_request(
    vmid: u32,
    config: &ContainerConfig,
    proxmox: &ProxmoxConfig,
) -> LxcCreateRequest {
    let hostname = if config.hostname.is_empty() {
        config.name.clone()
    } else {
        config.hostname.clone()
    };

    let memory = if config.memory > 0 {
        config.memory / (1024 * 1024)
    } else {
        DEFAULT_MEMORY_MIB
    };
    let swap = if config.memory_swap > 0 {
        config.memory_swap / (1024 * 1024)
    } else {
        DEFAULT_SWAP_MIB
    };
    let cores = if config.cpus > 0.0 {
        config.cpus as u32
    } else {
        DEFAULT_CORES
    };

    let mut mounts = BTreeMap::new();
    for (index, volume) in config.volumes.iter().enumerate() {
        let mut entry = format!("{},mp={}", volume.source, volume.target);
        if volume.read_only {
            entry.push_str(",ro=1");
        }
        mounts.insert(format!("mp{}", index), entry);
    }

    LxcCreateRequest {
        vmid,
        hostname,
        ostemplate: config.image.clone(),
        storage: proxmox.storage.clone(),
        password: generate_root_password(),
        unprivileged: !config.privileged,
        start: false,
        memory,
        swap,
        cores,
        net0: LXC_DEFAULT_NET0.to_string(),
        rootfs: format!("{}:{}", proxmox.storage, ROOTFS_SIZE_GIB),
        features: LXC_FEATURES.to_string(),
        mounts,
    }
}

/// Random root password for the created container.
///
/// The password is never stored; console access goes through `pct` on the
/// node, not through this credential.
fn generate_root_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOT_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl ContainerRuntime for ProxmoxRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Proxmox
    }

    async fn version(&self) -> String {
        if !self.is_connected() {
            return "unknown".to_string();
        }
        match self.api::<VersionData>(Method::GET, "/version", None).await {
            Ok(data) => data.version,
            Err(_) => "unknown".to_string(),
        }
    }

    // =========================================================================
    // Connection Lifecycle
    // =========================================================================

    async fn connect(&self) -> Result<()> {
        let transport: Arc<dyn ApiTransport> = Arc::new(HttpTransport::new(&self.config)?);

        // Reachability and token check before anything else.
        let version: VersionData =
            decode("/version", transport.request(Method::GET, "/version", None).await?)?;
        info!("Connected to Proxmox VE {}", version.version);

        // Both recovery steps are non-fatal: an unreadable metadata file
        // costs labels, not the connection, and a failed inventory fetch
        // leaves the cursor at the configured start.
        if let Err(e) = self.metadata.load().await {
            warn!("Failed to load Proxmox metadata: {}", e);
        }
        if let Err(e) = self.refresh_allocator(transport.as_ref()).await {
            warn!("Failed to recompute VMID cursor from inventory: {}", e);
        }

        *self
            .transport
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))? = Some(transport);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.transport
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    async fn close(&self) -> Result<()> {
        // Synchronous flush: the durability point for every label written
        // since connect. Closing twice re-flushes unchanged data.
        if let Err(e) = self.metadata.save() {
            warn!("Failed to save Proxmox metadata: {}", e);
        }
        *self
            .transport
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))? = None;
        Ok(())
    }

    // =========================================================================
    // Entity Lifecycle
    // =========================================================================

    async fn create(&self, config: &ContainerConfig) -> Result<String> {
        // Connection gate before allocation: an exhausted range must fail
        // without a remote call, and a disconnected runtime must fail
        // without consuming a VMID.
        let transport = self.transport()?;
        let vmid = self.allocator.allocate()?;

        let request = build_lxc_request(vmid, config, &self.config);
        let body = serde_json::to_value(&request)
            .map_err(|e| Error::Internal(format!("unserializable LXC request: {}", e)))?;
        let path = format!("/nodes/{}/lxc", self.node);
        transport.request(Method::POST, &path, Some(body)).await?;

        // Label bookkeeping is best-effort: the container exists now, and
        // that outcome is not sacrificed for metadata durability.
        if !config.labels.is_empty() {
            if let Err(e) = self.metadata.set(vmid, config.labels.clone()) {
                warn!("Failed to record labels for VMID {}: {}", vmid, e);
            }
        }
        if let Err(e) = self.metadata.set_label(vmid, NAME_LABEL, &config.name) {
            warn!("Failed to record name for VMID {}: {}", vmid, e);
        }
        self.names.insert(&config.name, vmid);

        info!("Created LXC container {} (VMID {})", config.name, vmid);
        Ok(vmid.to_string())
    }

    async fn start(&self, id: &str) -> Result<()> {
        let vmid = self.parse_vmid(id)?;
        let _: Value = self
            .api(
                Method::POST,
                &format!("/nodes/{}/lxc/{}/status/start", self.node, vmid),
                None,
            )
            .await?;
        info!("Started LXC container VMID {}", vmid);
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let vmid = self.parse_vmid(id)?;
        let _: Value = self
            .api(
                Method::POST,
                &format!("/nodes/{}/lxc/{}/status/stop", self.node, vmid),
                None,
            )
            .await?;
        info!("Stopped LXC container VMID {}", vmid);
        Ok(())
    }

    async fn restart(&self, id: &str) -> Result<()> {
        if let Err(e) = self.stop(id).await {
            warn!("Stop before restart of {} failed: {}", id, e);
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        self.start(id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let vmid = self.parse_vmid(id)?;

        if let Err(e) = self.stop(id).await {
            warn!("Stop before removal of {} failed: {}", id, e);
        }
        tokio::time::sleep(SETTLE_DELAY).await;

        let _: Value = self
            .api(
                Method::DELETE,
                &format!("/nodes/{}/lxc/{}", self.node, vmid),
                None,
            )
            .await?;

        // Metadata is purged only once the deletion stands.
        if let Err(e) = self.metadata.delete(vmid) {
            warn!("Failed to purge metadata for VMID {}: {}", vmid, e);
        }
        self.names.remove(vmid);

        info!("Removed LXC container VMID {}", vmid);
        Ok(())
    }

    async fn recreate(&self, id: &str, config: &ContainerConfig) -> Result<String> {
        // A failed removal propagates; creating the replacement anyway
        // would hide the half-completed recreation from the caller.
        self.remove(id).await?;
        self.create(config).await
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    async fn list(&self) -> Result<Vec<Container>> {
        let inventory: Vec<LxcSummary> = self
            .api(Method::GET, &format!("/nodes/{}/lxc", self.node), None)
            .await?;

        inventory
            .iter()
            .map(|summary| self.container_from_summary(summary))
            .collect()
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let vmid = self.parse_vmid(id)?;
        let lxc: LxcConfigData = self
            .api(
                Method::GET,
                &format!("/nodes/{}/lxc/{}/config", self.node, vmid),
                None,
            )
            .await?;

        // Live state is a bonus; a failed status query degrades to the
        // unknown state instead of failing the inspection.
        let status: LxcStatusData = match self
            .api(
                Method::GET,
                &format!("/nodes/{}/lxc/{}/status/current", self.node, vmid),
                None,
            )
            .await
        {
            Ok(status) => status,
            Err(e) => {
                debug!("Status query for VMID {} failed: {}", vmid, e);
                LxcStatusData::default()
            }
        };

        let name = self.metadata.get_label(vmid, NAME_LABEL)?.unwrap_or_default();
        let labels = self.metadata.get(vmid)?.unwrap_or_default();
        let image = lxc.ostemplate.clone().unwrap_or_default();

        Ok(ContainerDetails {
            container: Container {
                id: id.to_string(),
                name: name.clone(),
                image: image.clone(),
                state: map_state(status.status.as_deref()),
                status: status.status.unwrap_or_else(|| "unknown".to_string()),
                created: 0,
                labels: labels.clone(),
                ports: Vec::new(),
                networks: Vec::new(),
            },
            config: ContainerConfig {
                name,
                image,
                hostname: lxc.hostname.unwrap_or_default(),
                labels,
                memory: lxc.memory.unwrap_or(0) * 1024 * 1024,
                memory_swap: lxc.swap.unwrap_or(0) * 1024 * 1024,
                cpus: lxc.cores.unwrap_or(0) as f64,
                privileged: lxc.unprivileged == Some(0),
                ..ContainerConfig::default()
            },
            mounts: Vec::new(),
        })
    }

    async fn logs(&self, id: &str, opts: &LogOptions) -> Result<LogStream> {
        let _ = opts;
        let vmid = self.parse_vmid(id)?;
        debug!("Log stream requested for VMID {}", vmid);

        // Deliberately a placeholder stream rather than an error: callers
        // render the message in their log view instead of failing it.
        Ok(Box::new(std::io::Cursor::new(
            b"log streaming is not yet supported for Proxmox LXC\n".to_vec(),
        )))
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats> {
        let vmid = self.parse_vmid(id)?;
        let status: LxcStatusData = self
            .api(
                Method::GET,
                &format!("/nodes/{}/lxc/{}/status/current", self.node, vmid),
                None,
            )
            .await?;

        let memory_percent = if status.maxmem > 0 {
            status.mem as f64 / status.maxmem as f64 * 100.0
        } else {
            0.0
        };

        Ok(ContainerStats {
            id: id.to_string(),
            name: self.metadata.get_label(vmid, NAME_LABEL)?.unwrap_or_default(),
            cpu_percent: status.cpu * 100.0,
            memory_usage: status.mem,
            memory_limit: status.maxmem,
            memory_percent,
            network_rx: status.netin,
            network_tx: status.netout,
            block_read: status.diskread,
            block_write: status.diskwrite,
        })
    }

    async fn stats_all(&self) -> Result<Vec<ContainerStats>> {
        let containers = self.list().await?;

        let mut all = Vec::with_capacity(containers.len());
        for container in containers {
            match self.stats(&container.id).await {
                Ok(stats) => all.push(stats),
                Err(e) => debug!("Skipping stats for {}: {}", container.id, e),
            }
        }
        Ok(all)
    }

    // =========================================================================
    // Networks & Images
    // =========================================================================

    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.transport()?;
        // Translated containers all live on the default bridge; there is
        // nothing else to enumerate.
        Ok(vec![Network {
            id: "vmbr0".to_string(),
            name: "vmbr0".to_string(),
            driver: "bridge".to_string(),
            labels: HashMap::new(),
        }])
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let path = format!(
            "/nodes/{}/storage/{}/content?content=vztmpl",
            self.node, self.config.storage
        );
        let content: Vec<StorageContent> = self.api(Method::GET, &path, None).await?;

        Ok(content
            .into_iter()
            .map(|template| {
                let name = template
                    .volid
                    .rsplit('/')
                    .next()
                    .unwrap_or("")
                    .to_string();
                Image {
                    id: template.volid,
                    name,
                    size: template.size,
                    created: template.ctime,
                }
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
