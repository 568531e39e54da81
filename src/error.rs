//! Error types for the runtime abstraction layer.

use std::path::PathBuf;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the runtime layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration is missing a required field or is otherwise unusable.
    ///
    /// Detected at backend construction, before any remote call. Fatal to
    /// startup; never produced by a lifecycle operation.
    #[error("invalid runtime configuration: {0}")]
    Config(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// Operation was called before a successful `connect`.
    #[error("not connected to {0}")]
    NotConnected(&'static str),

    /// Transport-level failure (DNS, TLS, timeout, connection refused).
    ///
    /// Surfaced from `connect` and from individual API calls; retryable by
    /// the caller.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Remote API Errors
    // =========================================================================
    /// The management API answered with a non-2xx status.
    ///
    /// The raw response body is carried verbatim as error detail.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// A response decoded as JSON, but not into the shape the endpoint
    /// promises.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    // =========================================================================
    // Identifier Errors
    // =========================================================================
    /// The VMID range is exhausted; no identifier was allocated.
    #[error("VMID range exhausted ({start}..{end})")]
    VmidExhausted { start: u32, end: u32 },

    /// An entity id that is not a valid VMID for this backend.
    #[error("invalid entity id '{id}': {reason}")]
    InvalidEntityId { id: String, reason: String },

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Requested backend is not built into this crate.
    #[error("runtime '{runtime}' not available: {reason}")]
    RuntimeUnavailable { runtime: String, reason: String },

    /// Operation not supported by this backend.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    // =========================================================================
    // Metadata Errors
    // =========================================================================
    /// Failed to read the metadata document from disk.
    #[error("failed to load metadata from {path}: {reason}")]
    MetadataLoad { path: PathBuf, reason: String },

    /// Failed to persist the metadata document.
    #[error("failed to save metadata to {path}: {reason}")]
    MetadataSave { path: PathBuf, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}
