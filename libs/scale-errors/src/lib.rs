//! Shared error taxonomy for the scale ingestion core.
//!
//! Each subsystem gets its own `thiserror` enum, kept distinct so transport,
//! discovery, and storage failures carry their own variants, and the
//! top-level [`ScaleError`] wraps all of them via `#[from]`.

use thiserror::Error;

/// Transport-layer failures.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Discovery-engine failures.
#[derive(Error, Debug, Clone)]
pub enum DiscoveryError {
    #[error("no frames captured during baseline window")]
    NoFramesCaptured,
    #[error("ground-truth correlation too low: {0:.1}")]
    LowCorrelation(f64),
    #[error("template synthesis failed: {0}")]
    TemplateSynthesisFailed(String),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session is in phase {0:?}, operation requires a different phase")]
    InvalidPhase(String),
    #[error("session already completed")]
    AlreadyCompleted,
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("session cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Storage-router failures.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Transient: timeout, connection reset — the router tries the next backend.
    #[error("transient storage error on {backend}: {message}")]
    Transient { backend: String, message: String },
    /// Permanent: auth, schema mismatch — still only demotes within this call.
    #[error("permanent storage error on {backend}: {message}")]
    Permanent { backend: String, message: String },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("all backends failed: {0:?}")]
    AllBackendsFailed(Vec<String>),
}

/// Template-store failures.
#[derive(Error, Debug, Clone)]
pub enum TemplateStoreError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("template {0} is builtin and cannot be deleted")]
    BuiltinImmutable(String),
    #[error("template name {0} already exists")]
    DuplicateName(String),
    #[error("invalid template: {0}")]
    ValidationError(String),
}

/// Top-level error composing every subsystem.
#[derive(Error, Debug, Clone)]
pub enum ScaleError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    TemplateStore(#[from] TemplateStoreError),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = ScaleError> = std::result::Result<T, E>;
