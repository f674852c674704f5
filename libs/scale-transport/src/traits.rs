use async_trait::async_trait;
use scale_errors::TransportError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Connection lifecycle state, published on a `watch` channel so a late
/// subscriber sees the current value rather than a replayed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// One chunk of raw bytes as delivered by the transport, with the
/// monotonic receive time.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub bytes: Vec<u8>,
    pub received_at: Instant,
}

/// Byte-transparent link to a scale. No framing logic lives here; frames
/// are recovered by the template.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin the connect/read/reconnect loop in the background. Idempotent:
    /// calling twice on an already-running transport is a no-op. Takes
    /// `Arc<Self>` so the background task can outlive the caller's stack
    /// frame without unsafe lifetime extension.
    async fn start(self: Arc<Self>, cancel: CancellationToken);

    /// Subscribe to incoming data chunks. Each subscriber gets its own
    /// receiver; a slow subscriber may miss events (bounded lag), matching
    /// `tokio::sync::broadcast` semantics.
    fn subscribe_data(&self) -> broadcast::Receiver<DataEvent>;

    /// Subscribe to connection-state changes; the receiver immediately
    /// yields the current state.
    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// Send bytes — used to transmit a template's request-weight command.
    async fn send(&self, data: &[u8]) -> Result<usize, TransportError>;

    fn current_state(&self) -> ConnectionState;
}
