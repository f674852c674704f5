use crate::traits::{ConnectionState, DataEvent, Transport};
use async_trait::async_trait;
use scale_errors::TransportError;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

/// In-memory transport for tests (mirrors `comsrv::core::transport::mock`):
/// feed it bytes with [`MockTransport::push`], it republishes them on the
/// `Transport` data channel exactly like a live link.
pub struct MockTransport {
    data_tx: broadcast::Sender<DataEvent>,
    state_tx: watch::Sender<ConnectionState>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (data_tx, _) = broadcast::channel(1024);
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Arc::new(Self {
            data_tx,
            state_tx,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, bytes: &[u8]) {
        let _ = self.data_tx.send(DataEvent {
            bytes: bytes.to_vec(),
            received_at: Instant::now(),
        });
    }

    pub fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    pub async fn sent_commands(&self) -> Vec<Vec<u8>> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(self: Arc<Self>, _cancel: CancellationToken) {
        // Nothing to spawn — data arrives via `push`.
    }

    fn subscribe_data(&self) -> broadcast::Receiver<DataEvent> {
        self.data_tx.subscribe()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.sent.lock().await.push(data.to_vec());
        Ok(data.len())
    }

    fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushed_bytes_are_observable_by_subscribers() {
        let t = MockTransport::new();
        let mut rx = t.subscribe_data();
        t.push(b"hello");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.bytes, b"hello");
    }

    #[tokio::test]
    async fn send_is_recorded() {
        let t = MockTransport::new();
        t.send(b"W\r\n").await.unwrap();
        assert_eq!(t.sent_commands().await, vec![b"W\r\n".to_vec()]);
    }
}
