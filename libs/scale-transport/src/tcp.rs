use crate::traits::{ConnectionState, DataEvent, Transport};
use async_trait::async_trait;
use scale_errors::TransportError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw-TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub host: String,
    pub port: u16,
    pub read_buffer_size: usize,
    pub read_timeout: Duration,
    /// Minimum reconnect backoff.
    pub backoff_base: Duration,
    /// Maximum reconnect backoff.
    pub backoff_cap: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4001,
            read_buffer_size: 4096,
            read_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

/// TCP transport to the serial-to-Ethernet converter.
pub struct TcpTransport {
    config: TcpTransportConfig,
    data_tx: broadcast::Sender<DataEvent>,
    state_tx: watch::Sender<ConnectionState>,
    write_half: Arc<Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>>,
    started: AtomicBool,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        let (data_tx, _) = broadcast::channel(1024);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            data_tx,
            state_tx,
            write_half: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn connect_once(&self) -> Result<TcpStream, TransportError> {
        let addr = self.addr();
        TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::Connect(format!("{addr}: {e}")))
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let mut backoff = self.config.backoff_base;
        loop {
            if cancel.is_cancelled() {
                let _ = self.state_tx.send(ConnectionState::Disconnected);
                return;
            }

            let _ = self.state_tx.send(ConnectionState::Connecting);
            let stream = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.connect_once() => result,
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, backoff_ms = backoff.as_millis(), "tcp connect failed, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.config.backoff_cap);
                    continue;
                }
            };

            info!(addr = %self.addr(), "tcp transport connected");
            backoff = self.config.backoff_base;
            let _ = self.state_tx.send(ConnectionState::Connected);

            let (mut read_half, write_half) = stream.into_split();
            *self.write_half.lock().await = Some(write_half);

            let mut buf = vec![0u8; self.config.read_buffer_size];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = self.state_tx.send(ConnectionState::Disconnected);
                        return;
                    }
                    read = read_half.read(&mut buf) => {
                        match read {
                            Ok(0) => {
                                warn!("tcp peer closed connection");
                                break;
                            }
                            Ok(n) => {
                                debug!(bytes = n, "tcp data received");
                                let _ = self.data_tx.send(DataEvent {
                                    bytes: buf[..n].to_vec(),
                                    received_at: Instant::now(),
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, "tcp read failed");
                                break;
                            }
                        }
                    }
                }
            }

            *self.write_half.lock().await = None;
            let _ = self.state_tx.send(ConnectionState::Disconnected);
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(self: Arc<Self>, cancel: CancellationToken) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move { self.run_loop(cancel).await });
    }

    fn subscribe_data(&self) -> broadcast::Receiver<DataEvent> {
        self.data_tx.subscribe()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn send(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.write_half.lock().await;
        match guard.as_mut() {
            Some(w) => w
                .write_all(data)
                .await
                .map(|_| data.len())
                .map_err(|e| TransportError::Write(e.to_string())),
            None => Err(TransportError::Write("not connected".to_string())),
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_bounds() {
        let cfg = TcpTransportConfig::default();
        assert_eq!(cfg.port, 4001);
        assert!(cfg.backoff_base >= Duration::from_millis(100));
        assert!(cfg.backoff_cap >= Duration::from_secs(2));
    }

    #[test]
    fn fresh_transport_starts_disconnected() {
        let t = TcpTransport::new(TcpTransportConfig::default());
        assert_eq!(t.current_state(), ConnectionState::Disconnected);
    }
}
