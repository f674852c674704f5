use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scale_errors::StorageError;
use scale_model::Reading;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time connectivity/health snapshot for one backend.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryHealth {
    pub connected: bool,
    pub is_healthy: bool,
    pub last_checked: DateTime<Utc>,
}

/// Result of writing a batch of readings to one backend.
#[derive(Debug, Clone)]
pub struct BatchWriteResult {
    pub batch_size: usize,
    pub successful_writes: usize,
}

/// Storage backend contract. The router never talks to a concrete driver
/// directly; it only ever holds `Arc<dyn Repository>`.
#[async_trait]
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;
    async fn connect(&self) -> Result<(), StorageError>;
    async fn disconnect(&self);
    async fn test_connectivity(&self) -> Result<bool, StorageError>;
    fn health(&self) -> RepositoryHealth;
    async fn write(&self, reading: &Reading) -> Result<(), StorageError>;
    async fn write_batch(&self, readings: &[Reading]) -> Result<BatchWriteResult, StorageError>;
}

/// Injectable failure behavior for [`InMemoryRepository`], used by router
/// tests to force transient/permanent errors without a real backend.
#[derive(Debug, Clone)]
pub enum FailureMode {
    None,
    AlwaysTransient(String),
    AlwaysPermanent(String),
    FailNextNTimes(usize, String),
}

struct State {
    failure: FailureMode,
    connected: bool,
}

/// In-memory test double for a storage backend. Used both as the
/// "relational" and the "time-series" stand-in, distinguished only by the
/// name given at construction.
pub struct InMemoryRepository {
    name: String,
    state: Mutex<State>,
    written: Mutex<Vec<Reading>>,
    write_count: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(State {
                failure: FailureMode::None,
                connected: true,
            }),
            written: Mutex::new(Vec::new()),
            write_count: AtomicUsize::new(0),
        })
    }

    pub fn set_failure_mode(&self, mode: FailureMode) {
        self.state.lock().failure = mode;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn written_readings(&self) -> Vec<Reading> {
        self.written.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::Relaxed)
    }

    fn next_failure(&self) -> Option<StorageError> {
        let mut state = self.state.lock();
        match &mut state.failure {
            FailureMode::None => None,
            FailureMode::AlwaysTransient(msg) => Some(StorageError::Transient {
                backend: self.name.clone(),
                message: msg.clone(),
            }),
            FailureMode::AlwaysPermanent(msg) => Some(StorageError::Permanent {
                backend: self.name.clone(),
                message: msg.clone(),
            }),
            FailureMode::FailNextNTimes(remaining, msg) => {
                if *remaining == 0 {
                    None
                } else {
                    let error = StorageError::Transient {
                        backend: self.name.clone(),
                        message: msg.clone(),
                    };
                    *remaining -= 1;
                    Some(error)
                }
            }
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), StorageError> {
        self.state.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    async fn test_connectivity(&self) -> Result<bool, StorageError> {
        Ok(self.state.lock().connected)
    }

    fn health(&self) -> RepositoryHealth {
        let state = self.state.lock();
        RepositoryHealth {
            connected: state.connected,
            is_healthy: state.connected && !matches!(state.failure, FailureMode::AlwaysPermanent(_)),
            last_checked: Utc::now(),
        }
    }

    async fn write(&self, reading: &Reading) -> Result<(), StorageError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        if !self.state.lock().connected {
            return Err(StorageError::BackendUnavailable(self.name.clone()));
        }
        self.written.lock().push(reading.clone());
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_batch(&self, readings: &[Reading]) -> Result<BatchWriteResult, StorageError> {
        if let Some(err) = self.next_failure() {
            return Err(err);
        }
        if !self.state.lock().connected {
            return Err(StorageError::BackendUnavailable(self.name.clone()));
        }
        let mut written = self.written.lock();
        written.extend(readings.iter().cloned());
        self.write_count.fetch_add(readings.len(), Ordering::Relaxed);
        Ok(BatchWriteResult {
            batch_size: readings.len(),
            successful_writes: readings.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            device_id: "scale-1".to_string(),
            channel: 1,
            timestamp: Utc::now(),
            raw_value: 12.3,
            processed_value: Some(12.3),
            rate: None,
            unit: "kg".to_string(),
            status: None,
            quality: scale_model::ReadingQuality::Good,
            stability_score: Some(95.0),
            template_id: Some("mettler_toledo_sics".to_string()),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn always_transient_mode_fails_every_write() {
        let repo = InMemoryRepository::new("relational");
        repo.set_failure_mode(FailureMode::AlwaysTransient("timeout".to_string()));
        assert!(repo.write(&reading()).await.is_err());
    }

    #[tokio::test]
    async fn fail_next_n_times_recovers_after_budget_exhausted() {
        let repo = InMemoryRepository::new("relational");
        repo.set_failure_mode(FailureMode::FailNextNTimes(2, "reset".to_string()));
        assert!(repo.write(&reading()).await.is_err());
        assert!(repo.write(&reading()).await.is_err());
        assert!(repo.write(&reading()).await.is_ok());
        assert_eq!(repo.write_count(), 1);
    }

    #[tokio::test]
    async fn disconnected_backend_rejects_writes() {
        let repo = InMemoryRepository::new("relational");
        repo.set_connected(false);
        assert!(repo.write(&reading()).await.is_err());
        assert!(!repo.health().connected);
    }
}
