use crate::config::ScaleServiceConfig;
use scale_discovery::Supervisor;
use scale_errors::ScaleError;
use scale_model::{DataClassification, PerformanceRequirements, StoragePolicy};
use scale_storage::{InMemoryRepository, PerformanceTracker, Repository, StorageRouter};
use scale_templates::TemplateStore;
use scale_transport::{TcpTransport, TcpTransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything a running instance needs to hand out to callers: the
/// discovery supervisor driving sessions, and the storage router that
/// ingested readings are handed to once a session completes.
pub struct ScaleService {
    pub supervisor: Arc<Supervisor>,
    pub storage: Arc<StorageRouter>,
}

impl ScaleService {
    /// Builds the full component graph: transport, stability monitor (via
    /// the supervisor), template store, discovery supervisor, and storage
    /// router with two in-memory repositories registered as the "relational"
    /// primary and "timeseries" fallback.
    pub fn build(config: &ScaleServiceConfig) -> Self {
        let templates = Arc::new(TemplateStore::new());
        let supervisor = Supervisor::new(templates);

        let perf = Arc::new(PerformanceTracker::new());
        let storage = Arc::new(StorageRouter::new(perf));

        let relational = InMemoryRepository::new("relational");
        let timeseries = InMemoryRepository::new("timeseries");
        storage.register_backend(relational.clone() as Arc<dyn Repository>);
        storage.register_backend(timeseries.clone() as Arc<dyn Repository>);

        for (classification, primary, fallback) in [
            (DataClassification::DiscreteReading, "relational", "timeseries"),
            (DataClassification::TimeSeries, "timeseries", "relational"),
            (DataClassification::Configuration, "relational", "timeseries"),
        ] {
            storage.set_policy(StoragePolicy {
                classification,
                primary_backend: primary.to_string(),
                fallback_backend: Some(fallback.to_string()),
                retention: Duration::from_secs(30 * 24 * 3600),
                batch_size: 100,
                flush_interval: Duration::from_secs(5),
                performance_requirements: PerformanceRequirements::default(),
            });
        }

        info!(host = %config.transport.host, port = config.transport.port, "scale service built");

        Self { supervisor, storage }
    }

    /// Starts a discovery session against a freshly constructed TCP
    /// transport for the configured host/port.
    pub async fn start_discovery(&self, config: &ScaleServiceConfig) -> Result<String, ScaleError> {
        let tcp_config: TcpTransportConfig = (&config.transport).into();
        let transport = Arc::new(TcpTransport::new(tcp_config));
        let session_config = (&config.discovery).into();
        let session_id = self.supervisor.start(transport, session_config).await?;
        Ok(session_id)
    }

    /// Cancels every in-flight discovery session, for the ctrl-c handler
    /// in `main`.
    pub async fn shutdown(&self) {
        for session_id in self.supervisor.active_session_ids() {
            if let Err(e) = self.supervisor.cancel(&session_id).await {
                tracing::warn!(%session_id, error = %e, "failed to cancel session during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_registers_both_backends_with_a_policy() {
        let config = ScaleServiceConfig::default();
        let service = ScaleService::build(&config);
        let reading = scale_model::Reading {
            device_id: "scale-1".to_string(),
            channel: 1,
            timestamp: chrono::Utc::now(),
            raw_value: 1.0,
            processed_value: Some(1.0),
            rate: None,
            unit: "kg".to_string(),
            status: None,
            quality: scale_model::ReadingQuality::Good,
            stability_score: Some(90.0),
            template_id: Some("generic".to_string()),
            metadata: Default::default(),
        };
        let result = service.storage.route(&reading).await;
        assert!(result.is_ok());
    }
}
