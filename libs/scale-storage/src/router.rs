use crate::perf::{OpSample, OpType, PerformanceTracker};
use crate::repository::Repository;
use dashmap::DashMap;
use rand::Rng;
use scale_errors::StorageError;
use scale_model::{DataClassification, Reading, StoragePolicy};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Outcome of routing a single reading.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub classification: DataClassification,
    pub backend: String,
    pub attempts: Vec<String>,
}

/// Per-backend outcome inside a batch route, keyed by classification.
#[derive(Debug, Clone)]
pub struct BackendBatchResult {
    pub backend: String,
    pub batch_size: usize,
    pub successful_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchRouteResult {
    pub per_backend: Vec<BackendBatchResult>,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub primary: String,
    pub secondary: Option<String>,
    pub confidence: f64,
    pub performance_estimate: f64,
}

/// Routes readings to storage backends by classification, honoring a
/// per-classification primary/fallback policy and recording outcomes in
/// the performance tracker.
pub struct StorageRouter {
    backends: DashMap<String, Arc<dyn Repository>>,
    policies: DashMap<DataClassification, StoragePolicy>,
    perf: Arc<PerformanceTracker>,
}

impl StorageRouter {
    pub fn new(perf: Arc<PerformanceTracker>) -> Self {
        Self {
            backends: DashMap::new(),
            policies: DashMap::new(),
            perf,
        }
    }

    pub fn register_backend(&self, repo: Arc<dyn Repository>) {
        self.backends.insert(repo.name().to_string(), repo);
    }

    pub fn set_policy(&self, policy: StoragePolicy) {
        self.policies.insert(policy.classification, policy);
    }

    /// First-match-wins classification: a parsed scale reading is always
    /// `DiscreteReading`; everything else is distinguished by tag.
    pub fn classify(&self, reading: &Reading) -> DataClassification {
        if reading.template_id.is_some() {
            return DataClassification::DiscreteReading;
        }
        if reading.tag("device_type").map(|t| t.contains("6051")).unwrap_or(false) {
            return DataClassification::TimeSeries;
        }
        if reading.tag("data_type") == Some("configuration") {
            return DataClassification::Configuration;
        }
        DataClassification::TimeSeries
    }

    fn policy_for(&self, classification: DataClassification) -> Result<StoragePolicy, StorageError> {
        self.policies
            .get(&classification)
            .map(|p| p.clone())
            .ok_or_else(|| StorageError::BackendUnavailable(format!("no policy for {classification:?}")))
    }

    fn backend_eligible(&self, name: &str) -> Option<Arc<dyn Repository>> {
        let repo = self.backends.get(name)?.clone();
        let health = repo.health();
        if health.connected && health.is_healthy {
            Some(repo)
        } else {
            None
        }
    }

    /// Tries each backend in `policy.backend_order()` sequentially; the
    /// fallback is only attempted after the primary returns an error.
    pub async fn route(&self, reading: &Reading) -> Result<RouteResult, StorageError> {
        let classification = self.classify(reading);
        let policy = self.policy_for(classification)?;
        let mut attempts = Vec::new();

        for name in policy.backend_order() {
            attempts.push(name.clone());
            let Some(repo) = self.backend_eligible(&name) else {
                warn!(backend = %name, "backend ineligible, trying next");
                continue;
            };

            let start = Instant::now();
            let result = repo.write(reading).await;
            let duration = start.elapsed();
            self.perf.record(
                &name,
                OpSample {
                    op_type: OpType::Write,
                    ts: Instant::now(),
                    duration,
                    points_processed: 1,
                    points_failed: if result.is_ok() { 0 } else { 1 },
                    success: result.is_ok(),
                },
            );

            match result {
                Ok(()) => {
                    return Ok(RouteResult {
                        classification,
                        backend: name,
                        attempts,
                    })
                }
                Err(StorageError::Permanent { .. }) => continue,
                Err(StorageError::Transient { .. }) => continue,
                Err(other) => {
                    warn!(backend = %name, error = %other, "backend write failed");
                    continue;
                }
            }
        }

        Err(StorageError::AllBackendsFailed(attempts))
    }

    /// Groups readings by classification, then writes each group's backend
    /// batch in one call. An empty input is a no-op success.
    pub async fn route_batch(&self, readings: &[Reading]) -> BatchRouteResult {
        if readings.is_empty() {
            return BatchRouteResult::default();
        }

        let mut groups: std::collections::HashMap<DataClassification, Vec<Reading>> =
            std::collections::HashMap::new();
        for reading in readings {
            groups
                .entry(self.classify(reading))
                .or_default()
                .push(reading.clone());
        }

        let mut per_backend = Vec::new();
        for (classification, group) in groups {
            let Ok(policy) = self.policy_for(classification) else {
                warn!(?classification, "no policy registered, dropping batch group");
                continue;
            };

            let mut written = false;
            for name in policy.backend_order() {
                let Some(repo) = self.backend_eligible(&name) else {
                    continue;
                };

                let start = Instant::now();
                let result = repo.write_batch(&group).await;
                let duration = start.elapsed();
                let (batch_size, successful_writes, success) = match &result {
                    Ok(r) => (r.batch_size, r.successful_writes, true),
                    Err(_) => (group.len(), 0, false),
                };
                self.perf.record(
                    &name,
                    OpSample {
                        op_type: OpType::Write,
                        ts: Instant::now(),
                        duration,
                        points_processed: successful_writes,
                        points_failed: batch_size - successful_writes,
                        success,
                    },
                );

                if let Ok(r) = result {
                    per_backend.push(BackendBatchResult {
                        backend: name,
                        batch_size: r.batch_size,
                        successful_writes: r.successful_writes,
                    });
                    written = true;
                    break;
                }
            }

            if !written {
                per_backend.push(BackendBatchResult {
                    backend: policy.primary_backend.clone(),
                    batch_size: group.len(),
                    successful_writes: 0,
                });
            }
        }

        BatchRouteResult { per_backend }
    }

    /// Scores every healthy registered backend for a classification's
    /// policy; highest score wins, ties broken by a small random jitter.
    /// Unhealthy backends are never scored, so they can never come back as
    /// the recommendation.
    pub fn recommend(&self, classification: DataClassification, policy: &StoragePolicy) -> Recommendation {
        let mut scored: Vec<(String, i32)> = self
            .backends
            .iter()
            .filter(|entry| {
                let health = entry.value().health();
                health.connected && health.is_healthy
            })
            .map(|entry| {
                let name = entry.key().clone();
                let mut score = 0;
                if name == policy.primary_backend {
                    score += 100;
                }
                score += 50; // already filtered to connected backends
                score += rand::thread_rng().gen_range(0..=10);
                (name, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let primary = scored
            .first()
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| policy.primary_backend.clone());
        let secondary = scored.get(1).map(|(name, _)| name.clone());
        let confidence = scored
            .first()
            .map(|(_, score)| (*score as f64 / 160.0).min(1.0))
            .unwrap_or(0.0);

        let _ = classification;
        Recommendation {
            primary,
            secondary,
            confidence,
            performance_estimate: policy.performance_requirements.max_write_latency_ms as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FailureMode, InMemoryRepository};
    use scale_model::{PerformanceRequirements, ReadingQuality};
    use std::time::Duration;

    fn reading(template_id: Option<&str>) -> Reading {
        Reading {
            device_id: "scale-1".to_string(),
            channel: 1,
            timestamp: chrono::Utc::now(),
            raw_value: 12.3,
            processed_value: Some(12.3),
            rate: None,
            unit: "kg".to_string(),
            status: None,
            quality: ReadingQuality::Good,
            stability_score: Some(95.0),
            template_id: template_id.map(str::to_string),
            metadata: Default::default(),
        }
    }

    fn policy(classification: DataClassification, primary: &str, fallback: Option<&str>) -> StoragePolicy {
        StoragePolicy {
            classification,
            primary_backend: primary.to_string(),
            fallback_backend: fallback.map(str::to_string),
            retention: Duration::from_secs(86_400),
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            performance_requirements: PerformanceRequirements::default(),
        }
    }

    #[tokio::test]
    async fn scale_reading_classified_as_discrete_reading() {
        let router = StorageRouter::new(Arc::new(PerformanceTracker::new()));
        let classification = router.classify(&reading(Some("mettler_toledo_sics")));
        assert_eq!(classification, DataClassification::DiscreteReading);
    }

    #[tokio::test]
    async fn route_falls_back_after_primary_fails() {
        let router = StorageRouter::new(Arc::new(PerformanceTracker::new()));
        let primary = InMemoryRepository::new("relational");
        primary.set_failure_mode(FailureMode::AlwaysTransient("down".to_string()));
        let fallback = InMemoryRepository::new("objectstore");
        router.register_backend(primary.clone());
        router.register_backend(fallback.clone());
        router.set_policy(policy(DataClassification::DiscreteReading, "relational", Some("objectstore")));

        let result = router.route(&reading(Some("mettler_toledo_sics"))).await.unwrap();
        assert_eq!(result.backend, "objectstore");
        assert_eq!(result.attempts, vec!["relational".to_string(), "objectstore".to_string()]);
        assert_eq!(fallback.write_count(), 1);
        assert_eq!(primary.write_count(), 0);
    }

    #[tokio::test]
    async fn route_fails_when_all_backends_exhausted() {
        let router = StorageRouter::new(Arc::new(PerformanceTracker::new()));
        let primary = InMemoryRepository::new("relational");
        primary.set_connected(false);
        router.register_backend(primary);
        router.set_policy(policy(DataClassification::DiscreteReading, "relational", None));

        let err = router.route(&reading(Some("mettler_toledo_sics"))).await.unwrap_err();
        assert!(matches!(err, StorageError::AllBackendsFailed(_)));
    }

    #[tokio::test]
    async fn route_batch_on_empty_input_is_a_no_op_success() {
        let router = StorageRouter::new(Arc::new(PerformanceTracker::new()));
        let result = router.route_batch(&[]).await;
        assert!(result.per_backend.is_empty());
    }

    #[tokio::test]
    async fn route_batch_groups_by_classification() {
        let router = StorageRouter::new(Arc::new(PerformanceTracker::new()));
        let relational = InMemoryRepository::new("relational");
        let timeseries = InMemoryRepository::new("timeseries");
        router.register_backend(relational.clone());
        router.register_backend(timeseries.clone());
        router.set_policy(policy(DataClassification::DiscreteReading, "relational", None));
        router.set_policy(policy(DataClassification::TimeSeries, "timeseries", None));

        let mut discrete = reading(Some("mettler_toledo_sics"));
        discrete.device_id = "scale-1".to_string();
        let mut series = reading(None);
        series.metadata.insert("device_type".to_string(), "modbus/6051/3".to_string());

        let result = router.route_batch(&[discrete, series]).await;
        assert_eq!(result.per_backend.len(), 2);
        assert_eq!(relational.write_count(), 1);
        assert_eq!(timeseries.write_count(), 1);
    }
}
