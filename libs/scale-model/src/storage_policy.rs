use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bucket used to route a reading to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    TimeSeries,
    DiscreteReading,
    Configuration,
    ProtocolTemplate,
    SystemLog,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRequirements {
    pub max_write_latency_ms: u64,
    pub min_throughput_ops_per_s: f64,
}

impl Default for PerformanceRequirements {
    fn default() -> Self {
        Self {
            max_write_latency_ms: 500,
            min_throughput_ops_per_s: 10.0,
        }
    }
}

/// Per-classification routing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoragePolicy {
    pub classification: DataClassification,
    pub primary_backend: String,
    pub fallback_backend: Option<String>,
    #[serde(with = "humantime_duration")]
    pub retention: Duration,
    pub batch_size: usize,
    #[serde(with = "humantime_duration")]
    pub flush_interval: Duration,
    pub performance_requirements: PerformanceRequirements,
}

impl StoragePolicy {
    /// Ordered backend names: primary, then fallback if present.
    pub fn backend_order(&self) -> Vec<String> {
        let mut order = vec![self.primary_backend.clone()];
        if let Some(fb) = &self.fallback_backend {
            order.push(fb.clone());
        }
        order
    }
}

/// Durations are persisted as seconds; kept as its own module so serde's
/// attribute can reference it without pulling in a crate dependency.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
