use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome quality of a parsed/validated reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingQuality {
    Good,
    Uncertain,
    Bad,
    ConfigurationError,
    DeviceFailure,
    Timeout,
    Overflow,
}

/// A single ingested scale measurement.
///
/// `metadata` carries the classification tags read by the Storage Router
/// (`device_type`, `data_type`, ...) as a tagged union rather than typed
/// fields, since the set of tags a backend cares about varies by backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub channel: u16,
    pub timestamp: DateTime<Utc>,
    pub raw_value: f64,
    pub processed_value: Option<f64>,
    /// Counter/rate-pipeline field, carried on scale readings only when
    /// present in `metadata`.
    pub rate: Option<f64>,
    pub unit: String,
    pub status: Option<String>,
    pub quality: ReadingQuality,
    pub stability_score: Option<f64>,
    pub template_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Reading {
    /// A non-`Good` quality must carry either `status` or a non-empty
    /// `metadata.error`.
    pub fn check_quality_invariant(&self) -> bool {
        if self.quality == ReadingQuality::Good {
            return true;
        }
        self.status.is_some()
            || self
                .metadata
                .get("error")
                .map(|e| !e.is_empty())
                .unwrap_or(false)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
