use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-level classification of the current link/signal quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityState {
    Stable,
    Noisy,
    Intermittent,
    Corrupted,
    Disconnected,
    Unknown,
    /// Neither corrupted, dropping, noisy, nor stable — the residual
    /// bucket the classifier falls through to.
    Unstable,
}

impl Default for StabilityState {
    fn default() -> Self {
        StabilityState::Unknown
    }
}

/// One observation fed into the rolling analysis window.
#[derive(Debug, Clone)]
pub struct StabilitySample {
    pub bytes: Vec<u8>,
    pub timestamp: std::time::Instant,
    pub valid: bool,
    pub length: usize,
    pub has_null_bytes: bool,
    pub has_control_chars: bool,
    /// Fraction of `byte >= 32 || byte in {9, 10, 13}`.
    pub signal_strength: f64,
}

impl StabilitySample {
    pub fn from_bytes(bytes: &[u8], valid: bool) -> Self {
        let length = bytes.len();
        let has_null_bytes = bytes.contains(&0);
        let has_control_chars = bytes
            .iter()
            .any(|&b| b < 32 && b != 9 && b != 10 && b != 13);
        let printable = bytes
            .iter()
            .filter(|&&b| b >= 32 || b == 9 || b == 10 || b == 13)
            .count();
        let signal_strength = if length == 0 {
            0.0
        } else {
            printable as f64 / length as f64
        };
        Self {
            bytes: bytes.to_vec(),
            timestamp: std::time::Instant::now(),
            valid,
            length,
            has_null_bytes,
            has_control_chars,
            signal_strength,
        }
    }
}

/// Published on change or on each analysis tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    pub timestamp: DateTime<Utc>,
    pub state: StabilityState,
    /// `[0, 100]`.
    pub score: f64,
    pub analysis: StabilityAnalysis,
    pub sample_count: usize,
    pub recommended_actions: Vec<String>,
}

/// Intermediate statistics computed over the rolling window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StabilityAnalysis {
    pub data_quality: f64,
    pub length_consistency: f64,
    pub timing_consistency: f64,
    pub signal_strength: f64,
    pub valid_rate: f64,
    pub corruption_detected: bool,
    pub dropouts_detected: bool,
    pub noise_detected: bool,
    pub timing_issues_detected: bool,
}
