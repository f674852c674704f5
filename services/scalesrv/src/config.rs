use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use scale_model::SessionConfig;
use scale_stability::StabilityMonitorConfig;
use scale_transport::TcpTransportConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport tunables, the serde-friendly counterpart of
/// [`TcpTransportConfig`] (which itself carries no serde derives since it
/// is never the thing persisted — this struct is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    pub host: String,
    pub port: u16,
    pub read_buffer_size: usize,
    pub read_timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let d = TcpTransportConfig::default();
        Self {
            host: d.host,
            port: d.port,
            read_buffer_size: d.read_buffer_size,
            read_timeout_ms: d.read_timeout.as_millis() as u64,
            backoff_base_ms: d.backoff_base.as_millis() as u64,
            backoff_cap_ms: d.backoff_cap.as_millis() as u64,
        }
    }
}

impl From<&TransportSettings> for TcpTransportConfig {
    fn from(s: &TransportSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            read_buffer_size: s.read_buffer_size,
            read_timeout: Duration::from_millis(s.read_timeout_ms),
            backoff_base: Duration::from_millis(s.backoff_base_ms),
            backoff_cap: Duration::from_millis(s.backoff_cap_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilitySettings {
    pub window_size: usize,
    pub analysis_interval_ms: u64,
    pub dropout_threshold_ms: u64,
    pub stability_threshold: f64,
    pub allow_unknown_signals: bool,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        let d = StabilityMonitorConfig::default();
        Self {
            window_size: d.window_size,
            analysis_interval_ms: d.analysis_interval.as_millis() as u64,
            dropout_threshold_ms: d.dropout_threshold.as_millis() as u64,
            stability_threshold: d.stability_threshold,
            allow_unknown_signals: d.allow_unknown_signals,
        }
    }
}

impl From<&StabilitySettings> for StabilityMonitorConfig {
    fn from(s: &StabilitySettings) -> Self {
        Self {
            window_size: s.window_size,
            analysis_interval: Duration::from_millis(s.analysis_interval_ms),
            dropout_threshold: Duration::from_millis(s.dropout_threshold_ms),
            stability_threshold: s.stability_threshold,
            allow_unknown_signals: s.allow_unknown_signals,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    pub minimum_frames_for_analysis: usize,
    pub baseline_capture_timeout_ms: u64,
    pub max_buffered_frames: usize,
    pub confidence_threshold: f64,
    pub minimum_steps: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let d = SessionConfig::default();
        Self {
            minimum_frames_for_analysis: d.minimum_frames_for_analysis,
            baseline_capture_timeout_ms: d.baseline_capture_timeout.as_millis() as u64,
            max_buffered_frames: d.max_buffered_frames,
            confidence_threshold: d.confidence_threshold,
            minimum_steps: d.minimum_steps,
        }
    }
}

impl From<&DiscoverySettings> for SessionConfig {
    fn from(s: &DiscoverySettings) -> Self {
        Self {
            minimum_frames_for_analysis: s.minimum_frames_for_analysis,
            baseline_capture_timeout: Duration::from_millis(s.baseline_capture_timeout_ms),
            max_buffered_frames: s.max_buffered_frames,
            confidence_threshold: s.confidence_threshold,
            minimum_steps: s.minimum_steps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub name: String,
    pub log_level: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "scalesrv".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Top-level configuration, layered the way `voltage-config` layers
/// `comsrv.yaml`: defaults, then an optional file, then environment
/// variables prefixed `SCALESRV_`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleServiceConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub stability: StabilitySettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

impl ScaleServiceConfig {
    /// Loads config from an optional YAML file, overlaid with
    /// `SCALESRV_`-prefixed environment variables, falling back to
    /// built-in defaults for anything unset.
    pub fn load(path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("SCALESRV_").split("_"));
        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_into_library_configs() {
        let config = ScaleServiceConfig::default();
        let tcp: TcpTransportConfig = (&config.transport).into();
        assert_eq!(tcp.port, 4001);
        let stability: StabilityMonitorConfig = (&config.stability).into();
        assert_eq!(stability.window_size, 200);
        let session: SessionConfig = (&config.discovery).into();
        assert_eq!(session.minimum_steps, 3);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let config = ScaleServiceConfig::load(None).expect("defaults must extract");
        assert_eq!(config.service.name, "scalesrv");
    }
}
