use std::time::Duration;

/// Tunables for the Stability Monitor.
#[derive(Debug, Clone)]
pub struct StabilityMonitorConfig {
    /// Rolling window size, default 200.
    pub window_size: usize,
    /// Periodic analysis cadence, default 2000ms.
    pub analysis_interval: Duration,
    /// Inter-arrival gap considered a dropout, default 5000ms.
    pub dropout_threshold: Duration,
    /// Score at/above which the link is considered `Stable`, default 80.
    pub stability_threshold: f64,
    /// Whether `Unknown`-state frames pass through `filter`.
    pub allow_unknown_signals: bool,
}

impl Default for StabilityMonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 200,
            analysis_interval: Duration::from_millis(2000),
            dropout_threshold: Duration::from_millis(5000),
            stability_threshold: 80.0,
            allow_unknown_signals: false,
        }
    }
}
