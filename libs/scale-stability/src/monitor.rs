use crate::analysis::{analyze_window, recommended_actions};
use crate::config::StabilityMonitorConfig;
use chrono::Utc;
use parking_lot::RwLock;
use scale_model::{StabilityReport, StabilitySample, StabilityState};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Adaptive stability classifier and byte filter.
pub struct StabilityMonitor {
    config: StabilityMonitorConfig,
    window: RwLock<VecDeque<StabilitySample>>,
    state: RwLock<StabilityState>,
    report_tx: watch::Sender<StabilityReport>,
}

impl StabilityMonitor {
    pub fn new(config: StabilityMonitorConfig) -> Arc<Self> {
        let initial = StabilityReport {
            timestamp: Utc::now(),
            state: StabilityState::Unknown,
            score: 0.0,
            analysis: Default::default(),
            sample_count: 0,
            recommended_actions: recommended_actions(StabilityState::Unknown),
        };
        let (report_tx, _) = watch::channel(initial);
        Arc::new(Self {
            config,
            window: RwLock::new(VecDeque::new()),
            state: RwLock::new(StabilityState::Unknown),
            report_tx,
        })
    }

    /// Append a sample, evicting the oldest when the window is full.
    pub fn add_sample(&self, bytes: &[u8], valid: bool) {
        let sample = StabilitySample::from_bytes(bytes, valid);
        let mut window = self.window.write();
        if window.len() >= self.config.window_size {
            window.pop_front();
        }
        window.push_back(sample);
    }

    /// Run the analysis once over the current window, update state, and
    /// publish a report. Pure w.r.t. window contents; called both by the
    /// periodic tick and directly in tests.
    pub fn analyze(&self) -> StabilityReport {
        let samples: Vec<_> = self.window.read().iter().cloned().collect();
        let (state, score, analysis) = analyze_window(&samples, &self.config);
        *self.state.write() = state;

        let report = StabilityReport {
            timestamp: Utc::now(),
            state,
            score,
            analysis,
            sample_count: samples.len(),
            recommended_actions: recommended_actions(state),
        };
        let _ = self.report_tx.send(report.clone());
        report
    }

    pub fn current_state(&self) -> StabilityState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> watch::Receiver<StabilityReport> {
        self.report_tx.subscribe()
    }

    /// Apply the current state's filtering rule to a chunk of bytes.
    /// Pure with respect to its input and the
    /// currently-published state.
    pub fn filter(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        match self.current_state() {
            StabilityState::Stable => Some(bytes.to_vec()),
            StabilityState::Noisy | StabilityState::Unstable => {
                let kept: Vec<u8> = bytes
                    .iter()
                    .copied()
                    .filter(|&b| b != 0 && (b >= 32 || b == 9 || b == 10 || b == 13))
                    .collect();
                if bytes.is_empty() {
                    return None;
                }
                let kept_fraction = kept.len() as f64 / bytes.len() as f64;
                if kept_fraction < 0.7 {
                    None
                } else {
                    Some(kept)
                }
            }
            StabilityState::Intermittent => {
                if bytes.iter().any(|b| b.is_ascii_digit()) {
                    Some(bytes.to_vec())
                } else {
                    None
                }
            }
            StabilityState::Corrupted => {
                if bytes.contains(&0) {
                    return None;
                }
                let bad_controls = bytes
                    .iter()
                    .filter(|&&b| b < 32 && b != 9 && b != 10 && b != 13)
                    .count();
                let fraction = if bytes.is_empty() {
                    0.0
                } else {
                    bad_controls as f64 / bytes.len() as f64
                };
                if fraction > 0.1 {
                    None
                } else {
                    Some(bytes.to_vec())
                }
            }
            StabilityState::Disconnected => None,
            StabilityState::Unknown => {
                if self.config.allow_unknown_signals {
                    Some(bytes.to_vec())
                } else {
                    None
                }
            }
        }
    }

    /// Spawn the periodic analysis tick at `analysis_interval_ms`
    /// (default 2000ms).
    pub fn spawn_periodic(self: Arc<Self>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.analysis_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let report = self.analyze();
                        debug!(state = ?report.state, score = report.score, "stability tick");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_state_rejects_every_non_empty_input() {
        let m = StabilityMonitor::new(StabilityMonitorConfig::default());
        for _ in 0..20 {
            m.add_sample(b"", false);
        }
        m.analyze();
        assert_eq!(m.current_state(), StabilityState::Disconnected);
        assert_eq!(m.filter(b"anything"), None);
    }

    #[test]
    fn filter_is_idempotent_when_state_is_unchanged() {
        let m = StabilityMonitor::new(StabilityMonitorConfig::default());
        for _ in 0..50 {
            m.add_sample(b"ST,GS,+00012.3,kg\r\n", true);
        }
        m.analyze();
        assert_eq!(m.current_state(), StabilityState::Stable);
        let once = m.filter(b"ST,GS,+00012.3,kg\r\n");
        let twice = once.clone().and_then(|b| m.filter(&b));
        assert_eq!(once, twice);
    }

    #[test]
    fn noise_filter_drops_null_bytes_and_rejects_if_too_much_was_dropped() {
        let m = StabilityMonitor::new(StabilityMonitorConfig::default());
        // Force Noisy: inject data_quality>60 with high signal-strength variance.
        for i in 0..100 {
            if i % 2 == 0 {
                m.add_sample(b"ST,GS,+0012.3,kg\r\n", true);
            } else {
                m.add_sample(&[0u8; 2], true);
            }
        }
        m.analyze();
        let state = m.current_state();
        if state == StabilityState::Noisy {
            let mostly_null = vec![0u8; 8];
            assert_eq!(m.filter(&mostly_null), None);
        }
    }

    #[test]
    fn window_evicts_oldest_sample_once_full() {
        let mut config = StabilityMonitorConfig::default();
        config.window_size = 5;
        let m = StabilityMonitor::new(config);
        for i in 0..10u8 {
            m.add_sample(&[i], true);
        }
        assert_eq!(m.window.read().len(), 5);
    }
}
