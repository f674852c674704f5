use crate::{Frame, Template};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discovery session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    Initializing,
    CapturingData,
    TestingTemplates,
    InteractiveDiscovery,
    GeneratingTemplate,
    Completed,
    Failed,
    Cancelled,
}

impl DiscoveryPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DiscoveryPhase::Completed | DiscoveryPhase::Failed | DiscoveryPhase::Cancelled
        )
    }

    /// Validates a transition against the phase lifecycle graph.
    /// Any phase may transition to `Failed`/`Cancelled`; the only other
    /// back-edge permitted is `InteractiveDiscovery -> CapturingData`.
    pub fn can_transition_to(self, next: DiscoveryPhase) -> bool {
        use DiscoveryPhase::*;
        if next == Failed || next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Initializing, CapturingData)
                | (CapturingData, TestingTemplates)
                | (TestingTemplates, Completed)
                | (TestingTemplates, InteractiveDiscovery)
                | (InteractiveDiscovery, CapturingData)
                | (InteractiveDiscovery, GeneratingTemplate)
                | (GeneratingTemplate, Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Per-frame/per-step analysis summary produced during interactive
/// discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepAnalysis {
    pub confidence: f64,
    pub detected_patterns: Vec<String>,
    pub is_stable: bool,
    pub format_consistency: f64,
}

/// One operator-guided ground-truth step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryStep {
    pub step_number: u32,
    pub action: String,
    pub expected_value: Option<f64>,
    pub instructions: String,
    pub captured_data: Vec<String>,
    pub analysis: StepAnalysis,
    pub status: StepStatus,
}

/// A single run of the discovery procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub session_id: String,
    pub phase: DiscoveryPhase,
    pub started_at: DateTime<Utc>,
    pub transport_ref: String,
    pub config: SessionConfig,
    #[serde(skip)]
    pub captured_frames: Vec<Frame>,
    pub template_results: Vec<TemplateTestResult>,
    pub steps: Vec<DiscoveryStep>,
    pub best_template: Option<Template>,
    pub best_confidence: f64,
    pub cancelled: bool,
}

/// Tunables for a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub minimum_frames_for_analysis: usize,
    #[serde(with = "millis")]
    pub baseline_capture_timeout: Duration,
    pub max_buffered_frames: usize,
    pub confidence_threshold: f64,
    pub minimum_steps: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            minimum_frames_for_analysis: 10,
            baseline_capture_timeout: Duration::from_secs(10),
            max_buffered_frames: 1000,
            confidence_threshold: 85.0,
            minimum_steps: 3,
        }
    }
}

/// Result of `test_template` for one template against captured frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateTestResult {
    pub template_name: String,
    pub successful_parses: usize,
    pub frames_tested: usize,
    pub frame_consistency: f64,
    pub format_match: f64,
    pub data_quality: f64,
    pub confidence: f64,
    pub sample_fields: Vec<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::DiscoveryPhase::*;

    #[test]
    fn valid_forward_path_is_accepted() {
        assert!(Initializing.can_transition_to(CapturingData));
        assert!(CapturingData.can_transition_to(TestingTemplates));
        assert!(TestingTemplates.can_transition_to(Completed));
        assert!(TestingTemplates.can_transition_to(InteractiveDiscovery));
        assert!(InteractiveDiscovery.can_transition_to(GeneratingTemplate));
        assert!(GeneratingTemplate.can_transition_to(Completed));
    }

    #[test]
    fn interactive_discovery_can_loop_back_for_more_sampling() {
        assert!(InteractiveDiscovery.can_transition_to(CapturingData));
    }

    #[test]
    fn any_non_terminal_phase_can_fail_or_cancel() {
        for phase in [
            Initializing,
            CapturingData,
            TestingTemplates,
            InteractiveDiscovery,
            GeneratingTemplate,
        ] {
            assert!(phase.can_transition_to(Failed));
            assert!(phase.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn terminal_phases_reject_further_transitions() {
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(CapturingData));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn skipping_phases_is_rejected() {
        assert!(!Initializing.can_transition_to(TestingTemplates));
        assert!(!CapturingData.can_transition_to(Completed));
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
