use chrono::{DateTime, Utc};
use scale_model::{DiscoveryPhase, DiscoveryStep, Template};
use std::time::Duration;

/// One step of operator guidance for interactive ground-truth discovery.
#[derive(Debug, Clone)]
pub struct StepGuidance {
    pub action: String,
    pub expected_weight: Option<f64>,
    pub instructions: String,
    pub capture_time_ms: u64,
}

/// A batch of interactive steps submitted via `continue_interactive`.
#[derive(Debug, Clone)]
pub struct InteractiveGuidance {
    pub steps: Vec<StepGuidance>,
    pub minimum_steps: usize,
}

/// One event on the per-session progress stream. `progress_pct` is
/// monotonically non-decreasing until a terminal event.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub session_id: String,
    pub phase: DiscoveryPhase,
    pub progress_pct: u8,
    pub message: String,
    pub ts: DateTime<Utc>,
}

/// Terminal outcome of a discovery session.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub session_id: String,
    pub success: bool,
    pub best_template: Option<Template>,
    pub confidence: f64,
    pub duration: Duration,
    pub captured_frames: usize,
    pub tested_templates: usize,
    pub interactive_steps: usize,
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase: DiscoveryPhase,
    pub active: bool,
    pub duration: Duration,
    pub captured_frames: usize,
    pub best_confidence: f64,
    pub current_step: usize,
    pub tested_templates: usize,
}

/// Outcome of one `continue_interactive` call: either the session needs
/// more operator-guided steps, or enough ground truth has accumulated to
/// synthesize and finalize a template.
#[derive(Debug, Clone)]
pub enum InteractiveOutcome {
    NeedsMoreSteps(SessionStatus),
    Ready(DiscoveryResult),
}

pub(crate) fn clamp_pct(value: u8) -> u8 {
    value.min(100)
}

pub(crate) fn step_snapshot(step: &DiscoveryStep) -> String {
    format!("{}: {:?}", step.step_number, step.status)
}
