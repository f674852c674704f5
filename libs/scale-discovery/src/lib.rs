//! Protocol discovery: baseline capture, built-in template matching,
//! operator-guided ground-truth scoring, and template synthesis, wired
//! together by a session supervisor.

mod baseline;
mod capture;
mod interactive;
mod matching;
mod supervisor;
mod synthesis;
mod types;

pub use baseline::{capture_baseline, BaselineOutcome};
pub use capture::capture_step;
pub use interactive::{format_consistency, recommended_action, score_step, StepScore};
pub use matching::test_template;
pub use supervisor::Supervisor;
pub use synthesis::{is_representative, synthesize_template};
pub use types::{
    DiscoveryResult, InteractiveGuidance, InteractiveOutcome, ProgressEvent, SessionStatus,
    StepGuidance,
};
