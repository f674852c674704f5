//! Core domain types shared across the scale ingestion core.
//!
//! Plain data types with serde derives and small validation helpers, no I/O.

mod frame;
mod reading;
mod session;
mod stability;
mod storage_policy;
mod template;

pub use frame::Frame;
pub use reading::{Reading, ReadingQuality};
pub use session::{
    DiscoveryPhase, DiscoverySession, DiscoveryStep, SessionConfig, StepAnalysis, StepStatus,
    TemplateTestResult,
};
pub use stability::{StabilityAnalysis, StabilityReport, StabilitySample, StabilityState};
pub use storage_policy::{DataClassification, PerformanceRequirements, StoragePolicy};
pub use template::{
    CommandSet, ErrorHandling, FieldExtraction, FieldType, FramingConfig, LinkLayerConfig,
    Parity, FlowControl, FrameEncoding, ResponsePatterns, Template, TemplateField, ValidationRules,
};
