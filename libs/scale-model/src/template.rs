use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serial link parameters, advisory only when tunneled over TCP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LinkLayerConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            flow_control: FlowControl::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    XonXoff,
    RtsCts,
}

/// Request-weight command plus auxiliary commands (tare, zero, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandSet {
    pub request_weight: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Framing: encoding, delimiter, optional STX/ETX envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FramingConfig {
    pub encoding: FrameEncoding,
    pub delimiter: String,
    pub stx: Option<u8>,
    pub etx: Option<u8>,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            encoding: FrameEncoding::Ascii,
            delimiter: "\r\n".to_string(),
            stx: None,
            etx: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEncoding {
    Ascii,
    Utf8,
    Latin1,
}

/// How a field's raw value is located inside a decoded frame string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldExtraction {
    FixedOffset { offset: usize, length: usize },
    Regex { pattern: String, group: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldType {
    Numeric { decimal_places: u8 },
    Enum { values: HashMap<String, String> },
    String,
}

/// An ordered field descriptor within a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateField {
    pub name: String,
    pub extraction: FieldExtraction,
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationRules {
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub assertions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorHandling {
    /// regex pattern -> error label
    pub errors: HashMap<String, String>,
    /// error label -> recovery command
    pub recovery: HashMap<String, String>,
}

/// An immutable, versioned description of a scale protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Template {
    pub template_name: String,
    pub display_name: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub version: String,
    pub author: Option<String>,

    pub communication: LinkLayerConfig,
    pub commands: CommandSet,
    /// Persisted templates historically carried only `response_patterns`;
    /// `framing` is needed to extract typed fields, so it defaults to empty
    /// and JSON missing this key still round-trips.
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub fields: Vec<TemplateField>,

    pub response_patterns: ResponsePatterns,
    pub validation: ValidationRules,
    pub error_handling: ErrorHandling,

    /// `[1, 100]`, higher tried first during discovery.
    pub priority: u8,
    /// `[0, 100]`.
    pub confidence_threshold: f64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub supported_baud_rates: Vec<u32>,
    pub environmental_optimization: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,

    pub is_active: bool,
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    /// Exponentially-smoothed success rate, `[0, 1]`.
    pub success_rate: f64,
}

/// Weight/stability/unrelated regex patterns carried on the wire form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponsePatterns {
    pub weight_regex: String,
    pub stable_regex: Option<String>,
    pub unstable_regex: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Template {
    /// `effective_priority = priority + success_rate * 0.3 + min(log10(usage+1) * 10, 20)`.
    /// Used to sort the Template Store's discovery order.
    pub fn effective_priority(&self) -> f64 {
        let usage_term = ((self.usage_count as f64 + 1.0).log10() * 10.0).min(20.0);
        self.priority as f64 + self.success_rate * 0.3 + usage_term
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.priority) {
            return Err(format!("priority {} out of range [1,100]", self.priority));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold {} out of range [0,100]",
                self.confidence_threshold
            ));
        }
        if self.template_name.trim().is_empty() {
            return Err("template_name must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_template() -> Template {
        Template {
            template_name: "test_template".into(),
            display_name: "Test".into(),
            manufacturer: "Acme".into(),
            model: None,
            version: "1.0".into(),
            author: None,
            communication: LinkLayerConfig::default(),
            commands: CommandSet::default(),
            framing: FramingConfig::default(),
            fields: vec![],
            response_patterns: ResponsePatterns::default(),
            validation: ValidationRules::default(),
            error_handling: ErrorHandling::default(),
            priority: 50,
            confidence_threshold: 85.0,
            timeout_ms: 1000,
            max_retries: 3,
            supported_baud_rates: vec![9600],
            environmental_optimization: None,
            tags: HashMap::new(),
            is_active: true,
            is_builtin: false,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            success_rate: 0.0,
        }
    }

    #[test]
    fn effective_priority_grows_with_usage_and_success_but_is_capped() {
        let mut t = base_template();
        let base = t.effective_priority();
        t.usage_count = 10_000;
        t.success_rate = 1.0;
        let boosted = t.effective_priority();
        assert!(boosted > base);
        // usage term capped at 20, success term capped at 0.3.
        assert!(boosted <= t.priority as f64 + 0.3 + 20.0 + 1e-9);
    }

    #[test]
    fn priority_out_of_range_fails_validation() {
        let mut t = base_template();
        t.priority = 0;
        assert!(t.validate().is_err());
        t.priority = 101;
        assert!(t.validate().is_err());
        t.priority = 100;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn confidence_threshold_out_of_range_fails_validation() {
        let mut t = base_template();
        t.confidence_threshold = -1.0;
        assert!(t.validate().is_err());
        t.confidence_threshold = 100.1;
        assert!(t.validate().is_err());
    }
}
