use crate::interactive::format_consistency;
use chrono::Utc;
use regex::Regex;
use scale_errors::DiscoveryError;
use scale_model::{
    CommandSet, ErrorHandling, FieldExtraction, FieldType, FrameEncoding, FramingConfig,
    LinkLayerConfig, ResponsePatterns, Template, TemplateField, ValidationRules,
};
use std::collections::HashMap;

/// Builds a candidate template from the merged lines captured across
/// interactive steps. Requires at least one line with a numeric token.
///
/// `stable_lines` are the lines captured during steps that scored as
/// `Completed`, used to derive the optional stability field.
pub fn synthesize_template(
    all_lines: &[String],
    stable_lines: &[String],
    raw_chunks: &[u8],
    overall_correlation: f64,
) -> Result<Template, DiscoveryError> {
    if all_lines.is_empty() {
        return Err(DiscoveryError::TemplateSynthesisFailed(
            "no captured lines to synthesize from".to_string(),
        ));
    }

    let delimiter = detect_delimiter(raw_chunks);
    let weight_field = find_weight_field(all_lines).ok_or_else(|| {
        DiscoveryError::TemplateSynthesisFailed("no numeric token found in captured data".to_string())
    })?;

    let mut fields = vec![weight_field];
    if let Some(stability_field) = find_stability_field(stable_lines) {
        fields.push(stability_field);
    }
    if let Some(unit_field) = find_unit_field(all_lines) {
        fields.push(unit_field);
    }

    let now = Utc::now();
    Ok(Template {
        template_name: format!("synthesized_{}", now.timestamp_millis()),
        display_name: "Synthesized Template".to_string(),
        manufacturer: "Unknown".to_string(),
        model: None,
        version: "1.0".to_string(),
        author: Some("discovery-engine".to_string()),
        communication: LinkLayerConfig::default(),
        commands: CommandSet::default(),
        framing: FramingConfig {
            encoding: FrameEncoding::Ascii,
            delimiter: delimiter.to_string(),
            stx: None,
            etx: None,
        },
        fields,
        response_patterns: ResponsePatterns {
            weight_regex: r"([+-]?\d+\.\d+)".to_string(),
            stable_regex: None,
            unstable_regex: None,
            extra: HashMap::new(),
        },
        validation: ValidationRules::default(),
        error_handling: ErrorHandling::default(),
        priority: 40,
        confidence_threshold: overall_correlation,
        timeout_ms: 2000,
        max_retries: 3,
        supported_baud_rates: vec![9600],
        environmental_optimization: None,
        tags: HashMap::from([("source".to_string(), "synthesized".to_string())]),
        is_active: true,
        is_builtin: false,
        created_at: now,
        modified_at: now,
        last_used_at: None,
        usage_count: 0,
        success_rate: (overall_correlation / 100.0).clamp(0.0, 1.0),
    })
}

/// CR-LF if present in >= 50% of line boundaries, else LF.
fn detect_delimiter(raw: &[u8]) -> &'static str {
    let crlf_count = raw.windows(2).filter(|w| w == b"\r\n").count();
    let lf_count = raw.iter().filter(|&&b| b == b'\n').count();
    if lf_count == 0 {
        return "\r\n";
    }
    if crlf_count as f64 / lf_count as f64 >= 0.5 {
        "\r\n"
    } else {
        "\n"
    }
}

fn find_weight_field(lines: &[String]) -> Option<TemplateField> {
    let numeric = Regex::new(r"[+-]?\d+\.\d+|[+-]?\d+").unwrap();
    let sample = lines.iter().find(|l| numeric.is_match(l))?;
    let m = numeric.find(sample)?;
    let token = m.as_str();
    let decimal_places = token
        .split_once('.')
        .map(|(_, frac)| frac.len() as u8)
        .unwrap_or(0);
    let offset = sample[..m.start()].chars().count();
    let length = token.chars().count();
    Some(TemplateField {
        name: "weight".to_string(),
        extraction: FieldExtraction::FixedOffset { offset, length },
        field_type: FieldType::Numeric { decimal_places },
        required: true,
    })
}

/// Derives a two-valued stability enum from the leading character of stable
/// lines, when a second, differing leading character also appears.
fn find_stability_field(stable_lines: &[String]) -> Option<TemplateField> {
    if stable_lines.len() < 2 {
        return None;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for line in stable_lines {
        if let Some(c) = line.chars().next() {
            *counts.entry(c).or_insert(0) += 1;
        }
    }
    let (dominant, count) = counts.iter().max_by_key(|(_, c)| **c)?;
    if *count as f64 / stable_lines.len() as f64 < 0.7 {
        return None;
    }
    let mut values = HashMap::new();
    values.insert(dominant.to_string(), "stable".to_string());
    Some(TemplateField {
        name: "stability".to_string(),
        extraction: FieldExtraction::FixedOffset {
            offset: 0,
            length: 1,
        },
        field_type: FieldType::Enum { values },
        required: false,
    })
}

/// Derives an optional string field from a trailing alphabetic token
/// consistent across at least half the captured lines.
fn find_unit_field(lines: &[String]) -> Option<TemplateField> {
    let unit_re = Regex::new(r"([A-Za-z]+)\s*$").unwrap();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0;
    for line in lines {
        if let Some(caps) = unit_re.captures(line) {
            *counts.entry(caps[1].to_string()).or_insert(0) += 1;
            total += 1;
        }
    }
    if total == 0 {
        return None;
    }
    let (unit, count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
    if count as f64 / lines.len() as f64 < 0.5 {
        return None;
    }
    Some(TemplateField {
        name: "unit".to_string(),
        extraction: FieldExtraction::Regex {
            pattern: format!(r"({unit})\s*$"),
            group: 1,
        },
        field_type: FieldType::String,
        required: false,
    })
}

/// Whether two sets of lines are consistent enough to be worth re-testing
/// the synthesized template against (used by callers deciding to re-run
/// `test_template` on the candidate).
pub fn is_representative(lines: &[String]) -> bool {
    format_consistency(lines) >= 50.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_weight_field_from_numeric_tokens() {
        let lines: Vec<String> = vec![
            "S,GS,+00001.000,kg".to_string(),
            "S,GS,+00001.001,kg".to_string(),
            "S,GS,+00000.999,kg".to_string(),
        ];
        let raw = b"S,GS,+00001.000,kg\r\nS,GS,+00001.001,kg\r\n".to_vec();
        let template = synthesize_template(&lines, &lines, &raw, 90.0).unwrap();
        assert_eq!(template.framing.delimiter, "\r\n");
        let weight = template.fields.iter().find(|f| f.name == "weight").unwrap();
        match &weight.field_type {
            FieldType::Numeric { decimal_places } => assert_eq!(*decimal_places, 3),
            other => panic!("expected numeric field, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_fails_synthesis() {
        assert!(synthesize_template(&[], &[], &[], 0.0).is_err());
    }

    #[test]
    fn lf_only_stream_is_detected_as_lf_delimiter() {
        let lines: Vec<String> = vec!["12.3 kg".to_string(), "12.4 kg".to_string()];
        let raw = b"12.3 kg\n12.4 kg\n".to_vec();
        let template = synthesize_template(&lines, &[], &raw, 80.0).unwrap();
        assert_eq!(template.framing.delimiter, "\n");
    }
}
