use crate::value::{FieldValue, ParsedFrame};
use regex::Regex;
use scale_model::{FieldExtraction, FieldType, FrameEncoding, Template};
use std::collections::HashMap;
use tracing::trace;

/// Decodes `bytes` per the template's framing encoding, applies every field
/// rule, and returns a [`ParsedFrame`].
pub fn parse_frame(template: &Template, bytes: &[u8]) -> ParsedFrame {
    let raw = decode(bytes, template.framing.encoding);
    let mut fields = HashMap::with_capacity(template.fields.len());
    let mut errors = Vec::new();
    let mut all_required_ok = true;

    for field in &template.fields {
        match extract_and_convert(&raw, field) {
            Ok(value) => {
                fields.insert(field.name.clone(), Some(value));
            }
            Err(message) => {
                trace!(field = %field.name, %message, "field extraction failed");
                errors.push(format!("{}: {message}", field.name));
                fields.insert(field.name.clone(), None);
                if field.required {
                    all_required_ok = false;
                }
            }
        }
    }

    ParsedFrame {
        raw,
        fields,
        valid: all_required_ok,
        errors,
    }
}

fn decode(bytes: &[u8], encoding: FrameEncoding) -> String {
    match encoding {
        FrameEncoding::Ascii | FrameEncoding::Latin1 => {
            bytes.iter().map(|&b| b as char).collect()
        }
        FrameEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn extract_and_convert(
    raw: &str,
    field: &scale_model::TemplateField,
) -> Result<FieldValue, String> {
    let extracted = extract_raw(raw, &field.extraction)?;
    convert(&extracted, &field.field_type)
}

fn extract_raw(raw: &str, extraction: &FieldExtraction) -> Result<String, String> {
    match extraction {
        FieldExtraction::FixedOffset { offset, length } => {
            let chars: Vec<char> = raw.chars().collect();
            if offset + length > chars.len() {
                return Err(format!(
                    "fixed offset [{offset}, {offset}+{length}) out of bounds for frame of length {}",
                    chars.len()
                ));
            }
            Ok(chars[*offset..*offset + *length].iter().collect())
        }
        FieldExtraction::Regex { pattern, group } => {
            let re = Regex::new(pattern).map_err(|e| format!("invalid regex {pattern:?}: {e}"))?;
            let caps = re
                .captures(raw)
                .ok_or_else(|| format!("pattern {pattern:?} did not match"))?;
            caps.get(*group)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| format!("pattern {pattern:?} has no capture group {group}"))
        }
    }
}

fn convert(extracted: &str, field_type: &FieldType) -> Result<FieldValue, String> {
    match field_type {
        FieldType::Numeric { decimal_places } => {
            let parsed: f64 = extracted
                .trim()
                .parse()
                .map_err(|e| format!("{extracted:?} is not numeric: {e}"))?;
            let factor = 10f64.powi(*decimal_places as i32);
            let rounded = (parsed * factor).round() / factor;
            Ok(FieldValue::Numeric(rounded))
        }
        FieldType::Enum { values } => values
            .get(extracted)
            .cloned()
            .map(FieldValue::Enum)
            .ok_or_else(|| format!("{extracted:?} is not a recognized enum value")),
        FieldType::String => Ok(FieldValue::String(extracted.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scale_model::{
        CommandSet, ErrorHandling, FieldExtraction, FieldType, FramingConfig, LinkLayerConfig,
        ResponsePatterns, TemplateField, ValidationRules,
    };
    use std::collections::HashMap;

    fn template_with_fields(fields: Vec<TemplateField>) -> Template {
        Template {
            template_name: "t".to_string(),
            display_name: "t".to_string(),
            manufacturer: "Acme".to_string(),
            model: None,
            version: "1.0".to_string(),
            author: None,
            communication: LinkLayerConfig::default(),
            commands: CommandSet::default(),
            framing: FramingConfig::default(),
            fields,
            response_patterns: ResponsePatterns::default(),
            validation: ValidationRules::default(),
            error_handling: ErrorHandling::default(),
            priority: 50,
            confidence_threshold: 85.0,
            timeout_ms: 2000,
            max_retries: 3,
            supported_baud_rates: vec![9600],
            environmental_optimization: None,
            tags: HashMap::new(),
            is_active: true,
            is_builtin: false,
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
            last_used_at: None,
            usage_count: 0,
            success_rate: 0.0,
        }
    }

    #[test]
    fn regex_numeric_field_extracts_and_rounds() {
        let field = TemplateField {
            name: "weight".to_string(),
            extraction: FieldExtraction::Regex {
                pattern: r"([+-]?\d+\.\d+)".to_string(),
                group: 1,
            },
            field_type: FieldType::Numeric { decimal_places: 1 },
            required: true,
        };
        let template = template_with_fields(vec![field]);
        let parsed = parse_frame(&template, b"ST,GS,+00012.34,kg\r\n");
        assert!(parsed.valid);
        assert_eq!(
            parsed.fields["weight"].as_ref().unwrap().as_numeric(),
            Some(12.3)
        );
    }

    #[test]
    fn missing_required_field_marks_frame_invalid() {
        let field = TemplateField {
            name: "weight".to_string(),
            extraction: FieldExtraction::Regex {
                pattern: r"(\d+\.\d+)".to_string(),
                group: 1,
            },
            field_type: FieldType::Numeric { decimal_places: 1 },
            required: true,
        };
        let template = template_with_fields(vec![field]);
        let parsed = parse_frame(&template, b"no numbers here\r\n");
        assert!(!parsed.valid);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.fields["weight"].is_none());
    }

    #[test]
    fn missing_optional_field_is_non_fatal() {
        let field = TemplateField {
            name: "unit".to_string(),
            extraction: FieldExtraction::Regex {
                pattern: r"(kg|lb)".to_string(),
                group: 1,
            },
            field_type: FieldType::String,
            required: false,
        };
        let template = template_with_fields(vec![field]);
        let parsed = parse_frame(&template, b"12.3\r\n");
        assert!(parsed.valid);
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn fixed_offset_extraction_slices_by_char_index() {
        let field = TemplateField {
            name: "stability".to_string(),
            extraction: FieldExtraction::FixedOffset {
                offset: 0,
                length: 1,
            },
            field_type: FieldType::Enum {
                values: HashMap::from([("S".to_string(), "stable".to_string())]),
            },
            required: true,
        };
        let template = template_with_fields(vec![field]);
        let parsed = parse_frame(&template, b"S,+0012.3,kg\r\n");
        assert_eq!(
            parsed.fields["stability"].as_ref().unwrap().as_str(),
            "stable"
        );
    }
}
