use scale_model::{Frame, Template, TemplateTestResult};
use scale_parser::{parse_frame, FieldValue};
use std::collections::HashMap;

/// Tests one template against up to 50 captured frames and scores it.
///
/// `confidence = parse_rate*0.4 + frame_consistency*0.3 + format_match*0.2
/// + data_quality*0.1`, clipped to `[0,100]`.
pub fn test_template(template: &Template, frames: &[Frame]) -> TemplateTestResult {
    let tested: Vec<&Frame> = frames.iter().take(50).collect();
    let parsed: Vec<_> = tested
        .iter()
        .map(|f| parse_frame(template, &f.bytes))
        .collect();

    let frames_tested = parsed.len();
    let successful_parses = parsed.iter().filter(|p| p.valid).count();
    let parse_rate = ratio_pct(successful_parses, frames_tested);

    let lengths: Vec<f64> = tested.iter().map(|f| f.bytes.len() as f64).collect();
    let frame_consistency = frame_consistency_score(&lengths);
    let format_match = format_match_score(template, &parsed);
    let data_quality = data_quality_score(&parsed, parse_rate);

    let confidence =
        (parse_rate * 0.4 + frame_consistency * 0.3 + format_match * 0.2 + data_quality * 0.1)
            .clamp(0.0, 100.0);

    let sample_fields = parsed
        .iter()
        .filter(|p| p.valid)
        .take(5)
        .map(|p| {
            p.fields
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), display_value(v))))
                .collect::<HashMap<String, String>>()
        })
        .collect();

    TemplateTestResult {
        template_name: template.template_name.clone(),
        successful_parses,
        frames_tested,
        frame_consistency,
        format_match,
        data_quality,
        confidence,
        sample_fields,
    }
}

fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Numeric(n) => n.to_string(),
        FieldValue::Enum(s) | FieldValue::String(s) => s.clone(),
    }
}

fn ratio_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64], mean_value: f64) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64
    }
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let mean_value = mean(values);
    if mean_value <= 0.0 || values.len() < 2 {
        return 0.0;
    }
    variance(values, mean_value).sqrt() / mean_value
}

fn consistency_score(cv: f64) -> f64 {
    (100.0 * (1.0 - cv.min(1.0))).max(0.0)
}

/// `0.4*length_consistency + 0.3*variation_score + 0.3*uniformity`.
/// `length_consistency` uses the coefficient of variation; `variation_score`
/// uses the normalized range (max-min)/mean as a second, coarser signal;
/// `uniformity` is the share of frames at the dominant (modal) length.
fn frame_consistency_score(lengths: &[f64]) -> f64 {
    if lengths.is_empty() {
        return 0.0;
    }
    let length_consistency = consistency_score(coefficient_of_variation(lengths));

    let mean_len = mean(lengths);
    let range = lengths.iter().cloned().fold(f64::MIN, f64::max)
        - lengths.iter().cloned().fold(f64::MAX, f64::min);
    let range_cv = if mean_len > 0.0 { range / mean_len } else { 0.0 };
    let variation_score = consistency_score(range_cv);

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &l in lengths {
        *counts.entry(l as i64).or_insert(0) += 1;
    }
    let dominant = counts.values().cloned().max().unwrap_or(0);
    let uniformity = 100.0 * dominant as f64 / lengths.len() as f64;

    0.4 * length_consistency + 0.3 * variation_score + 0.3 * uniformity
}

fn format_match_score(template: &Template, parsed: &[scale_parser::ParsedFrame]) -> f64 {
    if template.fields.is_empty() || parsed.is_empty() {
        return 0.0;
    }
    let required_count = template.fields.iter().filter(|f| f.required).count();
    let optional_count = template.fields.len() - required_count;
    let max_possible = required_count as f64 + optional_count as f64 * 0.5;
    if max_possible <= 0.0 {
        return 0.0;
    }

    let mut per_frame_scores = Vec::with_capacity(parsed.len());
    for frame in parsed {
        let mut score = 0.0;
        for field in &template.fields {
            let present = frame.fields.get(&field.name).map(|v| v.is_some()).unwrap_or(false);
            score += match (present, field.required) {
                (true, true) => 1.0,
                (true, false) => 0.5,
                (false, true) => -0.5,
                (false, false) => 0.0,
            };
        }
        per_frame_scores.push((score / max_possible * 100.0).clamp(0.0, 100.0));
    }

    let base = mean(&per_frame_scores);
    let consistency_bonus = consistency_score(coefficient_of_variation(&per_frame_scores)) * 0.05;
    (base + consistency_bonus).clamp(0.0, 100.0)
}

/// Mean of valid-parse ratio, field completeness, and a 3-sigma outlier
/// check on numeric fields. Type consistency is folded into field
/// completeness since a field is only ever recorded non-null after its
/// value has already converted to the declared type.
fn data_quality_score(parsed: &[scale_parser::ParsedFrame], parse_rate: f64) -> f64 {
    if parsed.is_empty() {
        return 0.0;
    }

    let field_completeness = mean(
        &parsed
            .iter()
            .map(|p| {
                if p.fields.is_empty() {
                    0.0
                } else {
                    let present = p.fields.values().filter(|v| v.is_some()).count();
                    100.0 * present as f64 / p.fields.len() as f64
                }
            })
            .collect::<Vec<_>>(),
    );

    let outlier_score = numeric_outlier_score(parsed);

    mean(&[parse_rate, field_completeness, outlier_score])
}

fn numeric_outlier_score(parsed: &[scale_parser::ParsedFrame]) -> f64 {
    let mut by_field: HashMap<&str, Vec<f64>> = HashMap::new();
    for frame in parsed {
        for (name, value) in &frame.fields {
            if let Some(FieldValue::Numeric(n)) = value {
                by_field.entry(name.as_str()).or_default().push(*n);
            }
        }
    }
    if by_field.is_empty() {
        return 100.0;
    }

    let mut scores = Vec::with_capacity(by_field.len());
    for values in by_field.values() {
        if values.len() < 2 {
            scores.push(100.0);
            continue;
        }
        let mean_value = mean(values);
        let std_dev = variance(values, mean_value).sqrt();
        if std_dev == 0.0 {
            scores.push(100.0);
            continue;
        }
        let inliers = values
            .iter()
            .filter(|&&v| (v - mean_value).abs() <= 3.0 * std_dev)
            .count();
        scores.push(100.0 * inliers as f64 / values.len() as f64);
    }
    mean(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scale_model::{
        CommandSet, ErrorHandling, FieldExtraction, FieldType, FramingConfig, LinkLayerConfig,
        ResponsePatterns, TemplateField, ValidationRules,
    };
    use std::collections::HashMap as Map;

    fn weight_template() -> Template {
        Template {
            template_name: "test".to_string(),
            display_name: "test".to_string(),
            manufacturer: "Acme".to_string(),
            model: None,
            version: "1.0".to_string(),
            author: None,
            communication: LinkLayerConfig::default(),
            commands: CommandSet::default(),
            framing: FramingConfig::default(),
            fields: vec![TemplateField {
                name: "weight".to_string(),
                extraction: FieldExtraction::Regex {
                    pattern: r"([+-]?\d+\.\d+)".to_string(),
                    group: 1,
                },
                field_type: FieldType::Numeric { decimal_places: 1 },
                required: true,
            }],
            response_patterns: ResponsePatterns::default(),
            validation: ValidationRules::default(),
            error_handling: ErrorHandling::default(),
            priority: 50,
            confidence_threshold: 85.0,
            timeout_ms: 2000,
            max_retries: 3,
            supported_baud_rates: vec![9600],
            environmental_optimization: None,
            tags: Map::new(),
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
    fn consistent_frames_score_high_confidence() {
        let template = weight_template();
        let frames: Vec<_> = (0..20)
            .map(|_| Frame::new(b"ST,GS,+00012.3,kg\r\n".to_vec(), true))
            .collect();
        let result = test_template(&template, &frames);
        assert!(result.confidence >= 85.0, "{:?}", result);
        assert_eq!(result.successful_parses, 20);
    }

    #[test]
    fn garbage_frames_score_low_confidence() {
        let template = weight_template();
        let frames: Vec<_> = (0..20)
            .map(|_| Frame::new(b"completely unrelated text".to_vec(), true))
            .collect();
        let result = test_template(&template, &frames);
        assert!(result.confidence < 50.0, "{:?}", result);
        assert_eq!(result.successful_parses, 0);
    }

    #[test]
    fn only_up_to_fifty_frames_are_tested() {
        let template = weight_template();
        let frames: Vec<_> = (0..120)
            .map(|_| Frame::new(b"ST,GS,+00012.3,kg\r\n".to_vec(), true))
            .collect();
        let result = test_template(&template, &frames);
        assert_eq!(result.frames_tested, 50);
    }
}
