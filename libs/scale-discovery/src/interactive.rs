use regex::Regex;
use scale_model::StepAnalysis;
use std::collections::HashMap;
use std::sync::OnceLock;

fn numeric_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+-]?\d+\.?\d*").unwrap())
}

/// Result of scoring one interactive step's captured lines against the
/// operator-supplied expected weight.
#[derive(Debug, Clone)]
pub struct StepScore {
    pub weight_correlation: f64,
    pub timing_consistency: f64,
    pub data_consistency: f64,
    pub score: f64,
    pub completed: bool,
}

impl StepScore {
    pub fn into_analysis(self) -> StepAnalysis {
        StepAnalysis {
            confidence: self.score,
            detected_patterns: vec![
                format!("weight_correlation={:.1}", self.weight_correlation),
                format!("timing_consistency={:.1}", self.timing_consistency),
                format!("data_consistency={:.1}", self.data_consistency),
            ],
            is_stable: self.completed,
            format_consistency: self.data_consistency,
        }
    }
}

/// Scores one step's captured lines per the weight-correlation /
/// timing-consistency / data-consistency formula. `expected_min_count` is
/// the number of lines expected within the capture window at normal
/// reporting cadence.
pub fn score_step(lines: &[String], expected_weight: Option<f64>, expected_min_count: usize) -> StepScore {
    let weight_correlation = expected_weight
        .map(|expected| weight_correlation(lines, expected))
        .unwrap_or(0.0);
    let timing_consistency = timing_consistency(lines, expected_min_count);
    let data_consistency = format_consistency(lines);

    let score = 0.5 * weight_correlation + 0.25 * timing_consistency + 0.25 * data_consistency;
    StepScore {
        weight_correlation,
        timing_consistency,
        data_consistency,
        score,
        completed: score >= 70.0,
    }
}

fn weight_correlation(lines: &[String], expected: f64) -> f64 {
    let tokens: Vec<f64> = lines
        .iter()
        .flat_map(|line| numeric_token_regex().find_iter(line))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    let Some(closest) = tokens
        .iter()
        .min_by(|a, b| (*a - expected).abs().partial_cmp(&(*b - expected).abs()).unwrap())
    else {
        return 0.0;
    };
    const EPSILON: f64 = 1e-9;
    (100.0 - (closest - expected).abs() / expected.abs().max(EPSILON) * 100.0).max(0.0)
}

fn timing_consistency(lines: &[String], expected_min_count: usize) -> f64 {
    let count_term = if expected_min_count == 0 {
        100.0
    } else {
        (100.0 * lines.len() as f64 / expected_min_count as f64).min(100.0)
    };
    0.3 * count_term + 0.7 * format_consistency(lines)
}

/// Weighted blend of length consistency (0.5), per-position character-class
/// consistency (0.3), and common-suffix consistency (0.2).
pub fn format_consistency(lines: &[String]) -> f64 {
    if lines.is_empty() {
        return 0.0;
    }
    let lengths: Vec<f64> = lines.iter().map(|l| l.chars().count() as f64).collect();
    let length_consistency = consistency_score(coefficient_of_variation(&lengths));
    let char_class = char_class_consistency(lines);
    let suffix = suffix_consistency(lines);
    0.5 * length_consistency + 0.3 * char_class + 0.2 * suffix
}

fn char_class(c: char) -> u8 {
    if c.is_ascii_digit() {
        0
    } else if c.is_alphabetic() {
        1
    } else if c.is_whitespace() {
        2
    } else {
        3
    }
}

fn char_class_consistency(lines: &[String]) -> f64 {
    let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();
    let min_len = chars.iter().map(|c| c.len()).min().unwrap_or(0);
    if min_len == 0 {
        return 0.0;
    }
    let mut position_scores = Vec::with_capacity(min_len);
    for pos in 0..min_len {
        let mut counts: HashMap<u8, usize> = HashMap::new();
        for line in &chars {
            *counts.entry(char_class(line[pos])).or_insert(0) += 1;
        }
        let dominant = counts.values().cloned().max().unwrap_or(0);
        position_scores.push(100.0 * dominant as f64 / lines.len() as f64);
    }
    position_scores.iter().sum::<f64>() / position_scores.len() as f64
}

fn suffix_consistency(lines: &[String]) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for line in lines {
        let suffix: String = line.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
        *counts.entry(suffix).or_insert(0) += 1;
    }
    let dominant = counts.values().cloned().max().unwrap_or(0);
    100.0 * dominant as f64 / lines.len() as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let mean_value = mean(values);
    if mean_value <= 0.0 || values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / mean_value
}

fn consistency_score(cv: f64) -> f64 {
    (100.0 * (1.0 - cv.min(1.0))).max(0.0)
}

/// Recommended next action band for the overall ground-truth correlation.
pub fn recommended_action(overall_correlation: f64) -> &'static str {
    if overall_correlation >= 85.0 {
        "Generate template"
    } else if overall_correlation >= 70.0 {
        "Generate template with validation"
    } else if overall_correlation >= 50.0 {
        "Collect more data"
    } else {
        "Review setup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn closest_token_to_expected_drives_high_correlation() {
        let ls = lines(&["ST,GS,+00001.00,kg", "ST,GS,+00001.01,kg", "ST,GS,+00000.99,kg"]);
        let score = score_step(&ls, Some(1.0), 3);
        assert!(score.weight_correlation > 95.0, "{:?}", score);
    }

    #[test]
    fn completed_step_requires_score_at_least_seventy() {
        let ls = lines(&["ST,GS,+00001.00,kg", "ST,GS,+00001.00,kg", "ST,GS,+00001.00,kg"]);
        let score = score_step(&ls, Some(1.0), 3);
        assert!(score.completed);
        let bad = lines(&["garbage", "noise***", "???"]);
        let score = score_step(&bad, Some(1.0), 3);
        assert!(!score.completed);
    }

    #[test]
    fn recommended_action_bands() {
        assert_eq!(recommended_action(90.0), "Generate template");
        assert_eq!(recommended_action(75.0), "Generate template with validation");
        assert_eq!(recommended_action(55.0), "Collect more data");
        assert_eq!(recommended_action(10.0), "Review setup");
    }
}
