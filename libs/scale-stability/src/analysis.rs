use crate::config::StabilityMonitorConfig;
use scale_model::{StabilityAnalysis, StabilitySample, StabilityState};
use std::time::Duration;

/// Pure analysis over a window snapshot. Kept free of any locking so it is
/// trivially testable and reusable from both the periodic tick and unit
/// tests.
pub fn analyze_window(
    samples: &[StabilitySample],
    config: &StabilityMonitorConfig,
) -> (StabilityState, f64, StabilityAnalysis) {
    if samples.is_empty() {
        let analysis = StabilityAnalysis::default();
        return (StabilityState::Unknown, 0.0, analysis);
    }

    let n = samples.len() as f64;
    let valid_rate = samples.iter().filter(|s| s.valid).count() as f64 / n;
    let no_null_rate = samples.iter().filter(|s| !s.has_null_bytes).count() as f64 / n;
    let no_bad_control_rate = samples.iter().filter(|s| !s.has_control_chars).count() as f64 / n;
    let mean_signal_strength = samples.iter().map(|s| s.signal_strength).sum::<f64>() / n;

    let data_quality =
        100.0 * mean(&[valid_rate, no_null_rate, no_bad_control_rate, mean_signal_strength]);

    let lengths: Vec<f64> = samples.iter().map(|s| s.length as f64).collect();
    let mean_len = mean(&lengths);
    let length_cv = coefficient_of_variation(&lengths, mean_len);
    let length_consistency = consistency_score(length_cv);

    let intervals_ms = interval_ms(samples);
    let mean_interval = mean(&intervals_ms);
    let timing_cv = coefficient_of_variation(&intervals_ms, mean_interval);
    let timing_consistency = consistency_score(timing_cv);

    let signal_strength_pct = mean_signal_strength * 100.0;

    let score = 0.40 * data_quality
        + 0.25 * length_consistency
        + 0.20 * timing_consistency
        + 0.15 * signal_strength_pct;
    let score = score.clamp(0.0, 100.0);

    // Corruption: >=2 of: >30% null, >20% bad control, max_len > 3*mean_len.
    let null_frac = samples.iter().filter(|s| s.has_null_bytes).count() as f64 / n;
    let bad_control_frac = samples.iter().filter(|s| s.has_control_chars).count() as f64 / n;
    let max_len = lengths.iter().cloned().fold(0.0_f64, f64::max);
    let corruption_votes = [
        null_frac > 0.30,
        bad_control_frac > 0.20,
        mean_len > 0.0 && max_len > 3.0 * mean_len,
    ]
    .into_iter()
    .filter(|v| *v)
    .count();
    let corruption_detected = corruption_votes >= 2;

    // Dropouts: >10% of inter-arrival gaps exceed dropout_threshold.
    let dropout_ms = config.dropout_threshold.as_secs_f64() * 1000.0;
    let dropouts_detected = !intervals_ms.is_empty()
        && (intervals_ms.iter().filter(|&&gap| gap > dropout_ms).count() as f64
            / intervals_ms.len() as f64)
            > 0.10;

    // Noise: variance of signal strength (expressed 0-100) > 400.
    let strengths_pct: Vec<f64> = samples.iter().map(|s| s.signal_strength * 100.0).collect();
    let strength_variance = variance(&strengths_pct, signal_strength_pct);
    let noise_detected = strength_variance > 400.0;

    let timing_issues_detected = timing_consistency < 50.0;

    let analysis = StabilityAnalysis {
        data_quality,
        length_consistency,
        timing_consistency,
        signal_strength: signal_strength_pct,
        valid_rate,
        corruption_detected,
        dropouts_detected,
        noise_detected,
        timing_issues_detected,
    };

    let state = classify_state(
        valid_rate,
        data_quality,
        score,
        corruption_detected,
        dropouts_detected,
        noise_detected,
        timing_issues_detected,
        config.stability_threshold,
    );

    (state, score, analysis)
}

/// State machine. `valid_rate` is treated uniformly as a `[0,1]` fraction
/// throughout (see DESIGN.md for the reasoning behind that choice).
#[allow(clippy::too_many_arguments)]
fn classify_state(
    valid_rate: f64,
    data_quality: f64,
    score: f64,
    corruption: bool,
    dropouts: bool,
    noise: bool,
    timing_issues: bool,
    stability_threshold: f64,
) -> StabilityState {
    if valid_rate < 0.10 {
        return StabilityState::Disconnected;
    }
    if corruption && data_quality < 30.0 {
        return StabilityState::Corrupted;
    }
    if dropouts && valid_rate < 0.70 {
        return StabilityState::Intermittent;
    }
    if noise && data_quality > 60.0 {
        return StabilityState::Noisy;
    }
    if score >= stability_threshold {
        return StabilityState::Stable;
    }
    if timing_issues {
        return StabilityState::Intermittent;
    }
    StabilityState::Unstable
}

/// Recommended actions per state; every non-`Stable` state carries at
/// least one.
pub fn recommended_actions(state: StabilityState) -> Vec<String> {
    match state {
        StabilityState::Stable => vec![],
        StabilityState::Noisy => vec![
            "Check cable shielding".to_string(),
            "Verify ground connections".to_string(),
        ],
        StabilityState::Intermittent => vec![
            "Check for loose connector".to_string(),
            "Inspect serial-to-Ethernet converter power supply".to_string(),
        ],
        StabilityState::Corrupted => vec![
            "Verify baud rate matches scale configuration".to_string(),
            "Check for electrical interference near the serial line".to_string(),
        ],
        StabilityState::Disconnected => vec![
            "Verify network path to the serial-to-Ethernet converter".to_string(),
            "Confirm the scale is powered on".to_string(),
        ],
        StabilityState::Unknown => vec!["Collect more samples before judging link quality".to_string()],
        StabilityState::Unstable => vec!["Monitor for a recurring pattern before escalating".to_string()],
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

fn coefficient_of_variation(values: &[f64], mean_value: f64) -> f64 {
    if mean_value <= 0.0 || values.len() < 2 {
        return 0.0;
    }
    let std_dev = variance(values, mean_value).sqrt();
    std_dev / mean_value
}

/// Converts a coefficient of variation into a `[0,100]` consistency score:
/// `cv = 0` -> 100, `cv >= 1` -> 0, linear in between.
fn consistency_score(cv: f64) -> f64 {
    (100.0 * (1.0 - cv.min(1.0))).max(0.0)
}

fn interval_ms(samples: &[StabilitySample]) -> Vec<f64> {
    samples
        .windows(2)
        .map(|w| duration_ms(w[1].timestamp.duration_since(w[0].timestamp)))
        .collect()
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(bytes: &[u8], valid: bool) -> StabilitySample {
        StabilitySample::from_bytes(bytes, valid)
    }

    #[test]
    fn empty_window_is_unknown() {
        let (state, score, _) = analyze_window(&[], &StabilityMonitorConfig::default());
        assert_eq!(state, StabilityState::Unknown);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn mostly_invalid_samples_are_disconnected() {
        let samples: Vec<_> = (0..20).map(|_| sample(b"garbage", false)).collect();
        let (state, _, analysis) = analyze_window(&samples, &StabilityMonitorConfig::default());
        assert_eq!(state, StabilityState::Disconnected);
        assert!(analysis.valid_rate < 0.10);
    }

    #[test]
    fn clean_uniform_frames_are_stable() {
        let samples: Vec<_> = (0..50)
            .map(|_| sample(b"ST,GS,+00012.3,kg\r\n", true))
            .collect();
        let (state, score, _) = analyze_window(&samples, &StabilityMonitorConfig::default());
        assert_eq!(state, StabilityState::Stable);
        assert!(score >= 80.0);
    }

    #[test]
    fn heavy_null_bytes_are_corrupted() {
        let mut samples = vec![];
        for _ in 0..40 {
            samples.push(sample(&[0u8; 10], true));
        }
        let (state, _, analysis) = analyze_window(&samples, &StabilityMonitorConfig::default());
        assert!(analysis.corruption_detected);
        assert_eq!(state, StabilityState::Corrupted);
    }

    #[test]
    fn every_non_stable_state_has_a_recommended_action() {
        for state in [
            StabilityState::Noisy,
            StabilityState::Intermittent,
            StabilityState::Corrupted,
            StabilityState::Disconnected,
            StabilityState::Unknown,
            StabilityState::Unstable,
        ] {
            assert!(!recommended_actions(state).is_empty(), "{state:?}");
        }
    }
}
