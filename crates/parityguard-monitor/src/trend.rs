//! Long-window accuracy trends from a least-squares fit over run history.

use std::collections::BTreeMap;

use parityguard_core::{Trend, TrendAnalysis, TrendSeverity, ValidationRun, ValidationStatus};

/// Correlation below which a moving series is called volatile.
const MIN_CONFIDENCE: f64 = 0.5;

/// Fit of one accuracy series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesFit {
    pub direction: Trend,
    pub slope: f64,
    pub confidence: f64,
    /// Fitted accuracy change from first to last sample.
    pub change: f64,
}

/// Classify a series ordered oldest first.
///
/// A fitted change smaller than `stable_band` is stable. Otherwise a weak
/// correlation means volatile, and the slope sign picks improving or
/// degrading.
pub fn fit_series(series: &[f64], stable_band: f64) -> SeriesFit {
    let n = series.len();
    if n < 2 {
        return SeriesFit {
            direction: Trend::Stable,
            slope: 0.0,
            confidence: 0.0,
            change: 0.0,
        };
    }

    let count = n as f64;
    let mean_x = (count - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / count;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (index, value) in series.iter().enumerate() {
        let dx = index as f64 - mean_x;
        let dy = value - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let slope = cov / var_x;
    let confidence = if var_y == 0.0 {
        0.0
    } else {
        (cov / (var_x * var_y).sqrt()).abs().min(1.0)
    };
    let change = slope * (count - 1.0);

    let direction = if change.abs() < stable_band {
        Trend::Stable
    } else if confidence < MIN_CONFIDENCE {
        Trend::Volatile
    } else if slope > 0.0 {
        Trend::Improving
    } else {
        Trend::Degrading
    };

    SeriesFit {
        direction,
        slope,
        confidence,
        change,
    }
}

fn severity_of(change: f64) -> TrendSeverity {
    let magnitude = change.abs();
    if magnitude > 0.10 {
        TrendSeverity::High
    } else if magnitude > 0.05 {
        TrendSeverity::Medium
    } else {
        TrendSeverity::Low
    }
}

/// Per-metric trends across `history`, sorted by metric name.
pub fn analyze_trends(history: &[ValidationRun], stable_band: f64) -> Vec<TrendAnalysis> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for run in history {
        for result in run.results.iter().filter(|result| result.status != ValidationStatus::Skipped) {
            series
                .entry(result.metric_name.as_str())
                .or_default()
                .push(result.accuracy);
        }
    }

    series
        .into_iter()
        .map(|(metric, values)| {
            let fit = fit_series(&values, stable_band);
            TrendAnalysis {
                metric_name: metric.to_string(),
                direction: fit.direction,
                severity: severity_of(fit.change),
                confidence: fit.confidence,
                samples: values.len(),
                slope: fit.slope,
            }
        })
        .collect()
}

/// Direction of the per-run average accuracy.
pub fn overall_direction(history: &[ValidationRun], stable_band: f64) -> Trend {
    let averages: Vec<f64> = history.iter().map(|run| run.average_accuracy).collect();
    fit_series(&averages, stable_band).direction
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use parityguard_core::{RunKind, ValidationResult, ValidationStatus};

    use super::*;

    fn run(index: i64, accuracy: f64) -> ValidationRun {
        let mut result = ValidationResult::skipped("Top Wait Events", "fixture");
        result.accuracy = accuracy;
        result.status = ValidationStatus::Passed;
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("timestamp")
            + TimeDelta::hours(index);
        ValidationRun::from_results(format!("run_{index}"), RunKind::Quick, at, 1, vec![result])
    }

    #[test]
    fn steady_decline_is_degrading() {
        let fit = fit_series(&[0.99, 0.96, 0.93, 0.90, 0.87], 0.02);
        assert_eq!(fit.direction, Trend::Degrading);
        assert!((fit.slope + 0.03).abs() < 1e-9);
        assert!(fit.confidence > 0.99);
    }

    #[test]
    fn flat_series_is_stable() {
        let fit = fit_series(&[0.97, 0.97, 0.97], 0.02);
        assert_eq!(fit.direction, Trend::Stable);
        assert_eq!(fit.confidence, 0.0);
    }

    #[test]
    fn noisy_series_is_volatile() {
        let fit = fit_series(&[0.6, 1.0, 0.55, 0.98, 0.62, 0.97, 0.58, 0.99], 0.02);
        assert_eq!(fit.direction, Trend::Volatile);
    }

    #[test]
    fn short_series_is_stable() {
        assert_eq!(fit_series(&[0.5], 0.02).direction, Trend::Stable);
        assert_eq!(fit_series(&[], 0.02).direction, Trend::Stable);
    }

    #[test]
    fn trends_per_metric() {
        let history: Vec<_> = [0.99, 0.95, 0.91, 0.86]
            .iter()
            .enumerate()
            .map(|(index, accuracy)| run(index as i64, *accuracy))
            .collect();
        let trends = analyze_trends(&history, 0.02);
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].metric_name, "Top Wait Events");
        assert_eq!(trends[0].direction, Trend::Degrading);
        assert_eq!(trends[0].severity, TrendSeverity::High);
        assert_eq!(trends[0].samples, 4);
        assert_eq!(overall_direction(&history, 0.02), Trend::Degrading);
    }

    #[test]
    fn skipped_results_do_not_count_as_samples() {
        let mut history: Vec<_> = [0.99, 0.95, 0.91]
            .iter()
            .enumerate()
            .map(|(index, accuracy)| run(index as i64, *accuracy))
            .collect();
        let mut interrupted = run(3, 1.0);
        interrupted.results[0].status = ValidationStatus::Skipped;
        history.push(interrupted);

        let trends = analyze_trends(&history, 0.02);
        assert_eq!(trends[0].samples, 3);
        assert_eq!(trends[0].direction, Trend::Degrading);
    }
}
