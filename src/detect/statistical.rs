//! Z-score detection against a single global baseline for the window.

use crate::detect::{AnomalyType, Candidate, DetectError, DetectedBy, Metric, Sensitivity, Severity};
use crate::telemetry::Reading;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Mean and standard deviation, or `None` when a z-score is undefined
    /// (fewer than two samples, or zero spread).
    pub fn baseline(&self) -> Option<Baseline> {
        if self.values.len() < 2 {
            return None;
        }
        let std_dev = self.std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return None;
        }
        Some(Baseline {
            mean: self.mean(),
            std_dev,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
}

impl Baseline {
    /// Absolute z-score of `value`.
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean).abs() / self.std_dev
    }
}

pub struct StatisticalDetector {
    sensitivity: Sensitivity,
}

impl StatisticalDetector {
    pub fn new(sensitivity: Sensitivity) -> Self {
        Self { sensitivity }
    }

    /// Flag readings whose power deviates from the window mean by more than the
    /// sensitivity threshold. Zero-power samples (night, curtailment) are ignored.
    pub fn detect(&self, readings: &[Reading]) -> Result<Vec<Candidate>, DetectError> {
        for r in readings {
            if !r.power.is_finite() || r.power < 0.0 {
                return Err(DetectError::MalformedTelemetry {
                    timestamp: r.timestamp,
                    reason: format!("power must be a non-negative number, got {}", r.power),
                });
            }
        }

        let producing: Vec<&Reading> = readings.iter().filter(|r| r.power != 0.0).collect();
        let series = TimeSeries::new(producing.iter().map(|r| r.power).collect());
        let Some(baseline) = series.baseline() else {
            return Ok(Vec::new());
        };

        Ok(producing
            .into_iter()
            .filter_map(|r| self.evaluate(r, &baseline))
            .collect())
    }

    /// Score one reading against a precomputed baseline.
    pub fn evaluate(&self, reading: &Reading, baseline: &Baseline) -> Option<Candidate> {
        let threshold = self.sensitivity.z_threshold();
        let z = baseline.z_score(reading.power);
        if z <= threshold {
            return None;
        }

        let anomaly_type = if reading.power < baseline.mean {
            AnomalyType::GenerationDrop
        } else {
            AnomalyType::UnexpectedSpike
        };
        let deviation_percent = if baseline.mean != 0.0 {
            (reading.power - baseline.mean) / baseline.mean * 100.0
        } else {
            0.0
        };

        Some(Candidate {
            plant_id: reading.plant_id.clone(),
            timestamp: reading.timestamp,
            anomaly_type,
            severity: severity_for_z(z),
            confidence: (z / 5.0).min(1.0),
            detected_by: DetectedBy::Statistical,
            metric_affected: Metric::Power,
            expected_value: baseline.mean,
            actual_value: reading.power,
            deviation_percent,
            metadata: serde_json::json!({
                "z_score": z,
                "mean": baseline.mean,
                "std_dev": baseline.std_dev,
                "threshold": threshold,
                "sensitivity": self.sensitivity,
            }),
        })
    }
}

fn severity_for_z(z: f64) -> Severity {
    if z > 4.0 {
        Severity::Critical
    } else if z > 3.5 {
        Severity::High
    } else if z > 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
