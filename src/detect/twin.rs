//! Digital-twin gap detection: flags energy output that strays from the model's
//! expectation by more than a percentage threshold.

use crate::detect::{AnomalyType, Candidate, DetectError, DetectedBy, Metric, Severity};
use crate::telemetry::PerformanceGap;

/// Confidence assigned to every twin finding. Higher than the raw statistical
/// detector because the expected value already comes from a plant model.
pub const TWIN_CONFIDENCE: f64 = 0.85;

pub const DEFAULT_GAP_THRESHOLD_PERCENT: f64 = 10.0;

pub struct TwinGapDetector {
    threshold_percent: f64,
}

impl Default for TwinGapDetector {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_THRESHOLD_PERCENT)
    }
}

impl TwinGapDetector {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    pub fn detect(&self, gaps: &[PerformanceGap]) -> Result<Vec<Candidate>, DetectError> {
        let mut found = Vec::new();
        for gap in gaps {
            if !gap.gap_percent.is_finite() {
                return Err(DetectError::MalformedTelemetry {
                    timestamp: gap.timestamp,
                    reason: format!("gap_percent is not a number: {}", gap.gap_percent),
                });
            }

            let magnitude = gap.gap_percent.abs();
            if magnitude <= self.threshold_percent {
                continue;
            }

            let anomaly_type = if gap.gap_percent < 0.0 {
                AnomalyType::Underperformance
            } else {
                AnomalyType::Overperformance
            };

            found.push(Candidate {
                plant_id: gap.plant_id.clone(),
                timestamp: gap.timestamp,
                anomaly_type,
                severity: severity_for_gap(magnitude),
                confidence: TWIN_CONFIDENCE,
                detected_by: DetectedBy::DigitalTwin,
                metric_affected: Metric::Energy,
                expected_value: gap.expected_energy,
                actual_value: gap.actual_energy,
                deviation_percent: gap.gap_percent,
                metadata: serde_json::json!({
                    "gap_energy": gap.gap_energy,
                    "probable_causes": gap.probable_causes,
                }),
            });
        }
        Ok(found)
    }
}

fn severity_for_gap(magnitude: f64) -> Severity {
    if magnitude > 30.0 {
        Severity::Critical
    } else if magnitude > 20.0 {
        Severity::High
    } else if magnitude > 15.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
