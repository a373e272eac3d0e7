//! Missing-telemetry detection.

use crate::detect::{AnomalyType, Candidate, DetectError, DetectedBy, Metric, Severity};
use crate::telemetry::Reading;

pub const DEFAULT_EXPECTED_INTERVAL_MINUTES: f64 = 15.0;

pub struct DataGapDetector {
    expected_interval_minutes: f64,
}

impl Default for DataGapDetector {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECTED_INTERVAL_MINUTES)
    }
}

impl DataGapDetector {
    pub fn new(expected_interval_minutes: f64) -> Self {
        Self {
            expected_interval_minutes,
        }
    }

    /// Flag every interval between consecutive readings longer than twice the
    /// expected sampling interval. The anomaly is stamped with the last reading
    /// before the silence.
    pub fn detect(&self, readings: &[Reading]) -> Result<Vec<Candidate>, DetectError> {
        let limit = 2.0 * self.expected_interval_minutes;
        let mut found = Vec::new();

        for pair in readings.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let gap_minutes = (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 60_000.0;
            if gap_minutes < 0.0 {
                return Err(DetectError::MalformedTelemetry {
                    timestamp: next.timestamp,
                    reason: format!("reading precedes previous sample at {}", prev.timestamp),
                });
            }
            if gap_minutes <= limit {
                continue;
            }

            found.push(Candidate {
                plant_id: prev.plant_id.clone(),
                timestamp: prev.timestamp,
                anomaly_type: AnomalyType::DataGap,
                severity: severity_for_gap(gap_minutes),
                confidence: 1.0,
                detected_by: DetectedBy::Statistical,
                metric_affected: Metric::Availability,
                expected_value: self.expected_interval_minutes,
                actual_value: gap_minutes,
                deviation_percent: (gap_minutes - self.expected_interval_minutes)
                    / self.expected_interval_minutes
                    * 100.0,
                metadata: serde_json::json!({
                    "gap_start": prev.timestamp,
                    "gap_end": next.timestamp,
                    "gap_minutes": gap_minutes,
                    "expected_interval_minutes": self.expected_interval_minutes,
                }),
            });
        }

        Ok(found)
    }
}

fn severity_for_gap(gap_minutes: f64) -> Severity {
    if gap_minutes > 120.0 {
        Severity::High
    } else if gap_minutes > 60.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
