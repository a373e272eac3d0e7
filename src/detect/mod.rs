//! Anomaly detection: the three detectors, the aggregating engine, and the
//! anomaly store.

pub mod data_gap;
pub mod engine;
pub mod statistical;
pub mod store;
pub mod twin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single detector. The engine recovers from these locally.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("malformed telemetry at {timestamp}: {reason}")]
    MalformedTelemetry {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("telemetry unavailable: {0}")]
    Telemetry(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Defines a snake_case string enum with `as_str`, `Display` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

string_enum!(
    /// Class of abnormal behaviour.
    AnomalyType, "anomaly type" {
        GenerationDrop => "generation_drop",
        UnexpectedSpike => "unexpected_spike",
        Underperformance => "underperformance",
        Overperformance => "overperformance",
        DataGap => "data_gap",
        Offline => "offline",
    }
);

string_enum!(
    Severity, "severity" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

string_enum!(
    DetectedBy, "detector" {
        Statistical => "statistical",
        DigitalTwin => "digital_twin",
    }
);

string_enum!(
    Metric, "metric" {
        Power => "power",
        Energy => "energy",
        Availability => "availability",
    }
);

string_enum!(
    /// How eager the statistical detector is.
    Sensitivity, "sensitivity" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl Sensitivity {
    /// Z-score a reading must strictly exceed to be flagged.
    pub fn z_threshold(&self) -> f64 {
        match self {
            Sensitivity::High => 2.5,
            Sensitivity::Medium => 3.0,
            Sensitivity::Low => 3.5,
        }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Sensitivity::Medium
    }
}

/// Per-run detector toggles. The data-gap detector always runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub statistical_enabled: bool,
    pub digital_twin_enabled: bool,
    pub sensitivity: Sensitivity,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            statistical_enabled: true,
            digital_twin_enabled: true,
            sensitivity: Sensitivity::Medium,
        }
    }
}

/// A detector's finding before it has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub confidence: f64,
    pub detected_by: DetectedBy,
    pub metric_affected: Metric,
    pub expected_value: f64,
    pub actual_value: f64,
    pub deviation_percent: f64,
    pub metadata: serde_json::Value,
}

/// A persisted anomaly record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub confidence: f64,
    pub detected_by: DetectedBy,
    pub metric_affected: Metric,
    pub expected_value: f64,
    pub actual_value: f64,
    pub deviation_percent: f64,
    pub metadata: serde_json::Value,
    pub root_cause_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Anomaly {
    /// `true` once a root-cause analysis has been linked.
    pub fn is_analyzed(&self) -> bool {
        self.root_cause_id.is_some()
    }
}
