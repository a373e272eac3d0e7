use crate::detect::data_gap::DataGapDetector;
use crate::detect::statistical::StatisticalDetector;
use crate::detect::store::AnomalyStore;
use crate::detect::twin::TwinGapDetector;
use crate::detect::{Anomaly, Candidate, DetectError, DetectionConfig};
use crate::error::EngineError;
use crate::telemetry::TelemetrySource;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables shared by every detection run.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_period_hours: u32,
    pub max_period_hours: u32,
    pub expected_interval_minutes: f64,
    pub gap_threshold_percent: f64,
    pub default_config: DetectionConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_period_hours: 24,
            max_period_hours: 720,
            expected_interval_minutes: crate::detect::data_gap::DEFAULT_EXPECTED_INTERVAL_MINUTES,
            gap_threshold_percent: crate::detect::twin::DEFAULT_GAP_THRESHOLD_PERCENT,
            default_config: DetectionConfig::default(),
        }
    }
}

/// Outcome of one detection run.
#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub plant_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Findings reported by the detectors.
    pub anomalies_detected: usize,
    /// Distinct rows written; findings sharing a detection key count once.
    pub anomalies_persisted: usize,
    /// Rows that did not exist before this run.
    pub anomalies_new: usize,
    pub anomalies: Vec<Anomaly>,
    pub failed_detectors: Vec<String>,
}

/// Runs the detectors over a plant's telemetry window and persists the findings.
pub struct AnomalyEngine {
    telemetry: Arc<dyn TelemetrySource>,
    store: AnomalyStore,
    settings: EngineSettings,
}

impl AnomalyEngine {
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        store: AnomalyStore,
        settings: EngineSettings,
    ) -> Self {
        Self {
            telemetry,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Detect over the `period_hours` leading up to now.
    pub async fn detect(
        &self,
        plant_id: &str,
        period_hours: Option<u32>,
        config: Option<DetectionConfig>,
    ) -> Result<DetectionReport, EngineError> {
        let hours = period_hours.unwrap_or(self.settings.default_period_hours);
        if hours == 0 || hours > self.settings.max_period_hours {
            return Err(EngineError::invalid(format!(
                "period_hours must be between 1 and {}, got {hours}",
                self.settings.max_period_hours
            )));
        }
        let end = Utc::now();
        let start = end - Duration::hours(i64::from(hours));
        self.detect_window(plant_id, start, end, config).await
    }

    /// Detect over an explicit `[start, end]` window.
    pub async fn detect_window(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        config: Option<DetectionConfig>,
    ) -> Result<DetectionReport, EngineError> {
        let plant_id = validate_plant_id(plant_id)?;
        if start >= end {
            return Err(EngineError::invalid("window start must precede its end"));
        }
        let config = config.unwrap_or(self.settings.default_config);
        info!(%plant_id, %start, %end, ?config, "Running anomaly detection");

        let (statistical, twin, data_gap) = tokio::join!(
            self.run_statistical(plant_id, start, end, &config),
            self.run_twin(plant_id, start, end, &config),
            self.run_data_gap(plant_id, start, end),
        );

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut failed_detectors = Vec::new();
        for (name, result) in [
            ("statistical", statistical),
            ("digital_twin", twin),
            ("data_gap", data_gap),
        ] {
            match result {
                Ok(found) => {
                    debug!(%plant_id, detector = name, found = found.len(), "Detector finished");
                    candidates.extend(found);
                }
                Err(e) => {
                    warn!(%plant_id, detector = name, error = %e, "Detector failed, continuing without it");
                    failed_detectors.push(name.to_string());
                }
            }
        }

        let detected = candidates.len();
        let store = self.store.clone();
        let outcome =
            tokio::task::spawn_blocking(move || store.upsert_all(&candidates)).await??;

        info!(
            %plant_id,
            detected,
            persisted = outcome.anomalies.len(),
            new = outcome.inserted,
            failed = failed_detectors.len(),
            "Anomaly detection complete"
        );

        Ok(DetectionReport {
            plant_id: plant_id.to_string(),
            window_start: start,
            window_end: end,
            anomalies_detected: detected,
            anomalies_persisted: outcome.anomalies.len(),
            anomalies_new: outcome.inserted,
            anomalies: outcome.anomalies,
            failed_detectors,
        })
    }

    async fn run_statistical(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        config: &DetectionConfig,
    ) -> Result<Vec<Candidate>, DetectError> {
        if !config.statistical_enabled {
            return Ok(Vec::new());
        }
        let readings = self.telemetry.readings(plant_id, start, end).await?;
        StatisticalDetector::new(config.sensitivity).detect(&readings)
    }

    async fn run_twin(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        config: &DetectionConfig,
    ) -> Result<Vec<Candidate>, DetectError> {
        if !config.digital_twin_enabled {
            return Ok(Vec::new());
        }
        let gaps = self.telemetry.performance_gaps(plant_id, start, end).await?;
        TwinGapDetector::new(self.settings.gap_threshold_percent).detect(&gaps)
    }

    async fn run_data_gap(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, DetectError> {
        let readings = self.telemetry.readings(plant_id, start, end).await?;
        DataGapDetector::new(self.settings.expected_interval_minutes).detect(&readings)
    }
}

fn validate_plant_id(plant_id: &str) -> Result<&str, EngineError> {
    let trimmed = plant_id.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid("plant_id must not be empty"));
    }
    Ok(trimmed)
}
