use crate::config::DetectionSettings;
use crate::detect::engine::AnomalyEngine;
use crate::detect::store::AnomalyStore;
use crate::rca::store::AnalysisStore;
use crate::rca::RootCauseAnalyzer;
use crate::storage::Pool;
use crate::telemetry::SqliteTelemetry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnomalyEngine>,
    pub analyzer: RootCauseAnalyzer,
    pub anomalies: AnomalyStore,
}

impl AppState {
    /// Wire the engine and analyzer onto one SQLite pool.
    pub fn from_pool(pool: Pool, detection: &DetectionSettings) -> Self {
        let anomalies = AnomalyStore::new(pool.clone());
        let engine = AnomalyEngine::new(
            Arc::new(SqliteTelemetry::new(pool.clone())),
            anomalies.clone(),
            detection.engine_settings(),
        );
        let analyzer = RootCauseAnalyzer::new(anomalies.clone(), AnalysisStore::new(pool));
        Self {
            engine: Arc::new(engine),
            analyzer,
            anomalies,
        }
    }
}
