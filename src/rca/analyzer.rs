use crate::detect::store::AnomalyStore;
use crate::error::EngineError;
use crate::rca::playbook::{infer_causes, recommend_actions};
use crate::rca::store::AnalysisStore;
use crate::rca::{DependencyGraph, RootCauseAnalysis};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of an analysis request.
#[derive(Debug, Serialize)]
pub struct AnalysisOutcome {
    pub rca: RootCauseAnalysis,
    /// `false` when an earlier request had already produced the stored analysis.
    #[serde(skip)]
    pub created: bool,
    /// Problems that did not prevent the analysis from being returned.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Produces and persists root-cause analyses for stored anomalies.
#[derive(Clone)]
pub struct RootCauseAnalyzer {
    anomalies: AnomalyStore,
    analyses: AnalysisStore,
}

impl RootCauseAnalyzer {
    pub fn new(anomalies: AnomalyStore, analyses: AnalysisStore) -> Self {
        Self {
            anomalies,
            analyses,
        }
    }

    /// Analyze the anomaly identified by a textual UUID.
    pub async fn analyze(&self, anomaly_id: &str) -> Result<AnalysisOutcome, EngineError> {
        let id = parse_anomaly_id(anomaly_id)?;
        self.analyze_id(id).await
    }

    pub async fn analyze_id(&self, anomaly_id: Uuid) -> Result<AnalysisOutcome, EngineError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.analyze_blocking(anomaly_id)).await?
    }

    /// Stored analysis for an anomaly, if any.
    pub async fn existing(&self, anomaly_id: &str) -> Result<Option<RootCauseAnalysis>, EngineError> {
        let id = parse_anomaly_id(anomaly_id)?;
        let analyses = self.analyses.clone();
        tokio::task::spawn_blocking(move || analyses.get_by_anomaly(id)).await?
    }

    fn analyze_blocking(&self, anomaly_id: Uuid) -> Result<AnalysisOutcome, EngineError> {
        let anomaly = self
            .anomalies
            .get(anomaly_id)?
            .ok_or_else(|| EngineError::not_found("anomaly", anomaly_id))?;

        let rca = RootCauseAnalysis {
            id: Uuid::new_v4(),
            anomaly_id,
            plant_id: anomaly.plant_id.clone(),
            probable_causes: infer_causes(&anomaly),
            dependency_graph: DependencyGraph::pv_plant(),
            recommended_actions: recommend_actions(&anomaly),
            created_at: Utc::now(),
        };

        let created = self.analyses.insert_if_absent(&rca)?;
        let rca = if created {
            info!(
                %anomaly_id,
                anomaly_type = %anomaly.anomaly_type,
                causes = rca.probable_causes.len(),
                actions = rca.recommended_actions.len(),
                "Root-cause analysis stored"
            );
            rca
        } else {
            warn!(%anomaly_id, "Root-cause analysis already exists, returning stored analysis");
            self.analyses.get_by_anomaly(anomaly_id)?.ok_or_else(|| {
                EngineError::Persistence(format!(
                    "analysis for anomaly {anomaly_id} conflicted but cannot be read back"
                ))
            })?
        };

        let mut warnings = Vec::new();
        if anomaly.root_cause_id != Some(rca.id) {
            if let Err(e) = self.anomalies.set_root_cause(anomaly_id, rca.id) {
                warn!(
                    %anomaly_id,
                    analysis_id = %rca.id,
                    error = %e,
                    "Analysis stored but linking it to the anomaly failed"
                );
                warnings.push(format!("anomaly was not linked to analysis {}: {e}", rca.id));
            }
        }

        Ok(AnalysisOutcome {
            rca,
            created,
            warnings,
        })
    }
}

pub(crate) fn parse_anomaly_id(raw: &str) -> Result<Uuid, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::invalid("anomaly_id must not be empty"));
    }
    Uuid::parse_str(trimmed)
        .map_err(|e| EngineError::invalid(format!("anomaly_id '{trimmed}' is not a UUID: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AnomalyType, Candidate, DetectedBy, Metric, Severity};
    use crate::rca::Priority;
    use crate::storage::test_support::temp_pool;
    use crate::storage::Pool;
    use chrono::TimeZone;

    fn setup() -> (tempfile::TempDir, Pool, AnomalyStore, RootCauseAnalyzer) {
        let (dir, pool) = temp_pool();
        let anomalies = AnomalyStore::new(pool.clone());
        let analyzer = RootCauseAnalyzer::new(anomalies.clone(), AnalysisStore::new(pool.clone()));
        (dir, pool, anomalies, analyzer)
    }

    fn seed(store: &AnomalyStore, anomaly_type: AnomalyType) -> Uuid {
        let candidate = Candidate {
            plant_id: "plant-1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 6, 1, 13, 0, 0).unwrap(),
            anomaly_type,
            severity: Severity::Critical,
            confidence: 0.9,
            detected_by: DetectedBy::Statistical,
            metric_affected: Metric::Power,
            expected_value: 480.0,
            actual_value: 0.0,
            deviation_percent: -100.0,
            metadata: serde_json::json!({}),
        };
        store.upsert_all(&[candidate]).unwrap().anomalies[0].id
    }

    #[tokio::test]
    async fn test_offline_analysis_links_anomaly() {
        let (_dir, _pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::Offline);

        let outcome = analyzer.analyze(&id.to_string()).await.unwrap();
        assert!(outcome.created);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.rca.probable_causes.len(), 2);
        assert_eq!(outcome.rca.recommended_actions.len(), 1);
        assert_eq!(outcome.rca.recommended_actions[0].priority, Priority::Critical);
        assert_eq!(outcome.rca.dependency_graph, DependencyGraph::pv_plant());

        let stored = anomalies.get(id).unwrap().unwrap();
        assert_eq!(stored.root_cause_id, Some(outcome.rca.id));
    }

    #[tokio::test]
    async fn test_missing_anomaly_is_not_found_and_writes_nothing() {
        let (_dir, pool, _anomalies, analyzer) = setup();
        let err = analyzer.analyze(&Uuid::new_v4().to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert_eq!(AnalysisStore::new(pool).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_id_is_invalid_input() {
        let (_dir, _pool, _anomalies, analyzer) = setup();
        for raw in ["", "   ", "not-a-uuid"] {
            let err = analyzer.analyze(raw).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)), "{raw:?}");
        }
    }

    #[tokio::test]
    async fn test_repeat_analysis_returns_first_result() {
        let (_dir, pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::GenerationDrop);

        let first = analyzer.analyze_id(id).await.unwrap();
        let second = analyzer.analyze_id(id).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.rca, second.rca);
        assert_eq!(AnalysisStore::new(pool).count().unwrap(), 1);
        assert_eq!(anomalies.get(id).unwrap().unwrap().root_cause_id, Some(first.rca.id));
    }

    #[tokio::test]
    async fn test_unhandled_type_gets_empty_playbook() {
        let (_dir, _pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::UnexpectedSpike);
        let outcome = analyzer.analyze_id(id).await.unwrap();
        assert!(outcome.rca.probable_causes.is_empty());
        assert!(outcome.rca.recommended_actions.is_empty());
        assert_eq!(outcome.rca.dependency_graph.nodes.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_link_back_is_reported() {
        let (_dir, pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::DataGap);
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER freeze_root_cause BEFORE UPDATE OF root_cause_id ON anomalies
                 BEGIN SELECT RAISE(ABORT, 'anomalies are read-only'); END;",
            )
            .unwrap();

        let outcome = analyzer.analyze_id(id).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(anomalies.get(id).unwrap().unwrap().root_cause_id.is_none());
        assert_eq!(AnalysisStore::new(pool).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_existing_lookup() {
        let (_dir, _pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::Underperformance);
        assert!(analyzer.existing(&id.to_string()).await.unwrap().is_none());
        let outcome = analyzer.analyze_id(id).await.unwrap();
        let found = analyzer.existing(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(found, outcome.rca);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_one_analysis() {
        let (_dir, pool, anomalies, analyzer) = setup();
        let id = seed(&anomalies, AnomalyType::Offline);

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let analyzer = analyzer.clone();
                tokio::spawn(async move { analyzer.analyze_id(id).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for call in calls {
            outcomes.push(call.await.unwrap().unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
        let rca_id = outcomes[0].rca.id;
        assert!(outcomes.iter().all(|o| o.rca.id == rca_id));
        assert!(outcomes.iter().all(|o| o.warnings.is_empty()));
        assert_eq!(AnalysisStore::new(pool).count().unwrap(), 1);
        assert_eq!(anomalies.get(id).unwrap().unwrap().root_cause_id, Some(rca_id));
    }
}
