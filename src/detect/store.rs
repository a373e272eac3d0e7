use crate::detect::{Anomaly, Candidate};
use crate::error::EngineError;
use crate::storage::{json_column, parse_column, Pool};
use chrono::Utc;
use std::collections::HashMap;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

const ANOMALY_COLUMNS: &str = "id, plant_id, timestamp, anomaly_type, severity, confidence,
    detected_by, metric_affected, expected_value, actual_value, deviation_percent,
    metadata_json, root_cause_id, created_at, updated_at";

/// Result of persisting one detection run.
#[derive(Debug)]
pub struct UpsertOutcome {
    /// Distinct stored rows, in order of first appearance. Candidates sharing a
    /// detection key collapse into one row holding the last candidate's values.
    pub anomalies: Vec<Anomaly>,
    /// How many of them did not exist before this write.
    pub inserted: usize,
}

/// Persistence for anomaly records, keyed on
/// `(plant_id, timestamp, anomaly_type, metric_affected)`.
#[derive(Clone)]
pub struct AnomalyStore {
    pool: Pool,
}

impl AnomalyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert-or-replace every candidate in a single transaction.
    ///
    /// On a key conflict the detector-owned fields are overwritten; `id`,
    /// `created_at` and `root_cause_id` keep their stored values.
    pub fn upsert_all(&self, candidates: &[Candidate]) -> Result<UpsertOutcome, EngineError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();
        let mut anomalies: Vec<Anomaly> = Vec::with_capacity(candidates.len());
        let mut positions: HashMap<Uuid, usize> = HashMap::new();
        let mut inserted = 0;

        {
            let sql = format!(
                "INSERT INTO anomalies (id, plant_id, timestamp, anomaly_type, severity, confidence,
                    detected_by, metric_affected, expected_value, actual_value, deviation_percent,
                    metadata_json, root_cause_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, ?13)
                 ON CONFLICT(plant_id, timestamp, anomaly_type, metric_affected) DO UPDATE SET
                    severity = excluded.severity,
                    confidence = excluded.confidence,
                    detected_by = excluded.detected_by,
                    expected_value = excluded.expected_value,
                    actual_value = excluded.actual_value,
                    deviation_percent = excluded.deviation_percent,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                 RETURNING {ANOMALY_COLUMNS}"
            );
            let mut stmt = tx.prepare(&sql)?;

            for c in candidates {
                let fresh_id = Uuid::new_v4();
                let metadata = serde_json::to_string(&c.metadata)?;
                let stored = stmt.query_row(
                    params![
                        fresh_id.to_string(),
                        c.plant_id,
                        c.timestamp,
                        c.anomaly_type.as_str(),
                        c.severity.as_str(),
                        c.confidence,
                        c.detected_by.as_str(),
                        c.metric_affected.as_str(),
                        c.expected_value,
                        c.actual_value,
                        c.deviation_percent,
                        metadata,
                        now
                    ],
                    row_to_anomaly,
                )?;
                if stored.id == fresh_id {
                    inserted += 1;
                }
                match positions.get(&stored.id) {
                    Some(&pos) => anomalies[pos] = stored,
                    None => {
                        positions.insert(stored.id, anomalies.len());
                        anomalies.push(stored);
                    }
                }
            }
        }

        tx.commit()?;
        Ok(UpsertOutcome {
            anomalies,
            inserted,
        })
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Anomaly>, EngineError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {ANOMALY_COLUMNS} FROM anomalies WHERE id = ?1");
        let anomaly = conn
            .query_row(&sql, params![id.to_string()], row_to_anomaly)
            .optional()?;
        Ok(anomaly)
    }

    /// Most recent anomalies for a plant, newest first.
    pub fn list_for_plant(&self, plant_id: &str, limit: usize) -> Result<Vec<Anomaly>, EngineError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {ANOMALY_COLUMNS} FROM anomalies WHERE plant_id = ?1
             ORDER BY timestamp DESC, anomaly_type ASC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![plant_id, limit as i64], row_to_anomaly)?;

        let mut anomalies = Vec::new();
        for r in rows {
            anomalies.push(r?);
        }
        Ok(anomalies)
    }

    pub fn count_for_plant(&self, plant_id: &str) -> Result<i64, EngineError> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM anomalies WHERE plant_id = ?1",
            params![plant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Link an anomaly to its root-cause analysis. Fails with `NotFound` if the
    /// anomaly row has disappeared.
    pub fn set_root_cause(&self, anomaly_id: Uuid, analysis_id: Uuid) -> Result<(), EngineError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE anomalies SET root_cause_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![analysis_id.to_string(), Utc::now(), anomaly_id.to_string()],
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("anomaly", anomaly_id));
        }
        Ok(())
    }
}

fn row_to_anomaly(row: &rusqlite::Row<'_>) -> rusqlite::Result<Anomaly> {
    let root_cause_id = match row.get::<_, Option<String>>(12)? {
        Some(raw) => Some(Uuid::parse_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(Anomaly {
        id: parse_column(row, 0)?,
        plant_id: row.get(1)?,
        timestamp: row.get(2)?,
        anomaly_type: parse_column(row, 3)?,
        severity: parse_column(row, 4)?,
        confidence: row.get(5)?,
        detected_by: parse_column(row, 6)?,
        metric_affected: parse_column(row, 7)?,
        expected_value: row.get(8)?,
        actual_value: row.get(9)?,
        deviation_percent: row.get(10)?,
        metadata: json_column(row, 11)?,
        root_cause_id,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AnomalyType, DetectedBy, Metric, Severity};
    use crate::storage::test_support::temp_pool;
    use chrono::{TimeZone, Utc};

    fn candidate(severity: Severity, actual: f64) -> Candidate {
        Candidate {
            plant_id: "plant-1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 6, 1, 11, 0, 0).unwrap(),
            anomaly_type: AnomalyType::Underperformance,
            severity,
            confidence: 0.85,
            detected_by: DetectedBy::DigitalTwin,
            metric_affected: Metric::Energy,
            expected_value: 200.0,
            actual_value: actual,
            deviation_percent: (actual - 200.0) / 2.0,
            metadata: serde_json::json!({ "gap_energy": actual - 200.0 }),
        }
    }

    #[test]
    fn test_upsert_replaces_fields_and_keeps_id() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool);

        let first = store.upsert_all(&[candidate(Severity::Medium, 166.0)]).unwrap();
        assert_eq!(first.inserted, 1);
        let id = first.anomalies[0].id;

        let second = store.upsert_all(&[candidate(Severity::High, 150.0)]).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.anomalies[0].id, id);
        assert_eq!(second.anomalies[0].severity, Severity::High);
        assert_eq!(second.anomalies[0].actual_value, 150.0);
        assert_eq!(store.count_for_plant("plant-1").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_keys_in_one_batch_collapse() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool);

        let out = store
            .upsert_all(&[
                candidate(Severity::Medium, 166.0),
                candidate(Severity::Critical, 100.0),
            ])
            .unwrap();
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.inserted, 1);
        assert_eq!(out.anomalies[0].severity, Severity::Critical);
        assert_eq!(out.anomalies[0].actual_value, 100.0);
        assert_eq!(store.count_for_plant("plant-1").unwrap(), 1);
    }

    #[test]
    fn test_get_round_trips_record() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool);
        let out = store.upsert_all(&[candidate(Severity::High, 150.0)]).unwrap();
        let stored = &out.anomalies[0];

        let loaded = store.get(stored.id).unwrap().expect("row exists");
        assert_eq!(&loaded, stored);
        assert_eq!(loaded.metadata["gap_energy"], -50.0);
        assert!(!loaded.is_analyzed());

        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_root_cause_link_survives_upsert() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool.clone());
        let id = store.upsert_all(&[candidate(Severity::High, 150.0)]).unwrap().anomalies[0].id;

        // The FK on root_cause_analysis points the other way, so any id can be linked here.
        let analysis_id = Uuid::new_v4();
        store.set_root_cause(id, analysis_id).unwrap();

        let again = store.upsert_all(&[candidate(Severity::Critical, 100.0)]).unwrap();
        assert_eq!(again.anomalies[0].root_cause_id, Some(analysis_id));
    }

    #[test]
    fn test_set_root_cause_on_missing_anomaly() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool);
        let err = store.set_root_cause(Uuid::new_v4(), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_list_is_newest_first() {
        let (_dir, pool) = temp_pool();
        let store = AnomalyStore::new(pool);
        let mut early = candidate(Severity::Low, 170.0);
        early.timestamp = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
        store
            .upsert_all(&[early, candidate(Severity::High, 150.0)])
            .unwrap();

        let listed = store.list_for_plant("plant-1", 10).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].timestamp > listed[1].timestamp);
        assert_eq!(store.list_for_plant("plant-1", 1).unwrap().len(), 1);
        assert!(store.list_for_plant("plant-2", 10).unwrap().is_empty());
    }
}
