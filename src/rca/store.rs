use crate::error::EngineError;
use crate::rca::RootCauseAnalysis;
use crate::storage::{json_column, parse_column, Pool};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

const RCA_COLUMNS: &str = "id, anomaly_id, plant_id, probable_causes_json, dependency_graph_json,
    recommended_actions_json, created_at";

#[derive(Clone)]
pub struct AnalysisStore {
    pool: Pool,
}

impl AnalysisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert the analysis unless one already exists for the same anomaly.
    /// Returns `true` when this call created the row.
    pub fn insert_if_absent(&self, rca: &RootCauseAnalysis) -> Result<bool, EngineError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "INSERT INTO root_cause_analysis (id, anomaly_id, plant_id, probable_causes_json,
                dependency_graph_json, recommended_actions_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(anomaly_id) DO NOTHING",
            params![
                rca.id.to_string(),
                rca.anomaly_id.to_string(),
                rca.plant_id,
                serde_json::to_string(&rca.probable_causes)?,
                serde_json::to_string(&rca.dependency_graph)?,
                serde_json::to_string(&rca.recommended_actions)?,
                rca.created_at
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn get_by_anomaly(&self, anomaly_id: Uuid) -> Result<Option<RootCauseAnalysis>, EngineError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {RCA_COLUMNS} FROM root_cause_analysis WHERE anomaly_id = ?1");
        let rca = conn
            .query_row(&sql, params![anomaly_id.to_string()], row_to_analysis)
            .optional()?;
        Ok(rca)
    }

    pub fn count(&self) -> Result<i64, EngineError> {
        let conn = self.pool.get()?;
        let n = conn.query_row("SELECT COUNT(*) FROM root_cause_analysis", [], |row| row.get(0))?;
        Ok(n)
    }
}

fn row_to_analysis(row: &rusqlite::Row<'_>) -> rusqlite::Result<RootCauseAnalysis> {
    Ok(RootCauseAnalysis {
        id: parse_column(row, 0)?,
        anomaly_id: parse_column(row, 1)?,
        plant_id: row.get(2)?,
        probable_causes: json_column(row, 3)?,
        dependency_graph: json_column(row, 4)?,
        recommended_actions: json_column(row, 5)?,
        created_at: row.get(6)?,
    })
}
