//! Telemetry access: the read-only time series the detectors consume.
//!
//! Ingestion belongs to an external collaborator; this module only exposes
//! range queries over `readings` and `performance_gaps`, plus a bulk import used to
//! load fixtures into the local SQLite store.

use crate::storage::{json_column, Pool};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One sample of plant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    /// Instantaneous power (kW).
    pub power: f64,
    /// Energy for the sampling interval (kWh).
    pub energy: f64,
}

/// Expected-vs-actual energy comparison produced by the digital twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceGap {
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    pub expected_energy: f64,
    pub actual_energy: f64,
    pub gap_percent: f64,
    pub gap_energy: f64,
    #[serde(default)]
    pub probable_causes: Vec<String>,
}

impl PerformanceGap {
    /// Build a gap record, deriving `gap_percent` and `gap_energy`.
    pub fn from_energies(
        plant_id: &str,
        timestamp: DateTime<Utc>,
        expected_energy: f64,
        actual_energy: f64,
    ) -> Self {
        let gap_energy = actual_energy - expected_energy;
        let gap_percent = if expected_energy != 0.0 {
            gap_energy / expected_energy * 100.0
        } else {
            0.0
        };
        Self {
            plant_id: plant_id.to_string(),
            timestamp,
            expected_energy,
            actual_energy,
            gap_percent,
            gap_energy,
            probable_causes: Vec::new(),
        }
    }
}

/// Read-only access to a plant's telemetry over a time range.
///
/// Both queries return rows ordered by timestamp ascending, bounded by
/// `start <= timestamp <= end`.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn readings(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>>;

    async fn performance_gaps(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceGap>>;
}

/// Telemetry tables living in the engine's own SQLite database.
#[derive(Clone)]
pub struct SqliteTelemetry {
    pool: Pool,
}

impl SqliteTelemetry {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert readings, replacing any sample already stored for the same instant.
    pub fn insert_readings(&self, readings: &[Reading]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO readings (plant_id, timestamp, power, energy)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(plant_id, timestamp) DO UPDATE SET
                    power = excluded.power,
                    energy = excluded.energy",
            )?;
            for r in readings {
                stmt.execute(params![r.plant_id, r.timestamp, r.power, r.energy])?;
            }
        }
        tx.commit().context("Failed to import readings")?;
        Ok(readings.len())
    }

    pub fn insert_performance_gaps(&self, gaps: &[PerformanceGap]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO performance_gaps (plant_id, timestamp, expected_energy, actual_energy,
                    gap_percent, gap_energy, probable_causes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(plant_id, timestamp) DO UPDATE SET
                    expected_energy = excluded.expected_energy,
                    actual_energy = excluded.actual_energy,
                    gap_percent = excluded.gap_percent,
                    gap_energy = excluded.gap_energy,
                    probable_causes_json = excluded.probable_causes_json",
            )?;
            for g in gaps {
                let causes = serde_json::to_string(&g.probable_causes)?;
                stmt.execute(params![
                    g.plant_id,
                    g.timestamp,
                    g.expected_energy,
                    g.actual_energy,
                    g.gap_percent,
                    g.gap_energy,
                    causes
                ])?;
            }
        }
        tx.commit().context("Failed to import performance gaps")?;
        Ok(gaps.len())
    }

    fn query_readings(
        pool: &Pool,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT plant_id, timestamp, power, energy FROM readings
             WHERE plant_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![plant_id, start, end], |row| {
            Ok(Reading {
                plant_id: row.get(0)?,
                timestamp: row.get(1)?,
                power: row.get(2)?,
                energy: row.get(3)?,
            })
        })?;

        let mut readings = Vec::new();
        for r in rows {
            readings.push(r?);
        }
        Ok(readings)
    }

    fn query_gaps(
        pool: &Pool,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceGap>> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT plant_id, timestamp, expected_energy, actual_energy, gap_percent, gap_energy,
                    probable_causes_json
             FROM performance_gaps
             WHERE plant_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![plant_id, start, end], |row| {
            Ok(PerformanceGap {
                plant_id: row.get(0)?,
                timestamp: row.get(1)?,
                expected_energy: row.get(2)?,
                actual_energy: row.get(3)?,
                gap_percent: row.get(4)?,
                gap_energy: row.get(5)?,
                probable_causes: json_column(row, 6)?,
            })
        })?;

        let mut gaps = Vec::new();
        for r in rows {
            gaps.push(r?);
        }
        Ok(gaps)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for SqliteTelemetry {
    async fn readings(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        let pool = self.pool.clone();
        let plant_id = plant_id.to_string();
        tokio::task::spawn_blocking(move || Self::query_readings(&pool, &plant_id, start, end))
            .await?
    }

    async fn performance_gaps(
        &self,
        plant_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceGap>> {
        let pool = self.pool.clone();
        let plant_id = plant_id.to_string();
        tokio::task::spawn_blocking(move || Self::query_gaps(&pool, &plant_id, start, end)).await?
    }
}

/// Telemetry fixture accepted by `solarsentinel import`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TelemetryBundle {
    #[serde(default)]
    pub readings: Vec<Reading>,
    #[serde(default)]
    pub performance_gaps: Vec<PerformanceGap>,
}

impl TelemetryBundle {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read telemetry file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse telemetry file: {}", path.display()))
    }

    /// Write every record into the store. Returns `(readings, gaps)` imported.
    pub fn import_into(&self, telemetry: &SqliteTelemetry) -> Result<(usize, usize)> {
        let readings = telemetry.insert_readings(&self.readings)?;
        let gaps = telemetry.insert_performance_gaps(&self.performance_gaps)?;
        Ok((readings, gaps))
    }
}
