//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Current schema version recorded in `schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY,
            plant_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            power REAL NOT NULL,
            energy REAL NOT NULL,
            UNIQUE (plant_id, timestamp)
        );

        CREATE TABLE IF NOT EXISTS performance_gaps (
            id INTEGER PRIMARY KEY,
            plant_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            expected_energy REAL NOT NULL,
            actual_energy REAL NOT NULL,
            gap_percent REAL NOT NULL,
            gap_energy REAL NOT NULL,
            probable_causes_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE (plant_id, timestamp)
        );

        CREATE TABLE IF NOT EXISTS anomalies (
            id TEXT PRIMARY KEY,
            plant_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            anomaly_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            confidence REAL NOT NULL,
            detected_by TEXT NOT NULL,
            metric_affected TEXT NOT NULL,
            expected_value REAL NOT NULL,
            actual_value REAL NOT NULL,
            deviation_percent REAL NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            root_cause_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (plant_id, timestamp, anomaly_type, metric_affected)
        );

        CREATE TABLE IF NOT EXISTS root_cause_analysis (
            id TEXT PRIMARY KEY,
            anomaly_id TEXT NOT NULL UNIQUE,
            plant_id TEXT NOT NULL,
            probable_causes_json TEXT NOT NULL,
            dependency_graph_json TEXT NOT NULL,
            recommended_actions_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (anomaly_id) REFERENCES anomalies(id)
        );

        CREATE INDEX IF NOT EXISTS idx_readings_plant_ts ON readings(plant_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_gaps_plant_ts ON performance_gaps(plant_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_anomalies_plant_ts ON anomalies(plant_id, timestamp);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
