//! Root-cause analysis: maps a persisted anomaly to probable causes and
//! remediation steps.

pub mod analyzer;
pub mod playbook;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use analyzer::RootCauseAnalyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbableCause {
    pub cause: String,
    pub confidence: f64,
    pub evidence: String,
    /// Energy at stake (kWh).
    pub estimated_impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: String,
    pub priority: Priority,
    pub estimated_time_hours: f64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
}

/// Power-flow dependencies between plant subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    /// Build a linear chain where each element feeds the next.
    pub fn chain(stages: &[(&str, &str)]) -> Self {
        let nodes = stages
            .iter()
            .map(|(id, label)| GraphNode {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect();
        let edges = stages
            .windows(2)
            .map(|w| GraphEdge {
                from: w[0].0.to_string(),
                to: w[1].0.to_string(),
            })
            .collect();
        Self { nodes, edges }
    }

    /// The generic PV topology used for every plant:
    /// modules → strings → inverter → grid.
    pub fn pv_plant() -> Self {
        Self::chain(&[
            ("modules", "PV modules"),
            ("strings", "DC strings"),
            ("inverter", "Inverter"),
            ("grid", "Grid connection"),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    pub id: Uuid,
    pub anomaly_id: Uuid,
    pub plant_id: String,
    pub probable_causes: Vec<ProbableCause>,
    pub dependency_graph: DependencyGraph,
    pub recommended_actions: Vec<RecommendedAction>,
    pub created_at: DateTime<Utc>,
}
