//! Cause and remediation tables per anomaly type.
//!
//! Causes and actions are data: each anomaly type selects a static playbook, and
//! impacts are derived from the anomaly's own numbers through a scaling rule.

use crate::detect::{Anomaly, AnomalyType};
use crate::rca::{Priority, ProbableCause, RecommendedAction};

/// How a cause's energy impact is derived from the anomaly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Impact {
    /// `|expected - actual|` scaled by the factor.
    Deviation(f64),
    /// The full expected value (nothing is being produced).
    Expected,
    None,
}

impl Impact {
    pub fn estimate(&self, anomaly: &Anomaly) -> f64 {
        match self {
            Impact::Deviation(factor) => {
                (anomaly.expected_value - anomaly.actual_value).abs() * factor
            }
            Impact::Expected => anomaly.expected_value,
            Impact::None => 0.0,
        }
    }
}

#[derive(Debug)]
pub struct CauseRule {
    pub cause: &'static str,
    pub confidence: f64,
    pub evidence: &'static str,
    pub impact: Impact,
}

#[derive(Debug)]
pub struct ActionRule {
    pub action: &'static str,
    pub priority: Priority,
    pub estimated_time_hours: f64,
    pub estimated_cost: f64,
}

#[derive(Debug)]
pub struct Playbook {
    pub causes: &'static [CauseRule],
    pub actions: &'static [ActionRule],
}

static GENERATION_DROP: Playbook = Playbook {
    causes: &[
        CauseRule {
            cause: "Module soiling",
            confidence: 0.7,
            evidence: "Output fell well below the window baseline under otherwise normal operation",
            impact: Impact::Deviation(1.0),
        },
        CauseRule {
            cause: "Abnormal shading",
            confidence: 0.5,
            evidence: "Localized power loss consistent with partial shading of the array",
            impact: Impact::Deviation(0.6),
        },
        CauseRule {
            cause: "Module degradation",
            confidence: 0.3,
            evidence: "Sustained reduction in output relative to historical production",
            impact: Impact::Deviation(0.4),
        },
    ],
    actions: &[
        ActionRule {
            action: "Perform visual inspection of the array",
            priority: Priority::High,
            estimated_time_hours: 2.0,
            estimated_cost: 150.0,
        },
        ActionRule {
            action: "Schedule panel cleaning",
            priority: Priority::Medium,
            estimated_time_hours: 4.0,
            estimated_cost: 300.0,
        },
    ],
};

static UNDERPERFORMANCE: Playbook = Playbook {
    causes: &[
        CauseRule {
            cause: "Inverter operating below rated capacity",
            confidence: 0.6,
            evidence: "Actual energy below the digital twin expectation",
            impact: Impact::Deviation(1.0),
        },
        CauseRule {
            cause: "Disconnected or faulty string",
            confidence: 0.5,
            evidence: "Energy shortfall matches the loss of one or more strings",
            impact: Impact::Deviation(0.7),
        },
    ],
    actions: &[
        ActionRule {
            action: "Inspect inverter alarms and event log",
            priority: Priority::Critical,
            estimated_time_hours: 1.0,
            estimated_cost: 0.0,
        },
        ActionRule {
            action: "Test string voltages and currents",
            priority: Priority::High,
            estimated_time_hours: 3.0,
            estimated_cost: 200.0,
        },
    ],
};

static DATA_GAP: Playbook = Playbook {
    causes: &[CauseRule {
        cause: "Monitoring communication failure",
        confidence: 0.8,
        evidence: "No telemetry received for longer than twice the sampling interval",
        impact: Impact::None,
    }],
    actions: &[ActionRule {
        action: "Check data logger power and network connectivity",
        priority: Priority::Medium,
        estimated_time_hours: 1.0,
        estimated_cost: 50.0,
    }],
};

static OFFLINE: Playbook = Playbook {
    causes: &[
        CauseRule {
            cause: "Breaker trip or grid fault",
            confidence: 0.7,
            evidence: "Plant output dropped to zero",
            impact: Impact::Expected,
        },
        CauseRule {
            cause: "Inverter protective shutdown",
            confidence: 0.6,
            evidence: "Plant output dropped to zero",
            impact: Impact::Expected,
        },
    ],
    actions: &[ActionRule {
        action: "Urgent on-site check of breakers and inverter",
        priority: Priority::Critical,
        estimated_time_hours: 2.0,
        estimated_cost: 250.0,
    }],
};

static EMPTY: Playbook = Playbook {
    causes: &[],
    actions: &[],
};

pub fn playbook_for(anomaly_type: AnomalyType) -> &'static Playbook {
    match anomaly_type {
        AnomalyType::GenerationDrop => &GENERATION_DROP,
        AnomalyType::Underperformance => &UNDERPERFORMANCE,
        AnomalyType::DataGap => &DATA_GAP,
        AnomalyType::Offline => &OFFLINE,
        AnomalyType::UnexpectedSpike | AnomalyType::Overperformance => &EMPTY,
    }
}

/// Causes ranked by confidence, highest first.
pub fn infer_causes(anomaly: &Anomaly) -> Vec<ProbableCause> {
    let mut causes: Vec<ProbableCause> = playbook_for(anomaly.anomaly_type)
        .causes
        .iter()
        .map(|rule| ProbableCause {
            cause: rule.cause.to_string(),
            confidence: rule.confidence,
            evidence: rule.evidence.to_string(),
            estimated_impact: rule.impact.estimate(anomaly),
        })
        .collect();
    causes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    causes
}

pub fn recommend_actions(anomaly: &Anomaly) -> Vec<RecommendedAction> {
    playbook_for(anomaly.anomaly_type)
        .actions
        .iter()
        .map(|rule| RecommendedAction {
            action: rule.action.to_string(),
            priority: rule.priority,
            estimated_time_hours: rule.estimated_time_hours,
            estimated_cost: rule.estimated_cost,
        })
        .collect()
}
