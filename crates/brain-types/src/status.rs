//! Controller mode and derived brain status

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much human approval the brain requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainMode {
    /// Every proposal waits for a human
    #[default]
    Training,
    /// Routine, confident proposals go through on their own
    Supervised,
    /// Everything goes through except low-confidence high-priority proposals
    Autonomous,
}

impl fmt::Display for BrainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Training => "training",
            Self::Supervised => "supervised",
            Self::Autonomous => "autonomous",
        };
        f.write_str(s)
    }
}

impl FromStr for BrainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "training" => Ok(Self::Training),
            "supervised" => Ok(Self::Supervised),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(format!("Unknown brain mode: {}", other)),
        }
    }
}

/// Coarse health of the decision pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Point-in-time view of the controller.
///
/// Every count is aggregated from the live decision set when the status is
/// requested; nothing here is stored and incremented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainStatus {
    pub mode: BrainMode,
    /// Decisions not yet in a terminal stage
    pub active_decision_count: usize,
    /// Proposed decisions held for a human
    pub approvals_required: usize,
    pub executing_count: usize,
    pub escalated_count: usize,
    /// Executing decisions left without a result past the stale threshold
    pub stale_executing_count: usize,
    pub health_status: HealthStatus,
    pub updated_at: DateTime<Utc>,
}
