//! Channel and budget types
//!
//! Channels are allocation targets supplied by an external catalog. Their
//! budgets keep `remaining` and `utilization_percent` derived from
//! `allocated` and `spent`; the only way to change either input is through
//! a setter that recomputes both.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ChannelId;

/// Operating status of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Active,
    Paused,
    Optimizing,
    Constrained,
    Error,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Optimizing => "optimizing",
            Self::Constrained => "constrained",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct RawBudget {
    allocated: f64,
    #[serde(default)]
    spent: f64,
}

impl From<RawBudget> for ChannelBudget {
    fn from(raw: RawBudget) -> Self {
        ChannelBudget::new(raw.allocated, raw.spent)
    }
}

/// Budget state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBudget")]
pub struct ChannelBudget {
    allocated: f64,
    spent: f64,
    remaining: f64,
    utilization_percent: f64,
}

impl ChannelBudget {
    pub fn new(allocated: f64, spent: f64) -> Self {
        let mut budget = Self {
            allocated,
            spent,
            remaining: 0.0,
            utilization_percent: 0.0,
        };
        budget.recompute();
        budget
    }

    pub fn allocated(&self) -> f64 {
        self.allocated
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn utilization_percent(&self) -> f64 {
        self.utilization_percent
    }

    pub fn set_allocated(&mut self, allocated: f64) {
        self.allocated = allocated;
        self.recompute();
    }

    pub fn set_spent(&mut self, spent: f64) {
        self.spent = spent;
        self.recompute();
    }

    /// `remaining == allocated - spent` and `utilization == spent / allocated * 100`
    pub fn is_consistent(&self) -> bool {
        self.remaining == self.allocated - self.spent
            && self.utilization_percent == utilization(self.allocated, self.spent)
    }

    fn recompute(&mut self) {
        self.remaining = self.allocated - self.spent;
        self.utilization_percent = utilization(self.allocated, self.spent);
    }
}

fn utilization(allocated: f64, spent: f64) -> f64 {
    if allocated == 0.0 {
        0.0
    } else {
        spent / allocated * 100.0
    }
}

/// A budget-bearing allocation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ChannelStatus,
    pub budget: ChannelBudget,
    /// Overrides the ledger-wide lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_budget: Option<f64>,
    /// Overrides the ledger-wide upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_budget: Option<f64>,
    /// Sequence of the last decision applied to this channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_sequence: Option<u64>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: impl Into<ChannelId>, allocated: f64, spent: f64) -> Self {
        let id = id.into();
        Self {
            name: id.as_str().to_string(),
            id,
            status: ChannelStatus::Active,
            budget: ChannelBudget::new(allocated, spent),
            min_budget: None,
            max_budget: None,
            last_applied_sequence: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_status(mut self, status: ChannelStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_bounds(mut self, min_budget: Option<f64>, max_budget: Option<f64>) -> Self {
        self.min_budget = min_budget;
        self.max_budget = max_budget;
        self
    }
}
