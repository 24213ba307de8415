//! Insight types
//!
//! Insights are learned patterns with a reusable confidence score. Each use
//! by a decision is recorded as an [`InsightApplication`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Confidence;
use crate::ids::{ApplicationId, DecisionId, InsightId};

/// Kind of pattern an insight captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightType {
    ChannelPerformance,
    AudienceBehavior,
    OfferResponse,
    Timing,
    Constraint,
    Seasonality,
}

/// Result of applying an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationOutcome {
    Success,
    PartialSuccess,
    Pending,
    Failure,
}

impl ApplicationOutcome {
    /// Score the confidence update pulls toward; `None` while pending
    pub fn target(&self) -> Option<f64> {
        match self {
            Self::Success => Some(1.0),
            Self::PartialSuccess => Some(0.5),
            Self::Failure => Some(0.0),
            Self::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApplicationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial-success",
            Self::Pending => "pending",
            Self::Failure => "failure",
        };
        f.write_str(s)
    }
}

/// A learned pattern with a reusable confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub insight_type: InsightType,
    #[serde(default)]
    pub title: String,
    pub confidence_score: Confidence,
    #[serde(default)]
    pub application_count: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(id: impl Into<InsightId>, insight_type: InsightType, score: Confidence) -> Self {
        Self {
            id: id.into(),
            insight_type,
            title: String::new(),
            confidence_score: score,
            application_count: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// One use of an insight by a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightApplication {
    pub id: ApplicationId,
    pub insight_id: InsightId,
    pub decision_id: DecisionId,
    pub outcome: ApplicationOutcome,
    pub recorded_at: DateTime<Utc>,
    /// When the outcome left `pending`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}
