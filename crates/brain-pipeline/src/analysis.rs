//! Analysis seam
//!
//! Scoring models live outside the brain. An [`Analyzer`] only has to
//! return a confidence in `[0, 1]` and optional free text.

use std::sync::Arc;

use async_trait::async_trait;
use brain_insights::InsightStore;
use brain_types::{Confidence, Decision};
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;

/// Result of analysing a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub confidence: Confidence,
    pub expected_outcome: Option<String>,
}

/// Scores a decision before it is proposed
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, decision: &Decision) -> PipelineResult<Analysis>;
}

/// Always returns the same analysis
#[derive(Debug, Clone)]
pub struct FixedAnalyzer {
    analysis: Analysis,
}

impl FixedAnalyzer {
    pub fn new(confidence: Confidence, expected_outcome: Option<String>) -> Self {
        Self {
            analysis: Analysis {
                confidence,
                expected_outcome,
            },
        }
    }
}

#[async_trait]
impl Analyzer for FixedAnalyzer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn analyze(&self, _decision: &Decision) -> PipelineResult<Analysis> {
        Ok(self.analysis.clone())
    }
}

/// Mean score of the insights a decision is informed by.
///
/// Falls back to `prior` when the decision names none.
#[derive(Debug)]
pub struct InsightWeightedAnalyzer {
    insights: Arc<InsightStore>,
    prior: Confidence,
}

impl InsightWeightedAnalyzer {
    pub fn new(insights: Arc<InsightStore>, prior: Confidence) -> Self {
        Self { insights, prior }
    }
}

#[async_trait]
impl Analyzer for InsightWeightedAnalyzer {
    fn name(&self) -> &str {
        "insight-weighted"
    }

    async fn analyze(&self, decision: &Decision) -> PipelineResult<Analysis> {
        let scores = decision
            .informed_by
            .iter()
            .map(|id| self.insights.get(id).map(|i| i.confidence_score.value()))
            .collect::<Result<Vec<f64>, _>>()?;

        if scores.is_empty() {
            return Ok(Analysis {
                confidence: self.prior,
                expected_outcome: Some(format!("{} scored at prior", decision.decision_type)),
            });
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        Ok(Analysis {
            confidence: Confidence::clamped(mean),
            expected_outcome: Some(format!(
                "{} backed by {} insight(s)",
                decision.decision_type,
                scores.len()
            )),
        })
    }
}
