//! Reconciliation sweep over recovered executing decisions
//!
//! A decision is applied to the ledger and completed in two separate steps,
//! so a process that stops in between leaves it `executing`. After a
//! restart the restored decision is settled here: finished when the ledger
//! already shows its effect, otherwise left `executing` and reported for a
//! human to complete. Decisions submitted by this process are never
//! touched, and the action itself is never applied a second time.

use std::sync::Arc;

use brain_types::{DecisionId, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ReconcileConfig;
use crate::pipeline::DecisionPipeline;

/// What the sweep did with a recovered decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Settlement {
    Finished,
    NeedsReview,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub finished: Vec<DecisionId>,
    /// Still `executing`; the ledger does not show their effect
    pub needs_review: Vec<DecisionId>,
}

#[derive(Debug)]
pub struct Reconciler {
    pipeline: Arc<DecisionPipeline>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(pipeline: Arc<DecisionPipeline>, config: ReconcileConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn sweep(&self) -> ReconcileReport {
        self.sweep_at(self.pipeline.now())
    }

    /// Settle every recovered decision still waiting in `executing`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> ReconcileReport {
        let candidates: Vec<DecisionId> = self
            .pipeline
            .list_by_stage(Stage::Executing)
            .into_iter()
            .filter(|d| d.recovered && d.actual_result.is_none())
            .map(|d| d.id)
            .collect();

        let mut report = ReconcileReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for decision_id in candidates {
            match self.pipeline.settle(&decision_id, now) {
                Ok(Some(Settlement::Finished)) => report.finished.push(decision_id),
                Ok(Some(Settlement::NeedsReview)) => report.needs_review.push(decision_id),
                Ok(None) => {}
                Err(e) => {
                    error!(decision_id = %decision_id, error = %e, "Failed to reconcile decision");
                }
            }
        }

        if !report.finished.is_empty() {
            info!(finished = report.finished.len(), "Reconciled recovered decisions");
        }
        if !report.needs_review.is_empty() {
            warn!(
                needs_review = report.needs_review.len(),
                "Recovered decisions waiting for a human to complete them"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::events::EventBus;
    use brain_insights::{InsightConfig, InsightStore};
    use brain_ledger::{LedgerConfig, ResourceLedger};
    use brain_policy::{GateConfig, ModeController};
    use brain_types::{BrainMode, Channel, ChannelId, Confidence, Decision, DecisionType, Signal};
    use chrono::Duration;

    struct Fixture {
        ledger: Arc<ResourceLedger>,
        pipeline: Arc<DecisionPipeline>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(ResourceLedger::new(LedgerConfig::default()));
        ledger
            .register_channel(Channel::new("display", 8_000.0, 2_000.0))
            .unwrap();
        let insights = Arc::new(InsightStore::new(&InsightConfig::default()).unwrap());
        let controller = Arc::new(ModeController::new(
            BrainMode::Autonomous,
            GateConfig::default(),
        ));
        let pipeline = Arc::new(DecisionPipeline::new(
            ledger.clone(),
            insights,
            controller,
            Arc::new(EventBus::default()),
            &PipelineConfig::default(),
        ));
        let reconciler = Reconciler::new(
            pipeline.clone(),
            ReconcileConfig {
                interval_secs: 60,
                stale_after_secs: 120,
            },
        );
        Fixture {
            ledger,
            pipeline,
            reconciler,
        }
    }

    fn executing(f: &Fixture, allocated: f64) -> Decision {
        let decision = f
            .pipeline
            .submit_signal(
                Signal::new(DecisionType::BudgetReallocation).with_allocation("display", allocated),
            )
            .unwrap();
        f.pipeline
            .advance_to_analyzing(&decision.id, Confidence::new(0.9).unwrap(), None)
            .unwrap();
        let decision = f.pipeline.advance_to_proposed(&decision.id).unwrap();
        assert_eq!(decision.stage, Stage::Executing);
        decision
    }

    /// An executing decision as an earlier process would have saved it
    fn saved_executing(allocated: f64) -> Decision {
        let other = fixture();
        executing(&other, allocated)
    }

    #[test]
    fn test_live_executing_decisions_are_never_settled() {
        let f = fixture();
        let decision = executing(&f, 9_000.0);
        let long_after = Utc::now() + Duration::days(7);

        let report = f.reconciler.sweep_at(long_after);
        assert_eq!(report.examined, 0);
        assert_eq!(f.pipeline.get(&decision.id).unwrap().stage, Stage::Executing);

        // The caller can still close it and feed back
        let completed = f.pipeline.complete(&decision.id, "lift +4%", &[]).unwrap();
        assert_eq!(completed.decision.actual_result.as_deref(), Some("lift +4%"));
    }

    #[test]
    fn test_finishes_recovered_decision_the_ledger_reflects() {
        let f = fixture();
        let saved = saved_executing(9_000.0);
        // The allocation landed before the old process stopped
        f.ledger.apply(&saved).unwrap();
        f.pipeline.restore(saved.clone()).unwrap();

        let report = f.reconciler.sweep();
        assert_eq!(report.finished, vec![saved.id.clone()]);
        let decision = f.pipeline.get(&saved.id).unwrap();
        assert_eq!(decision.stage, Stage::Completed);
        assert!(decision.actual_result.unwrap().starts_with("reconciled"));

        // Idempotent: nothing left to settle
        let again = f.reconciler.sweep();
        assert_eq!(again.examined, 0);
    }

    #[test]
    fn test_unreflected_recovered_decision_waits_for_review() {
        let f = fixture();
        let saved = saved_executing(9_000.0);
        f.pipeline.restore(saved.clone()).unwrap();

        let report = f.reconciler.sweep();
        assert_eq!(report.needs_review, vec![saved.id.clone()]);
        assert!(report.finished.is_empty());

        let decision = f.pipeline.get(&saved.id).unwrap();
        assert_eq!(decision.stage, Stage::Executing);
        assert!(decision.actual_result.is_none());
        // Never applied a second time
        let channel = f.ledger.get_channel(&ChannelId::new("display")).unwrap();
        assert_eq!(channel.budget.allocated(), 8_000.0);

        // Still reported until someone closes it
        assert_eq!(f.reconciler.sweep().needs_review, vec![saved.id.clone()]);
        f.pipeline
            .complete(&saved.id, "checked by hand", &[])
            .unwrap();
        assert_eq!(f.reconciler.sweep().examined, 0);
    }
}
