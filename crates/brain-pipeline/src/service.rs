//! Strategy Brain service: the operation surface over all components.

use std::sync::Arc;

use brain_insights::{ApplicationRecorded, InsightConfig, InsightStore};
use brain_ledger::{LedgerConfig, ResourceLedger};
use brain_policy::{GateConfig, ModeController, ModeSwitch};
use brain_types::{
    ApplicationId, ApplicationOutcome, Approver, BrainMode, BrainStatus, Channel, ChannelId,
    Confidence, Decision, DecisionId, DecisionType, Insight, InsightId, Priority, Signal, Stage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::analysis::{Analyzer, InsightWeightedAnalyzer};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{BrainEvent, BrainEventEnvelope, EventBus};
use crate::monitor::{EscalationMonitor, SweepReport};
use crate::pipeline::{CompletedDecision, DecisionPipeline};
use crate::reconcile::{ReconcileReport, Reconciler};

/// Everything needed to assemble a brain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainSettings {
    #[serde(default)]
    pub mode: BrainMode,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub insights: InsightConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

pub struct StrategyBrain {
    ledger: Arc<ResourceLedger>,
    insights: Arc<InsightStore>,
    controller: Arc<ModeController>,
    pipeline: Arc<DecisionPipeline>,
    monitor: Arc<EscalationMonitor>,
    reconciler: Arc<Reconciler>,
    analyzer: Arc<dyn Analyzer>,
    events: Arc<EventBus>,
}

impl StrategyBrain {
    /// Assemble a brain with the insight-weighted analyzer
    pub fn new(settings: &BrainSettings) -> PipelineResult<Self> {
        Self::new_with_clock(settings, Arc::new(SystemClock))
    }

    /// Assemble a brain that reads all of its time from `clock`
    pub fn new_with_clock(settings: &BrainSettings, clock: Arc<dyn Clock>) -> PipelineResult<Self> {
        let prior = Confidence::new(settings.insights.default_confidence).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "default confidence {} outside [0, 1]",
                settings.insights.default_confidence
            ))
        })?;

        let ledger = Arc::new(ResourceLedger::new(settings.ledger.clone()));
        let insights = Arc::new(InsightStore::new(&settings.insights)?);
        let controller = Arc::new(ModeController::new(settings.mode, settings.gate.clone()));
        let events = Arc::new(EventBus::new(settings.pipeline.events.capacity));
        let pipeline = Arc::new(
            DecisionPipeline::new(
                ledger.clone(),
                insights.clone(),
                controller.clone(),
                events.clone(),
                &settings.pipeline,
            )
            .with_clock(clock),
        );
        let monitor = Arc::new(EscalationMonitor::new(
            pipeline.clone(),
            settings.pipeline.escalation.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            pipeline.clone(),
            settings.pipeline.reconcile.clone(),
        ));
        let analyzer = Arc::new(InsightWeightedAnalyzer::new(insights.clone(), prior));

        info!(mode = %settings.mode, "Strategy brain assembled");
        Ok(Self {
            ledger,
            insights,
            controller,
            pipeline,
            monitor,
            reconciler,
            analyzer,
            events,
        })
    }

    /// Swap the analysis model
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    // ── Catalog ─────────────────────────────────────────────────────

    pub fn register_channel(&self, channel: Channel) -> PipelineResult<()> {
        Ok(self.ledger.register_channel(channel)?)
    }

    pub fn register_insight(&self, insight: Insight) -> PipelineResult<()> {
        Ok(self.insights.register_insight(insight)?)
    }

    /// Remove a channel no decision refers to.
    pub fn retire_channel(&self, channel_id: &ChannelId) -> PipelineResult<Channel> {
        let channel = self.pipeline.retire_channel(channel_id)?;
        self.events.publish(BrainEvent::ChannelRetired {
            channel_id: channel_id.clone(),
        });
        Ok(channel)
    }

    // ── Decision lifecycle ──────────────────────────────────────────

    pub fn submit_signal(&self, signal: Signal) -> PipelineResult<Decision> {
        self.pipeline.submit_signal(signal)
    }

    /// Bring back a decision saved by an earlier process
    pub fn restore_decision(&self, decision: Decision) -> PipelineResult<Decision> {
        self.pipeline.restore(decision)
    }

    /// Run the configured analyzer and move the decision to `analyzing`.
    #[instrument(skip_all, fields(decision_id = %decision_id, analyzer = self.analyzer.name()))]
    pub async fn analyze(&self, decision_id: &DecisionId) -> PipelineResult<Decision> {
        let decision = self.pipeline.get(decision_id)?;
        if decision.stage != Stage::SignalDetected {
            return Err(PipelineError::InvalidTransition {
                decision_id: decision_id.clone(),
                from: decision.stage,
                to: Stage::Analyzing,
            });
        }
        let analysis = self.analyzer.analyze(&decision).await?;
        self.pipeline
            .advance_to_analyzing(decision_id, analysis.confidence, analysis.expected_outcome)
    }

    pub fn advance_to_analyzing(
        &self,
        decision_id: &DecisionId,
        confidence: Confidence,
        expected_outcome: Option<String>,
    ) -> PipelineResult<Decision> {
        self.pipeline
            .advance_to_analyzing(decision_id, confidence, expected_outcome)
    }

    pub fn propose(&self, decision_id: &DecisionId) -> PipelineResult<Decision> {
        self.pipeline.advance_to_proposed(decision_id)
    }

    pub fn approve(&self, decision_id: &DecisionId, approver: Approver) -> PipelineResult<Decision> {
        self.pipeline.approve(decision_id, approver)
    }

    pub fn reject(&self, decision_id: &DecisionId, reason: &str) -> PipelineResult<Decision> {
        self.pipeline.reject(decision_id, reason)
    }

    pub fn complete(
        &self,
        decision_id: &DecisionId,
        actual_result: impl Into<String>,
        applications: &[(InsightId, ApplicationOutcome)],
    ) -> PipelineResult<CompletedDecision> {
        self.pipeline
            .complete(decision_id, actual_result, applications)
    }

    /// Hand a decision to a human reviewer now
    pub fn escalate(&self, decision_id: &DecisionId, reason: &str) -> PipelineResult<bool> {
        self.monitor.escalate_now(decision_id, reason)
    }

    pub fn get_decision(&self, decision_id: &DecisionId) -> PipelineResult<Decision> {
        self.pipeline.get(decision_id)
    }

    pub fn list_decisions(&self) -> Vec<Decision> {
        self.pipeline.list()
    }

    // ── Controller ──────────────────────────────────────────────────

    pub fn switch_mode(&self, mode: BrainMode) -> ModeSwitch {
        let switch = self.controller.switch_mode(mode);
        self.events.publish(BrainEvent::ModeSwitched {
            previous: switch.previous,
            current: switch.current,
        });
        switch
    }

    pub fn get_brain_status(&self) -> BrainStatus {
        self.pipeline.status(self.pipeline.now())
    }

    // ── Ledger and insights ─────────────────────────────────────────

    /// Set a channel's allocation through a synthesized reallocation.
    ///
    /// The request itself counts as the operator's approval, so the
    /// decision executes in every mode. A ledger rejection leaves the
    /// decision `failed` and is returned.
    #[instrument(skip_all, fields(channel_id = %channel_id, new_allocated = new_allocated, operator = %operator))]
    pub fn adjust_channel_budget(
        &self,
        channel_id: &ChannelId,
        new_allocated: f64,
        operator: &str,
    ) -> PipelineResult<Decision> {
        let signal = Signal::new(DecisionType::BudgetReallocation)
            .with_priority(Priority::Medium)
            .with_summary(format!("set {} allocation to {}", channel_id, new_allocated))
            .with_metric("requested_allocation", new_allocated)
            .with_allocation(channel_id.clone(), new_allocated);

        let decision = self.pipeline.submit_signal(signal)?;
        self.pipeline.advance_to_analyzing(
            &decision.id,
            Confidence::clamped(1.0),
            Some(format!("{} allocated {}", channel_id, new_allocated)),
        )?;
        let decision = self.pipeline.advance_to_proposed(&decision.id)?;
        if decision.stage == Stage::Proposed {
            return self
                .pipeline
                .approve(&decision.id, Approver::human(operator));
        }
        Ok(decision)
    }

    pub fn record_insight_application(
        &self,
        insight_id: &InsightId,
        decision_id: &DecisionId,
        outcome: ApplicationOutcome,
    ) -> PipelineResult<ApplicationRecorded> {
        self.pipeline.get(decision_id)?;
        let recorded = self
            .insights
            .record_application(insight_id, decision_id, outcome)?;
        self.events.publish(BrainEvent::insight_updated(&recorded));
        Ok(recorded)
    }

    pub fn resolve_insight_application(
        &self,
        application_id: &ApplicationId,
        outcome: ApplicationOutcome,
    ) -> PipelineResult<ApplicationRecorded> {
        let recorded = self.insights.resolve_application(application_id, outcome)?;
        self.events.publish(BrainEvent::insight_updated(&recorded));
        Ok(recorded)
    }

    // ── Sweeps ──────────────────────────────────────────────────────

    pub fn sweep_escalations(&self, now: DateTime<Utc>) -> SweepReport {
        self.monitor.sweep_at(now)
    }

    pub fn reconcile(&self, now: DateTime<Utc>) -> ReconcileReport {
        self.reconciler.sweep_at(now)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    pub fn insights(&self) -> &Arc<InsightStore> {
        &self.insights
    }

    pub fn pipeline(&self) -> &Arc<DecisionPipeline> {
        &self.pipeline
    }

    pub fn monitor(&self) -> &Arc<EscalationMonitor> {
        &self.monitor
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.pipeline.now()
    }

    pub fn mode(&self) -> BrainMode {
        self.controller.mode()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrainEventEnvelope> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FixedAnalyzer;
    use brain_types::{ErrorKind, InsightType};

    fn brain(mode: BrainMode) -> StrategyBrain {
        let brain = StrategyBrain::new(&BrainSettings {
            mode,
            ..Default::default()
        })
        .unwrap();
        brain
            .register_channel(Channel::new("social", 6_000.0, 1_500.0))
            .unwrap();
        brain
            .register_insight(Insight::new(
                "promo-fatigue",
                InsightType::AudienceBehavior,
                Confidence::new(0.7).unwrap(),
            ))
            .unwrap();
        brain
    }

    #[tokio::test]
    async fn test_analyze_uses_configured_analyzer() {
        let brain = brain(BrainMode::Training).with_analyzer(Arc::new(FixedAnalyzer::new(
            Confidence::new(0.42).unwrap(),
            None,
        )));
        let decision = brain
            .submit_signal(Signal::new(DecisionType::OfferTesting))
            .unwrap();
        let analyzed = brain.analyze(&decision.id).await.unwrap();
        assert_eq!(analyzed.stage, Stage::Analyzing);
        assert_eq!(analyzed.confidence, Confidence::new(0.42));

        let err = brain.analyze(&decision.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_adjust_budget_runs_through_pipeline() {
        let brain = brain(BrainMode::Training);
        let decision = brain
            .adjust_channel_budget(&ChannelId::new("social"), 8_000.0, "ops")
            .unwrap();
        assert_eq!(decision.decision_type, DecisionType::BudgetReallocation);
        assert_eq!(decision.stage, Stage::Executing);
        assert_eq!(decision.approved_by, Some(Approver::human("ops")));
        let channel = brain.ledger().get_channel(&ChannelId::new("social")).unwrap();
        assert_eq!(channel.budget.allocated(), 8_000.0);
        assert_eq!(channel.budget.remaining(), 6_500.0);
    }

    #[test]
    fn test_retire_channel_blocked_by_referencing_decision() {
        let brain = brain(BrainMode::Training);
        brain
            .register_channel(Channel::new("print", 500.0, 0.0))
            .unwrap();
        let mut events = brain.subscribe();
        let decision = brain
            .submit_signal(Signal::new(DecisionType::ChannelPause).with_channel("social"))
            .unwrap();

        let err = brain.retire_channel(&ChannelId::new("social")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        brain
            .advance_to_analyzing(&decision.id, Confidence::new(0.5).unwrap(), None)
            .unwrap();
        brain.propose(&decision.id).unwrap();
        brain.reject(&decision.id, "not now").unwrap();

        // A rejected decision still names the channel
        let err = brain.retire_channel(&ChannelId::new("social")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert!(brain.retire_channel(&ChannelId::new("print")).is_ok());
        let remaining: Vec<_> = brain.ledger().list_channels().into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, vec![ChannelId::new("social")]);

        let retired = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e.event, BrainEvent::ChannelRetired { ref channel_id } if channel_id.as_str() == "print"));
        assert!(retired);
    }

    #[test]
    fn test_record_application_requires_known_decision() {
        let brain = brain(BrainMode::Training);
        let err = brain
            .record_insight_application(
                &InsightId::new("promo-fatigue"),
                &DecisionId::generate(),
                ApplicationOutcome::Success,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_mode_switch_is_published() {
        let brain = brain(BrainMode::Training);
        let mut events = brain.subscribe();
        let switch = brain.switch_mode(BrainMode::Supervised);
        assert_eq!(switch.previous, BrainMode::Training);
        assert_eq!(brain.get_brain_status().mode, BrainMode::Supervised);

        let envelope = events.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            BrainEvent::ModeSwitched {
                current: BrainMode::Supervised,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_prior_is_rejected() {
        let settings = BrainSettings {
            insights: InsightConfig {
                learning_rate: 0.2,
                default_confidence: 1.5,
            },
            ..Default::default()
        };
        assert!(StrategyBrain::new(&settings).is_err());
    }
}
