//! Decision pipeline: the lifecycle state machine.
//!
//! Every decision sits behind its own mutex. A stage change is computed and
//! written while that mutex is held, so no transition is ever derived from a
//! stale stage. Lock order is decision first, then channels (inside the
//! ledger); nothing takes them the other way round.
//!
//! Submission and restore hold the catalog lock shared while they check
//! and insert; retiring a channel holds it exclusively, so a channel can
//! never be retired while a decision naming it is being created.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use brain_insights::{ApplicationRecorded, InsightError, InsightStore};
use brain_ledger::{LedgerReceipt, ResourceLedger};
use brain_policy::ModeController;
use brain_types::{
    ApplicationOutcome, Approver, BrainStatus, Channel, ChannelId, Confidence, Decision, DecisionId,
    EscalationRecord, GateVerdict, HealthStatus, InsightId, LedgerEffect, Signal, Stage,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{HealthConfig, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::events::{BrainEvent, EventBus};
use crate::reconcile::Settlement;

/// A completed decision and the insight applications it recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedDecision {
    pub decision: Decision,
    pub applications: Vec<ApplicationRecorded>,
}

#[derive(Debug)]
pub struct DecisionPipeline {
    decisions: DashMap<DecisionId, Arc<Mutex<Decision>>>,
    sequence: AtomicU64,
    catalog: RwLock<()>,
    clock: Arc<dyn Clock>,
    ledger: Arc<ResourceLedger>,
    insights: Arc<InsightStore>,
    controller: Arc<ModeController>,
    events: Arc<EventBus>,
    health: HealthConfig,
    stale_after_secs: i64,
}

impl DecisionPipeline {
    pub fn new(
        ledger: Arc<ResourceLedger>,
        insights: Arc<InsightStore>,
        controller: Arc<ModeController>,
        events: Arc<EventBus>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            decisions: DashMap::new(),
            sequence: AtomicU64::new(0),
            catalog: RwLock::new(()),
            clock: Arc::new(SystemClock),
            ledger,
            insights,
            controller,
            events,
            health: config.health.clone(),
            stale_after_secs: config.reconcile.stale_after_secs,
        }
    }

    /// Read time from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a decision in `signal-detected`.
    #[instrument(skip_all, fields(decision_type = %signal.decision_type, priority = ?signal.priority))]
    pub fn submit_signal(&self, signal: Signal) -> PipelineResult<Decision> {
        let _catalog = self.catalog.read();
        self.validate_signal(&signal)?;

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let decision = Decision::from_signal(sequence, signal, self.clock.now());
        self.decisions.insert(
            decision.id.clone(),
            Arc::new(Mutex::new(decision.clone())),
        );

        info!(decision_id = %decision.id, sequence, "Signal submitted");
        self.events.publish(BrainEvent::DecisionSubmitted {
            decision_id: decision.id.clone(),
            decision_type: decision.decision_type,
            priority: decision.priority,
        });
        Ok(decision)
    }

    /// Bring back a decision saved by an earlier process.
    ///
    /// The decision keeps its id, sequence, stage and history and is marked
    /// recovered; later submissions are numbered after it. Every channel and
    /// insight it names must already be registered.
    #[instrument(skip_all, fields(decision_id = %decision.id, stage = %decision.stage))]
    pub fn restore(&self, mut decision: Decision) -> PipelineResult<Decision> {
        let _catalog = self.catalog.read();
        if let Some(channel_id) = decision
            .affected_channel_ids
            .iter()
            .find(|id| !self.ledger.contains(id))
        {
            return Err(PipelineError::InvalidInput(format!(
                "restored decision {} names unknown channel {}",
                decision.id, channel_id
            )));
        }
        if let Some(insight_id) = decision
            .informed_by
            .iter()
            .find(|id| !self.insights.contains(id))
        {
            return Err(PipelineError::InvalidInput(format!(
                "restored decision {} names unknown insight {}",
                decision.id, insight_id
            )));
        }

        decision.recovered = true;
        match self.decisions.entry(decision.id.clone()) {
            Entry::Occupied(_) => {
                return Err(PipelineError::InvalidInput(format!(
                    "decision {} already exists",
                    decision.id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(decision.clone())));
            }
        }
        self.sequence.fetch_max(decision.sequence, Ordering::SeqCst);

        info!(sequence = decision.sequence, "Decision restored");
        Ok(decision)
    }

    /// Remove a channel from the ledger once no decision names it.
    ///
    /// Terminal decisions count too: their history keeps pointing at the
    /// channel.
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    pub fn retire_channel(&self, channel_id: &ChannelId) -> PipelineResult<Channel> {
        let _catalog = self.catalog.write();
        if let Some(decision_id) = self.first_reference(channel_id) {
            return Err(PipelineError::InvalidInput(format!(
                "{} is referenced by decision {}",
                channel_id, decision_id
            )));
        }
        Ok(self.ledger.retire_channel(channel_id)?)
    }

    /// Record the analysis result and move to `analyzing`.
    ///
    /// This is the only place `confidence` is written.
    #[instrument(skip_all, fields(decision_id = %decision_id, confidence = %confidence))]
    pub fn advance_to_analyzing(
        &self,
        decision_id: &DecisionId,
        confidence: Confidence,
        expected_outcome: Option<String>,
    ) -> PipelineResult<Decision> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();
        self.transition(&mut decision, Stage::Analyzing, "analyzer", None, self.clock.now())?;
        decision.confidence = Some(confidence);
        decision.expected_outcome = expected_outcome;
        Ok(decision.clone())
    }

    /// Move to `proposed` and consult the approval gate.
    ///
    /// An auto-approved decision is executed before this returns. If the
    /// ledger rejects it, the decision ends `failed` and the ledger error is
    /// returned.
    #[instrument(skip_all, fields(decision_id = %decision_id))]
    pub fn advance_to_proposed(&self, decision_id: &DecisionId) -> PipelineResult<Decision> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();
        let now = self.clock.now();
        self.transition(&mut decision, Stage::Proposed, "pipeline", None, now)?;

        let verdict = self.controller.evaluate(&decision);
        decision.gate = Some(verdict.clone());
        self.events.publish(BrainEvent::GateEvaluated {
            decision_id: decision_id.clone(),
            verdict: verdict.clone(),
        });

        match verdict {
            GateVerdict::AutoApprove { mode } => {
                self.execute(&mut decision, Approver::Policy { mode }, now)?;
            }
            GateVerdict::Hold { mode, reason } => {
                info!(mode = %mode, reason = %reason, "Decision held for approval");
            }
        }
        Ok(decision.clone())
    }

    /// Approve a held decision and apply it to the ledger.
    ///
    /// The decision lock is held across the ledger write, so a concurrent
    /// reject or escalate either lands before it or finds `executing`.
    #[instrument(skip_all, fields(decision_id = %decision_id, approver = %approver))]
    pub fn approve(&self, decision_id: &DecisionId, approver: Approver) -> PipelineResult<Decision> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();
        self.execute(&mut decision, approver, self.clock.now())?;
        Ok(decision.clone())
    }

    #[instrument(skip_all, fields(decision_id = %decision_id))]
    pub fn reject(&self, decision_id: &DecisionId, reason: &str) -> PipelineResult<Decision> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();
        self.transition(
            &mut decision,
            Stage::Rejected,
            "reviewer",
            Some(reason.to_string()),
            self.clock.now(),
        )?;
        Ok(decision.clone())
    }

    /// Close an executing decision and feed its insight applications back.
    ///
    /// Every insight id is checked before anything is written.
    #[instrument(skip_all, fields(decision_id = %decision_id, applications = applications.len()))]
    pub fn complete(
        &self,
        decision_id: &DecisionId,
        actual_result: impl Into<String>,
        applications: &[(InsightId, ApplicationOutcome)],
    ) -> PipelineResult<CompletedDecision> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();

        if !decision.stage.can_transition_to(Stage::Completed) {
            return Err(PipelineError::InvalidTransition {
                decision_id: decision_id.clone(),
                from: decision.stage,
                to: Stage::Completed,
            });
        }
        if let Some((missing, _)) = applications
            .iter()
            .find(|(insight_id, _)| !self.insights.contains(insight_id))
        {
            return Err(InsightError::InsightNotFound(missing.clone()).into());
        }

        let mut recorded = Vec::with_capacity(applications.len());
        for (insight_id, outcome) in applications {
            let result = self
                .insights
                .record_application(insight_id, decision_id, *outcome)?;
            self.events.publish(BrainEvent::insight_updated(&result));
            recorded.push(result);
        }

        decision.actual_result = Some(actual_result.into());
        self.transition(&mut decision, Stage::Completed, "pipeline", None, self.clock.now())?;

        Ok(CompletedDecision {
            decision: decision.clone(),
            applications: recorded,
        })
    }

    pub fn get(&self, decision_id: &DecisionId) -> PipelineResult<Decision> {
        let handle = self.handle(decision_id)?;
        let decision = handle.lock().clone();
        Ok(decision)
    }

    /// All decisions in submission order
    pub fn list(&self) -> Vec<Decision> {
        let mut decisions: Vec<Decision> =
            self.handles().iter().map(|h| h.lock().clone()).collect();
        decisions.sort_by_key(|d| d.sequence);
        decisions
    }

    pub fn list_by_stage(&self, stage: Stage) -> Vec<Decision> {
        self.list()
            .into_iter()
            .filter(|d| d.stage == stage)
            .collect()
    }

    /// Whether any decision, terminal or not, names the channel
    pub fn references_channel(&self, channel_id: &ChannelId) -> bool {
        self.first_reference(channel_id).is_some()
    }

    /// Aggregate the controller view from the live decision set.
    pub fn status(&self, now: DateTime<Utc>) -> BrainStatus {
        let mut active = 0;
        let mut approvals = 0;
        let mut executing = 0;
        let mut escalated = 0;
        let mut stale = 0;

        for handle in self.handles() {
            let decision = handle.lock();
            if !decision.is_terminal() {
                active += 1;
            }
            if decision.awaiting_approval() {
                approvals += 1;
            }
            match decision.stage {
                Stage::Executing => {
                    executing += 1;
                    if self.is_stale(&decision, now, self.stale_after_secs) {
                        stale += 1;
                    }
                }
                Stage::Escalated => escalated += 1,
                _ => {}
            }
        }

        BrainStatus {
            mode: self.controller.mode(),
            active_decision_count: active,
            approvals_required: approvals,
            executing_count: executing,
            escalated_count: escalated,
            stale_executing_count: stale,
            health_status: derive_health(&self.health, approvals, escalated, stale),
            updated_at: now,
        }
    }

    // ── Monitor and reconciler entry points ─────────────────────────

    pub(crate) fn escalate(
        &self,
        decision_id: &DecisionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool> {
        self.escalate_with(decision_id, now, |_| Some(reason.to_string()))
    }

    /// Escalate if `reason_for` still finds a reason under the lock.
    ///
    /// `Ok(false)` when the decision is already escalated or no longer
    /// qualifies; `InvalidTransition` when it has left the watched stages.
    pub(crate) fn escalate_with<F>(
        &self,
        decision_id: &DecisionId,
        now: DateTime<Utc>,
        reason_for: F,
    ) -> PipelineResult<bool>
    where
        F: FnOnce(&Decision) -> Option<String>,
    {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();

        if decision.stage == Stage::Escalated {
            debug!(decision_id = %decision_id, "Decision already escalated");
            return Ok(false);
        }
        if !decision.stage.is_escalatable() {
            return Err(PipelineError::InvalidTransition {
                decision_id: decision_id.clone(),
                from: decision.stage,
                to: Stage::Escalated,
            });
        }
        let Some(reason) = reason_for(&*decision) else {
            return Ok(false);
        };

        let from = self.transition(
            &mut decision,
            Stage::Escalated,
            "escalation-monitor",
            Some(reason.clone()),
            now,
        )?;
        decision.escalation = Some(EscalationRecord {
            reason: reason.clone(),
            escalated_at: now,
            from_stage: from,
        });

        warn!(decision_id = %decision_id, from = %from, reason = %reason, "Decision escalated");
        self.events.publish(BrainEvent::DecisionEscalated {
            decision_id: decision_id.clone(),
            from,
            reason,
        });
        Ok(true)
    }

    /// Settle a recovered decision that was left `executing`.
    ///
    /// Finished when the ledger already shows its effect. Otherwise it stays
    /// `executing` for a human to complete; the action is never applied a
    /// second time and the decision is never failed here.
    pub(crate) fn settle(
        &self,
        decision_id: &DecisionId,
        now: DateTime<Utc>,
    ) -> PipelineResult<Option<Settlement>> {
        let handle = self.handle(decision_id)?;
        let mut decision = handle.lock();
        if !decision.recovered
            || decision.stage != Stage::Executing
            || decision.actual_result.is_some()
        {
            return Ok(None);
        }

        if self.ledger.reflects(&decision)? {
            decision.actual_result =
                Some("reconciled: ledger reflects the applied action".to_string());
            self.transition(&mut decision, Stage::Completed, "reconciler", None, now)?;
            Ok(Some(Settlement::Finished))
        } else {
            warn!(
                decision_id = %decision_id,
                sequence = decision.sequence,
                "Recovered decision does not match the ledger; left for review"
            );
            Ok(Some(Settlement::NeedsReview))
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn handle(&self, decision_id: &DecisionId) -> PipelineResult<Arc<Mutex<Decision>>> {
        self.decisions
            .get(decision_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| PipelineError::DecisionNotFound(decision_id.clone()))
    }

    fn handles(&self) -> Vec<Arc<Mutex<Decision>>> {
        self.decisions.iter().map(|e| e.value().clone()).collect()
    }

    fn first_reference(&self, channel_id: &ChannelId) -> Option<DecisionId> {
        self.handles().iter().find_map(|h| {
            let decision = h.lock();
            decision
                .references_channel(channel_id)
                .then(|| decision.id.clone())
        })
    }

    fn is_stale(&self, decision: &Decision, now: DateTime<Utc>, stale_after_secs: i64) -> bool {
        decision.stage == Stage::Executing
            && decision.actual_result.is_none()
            && decision.dwell_secs(now) > stale_after_secs
    }

    fn validate_signal(&self, signal: &Signal) -> PipelineResult<()> {
        for channel_id in &signal.affected_channel_ids {
            if !self.ledger.contains(channel_id) {
                return Err(PipelineError::InvalidInput(format!(
                    "unknown channel {}",
                    channel_id
                )));
            }
        }

        for (channel_id, allocated) in &signal.requested_allocations {
            if !signal.affected_channel_ids.contains(channel_id) {
                return Err(PipelineError::InvalidInput(format!(
                    "allocation requested for {} which the signal does not affect",
                    channel_id
                )));
            }
            if !allocated.is_finite() {
                return Err(PipelineError::InvalidInput(format!(
                    "allocation for {} is not a finite number",
                    channel_id
                )));
            }
        }

        let effect = signal.decision_type.ledger_effect();
        if effect != LedgerEffect::None && signal.affected_channel_ids.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "{} signal must name at least one channel",
                signal.decision_type
            )));
        }
        if effect == LedgerEffect::Reallocate {
            if let Some(channel_id) = signal
                .affected_channel_ids
                .iter()
                .find(|id| !signal.requested_allocations.contains_key(*id))
            {
                return Err(PipelineError::InvalidInput(format!(
                    "no allocation requested for {}",
                    channel_id
                )));
            }
        }

        if let Some(insight_id) = signal
            .informed_by
            .iter()
            .find(|id| !self.insights.contains(id))
        {
            return Err(PipelineError::InvalidInput(format!(
                "unknown insight {}",
                insight_id
            )));
        }
        Ok(())
    }

    fn transition(
        &self,
        decision: &mut Decision,
        next: Stage,
        actor: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> PipelineResult<Stage> {
        let from = decision
            .transition_to(next, actor, note, at)
            .map_err(|err| PipelineError::transition(&decision.id, err))?;

        info!(decision_id = %decision.id, from = %from, to = %next, actor, "Decision stage changed");
        self.events.publish(BrainEvent::StageChanged {
            decision_id: decision.id.clone(),
            from,
            to: next,
            actor: actor.to_string(),
        });
        Ok(from)
    }

    fn execute(
        &self,
        decision: &mut Decision,
        approver: Approver,
        now: DateTime<Utc>,
    ) -> PipelineResult<LedgerReceipt> {
        self.transition(decision, Stage::Executing, &approver.to_string(), None, now)?;
        decision.approved_by = Some(approver);

        match self.ledger.apply(decision) {
            Ok(receipt) => {
                self.events.publish(BrainEvent::LedgerApplied {
                    decision_id: decision.id.clone(),
                    receipt: receipt.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                warn!(
                    decision_id = %decision.id,
                    kind = %err.kind(),
                    error = %err,
                    "Ledger rejected decision"
                );
                self.events.publish(BrainEvent::LedgerRejected {
                    decision_id: decision.id.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
                self.fail(decision, "ledger", err.to_string(), now)?;
                Err(err.into())
            }
        }
    }

    fn fail(
        &self,
        decision: &mut Decision,
        actor: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        self.transition(decision, Stage::Failed, actor, Some(message.clone()), now)?;
        decision.actual_result = Some(message);
        Ok(())
    }
}

fn derive_health(
    config: &HealthConfig,
    approvals: usize,
    escalated: usize,
    stale: usize,
) -> HealthStatus {
    if approvals >= config.critical_backlog || stale > 0 {
        HealthStatus::Critical
    } else if approvals >= config.warning_backlog || escalated > 0 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}
