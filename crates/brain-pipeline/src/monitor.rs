//! Escalation monitor
//!
//! Each sweep reads the decision set, queues an escalation request for
//! every `analyzing` or `proposed` decision past its dwell-time limit, then
//! drains the queue. The timeout is evaluated again under the decision's
//! lock, so a decision approved or rejected between the read and the write
//! is left alone. Requests that fail for any other reason stay queued for
//! the next sweep.

use std::collections::VecDeque;
use std::sync::Arc;

use brain_types::{Decision, DecisionId, ErrorKind, Priority};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::config::EscalationConfig;
use crate::error::PipelineResult;
use crate::pipeline::DecisionPipeline;

/// Attempts before a failing request is dropped
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Trigger {
    Timeout,
    Manual(String),
}

#[derive(Debug, Clone)]
struct EscalationRequest {
    decision_id: DecisionId,
    trigger: Trigger,
    attempts: u32,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Decisions in a watched stage when the sweep started
    pub scanned: usize,
    pub escalated: Vec<DecisionId>,
    /// Requests that turned out to need nothing
    pub skipped: usize,
    /// Requests kept for the next sweep
    pub pending_retry: usize,
}

#[derive(Debug)]
pub struct EscalationMonitor {
    pipeline: Arc<DecisionPipeline>,
    config: EscalationConfig,
    queue: Mutex<VecDeque<EscalationRequest>>,
}

impl EscalationMonitor {
    pub fn new(pipeline: Arc<DecisionPipeline>, config: EscalationConfig) -> Self {
        Self {
            pipeline,
            config,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Requests waiting for the next sweep
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(self.pipeline.now())
    }

    #[instrument(skip_all, fields(now = %now))]
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let watched: Vec<Decision> = self
            .pipeline
            .list()
            .into_iter()
            .filter(|d| d.stage.is_escalatable())
            .collect();
        let scanned = watched.len();

        {
            let mut queue = self.queue.lock();
            for decision in watched
                .iter()
                .filter(|d| timeout_reason(d, now, &self.config).is_some())
            {
                if !queue.iter().any(|r| r.decision_id == decision.id) {
                    queue.push_back(EscalationRequest {
                        decision_id: decision.id.clone(),
                        trigger: Trigger::Timeout,
                        attempts: 0,
                    });
                }
            }
        }

        let report = self.drain(now, scanned);
        if !report.escalated.is_empty() {
            info!(escalated = report.escalated.len(), "Escalation sweep raised escalations");
        }
        report
    }

    /// Escalate one decision on request.
    ///
    /// `Ok(false)` when it was already escalated.
    pub fn escalate_now(&self, decision_id: &DecisionId, reason: &str) -> PipelineResult<bool> {
        let request = EscalationRequest {
            decision_id: decision_id.clone(),
            trigger: Trigger::Manual(reason.to_string()),
            attempts: 0,
        };
        self.process(&request, self.pipeline.now())
    }

    fn drain(&self, now: DateTime<Utc>, scanned: usize) -> SweepReport {
        let requests: Vec<EscalationRequest> = self.queue.lock().drain(..).collect();
        let mut report = SweepReport {
            scanned,
            ..Default::default()
        };
        let mut retry = Vec::new();

        for mut request in requests {
            match self.process(&request, now) {
                Ok(true) => report.escalated.push(request.decision_id),
                Ok(false) => report.skipped += 1,
                Err(e) if e.kind() == ErrorKind::InvalidTransition => {
                    debug!(
                        decision_id = %request.decision_id,
                        "Decision left its watched stage before escalation"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    request.attempts += 1;
                    if request.attempts >= MAX_ATTEMPTS {
                        error!(
                            decision_id = %request.decision_id,
                            attempts = request.attempts,
                            error = %e,
                            "Dropping escalation request"
                        );
                    } else {
                        error!(
                            decision_id = %request.decision_id,
                            attempts = request.attempts,
                            error = %e,
                            "Escalation failed, retrying next sweep"
                        );
                        retry.push(request);
                    }
                }
            }
        }

        report.pending_retry = retry.len();
        self.queue.lock().extend(retry);
        report
    }

    fn process(&self, request: &EscalationRequest, now: DateTime<Utc>) -> PipelineResult<bool> {
        match &request.trigger {
            Trigger::Timeout => self
                .pipeline
                .escalate_with(&request.decision_id, now, |d| {
                    timeout_reason(d, now, &self.config)
                }),
            Trigger::Manual(reason) => self.pipeline.escalate(&request.decision_id, reason, now),
        }
    }
}

/// Why a watched decision is overdue, if it is.
pub fn timeout_reason(
    decision: &Decision,
    now: DateTime<Utc>,
    config: &EscalationConfig,
) -> Option<String> {
    if !decision.stage.is_escalatable() {
        return None;
    }
    let dwell = decision.dwell_secs(now);
    if dwell > config.hard_timeout_secs {
        Some(format!(
            "{} for {}s, past the {}s hard timeout",
            decision.stage, dwell, config.hard_timeout_secs
        ))
    } else if decision.priority == Priority::High && dwell > config.high_priority_timeout_secs {
        Some(format!(
            "high-priority decision {} for {}s, past the {}s timeout",
            decision.stage, dwell, config.high_priority_timeout_secs
        ))
    } else {
        None
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
    use brain_types::{BrainMode, Confidence, DecisionType, Signal, Stage};
    use chrono::Duration;

    fn setup() -> (Arc<DecisionPipeline>, EscalationMonitor) {
        let pipeline = Arc::new(DecisionPipeline::new(
            Arc::new(ResourceLedger::new(LedgerConfig::default())),
            Arc::new(InsightStore::new(&InsightConfig::default()).unwrap()),
            Arc::new(ModeController::new(BrainMode::Training, GateConfig::default())),
            Arc::new(EventBus::default()),
            &PipelineConfig::default(),
        ));
        let monitor = EscalationMonitor::new(pipeline.clone(), EscalationConfig::default());
        (pipeline, monitor)
    }

    fn analyzing(pipeline: &DecisionPipeline, priority: Priority) -> DecisionId {
        let decision = pipeline
            .submit_signal(Signal::new(DecisionType::OfferEvolution).with_priority(priority))
            .unwrap();
        pipeline
            .advance_to_analyzing(&decision.id, Confidence::new(0.6).unwrap(), None)
            .unwrap();
        decision.id
    }

    #[test]
    fn test_timeouts_by_priority() {
        let (pipeline, monitor) = setup();
        let high = analyzing(&pipeline, Priority::High);
        let low = analyzing(&pipeline, Priority::Low);

        let report = monitor.sweep_at(Utc::now() + Duration::seconds(901));
        assert_eq!(report.scanned, 2);
        assert_eq!(report.escalated, vec![high.clone()]);
        assert_eq!(pipeline.get(&low).unwrap().stage, Stage::Analyzing);

        let report = monitor.sweep_at(Utc::now() + Duration::seconds(3601));
        assert_eq!(report.escalated, vec![low]);
    }

    #[test]
    fn test_second_sweep_leaves_escalated_unchanged() {
        let (pipeline, monitor) = setup();
        let id = analyzing(&pipeline, Priority::High);
        let later = Utc::now() + Duration::seconds(1000);

        monitor.sweep_at(later);
        let first = pipeline.get(&id).unwrap();
        let report = monitor.sweep_at(later + Duration::seconds(60));
        assert!(report.escalated.is_empty());
        assert_eq!(report.scanned, 0);
        assert_eq!(pipeline.get(&id).unwrap(), first);
        assert_eq!(monitor.pending(), 0);
    }

    #[test]
    fn test_dwell_resets_on_stage_change() {
        let (pipeline, monitor) = setup();
        let id = analyzing(&pipeline, Priority::High);
        pipeline.advance_to_proposed(&id).unwrap();
        let decision = pipeline.get(&id).unwrap();

        // Fresh in `proposed`: the earlier dwell in `analyzing` does not count
        assert!(timeout_reason(&decision, Utc::now() + Duration::seconds(10), monitor.config())
            .is_none());
        let report = monitor.sweep_at(Utc::now() + Duration::seconds(10));
        assert!(report.escalated.is_empty());
    }

    #[test]
    fn test_escalate_now_is_idempotent() {
        let (pipeline, monitor) = setup();
        let id = analyzing(&pipeline, Priority::Low);
        assert!(monitor.escalate_now(&id, "operator request").unwrap());
        assert!(!monitor.escalate_now(&id, "operator request").unwrap());
        assert_eq!(pipeline.list_by_stage(Stage::Escalated).len(), 1);
    }

    #[test]
    fn test_escalate_now_unknown_decision() {
        let (_, monitor) = setup();
        let err = monitor
            .escalate_now(&DecisionId::generate(), "operator request")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
