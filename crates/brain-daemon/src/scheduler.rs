//! Background sweeps
//!
//! The scheduler owns the two periodic loops: the escalation sweep and the
//! reconciliation sweep. Both run against the shared brain until `stop` is
//! called. When a snapshot path is set, state is saved after every
//! reconciliation sweep.

use std::path::PathBuf;
use std::sync::Arc;

use brain_pipeline::{BrainEvent, BrainEventEnvelope, StrategyBrain};
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};

use crate::error::DaemonResult;
use crate::snapshot::Snapshot;

/// Scheduler state
pub struct Scheduler {
    brain: Arc<StrategyBrain>,
    escalation_interval: Duration,
    reconcile_interval: Duration,
    snapshot_path: Option<PathBuf>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(brain: Arc<StrategyBrain>, snapshot_path: Option<PathBuf>) -> Arc<Self> {
        let escalation_secs = brain.monitor().config().interval_secs.max(1);
        let reconcile_secs = brain.reconciler().config().interval_secs.max(1);
        Arc::new(Self {
            brain,
            escalation_interval: Duration::from_secs(escalation_secs),
            reconcile_interval: Duration::from_secs(reconcile_secs),
            snapshot_path,
            running: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Write the brain's state to the snapshot path, if one is set
    pub fn save_snapshot(&self) -> DaemonResult<()> {
        if let Some(path) = &self.snapshot_path {
            Snapshot::capture(&self.brain).save(path)?;
        }
        Ok(())
    }

    /// Run both sweep loops until `stop` is called
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            escalation_interval_secs = self.escalation_interval.as_secs(),
            reconcile_interval_secs = self.reconcile_interval.as_secs(),
            "Scheduler started"
        );

        let escalation_scheduler = self.clone();
        let escalation_handle = tokio::spawn(async move {
            let mut interval = interval(escalation_scheduler.escalation_interval);

            loop {
                interval.tick().await;

                if !escalation_scheduler.is_running().await {
                    break;
                }

                let report = escalation_scheduler.brain.monitor().sweep();
                if !report.escalated.is_empty() || report.pending_retry > 0 {
                    tracing::info!(
                        scanned = report.scanned,
                        escalated = report.escalated.len(),
                        pending_retry = report.pending_retry,
                        "Escalation sweep"
                    );
                }
            }
        });

        let reconcile_scheduler = self.clone();
        let reconcile_handle = tokio::spawn(async move {
            let mut interval = interval(reconcile_scheduler.reconcile_interval);

            loop {
                interval.tick().await;

                if !reconcile_scheduler.is_running().await {
                    break;
                }

                let report = reconcile_scheduler.brain.reconciler().sweep();
                if !report.finished.is_empty() || !report.needs_review.is_empty() {
                    tracing::info!(
                        finished = report.finished.len(),
                        needs_review = report.needs_review.len(),
                        "Reconciliation sweep"
                    );
                }

                if let Err(e) = reconcile_scheduler.save_snapshot() {
                    tracing::error!(error = %e, "Failed to save snapshot");
                }
            }
        });

        let _ = tokio::join!(escalation_handle, reconcile_handle);

        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }
}

/// Log brain events until the bus closes
pub async fn log_events(mut events: broadcast::Receiver<BrainEventEnvelope>) {
    loop {
        match events.recv().await {
            Ok(envelope) => log_event(&envelope),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed = missed, "Event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_event(envelope: &BrainEventEnvelope) {
    let sequence = envelope.sequence;
    match &envelope.event {
        BrainEvent::DecisionEscalated {
            decision_id,
            reason,
            ..
        } => {
            tracing::warn!(sequence, decision_id = %decision_id, reason = %reason, "Decision escalated");
        }
        BrainEvent::LedgerRejected {
            decision_id,
            message,
            ..
        } => {
            tracing::warn!(sequence, decision_id = %decision_id, message = %message, "Ledger rejected decision");
        }
        event => match serde_json::to_string(event) {
            Ok(json) => tracing::debug!(sequence, event = %json, "Brain event"),
            Err(e) => tracing::error!(sequence, error = %e, "Failed to encode event"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_pipeline::BrainSettings;
    use brain_types::{BrainMode, Channel, Confidence, DecisionType, Signal, Stage};

    fn brain() -> Arc<StrategyBrain> {
        let mut settings = BrainSettings {
            mode: BrainMode::Autonomous,
            ..Default::default()
        };
        settings.pipeline.escalation.interval_secs = 1;
        settings.pipeline.reconcile.interval_secs = 1;
        let brain = StrategyBrain::new(&settings).unwrap();
        brain
            .register_channel(Channel::new("email", 10_000.0, 4_000.0))
            .unwrap();
        Arc::new(brain)
    }

    #[tokio::test]
    async fn test_scheduler_stops() {
        let scheduler = Scheduler::new(brain(), None);
        let handle = tokio::spawn(scheduler.clone().start());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_reconcile_loop_leaves_live_decisions_and_saves_state() {
        let dir = std::env::temp_dir().join(format!("braind-scheduler-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        let brain = brain();
        let decision = brain
            .submit_signal(Signal::new(DecisionType::ChannelPause).with_channel("email"))
            .unwrap();
        brain
            .advance_to_analyzing(&decision.id, Confidence::new(0.9).unwrap(), None)
            .unwrap();
        assert_eq!(brain.propose(&decision.id).unwrap().stage, Stage::Executing);

        let scheduler = Scheduler::new(brain.clone(), Some(path.clone()));
        let handle = tokio::spawn(scheduler.clone().start());

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        // Only the caller closes a decision it is still executing
        assert_eq!(
            brain.get_decision(&decision.id).unwrap().stage,
            Stage::Executing
        );
        let completed = brain.complete(&decision.id, "paused", &[]).unwrap();
        assert_eq!(completed.decision.actual_result.as_deref(), Some("paused"));

        let saved = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(saved.decisions.len(), 1);
        assert_eq!(saved.decisions[0].id, decision.id);
        assert_eq!(saved.channels.len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
