//! Brain events
//!
//! Every mutation of the decision set, the ledger, the insight store or the
//! mode is published on a broadcast channel. Publishing never fails: with
//! no subscribers the event is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use brain_insights::ApplicationRecorded;
use brain_ledger::LedgerReceipt;
use brain_types::{
    ApplicationId, BrainMode, ChannelId, Confidence, DecisionId, DecisionType, ErrorKind,
    GateVerdict, InsightId, Priority, Stage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Envelope wrapping every brain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainEventEnvelope {
    /// Monotonic per-bus sequence number
    pub sequence: u64,

    pub timestamp: DateTime<Utc>,

    pub event: BrainEvent,
}

/// Brain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrainEvent {
    DecisionSubmitted {
        decision_id: DecisionId,
        decision_type: DecisionType,
        priority: Priority,
    },

    StageChanged {
        decision_id: DecisionId,
        from: Stage,
        to: Stage,
        actor: String,
    },

    GateEvaluated {
        decision_id: DecisionId,
        verdict: GateVerdict,
    },

    DecisionEscalated {
        decision_id: DecisionId,
        from: Stage,
        reason: String,
    },

    LedgerApplied {
        decision_id: DecisionId,
        receipt: LedgerReceipt,
    },

    LedgerRejected {
        decision_id: DecisionId,
        kind: ErrorKind,
        message: String,
    },

    InsightUpdated {
        insight_id: InsightId,
        application_id: ApplicationId,
        decision_id: DecisionId,
        previous_score: Confidence,
        score: Confidence,
    },

    ModeSwitched {
        previous: BrainMode,
        current: BrainMode,
    },

    ChannelRetired {
        channel_id: ChannelId,
    },
}

impl BrainEvent {
    pub fn insight_updated(recorded: &ApplicationRecorded) -> Self {
        Self::InsightUpdated {
            insight_id: recorded.insight.id.clone(),
            application_id: recorded.application.id.clone(),
            decision_id: recorded.application.decision_id.clone(),
            previous_score: recorded.previous_score,
            score: recorded.insight.confidence_score,
        }
    }
}

/// Broadcast bus for brain events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BrainEventEnvelope>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: BrainEvent) {
        let envelope = BrainEventEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Utc::now(),
            event,
        };
        // No receivers is fine
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrainEventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
