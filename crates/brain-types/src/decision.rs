//! Decision types
//!
//! A decision is a unit of proposed or taken action. It is created from a
//! [`Signal`], scored by analysis, gated by the mode controller, applied to
//! the channel ledger and finally closed with an outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelStatus;
use crate::ids::{ChannelId, DecisionId, InsightId};
use crate::status::BrainMode;

/// What a decision does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionType {
    BudgetReallocation,
    ChannelPause,
    ChannelResume,
    OfferEvolution,
    ConstraintResponse,
    CampaignScale,
    OfferTesting,
}

/// The effect a decision type has on the channel ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Rewrite `allocated` on every affected channel
    Reallocate,
    /// Flip every affected channel to the given status
    SetStatus(ChannelStatus),
    /// Nothing to apply
    None,
}

impl DecisionType {
    pub fn ledger_effect(&self) -> LedgerEffect {
        match self {
            Self::BudgetReallocation | Self::CampaignScale => LedgerEffect::Reallocate,
            Self::ChannelPause => LedgerEffect::SetStatus(ChannelStatus::Paused),
            Self::ChannelResume => LedgerEffect::SetStatus(ChannelStatus::Active),
            Self::OfferEvolution | Self::ConstraintResponse | Self::OfferTesting => {
                LedgerEffect::None
            }
        }
    }

    /// Whether a decision of this type must name at least one channel
    pub fn touches_ledger(&self) -> bool {
        !matches!(self.ledger_effect(), LedgerEffect::None)
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BudgetReallocation => "budget-reallocation",
            Self::ChannelPause => "channel-pause",
            Self::ChannelResume => "channel-resume",
            Self::OfferEvolution => "offer-evolution",
            Self::ConstraintResponse => "constraint-response",
            Self::CampaignScale => "campaign-scale",
            Self::OfferTesting => "offer-testing",
        };
        f.write_str(s)
    }
}

/// Lifecycle stage of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SignalDetected,
    Analyzing,
    Proposed,
    Executing,
    Completed,
    Failed,
    Escalated,
    Rejected,
}

impl Stage {
    /// Terminal stages never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Escalated | Self::Rejected
        )
    }

    /// Stages the escalation monitor watches
    pub fn is_escalatable(&self) -> bool {
        matches!(self, Self::Analyzing | Self::Proposed)
    }

    /// The lifecycle edge table
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (SignalDetected, Analyzing)
                | (Analyzing, Proposed)
                | (Analyzing, Escalated)
                | (Proposed, Executing)
                | (Proposed, Rejected)
                | (Proposed, Escalated)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub const ALL: [Stage; 8] = [
        Stage::SignalDetected,
        Stage::Analyzing,
        Stage::Proposed,
        Stage::Executing,
        Stage::Completed,
        Stage::Failed,
        Stage::Escalated,
        Stage::Rejected,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SignalDetected => "signal-detected",
            Self::Analyzing => "analyzing",
            Self::Proposed => "proposed",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Decision priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A score in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Accepts only finite values inside `[0, 1]`
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Clamps into `[0, 1]`; NaN maps to 0
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("confidence {} outside [0, 1]", value))
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A metric snapshot value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Who let a decision through the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Approver {
    Human { name: String },
    Policy { mode: BrainMode },
}

impl Approver {
    pub fn human(name: impl Into<String>) -> Self {
        Self::Human { name: name.into() }
    }
}

impl fmt::Display for Approver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human { name } => write!(f, "human:{}", name),
            Self::Policy { mode } => write!(f, "policy:{}", mode),
        }
    }
}

/// Outcome of the approval gate at the `proposed` checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "kebab-case")]
pub enum GateVerdict {
    AutoApprove { mode: BrainMode },
    Hold { mode: BrainMode, reason: String },
}

impl GateVerdict {
    pub fn is_auto_approve(&self) -> bool {
        matches!(self, Self::AutoApprove { .. })
    }

    pub fn mode(&self) -> BrainMode {
        match self {
            Self::AutoApprove { mode } | Self::Hold { mode, .. } => *mode,
        }
    }
}

/// Why and when a decision was escalated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
    /// Stage the decision was in when it was escalated
    pub from_stage: Stage,
}

/// One audited stage change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Option<Stage>,
    pub to: Stage,
    pub at: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Rejected stage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move decision from {from} to {to}")]
pub struct StageTransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// The triggering observation that originates a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub decision_type: DecisionType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source_metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub affected_channel_ids: BTreeSet<ChannelId>,
    /// New `allocated` per channel for reallocating decision types
    #[serde(default)]
    pub requested_allocations: BTreeMap<ChannelId, f64>,
    /// Insights the analysis may draw on
    #[serde(default)]
    pub informed_by: BTreeSet<InsightId>,
}

impl Signal {
    pub fn new(decision_type: DecisionType) -> Self {
        Self {
            decision_type,
            priority: Priority::default(),
            summary: String::new(),
            source_metrics: BTreeMap::new(),
            affected_channel_ids: BTreeSet::new(),
            requested_allocations: BTreeMap::new(),
            informed_by: BTreeSet::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.source_metrics.insert(name.into(), value.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<ChannelId>) -> Self {
        self.affected_channel_ids.insert(channel_id.into());
        self
    }

    /// Names the channel and the allocation it should end up with
    pub fn with_allocation(mut self, channel_id: impl Into<ChannelId>, allocated: f64) -> Self {
        let channel_id = channel_id.into();
        self.affected_channel_ids.insert(channel_id.clone());
        self.requested_allocations.insert(channel_id, allocated);
        self
    }

    pub fn informed_by(mut self, insight_id: impl Into<InsightId>) -> Self {
        self.informed_by.insert(insight_id.into());
        self
    }
}

/// A proposed or executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    /// Submission order; ledger writes to one channel follow it
    pub sequence: u64,
    pub decision_type: DecisionType,
    pub stage: Stage,
    pub priority: Priority,
    pub summary: String,
    /// Set once, when analysis completes
    pub confidence: Option<Confidence>,
    pub source_metrics: BTreeMap<String, MetricValue>,
    pub affected_channel_ids: BTreeSet<ChannelId>,
    pub requested_allocations: BTreeMap<ChannelId, f64>,
    pub informed_by: BTreeSet<InsightId>,
    pub expected_outcome: Option<String>,
    /// Set once, when the decision reaches `completed` or `failed`
    pub actual_result: Option<String>,
    pub gate: Option<GateVerdict>,
    pub approved_by: Option<Approver>,
    pub escalation: Option<EscalationRecord>,
    pub created_at: DateTime<Utc>,
    pub stage_entered_at: DateTime<Utc>,
    pub history: Vec<StageTransition>,
    /// Restored from a snapshot rather than submitted in this process
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recovered: bool,
}

impl Decision {
    /// Create a decision in `signal-detected`
    pub fn from_signal(sequence: u64, signal: Signal, now: DateTime<Utc>) -> Self {
        Self {
            id: DecisionId::generate(),
            sequence,
            decision_type: signal.decision_type,
            stage: Stage::SignalDetected,
            priority: signal.priority,
            summary: signal.summary,
            confidence: None,
            source_metrics: signal.source_metrics,
            affected_channel_ids: signal.affected_channel_ids,
            requested_allocations: signal.requested_allocations,
            informed_by: signal.informed_by,
            expected_outcome: None,
            actual_result: None,
            gate: None,
            approved_by: None,
            escalation: None,
            created_at: now,
            stage_entered_at: now,
            history: vec![StageTransition {
                from: None,
                to: Stage::SignalDetected,
                at: now,
                actor: "sensor".to_string(),
                note: None,
            }],
            recovered: false,
        }
    }

    /// Move along one edge of the lifecycle table.
    ///
    /// Leaves the decision untouched when the edge does not exist.
    pub fn transition_to(
        &mut self,
        next: Stage,
        actor: impl Into<String>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Stage, StageTransitionError> {
        let from = self.stage;
        if !from.can_transition_to(next) {
            return Err(StageTransitionError { from, to: next });
        }
        self.stage = next;
        self.stage_entered_at = at;
        self.history.push(StageTransition {
            from: Some(from),
            to: next,
            at,
            actor: actor.into(),
            note,
        });
        Ok(from)
    }

    /// Seconds spent in the current stage
    pub fn dwell_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.stage_entered_at).num_seconds()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Held at the `proposed` checkpoint waiting for a human
    pub fn awaiting_approval(&self) -> bool {
        self.stage == Stage::Proposed
            && matches!(self.gate, Some(GateVerdict::Hold { .. }))
    }

    pub fn references_channel(&self, channel_id: &ChannelId) -> bool {
        self.affected_channel_ids.contains(channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> Decision {
        let signal = Signal::new(DecisionType::BudgetReallocation)
            .with_priority(Priority::High)
            .with_metric("roas", 2.4)
            .with_allocation("email", 5000.0);
        Decision::from_signal(1, signal, Utc::now())
    }

    #[test]
    fn new_decision_starts_in_signal_detected() {
        let decision = sample();
        assert_eq!(decision.stage, Stage::SignalDetected);
        assert!(decision.confidence.is_none());
        assert_eq!(decision.history.len(), 1);
        assert!(decision.references_channel(&ChannelId::new("email")));
    }

    #[test]
    fn transition_follows_edge_table() {
        let mut decision = sample();
        let now = Utc::now();
        decision
            .transition_to(Stage::Analyzing, "analyzer", None, now)
            .unwrap();
        assert_eq!(decision.stage, Stage::Analyzing);

        let err = decision
            .transition_to(Stage::Completed, "someone", None, now)
            .unwrap_err();
        assert_eq!(err.from, Stage::Analyzing);
        assert_eq!(err.to, Stage::Completed);
        assert_eq!(decision.stage, Stage::Analyzing);
        assert_eq!(decision.history.len(), 2);
    }

    #[test]
    fn terminal_stages_have_no_outgoing_edges() {
        for from in Stage::ALL.iter().filter(|s| s.is_terminal()) {
            for to in Stage::ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn dwell_time_tracks_stage_entry() {
        let mut decision = sample();
        let entered = Utc::now();
        decision
            .transition_to(Stage::Analyzing, "analyzer", None, entered)
            .unwrap();
        assert_eq!(decision.dwell_secs(entered + Duration::seconds(90)), 90);
    }

    #[test]
    fn confidence_bounds() {
        assert!(Confidence::new(0.0).is_some());
        assert!(Confidence::new(1.0).is_some());
        assert!(Confidence::new(1.01).is_none());
        assert!(Confidence::new(f64::NAN).is_none());
        assert_eq!(Confidence::clamped(-3.0).value(), 0.0);
        assert_eq!(Confidence::clamped(f64::NAN).value(), 0.0);
    }

    #[test]
    fn confidence_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<Confidence>("1.5").is_err());
        let c: Confidence = serde_json::from_str("0.4").unwrap();
        assert_eq!(c.value(), 0.4);
    }

    #[test]
    fn ledger_effect_by_type() {
        assert_eq!(
            DecisionType::ChannelPause.ledger_effect(),
            LedgerEffect::SetStatus(ChannelStatus::Paused)
        );
        assert!(DecisionType::CampaignScale.touches_ledger());
        assert!(!DecisionType::OfferTesting.touches_ledger());
    }

    #[test]
    fn signal_json_uses_kebab_case() {
        let json = r#"{
            "decision_type": "channel-pause",
            "priority": "high",
            "affected_channel_ids": ["paid-search"],
            "source_metrics": {"cpa": 81.5, "trend": "rising"}
        }"#;
        let signal: Signal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.decision_type, DecisionType::ChannelPause);
        assert_eq!(signal.priority, Priority::High);
        assert_eq!(
            signal.source_metrics.get("trend"),
            Some(&MetricValue::Text("rising".into()))
        );
    }
}
