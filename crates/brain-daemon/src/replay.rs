//! Scripted replay against a fresh brain
//!
//! A replay script is a JSON document with an optional catalog and a list
//! of steps. Decisions and insight applications are referred to by labels
//! assigned in the step that created them, since their ids are minted at
//! run time. The brain runs on a manual clock that only sweeps advance, so
//! timeouts can be exercised without waiting and every timestamp the brain
//! writes lives on the same timeline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use brain_pipeline::{Clock, ManualClock, PipelineError, StrategyBrain};
use brain_types::{
    ApplicationId, ApplicationOutcome, Approver, BrainMode, BrainStatus, Channel, ChannelId,
    Confidence, Decision, DecisionId, ErrorKind, Insight, InsightId, Signal,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Overrides the configured starting mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BrainMode>,

    /// Registered before the first step
    #[serde(default)]
    pub catalog: Catalog,

    /// Abort at the first failing step instead of recording it
    #[serde(default)]
    pub stop_on_error: bool,

    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn from_path(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::Script(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> DaemonResult<Self> {
        serde_json::from_str(raw).map_err(|e| DaemonError::Script(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ReplayStep {
    Submit {
        #[serde(rename = "ref")]
        label: String,
        signal: Signal,
    },
    /// Without `confidence` the brain's analyzer scores the decision
    Analyze {
        decision: String,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        expected_outcome: Option<String>,
    },
    Propose {
        decision: String,
    },
    Approve {
        decision: String,
        approver: String,
    },
    Reject {
        decision: String,
        reason: String,
    },
    Complete {
        decision: String,
        result: String,
        #[serde(default)]
        applications: Vec<ScriptApplication>,
    },
    Escalate {
        decision: String,
        reason: String,
    },
    SwitchMode {
        mode: BrainMode,
    },
    AdjustBudget {
        channel_id: ChannelId,
        allocated: f64,
        #[serde(default = "default_operator")]
        operator: String,
    },
    RetireChannel {
        channel_id: ChannelId,
    },
    RecordInsight {
        #[serde(rename = "ref", default)]
        label: Option<String>,
        insight_id: InsightId,
        decision: String,
        outcome: ApplicationOutcome,
    },
    ResolveInsight {
        application: String,
        outcome: ApplicationOutcome,
    },
    /// Advance the virtual clock, then run both sweeps
    Sweep {
        #[serde(default)]
        advance_secs: i64,
    },
}

impl ReplayStep {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "submit",
            Self::Analyze { .. } => "analyze",
            Self::Propose { .. } => "propose",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Complete { .. } => "complete",
            Self::Escalate { .. } => "escalate",
            Self::SwitchMode { .. } => "switch-mode",
            Self::AdjustBudget { .. } => "adjust-budget",
            Self::RetireChannel { .. } => "retire-channel",
            Self::RecordInsight { .. } => "record-insight",
            Self::ResolveInsight { .. } => "resolve-insight",
            Self::Sweep { .. } => "sweep",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptApplication {
    pub insight_id: InsightId,
    pub outcome: ApplicationOutcome,
}

fn default_operator() -> String {
    "replay".to_string()
}

/// Why a step did not go through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<PipelineError> for StepFailure {
    fn from(err: PipelineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<DecisionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Final state after a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub status: BrainStatus,
    pub decisions: Vec<Decision>,
    pub channels: Vec<Channel>,
    pub insights: Vec<Insight>,
    pub steps: Vec<StepOutcome>,
}

impl ReplayReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.succeeded()).count()
    }
}

/// Executes a script step by step against one brain.
///
/// `clock` must be the clock the brain was built with.
pub struct Replay<'a> {
    brain: &'a StrategyBrain,
    clock: Arc<ManualClock>,
    decisions: HashMap<String, DecisionId>,
    applications: HashMap<String, ApplicationId>,
}

impl<'a> Replay<'a> {
    pub fn new(brain: &'a StrategyBrain, clock: Arc<ManualClock>) -> Self {
        Self {
            brain,
            clock,
            decisions: HashMap::new(),
            applications: HashMap::new(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn run(mut self, script: &ReplayScript) -> DaemonResult<ReplayReport> {
        if let Some(mode) = script.mode {
            self.brain.switch_mode(mode);
        }
        script.catalog.register(self.brain)?;

        let mut steps = Vec::with_capacity(script.steps.len());
        for (index, step) in script.steps.iter().enumerate() {
            let outcome = match self.execute(step).await {
                Ok(decision_id) => StepOutcome {
                    index,
                    op: step.op(),
                    decision_id,
                    error: None,
                },
                Err(failure) => {
                    warn!(index, op = step.op(), kind = %failure.kind, "Replay step failed: {}", failure.message);
                    if script.stop_on_error {
                        return Err(DaemonError::Script(format!(
                            "step {} ({}) failed: {}",
                            index,
                            step.op(),
                            failure.message
                        )));
                    }
                    StepOutcome {
                        index,
                        op: step.op(),
                        decision_id: None,
                        error: Some(failure),
                    }
                }
            };
            steps.push(outcome);
        }

        let report = ReplayReport {
            status: self.brain.pipeline().status(self.now()),
            decisions: self.brain.list_decisions(),
            channels: self.brain.ledger().list_channels(),
            insights: self.brain.insights().list(),
            steps,
        };
        info!(
            steps = report.steps.len(),
            failed = report.failed_steps(),
            decisions = report.decisions.len(),
            "Replay finished"
        );
        Ok(report)
    }

    async fn execute(&mut self, step: &ReplayStep) -> Result<Option<DecisionId>, StepFailure> {
        let brain = self.brain;
        match step {
            ReplayStep::Submit { label, signal } => {
                if self.decisions.contains_key(label) {
                    return Err(invalid(format!("decision ref {} already used", label)));
                }
                let decision = brain.submit_signal(signal.clone())?;
                self.decisions.insert(label.clone(), decision.id.clone());
                Ok(Some(decision.id))
            }
            ReplayStep::Analyze {
                decision,
                confidence,
                expected_outcome,
            } => {
                let id = self.decision(decision)?;
                let analyzed = match confidence {
                    Some(value) => {
                        let confidence = Confidence::new(*value).ok_or_else(|| {
                            invalid(format!("confidence {} outside [0, 1]", value))
                        })?;
                        brain.advance_to_analyzing(&id, confidence, expected_outcome.clone())?
                    }
                    None => brain.analyze(&id).await?,
                };
                Ok(Some(analyzed.id))
            }
            ReplayStep::Propose { decision } => {
                let id = self.decision(decision)?;
                Ok(Some(brain.propose(&id)?.id))
            }
            ReplayStep::Approve { decision, approver } => {
                let id = self.decision(decision)?;
                Ok(Some(brain.approve(&id, Approver::human(approver.clone()))?.id))
            }
            ReplayStep::Reject { decision, reason } => {
                let id = self.decision(decision)?;
                Ok(Some(brain.reject(&id, reason)?.id))
            }
            ReplayStep::Complete {
                decision,
                result,
                applications,
            } => {
                let id = self.decision(decision)?;
                let applications: Vec<(InsightId, ApplicationOutcome)> = applications
                    .iter()
                    .map(|a| (a.insight_id.clone(), a.outcome))
                    .collect();
                let completed = brain.complete(&id, result.clone(), &applications)?;
                Ok(Some(completed.decision.id))
            }
            ReplayStep::Escalate { decision, reason } => {
                let id = self.decision(decision)?;
                brain.escalate(&id, reason)?;
                Ok(Some(id))
            }
            ReplayStep::SwitchMode { mode } => {
                brain.switch_mode(*mode);
                Ok(None)
            }
            ReplayStep::AdjustBudget {
                channel_id,
                allocated,
                operator,
            } => Ok(Some(
                brain
                    .adjust_channel_budget(channel_id, *allocated, operator)?
                    .id,
            )),
            ReplayStep::RetireChannel { channel_id } => {
                brain.retire_channel(channel_id)?;
                Ok(None)
            }
            ReplayStep::RecordInsight {
                label,
                insight_id,
                decision,
                outcome,
            } => {
                let id = self.decision(decision)?;
                let recorded = brain.record_insight_application(insight_id, &id, *outcome)?;
                if let Some(label) = label {
                    self.applications
                        .insert(label.clone(), recorded.application.id.clone());
                }
                Ok(Some(id))
            }
            ReplayStep::ResolveInsight {
                application,
                outcome,
            } => {
                let application_id =
                    self.applications.get(application).cloned().ok_or_else(|| {
                        not_found(format!("unknown application ref {}", application))
                    })?;
                let recorded = brain.resolve_insight_application(&application_id, *outcome)?;
                Ok(Some(recorded.application.decision_id))
            }
            ReplayStep::Sweep { advance_secs } => {
                let now = self.clock.advance(*advance_secs)?;
                brain.sweep_escalations(now);
                brain.reconcile(now);
                Ok(None)
            }
        }
    }

    fn decision(&self, label: &str) -> Result<DecisionId, StepFailure> {
        self.decisions
            .get(label)
            .cloned()
            .ok_or_else(|| not_found(format!("unknown decision ref {}", label)))
    }
}

fn invalid(message: String) -> StepFailure {
    StepFailure {
        kind: ErrorKind::InvalidInput,
        message,
    }
}

fn not_found(message: String) -> StepFailure {
    StepFailure {
        kind: ErrorKind::NotFound,
        message,
    }
}
