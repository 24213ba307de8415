//! Approval gate evaluated at the `proposed` checkpoint
//!
//! The gate is a pure function of the controller mode and the decision's
//! priority and confidence. It never looks at time or at other decisions.

use std::fmt::Debug;

use brain_types::{BrainMode, Confidence, Decision, GateVerdict, Priority};
use serde::{Deserialize, Serialize};

/// Confidence thresholds used by the mode gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum confidence for a non-high-priority auto-approval in supervised mode
    #[serde(default = "default_supervised_min_confidence")]
    pub supervised_min_confidence: f64,

    /// High-priority decisions below this confidence are held in autonomous mode
    #[serde(default = "default_autonomous_high_priority_min_confidence")]
    pub autonomous_high_priority_min_confidence: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            supervised_min_confidence: default_supervised_min_confidence(),
            autonomous_high_priority_min_confidence:
                default_autonomous_high_priority_min_confidence(),
        }
    }
}

fn default_supervised_min_confidence() -> f64 {
    0.75
}

fn default_autonomous_high_priority_min_confidence() -> f64 {
    0.5
}

/// Decides whether a proposed decision may execute without a human
pub trait ApprovalGate: Send + Sync + Debug {
    /// Unique identifier for this gate
    fn id(&self) -> &str;

    /// Evaluate a decision that has just reached `proposed`
    fn evaluate(&self, mode: BrainMode, decision: &Decision) -> GateVerdict;
}

/// The standard training / supervised / autonomous gate
#[derive(Debug, Clone, Default)]
pub struct ModeGate {
    config: GateConfig,
}

impl ModeGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

impl ApprovalGate for ModeGate {
    fn id(&self) -> &str {
        "mode-gate"
    }

    fn evaluate(&self, mode: BrainMode, decision: &Decision) -> GateVerdict {
        evaluate_gate(mode, &self.config, decision.priority, decision.confidence)
    }
}

/// Gate verdict for one `(mode, priority, confidence)` triple.
pub fn evaluate_gate(
    mode: BrainMode,
    config: &GateConfig,
    priority: Priority,
    confidence: Option<Confidence>,
) -> GateVerdict {
    match mode {
        BrainMode::Training => GateVerdict::Hold {
            mode,
            reason: "training mode requires human approval".to_string(),
        },
        BrainMode::Supervised => {
            if priority == Priority::High {
                return GateVerdict::Hold {
                    mode,
                    reason: "high-priority decisions require approval in supervised mode"
                        .to_string(),
                };
            }
            match confidence {
                Some(c) if c.value() >= config.supervised_min_confidence => {
                    GateVerdict::AutoApprove { mode }
                }
                Some(c) => GateVerdict::Hold {
                    mode,
                    reason: format!(
                        "confidence {} below supervised threshold {:.2}",
                        c, config.supervised_min_confidence
                    ),
                },
                None => GateVerdict::Hold {
                    mode,
                    reason: "decision has no confidence score".to_string(),
                },
            }
        }
        BrainMode::Autonomous => {
            if priority != Priority::High {
                return GateVerdict::AutoApprove { mode };
            }
            match confidence {
                Some(c) if c.value() < config.autonomous_high_priority_min_confidence => {
                    GateVerdict::Hold {
                        mode,
                        reason: format!(
                            "high-priority decision with confidence {} below {:.2}",
                            c, config.autonomous_high_priority_min_confidence
                        ),
                    }
                }
                Some(_) => GateVerdict::AutoApprove { mode },
                None => GateVerdict::Hold {
                    mode,
                    reason: "high-priority decision has no confidence score".to_string(),
                },
            }
        }
    }
}
