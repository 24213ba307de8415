//! Mode controller: the process-wide approval policy.
//!
//! The mode is read once per evaluation. A switch only affects decisions
//! evaluated after it; decisions already past the checkpoint keep the
//! verdict they were given.

use std::sync::Arc;

use brain_types::{BrainMode, Decision, GateVerdict};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gate::{ApprovalGate, GateConfig, ModeGate};

/// Record of a mode switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSwitch {
    pub previous: BrainMode,
    pub current: BrainMode,
    pub switched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ModeController {
    mode: RwLock<BrainMode>,
    gate: Arc<dyn ApprovalGate>,
}

impl ModeController {
    pub fn new(mode: BrainMode, config: GateConfig) -> Self {
        Self::with_gate(mode, Arc::new(ModeGate::new(config)))
    }

    pub fn with_gate(mode: BrainMode, gate: Arc<dyn ApprovalGate>) -> Self {
        Self {
            mode: RwLock::new(mode),
            gate,
        }
    }

    pub fn mode(&self) -> BrainMode {
        *self.mode.read()
    }

    pub fn switch_mode(&self, mode: BrainMode) -> ModeSwitch {
        let previous = {
            let mut current = self.mode.write();
            std::mem::replace(&mut *current, mode)
        };
        info!(previous = %previous, current = %mode, "Switched brain mode");
        ModeSwitch {
            previous,
            current: mode,
            switched_at: Utc::now(),
        }
    }

    /// Gate verdict for a decision under the current mode
    pub fn evaluate(&self, decision: &Decision) -> GateVerdict {
        let mode = self.mode();
        let verdict = self.gate.evaluate(mode, decision);
        debug!(
            decision_id = %decision.id,
            gate = self.gate.id(),
            mode = %mode,
            auto_approve = verdict.is_auto_approve(),
            "Evaluated approval gate"
        );
        verdict
    }
}
