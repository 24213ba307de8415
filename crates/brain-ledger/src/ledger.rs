//! Resource ledger: channel budget bookkeeping.
//!
//! Each channel sits behind its own mutex. A decision that touches several
//! channels locks them in id order, validates every change, and only then
//! writes, so an application is all-or-nothing and never interleaves with
//! another application on the same channel.

use std::sync::Arc;

use brain_types::{Channel, ChannelId, ChannelStatus, Decision, DecisionId, LedgerEffect};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{LedgerError, LedgerResult};

/// Ledger-wide allocation bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Lowest allocation a reallocation may request
    #[serde(default = "default_min_budget")]
    pub min_budget: f64,

    /// Highest allocation a reallocation may request
    #[serde(default = "default_max_budget")]
    pub max_budget: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_budget: default_min_budget(),
            max_budget: default_max_budget(),
        }
    }
}

fn default_min_budget() -> f64 {
    0.0
}

fn default_max_budget() -> f64 {
    1_000_000_000.0
}

/// Before/after view of one channel touched by an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelChange {
    pub channel_id: ChannelId,
    pub previous_allocated: f64,
    pub allocated: f64,
    pub previous_status: ChannelStatus,
    pub status: ChannelStatus,
}

/// What an application did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub decision_id: DecisionId,
    pub changes: Vec<ChannelChange>,
}

impl LedgerReceipt {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    /// One-line description used as a decision's audit note
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            return "no ledger effect".to_string();
        }
        self.changes
            .iter()
            .map(|c| {
                if c.previous_status != c.status {
                    format!("{} {} -> {}", c.channel_id, c.previous_status, c.status)
                } else {
                    format!(
                        "{} allocated {} -> {}",
                        c.channel_id, c.previous_allocated, c.allocated
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Channel budget ledger
#[derive(Debug, Default)]
pub struct ResourceLedger {
    config: LedgerConfig,
    channels: DashMap<ChannelId, Arc<Mutex<Channel>>>,
}

impl ResourceLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            channels: DashMap::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Add a channel from the external catalog.
    pub fn register_channel(&self, channel: Channel) -> LedgerResult<()> {
        let allocated = channel.budget.allocated();
        let spent = channel.budget.spent();
        if !allocated.is_finite() || allocated < 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "{} has invalid allocation {}",
                channel.id, allocated
            )));
        }
        if !spent.is_finite() || spent < 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "{} has invalid spend {}",
                channel.id, spent
            )));
        }

        match self.channels.entry(channel.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(LedgerError::DuplicateChannel(channel.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(channel_id = %channel.id, allocated, spent, "Registered channel");
                slot.insert(Arc::new(Mutex::new(channel)));
                Ok(())
            }
        }
    }

    /// Remove a channel. Callers must make sure no decision references it.
    pub fn retire_channel(&self, channel_id: &ChannelId) -> LedgerResult<Channel> {
        let (_, handle) = self
            .channels
            .remove(channel_id)
            .ok_or_else(|| LedgerError::ChannelNotFound(channel_id.clone()))?;
        let channel = handle.lock().clone();
        info!(channel_id = %channel_id, "Retired channel");
        Ok(channel)
    }

    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn get_channel(&self, channel_id: &ChannelId) -> LedgerResult<Channel> {
        let handle = self.handle(channel_id)?;
        let channel = handle.lock().clone();
        Ok(channel)
    }

    pub fn list_channels(&self) -> Vec<Channel> {
        let handles: Vec<_> = self.channels.iter().map(|e| e.value().clone()).collect();
        let mut channels: Vec<Channel> = handles.iter().map(|h| h.lock().clone()).collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }

    /// Sync the externally reported spend for a channel.
    pub fn record_spend(&self, channel_id: &ChannelId, spent: f64) -> LedgerResult<Channel> {
        if !spent.is_finite() || spent < 0.0 {
            return Err(LedgerError::InvalidInput(format!(
                "invalid spend {} for {}",
                spent, channel_id
            )));
        }
        let handle = self.handle(channel_id)?;
        let mut channel = handle.lock();
        channel.budget.set_spent(spent);
        channel.updated_at = Utc::now();
        if channel.budget.remaining() < 0.0 {
            warn!(
                channel_id = %channel_id,
                spent,
                allocated = channel.budget.allocated(),
                "Reported spend exceeds allocation"
            );
        }
        Ok(channel.clone())
    }

    /// Apply a decision's effect to every channel it touches.
    ///
    /// Validation covers all channels before any write happens. A channel
    /// only moves forward in submission order: a decision whose sequence is
    /// below the channel's last applied sequence is rejected as superseded.
    #[instrument(skip(self, decision), fields(decision_id = %decision.id, decision_type = %decision.decision_type))]
    pub fn apply(&self, decision: &Decision) -> LedgerResult<LedgerReceipt> {
        let effect = decision.decision_type.ledger_effect();
        if matches!(effect, LedgerEffect::None) {
            return Ok(LedgerReceipt {
                decision_id: decision.id.clone(),
                changes: Vec::new(),
            });
        }

        if decision.affected_channel_ids.is_empty() {
            return Err(LedgerError::InvalidInput(format!(
                "{} decision names no channels",
                decision.decision_type
            )));
        }

        let handles = self.handles_for(decision)?;
        let mut guards: Vec<MutexGuard<'_, Channel>> = handles.iter().map(|h| h.lock()).collect();

        for channel in guards.iter() {
            self.validate(decision, effect, channel)?;
        }

        let now = Utc::now();
        let mut changes = Vec::with_capacity(guards.len());
        for channel in guards.iter_mut() {
            let previous_allocated = channel.budget.allocated();
            let previous_status = channel.status;
            match effect {
                LedgerEffect::Reallocate => {
                    let requested = decision.requested_allocations[&channel.id];
                    channel.budget.set_allocated(requested);
                }
                LedgerEffect::SetStatus(target) => channel.status = target,
                LedgerEffect::None => {}
            }
            channel.last_applied_sequence = Some(decision.sequence);
            channel.updated_at = now;

            changes.push(ChannelChange {
                channel_id: channel.id.clone(),
                previous_allocated,
                allocated: channel.budget.allocated(),
                previous_status,
                status: channel.status,
            });
        }

        let receipt = LedgerReceipt {
            decision_id: decision.id.clone(),
            changes,
        };
        info!(summary = %receipt.summary(), "Applied decision to ledger");
        Ok(receipt)
    }

    /// Whether the ledger already shows the decision's effect.
    pub fn reflects(&self, decision: &Decision) -> LedgerResult<bool> {
        let effect = decision.decision_type.ledger_effect();
        if matches!(effect, LedgerEffect::None) {
            return Ok(true);
        }
        let handles = self.handles_for(decision)?;
        for handle in &handles {
            let channel = handle.lock();
            let shows = match effect {
                LedgerEffect::Reallocate => decision
                    .requested_allocations
                    .get(&channel.id)
                    .is_some_and(|requested| channel.budget.allocated() == *requested),
                LedgerEffect::SetStatus(target) => channel.status == target,
                LedgerEffect::None => true,
            };
            if !shows {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ── Internal helpers ─────────────────────────────────────────────

    fn handle(&self, channel_id: &ChannelId) -> LedgerResult<Arc<Mutex<Channel>>> {
        self.channels
            .get(channel_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| LedgerError::ChannelNotFound(channel_id.clone()))
    }

    /// Handles in channel-id order, which is the lock order
    fn handles_for(&self, decision: &Decision) -> LedgerResult<Vec<Arc<Mutex<Channel>>>> {
        decision
            .affected_channel_ids
            .iter()
            .map(|id| self.handle(id))
            .collect()
    }

    fn validate(&self, decision: &Decision, effect: LedgerEffect, channel: &Channel) -> LedgerResult<()> {
        if let Some(last) = channel.last_applied_sequence {
            if last > decision.sequence {
                warn!(
                    channel_id = %channel.id,
                    last_applied = last,
                    sequence = decision.sequence,
                    "Rejecting decision submitted before the channel's last write"
                );
                return Err(LedgerError::Superseded {
                    channel_id: channel.id.clone(),
                    sequence: decision.sequence,
                    last_applied: last,
                });
            }
        }
        match effect {
            LedgerEffect::Reallocate => {
                let requested = *decision
                    .requested_allocations
                    .get(&channel.id)
                    .ok_or_else(|| {
                        LedgerError::InvalidInput(format!(
                            "no requested allocation for {}",
                            channel.id
                        ))
                    })?;
                let min = channel.min_budget.unwrap_or(self.config.min_budget);
                let max = channel.max_budget.unwrap_or(self.config.max_budget);
                if !requested.is_finite() || requested < min || requested > max {
                    warn!(channel_id = %channel.id, requested, min, max, "Allocation out of bounds");
                    return Err(LedgerError::BudgetOutOfBounds {
                        channel_id: channel.id.clone(),
                        requested,
                        min,
                        max,
                    });
                }
                if requested < channel.budget.spent() {
                    warn!(
                        channel_id = %channel.id,
                        requested,
                        spent = channel.budget.spent(),
                        "Allocation below spend"
                    );
                    return Err(LedgerError::InsufficientRemaining {
                        channel_id: channel.id.clone(),
                        requested,
                        spent: channel.budget.spent(),
                    });
                }
                Ok(())
            }
            LedgerEffect::SetStatus(target) => {
                if channel.status == target {
                    return Err(LedgerError::InvalidChannelState {
                        channel_id: channel.id.clone(),
                        status: channel.status,
                    });
                }
                Ok(())
            }
            LedgerEffect::None => Ok(()),
        }
    }
}
