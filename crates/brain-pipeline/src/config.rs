//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// Runtime configuration for the pipeline and its sweeps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub events: EventsConfig,
}

/// Escalation monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_escalation_interval")]
    pub interval_secs: u64,

    /// Dwell time after which a high-priority decision is escalated
    #[serde(default = "default_high_priority_timeout")]
    pub high_priority_timeout_secs: i64,

    /// Dwell time after which any decision is escalated
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout_secs: i64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_escalation_interval(),
            high_priority_timeout_secs: default_high_priority_timeout(),
            hard_timeout_secs: default_hard_timeout(),
        }
    }
}

/// Reconciliation sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// Executing decisions older than this count as stale in health
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

/// Thresholds for the derived health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Approval backlog at which health turns to warning
    #[serde(default = "default_warning_backlog")]
    pub warning_backlog: usize,

    /// Approval backlog at which health turns to critical
    #[serde(default = "default_critical_backlog")]
    pub critical_backlog: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            warning_backlog: default_warning_backlog(),
            critical_backlog: default_critical_backlog(),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_escalation_interval() -> u64 {
    30
}

fn default_high_priority_timeout() -> i64 {
    900
}

fn default_hard_timeout() -> i64 {
    3600
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_stale_after() -> i64 {
    300
}

fn default_warning_backlog() -> usize {
    10
}

fn default_critical_backlog() -> usize {
    25
}

fn default_event_capacity() -> usize {
    1024
}
