//! # Strategy Brain Types
//!
//! Core data model shared by the Strategy Brain crates.
//!
//! ## Key Types
//!
//! - [`Decision`]: a proposed or executed action and its audit history
//! - [`Signal`]: the observation that originates a decision
//! - [`Channel`] / [`ChannelBudget`]: allocation targets and their budgets
//! - [`Insight`] / [`InsightApplication`]: learned patterns and their uses
//! - [`BrainStatus`]: derived controller view
//! - [`ErrorKind`]: error classification used by every layer
//!
//! ## Lifecycle
//!
//! ```text
//! signal-detected -> analyzing -> proposed -> executing -> completed
//!                        |           |  \          \
//!                        v           v   v          v
//!                    escalated  escalated rejected  failed
//! ```

#![deny(unsafe_code)]

pub mod channel;
pub mod decision;
pub mod error;
pub mod ids;
pub mod insight;
pub mod status;

pub use channel::{Channel, ChannelBudget, ChannelStatus};
pub use decision::{
    Approver, Confidence, Decision, DecisionType, EscalationRecord, GateVerdict, LedgerEffect,
    MetricValue, Priority, Signal, Stage, StageTransition, StageTransitionError,
};
pub use error::ErrorKind;
pub use ids::{ApplicationId, ChannelId, DecisionId, InsightId};
pub use insight::{ApplicationOutcome, Insight, InsightApplication, InsightType};
pub use status::{BrainMode, BrainStatus, HealthStatus};
