//! Strategy Brain daemon library
//!
//! This module provides the pieces the `braind` binary is assembled from:
//! - Layered configuration
//! - Channel and insight catalog loading
//! - Escalation and reconciliation scheduling
//! - Snapshot persistence across restarts
//! - Scripted replay against a fresh brain

pub mod catalog;
pub mod config;
pub mod error;
pub mod replay;
pub mod scheduler;
pub mod snapshot;

pub use catalog::Catalog;
pub use config::{BrainConfig, CatalogConfig, LoggingConfig, StateConfig};
pub use error::{DaemonError, DaemonResult};
pub use replay::{Replay, ReplayReport, ReplayScript, ReplayStep, StepFailure, StepOutcome};
pub use scheduler::{log_events, Scheduler};
pub use snapshot::Snapshot;
