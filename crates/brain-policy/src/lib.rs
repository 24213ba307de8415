//! # Strategy Brain Policy
//!
//! The human-in-the-loop policy consulted when a decision reaches
//! `proposed`.
//!
//! | Mode         | Auto-approves when                                     |
//! |--------------|--------------------------------------------------------|
//! | `training`   | never                                                  |
//! | `supervised` | priority is not high and confidence >= 0.75            |
//! | `autonomous` | always, except high priority with confidence < 0.5     |
//!
//! ## Key Components
//!
//! - [`ModeController`]: holds the process-wide mode and evaluates the gate
//! - [`ApprovalGate`]: seam for alternative gate implementations
//! - [`ModeGate`] / [`evaluate_gate`]: the standard mode gate

#![deny(unsafe_code)]

pub mod controller;
pub mod gate;

pub use controller::{ModeController, ModeSwitch};
pub use gate::{evaluate_gate, ApprovalGate, GateConfig, ModeGate};
