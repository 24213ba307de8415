//! Error classification shared by every Strategy Brain crate
//!
//! Each crate keeps its own error enum; all of them map onto this closed
//! set so callers can decide how to react without matching on variants
//! from every layer.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Malformed or referentially inconsistent request
    InvalidInput,
    /// Stage precondition violated
    InvalidTransition,
    /// Requested allocation outside the channel's bounds
    BudgetOutOfBounds,
    /// Requested allocation below what was already spent
    InsufficientRemaining,
    /// Channel already in the requested status
    InvalidChannelState,
    /// Unknown decision, channel, insight or application
    NotFound,
}

impl ErrorKind {
    /// Caller can retry with corrected input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidTransition | Self::NotFound)
    }

    /// Raised by the channel ledger while applying a decision
    pub fn is_ledger_rejection(&self) -> bool {
        matches!(
            self,
            Self::BudgetOutOfBounds | Self::InsufficientRemaining | Self::InvalidChannelState
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid-input",
            Self::InvalidTransition => "invalid-transition",
            Self::BudgetOutOfBounds => "budget-out-of-bounds",
            Self::InsufficientRemaining => "insufficient-remaining",
            Self::InvalidChannelState => "invalid-channel-state",
            Self::NotFound => "not-found",
        };
        f.write_str(s)
    }
}
