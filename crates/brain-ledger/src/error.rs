//! Error types for the channel ledger

use brain_types::{ChannelId, ChannelStatus, ErrorKind};
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// Channel not in the ledger
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Channel registered twice
    #[error("Channel already registered: {0}")]
    DuplicateChannel(ChannelId),

    /// Malformed request
    #[error("Invalid ledger input: {0}")]
    InvalidInput(String),

    /// Allocation outside `[min, max]`
    #[error("Allocation {requested} for {channel_id} outside bounds [{min}, {max}]")]
    BudgetOutOfBounds {
        channel_id: ChannelId,
        requested: f64,
        min: f64,
        max: f64,
    },

    /// Allocation would leave a negative remainder
    #[error("Allocation {requested} for {channel_id} is below spent {spent}")]
    InsufficientRemaining {
        channel_id: ChannelId,
        requested: f64,
        spent: f64,
    },

    /// Channel already in the target status
    #[error("Channel {channel_id} is already {status}")]
    InvalidChannelState {
        channel_id: ChannelId,
        status: ChannelStatus,
    },

    /// A later-submitted decision already wrote the channel
    #[error("Decision #{sequence} for {channel_id} superseded by #{last_applied}")]
    Superseded {
        channel_id: ChannelId,
        sequence: u64,
        last_applied: u64,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChannelNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateChannel(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::BudgetOutOfBounds { .. } => ErrorKind::BudgetOutOfBounds,
            Self::InsufficientRemaining { .. } => ErrorKind::InsufficientRemaining,
            Self::InvalidChannelState { .. } | Self::Superseded { .. } => {
                ErrorKind::InvalidChannelState
            }
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
