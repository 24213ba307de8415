//! Error types for the decision pipeline

use brain_insights::InsightError;
use brain_ledger::LedgerError;
use brain_types::{DecisionId, ErrorKind, Stage, StageTransitionError};
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Malformed or referentially inconsistent request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stage precondition violated
    #[error("Decision {decision_id} cannot move from {from} to {to}")]
    InvalidTransition {
        decision_id: DecisionId,
        from: Stage,
        to: Stage,
    },

    /// Unknown decision
    #[error("Decision not found: {0}")]
    DecisionNotFound(DecisionId),

    /// Rejected by the channel ledger
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Rejected by the insight store
    #[error(transparent)]
    Insight(#[from] InsightError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::DecisionNotFound(_) => ErrorKind::NotFound,
            Self::Ledger(e) => e.kind(),
            Self::Insight(e) => e.kind(),
        }
    }

    pub(crate) fn transition(decision_id: &DecisionId, err: StageTransitionError) -> Self {
        Self::InvalidTransition {
            decision_id: decision_id.clone(),
            from: err.from,
            to: err.to,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use brain_types::ChannelId;

    #[test]
    fn kinds_pass_through_wrapped_errors() {
        let err: PipelineError = LedgerError::InsufficientRemaining {
            channel_id: ChannelId::new("email"),
            requested: 3000.0,
            spent: 4000.0,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientRemaining);
        assert!(err.kind().is_ledger_rejection());

        let err = PipelineError::DecisionNotFound(DecisionId::generate());
        assert!(err.kind().is_recoverable());
    }
}
