//! Error types for the insight store

use brain_types::{ApplicationId, ErrorKind, InsightId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InsightError {
    #[error("Insight not found: {0}")]
    InsightNotFound(InsightId),

    #[error("Insight application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    #[error("Insight already registered: {0}")]
    DuplicateInsight(InsightId),

    #[error("Invalid insight input: {0}")]
    InvalidInput(String),
}

impl InsightError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsightNotFound(_) | Self::ApplicationNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateInsight(_) | Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

pub type InsightResult<T> = std::result::Result<T, InsightError>;
