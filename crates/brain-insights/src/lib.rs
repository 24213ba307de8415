//! # Strategy Brain Insights
//!
//! Bookkeeping for learned insights: each insight carries a confidence
//! score in `[0, 1]` and the history of decisions that applied it. When an
//! application's outcome is known, a [`ConfidenceRule`] folds it into the
//! score. The default rule is an exponentially weighted moving average:
//!
//! ```text
//! new = old + alpha * (target - old)     target: success 1.0, partial 0.5, failure 0.0
//! ```
//!
//! Pending applications are counted immediately but only move the score
//! when they are resolved.

#![deny(unsafe_code)]

pub mod error;
pub mod rule;
pub mod store;

pub use error::{InsightError, InsightResult};
pub use rule::{ConfidenceRule, EwmaRule};
pub use store::{ApplicationRecorded, InsightConfig, InsightStore};
