//! # Strategy Brain Ledger
//!
//! Pure bookkeeping for channel budgets. The ledger validates and applies
//! the effect of approved decisions (reallocations and status flips) and
//! keeps every channel's derived budget fields in step with its inputs.
//! It holds no policy: whether a decision may reach the ledger at all is
//! decided upstream by the pipeline and the mode controller.
//!
//! ## Key Components
//!
//! - [`ResourceLedger`]: per-channel locked budget state
//! - [`LedgerConfig`]: ledger-wide allocation bounds
//! - [`LedgerReceipt`]: record of what one application changed

#![deny(unsafe_code)]

pub mod error;
pub mod ledger;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{ChannelChange, LedgerConfig, LedgerReceipt, ResourceLedger};
