//! # Strategy Brain Pipeline
//!
//! The decision lifecycle and the sweeps that watch it.
//!
//! A signal becomes a decision in `signal-detected`. Analysis scores it and
//! moves it to `analyzing`; proposing it consults the mode controller,
//! which either executes it straight away or holds it for a human. Approved
//! decisions are applied to the channel ledger; completing one feeds its
//! outcome back into the insight store.
//!
//! ## Key Components
//!
//! - [`DecisionPipeline`]: per-decision locked state machine
//! - [`EscalationMonitor`]: dwell-time sweep that hands stuck decisions to humans
//! - [`Reconciler`]: settles decisions restored mid-execution after a restart
//! - [`Analyzer`]: seam for the external scoring model
//! - [`StrategyBrain`]: the operation surface tying it together
//! - [`EventBus`]: broadcast of every mutation
//! - [`Clock`]: the single time source, manual under replay

#![deny(unsafe_code)]

pub mod analysis;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod pipeline;
pub mod reconcile;
pub mod service;

pub use analysis::{Analysis, Analyzer, FixedAnalyzer, InsightWeightedAnalyzer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EscalationConfig, EventsConfig, HealthConfig, PipelineConfig, ReconcileConfig};
pub use error::{PipelineError, PipelineResult};
pub use events::{BrainEvent, BrainEventEnvelope, EventBus};
pub use monitor::{timeout_reason, EscalationMonitor, SweepReport};
pub use pipeline::{CompletedDecision, DecisionPipeline};
pub use reconcile::{ReconcileReport, Reconciler, Settlement};
pub use service::{BrainSettings, StrategyBrain};
