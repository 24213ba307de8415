//! Configuration for brain-daemon

use brain_insights::InsightConfig;
use brain_ledger::LedgerConfig;
use brain_pipeline::{
    BrainSettings, EscalationConfig, EventsConfig, HealthConfig, PipelineConfig, ReconcileConfig,
};
use brain_policy::GateConfig;
use brain_types::BrainMode;
use serde::{Deserialize, Serialize};

use crate::error::DaemonResult;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Mode the controller starts in
    #[serde(default)]
    pub mode: BrainMode,

    /// Approval gate thresholds
    #[serde(default)]
    pub gate: GateConfig,

    /// Ledger-wide allocation bounds
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Insight feedback configuration
    #[serde(default)]
    pub insights: InsightConfig,

    /// Escalation monitor configuration
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Reconciliation sweep configuration
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Health thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// Event bus configuration
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Channel and insight catalog
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Where decisions survive a restart
    #[serde(default)]
    pub state: StateConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Catalog location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file with `channels` and `insights`
    #[serde(default)]
    pub path: Option<String>,
}

/// State persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Snapshot file, restored at startup and rewritten after every
    /// reconciliation sweep and at shutdown. Unset keeps state in memory.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BrainConfig {
    /// Load configuration: defaults, then the optional file, then `BRAIN_*`
    /// environment variables (`__` separates nested keys, e.g.
    /// `BRAIN_ESCALATION__HARD_TIMEOUT_SECS`).
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&BrainConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BRAIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// The subset the brain itself is assembled from
    pub fn settings(&self) -> BrainSettings {
        BrainSettings {
            mode: self.mode,
            gate: self.gate.clone(),
            ledger: self.ledger.clone(),
            insights: self.insights.clone(),
            pipeline: PipelineConfig {
                escalation: self.escalation.clone(),
                reconcile: self.reconcile.clone(),
                health: self.health.clone(),
                events: self.events.clone(),
            },
        }
    }
}
