//! Channel and insight catalog
//!
//! Channels and insights are created out of band. The daemon reads them
//! from a JSON document and registers them before any signal arrives.

use std::collections::BTreeSet;
use std::path::Path;

use brain_pipeline::StrategyBrain;
use brain_types::{Channel, Insight};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub channels: Vec<Channel>,

    #[serde(default)]
    pub insights: Vec<Insight>,
}

impl Catalog {
    pub fn from_path(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> DaemonResult<Self> {
        serde_json::from_str(raw).map_err(|e| DaemonError::Catalog(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.insights.is_empty()
    }

    /// Register every entry with the brain.
    ///
    /// Channels the ledger already holds, restored from a snapshot, keep
    /// their restored state and are skipped.
    pub fn register(&self, brain: &StrategyBrain) -> DaemonResult<()> {
        let mut seen = BTreeSet::new();
        if let Some(twice) = self.channels.iter().find(|c| !seen.insert(&c.id)) {
            return Err(DaemonError::Catalog(format!(
                "channel {} listed twice",
                twice.id
            )));
        }

        for channel in &self.channels {
            if brain.ledger().contains(&channel.id) {
                debug!(channel_id = %channel.id, "Channel already restored; catalog entry skipped");
                continue;
            }
            brain
                .register_channel(channel.clone())
                .map_err(|e| DaemonError::Catalog(e.to_string()))?;
        }
        for insight in &self.insights {
            brain
                .register_insight(insight.clone())
                .map_err(|e| DaemonError::Catalog(e.to_string()))?;
        }
        info!(
            channels = self.channels.len(),
            insights = self.insights.len(),
            "Catalog registered"
        );
        Ok(())
    }
}
