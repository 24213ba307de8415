//! Decision snapshot - save and restore brain state across restarts.
//!
//! The snapshot is one JSON file holding the ledger's channels and every
//! decision. Writes go to a `.tmp` sibling first and are then renamed over
//! the old file, so an interrupted write never leaves a torn snapshot.

use std::path::Path;

use brain_pipeline::{ReconcileReport, StrategyBrain};
use brain_types::{Channel, Decision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::DaemonResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,

    #[serde(default)]
    pub channels: Vec<Channel>,

    #[serde(default)]
    pub decisions: Vec<Decision>,
}

impl Snapshot {
    /// Read the brain's current state.
    ///
    /// Channels are read before decisions: a decision caught mid-apply is
    /// restored `executing` against channels that may not show it yet, and
    /// is then left for review instead of being finished.
    pub fn capture(brain: &StrategyBrain) -> Self {
        let channels = brain.ledger().list_channels();
        let decisions = brain.list_decisions();
        Self {
            saved_at: brain.now(),
            channels,
            decisions,
        }
    }

    /// Load a snapshot; `None` when no file exists yet.
    pub fn load(path: impl AsRef<Path>) -> DaemonResult<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> DaemonResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;

        debug!(
            path = %path.display(),
            channels = self.channels.len(),
            decisions = self.decisions.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Rebuild a fresh brain from the snapshot and reconcile it.
    ///
    /// Snapshot channels go in first and keep their saved state; catalog
    /// channels already present are skipped, so only new catalog entries
    /// and the catalog's insights are added. Decisions come last, once every
    /// channel and insight they name is registered.
    pub fn restore(
        &self,
        brain: &StrategyBrain,
        catalog: Option<&Catalog>,
    ) -> DaemonResult<ReconcileReport> {
        for channel in &self.channels {
            brain.register_channel(channel.clone())?;
        }
        if let Some(catalog) = catalog {
            catalog.register(brain)?;
        }
        for decision in &self.decisions {
            brain.restore_decision(decision.clone())?;
        }

        info!(
            saved_at = %self.saved_at,
            channels = self.channels.len(),
            decisions = self.decisions.len(),
            "Snapshot restored"
        );
        Ok(brain.reconciler().sweep())
    }
}
