//! Insight store: confidence scores and their application history.
//!
//! Each insight and its applications live behind one mutex, so the count,
//! the history and the score always change together.

use std::sync::Arc;

use brain_types::{
    ApplicationId, ApplicationOutcome, Confidence, DecisionId, Insight, InsightApplication,
    InsightId,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{InsightError, InsightResult};
use crate::rule::{ConfidenceRule, EwmaRule};

/// Insight store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Learning rate of the default update rule
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Score used when analysis has no insight to draw on
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            default_confidence: default_confidence(),
        }
    }
}

fn default_learning_rate() -> f64 {
    0.2
}

fn default_confidence() -> f64 {
    0.5
}

/// Result of recording or resolving an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecorded {
    pub application: InsightApplication,
    /// Insight after the update
    pub insight: Insight,
    /// Score before the update
    pub previous_score: Confidence,
}

impl ApplicationRecorded {
    pub fn score_changed(&self) -> bool {
        self.previous_score != self.insight.confidence_score
    }
}

#[derive(Debug)]
struct InsightEntry {
    insight: Insight,
    applications: Vec<InsightApplication>,
}

/// Insight confidence store
#[derive(Debug)]
pub struct InsightStore {
    rule: Arc<dyn ConfidenceRule>,
    insights: DashMap<InsightId, Arc<Mutex<InsightEntry>>>,
    application_index: DashMap<ApplicationId, InsightId>,
}

impl InsightStore {
    /// Store using the EWMA rule at the configured learning rate
    pub fn new(config: &InsightConfig) -> InsightResult<Self> {
        let rule = EwmaRule::new(config.learning_rate)?;
        Ok(Self::with_rule(Arc::new(rule)))
    }

    pub fn with_rule(rule: Arc<dyn ConfidenceRule>) -> Self {
        Self {
            rule,
            insights: DashMap::new(),
            application_index: DashMap::new(),
        }
    }

    pub fn rule(&self) -> &dyn ConfidenceRule {
        self.rule.as_ref()
    }

    /// Add an insight from the catalog.
    ///
    /// The catalog's `application_count` is reset: the count always equals
    /// the number of applications held here.
    pub fn register_insight(&self, mut insight: Insight) -> InsightResult<()> {
        insight.application_count = 0;
        match self.insights.entry(insight.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(InsightError::DuplicateInsight(insight.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(insight_id = %insight.id, score = %insight.confidence_score, "Registered insight");
                slot.insert(Arc::new(Mutex::new(InsightEntry {
                    insight,
                    applications: Vec::new(),
                })));
                Ok(())
            }
        }
    }

    pub fn contains(&self, insight_id: &InsightId) -> bool {
        self.insights.contains_key(insight_id)
    }

    pub fn get(&self, insight_id: &InsightId) -> InsightResult<Insight> {
        let entry = self.entry(insight_id)?;
        let insight = entry.lock().insight.clone();
        Ok(insight)
    }

    pub fn list(&self) -> Vec<Insight> {
        let entries: Vec<_> = self.insights.iter().map(|e| e.value().clone()).collect();
        let mut insights: Vec<Insight> = entries.iter().map(|e| e.lock().insight.clone()).collect();
        insights.sort_by(|a, b| a.id.cmp(&b.id));
        insights
    }

    pub fn applications_for(&self, insight_id: &InsightId) -> InsightResult<Vec<InsightApplication>> {
        let entry = self.entry(insight_id)?;
        let applications = entry.lock().applications.clone();
        Ok(applications)
    }

    /// Append an application; resolved outcomes update the score.
    #[instrument(skip(self, insight_id, decision_id), fields(insight_id = %insight_id, decision_id = %decision_id))]
    pub fn record_application(
        &self,
        insight_id: &InsightId,
        decision_id: &DecisionId,
        outcome: ApplicationOutcome,
    ) -> InsightResult<ApplicationRecorded> {
        let entry = self.entry(insight_id)?;
        let now = Utc::now();
        let application = InsightApplication {
            id: ApplicationId::generate(),
            insight_id: insight_id.clone(),
            decision_id: decision_id.clone(),
            outcome,
            recorded_at: now,
            resolved_at: (!outcome.is_pending()).then_some(now),
        };

        let mut guard = entry.lock();
        let previous_score = guard.insight.confidence_score;
        guard.insight.application_count += 1;
        if !outcome.is_pending() {
            guard.insight.confidence_score = self.rule.update(previous_score, outcome);
        }
        guard.insight.updated_at = now;
        guard.applications.push(application.clone());
        self.application_index
            .insert(application.id.clone(), insight_id.clone());

        info!(
            outcome = %outcome,
            previous = %previous_score,
            score = %guard.insight.confidence_score,
            applications = guard.insight.application_count,
            "Recorded insight application"
        );

        Ok(ApplicationRecorded {
            application,
            insight: guard.insight.clone(),
            previous_score,
        })
    }

    /// Move a `pending` application to its final outcome.
    ///
    /// The score is updated here, once. The count is untouched because the
    /// application was already counted when it was recorded.
    #[instrument(skip(self, application_id), fields(application_id = %application_id))]
    pub fn resolve_application(
        &self,
        application_id: &ApplicationId,
        outcome: ApplicationOutcome,
    ) -> InsightResult<ApplicationRecorded> {
        if outcome.is_pending() {
            return Err(InsightError::InvalidInput(
                "cannot resolve an application to pending".to_string(),
            ));
        }
        let insight_id = self
            .application_index
            .get(application_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| InsightError::ApplicationNotFound(application_id.clone()))?;
        let entry = self.entry(&insight_id)?;

        let now = Utc::now();
        let mut guard = entry.lock();
        let position = guard
            .applications
            .iter()
            .position(|a| &a.id == application_id)
            .ok_or_else(|| InsightError::ApplicationNotFound(application_id.clone()))?;

        if !guard.applications[position].outcome.is_pending() {
            return Err(InsightError::InvalidInput(format!(
                "{} already resolved as {}",
                application_id, guard.applications[position].outcome
            )));
        }

        let previous_score = guard.insight.confidence_score;
        guard.insight.confidence_score = self.rule.update(previous_score, outcome);
        guard.insight.updated_at = now;
        let application = &mut guard.applications[position];
        application.outcome = outcome;
        application.resolved_at = Some(now);
        let application = application.clone();

        info!(
            outcome = %outcome,
            previous = %previous_score,
            score = %guard.insight.confidence_score,
            "Resolved pending insight application"
        );

        Ok(ApplicationRecorded {
            application,
            insight: guard.insight.clone(),
            previous_score,
        })
    }

    fn entry(&self, insight_id: &InsightId) -> InsightResult<Arc<Mutex<InsightEntry>>> {
        self.insights
            .get(insight_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| InsightError::InsightNotFound(insight_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_types::{ErrorKind, InsightType};
    use proptest::prelude::*;

    fn store_with(score: f64, alpha: f64) -> (InsightStore, InsightId) {
        let store = InsightStore::new(&InsightConfig {
            learning_rate: alpha,
            default_confidence: 0.5,
        })
        .unwrap();
        let id = InsightId::new("weekend-ctr");
        store
            .register_insight(Insight::new(
                id.clone(),
                InsightType::Timing,
                Confidence::new(score).unwrap(),
            ))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_success_application_updates_score() {
        let (store, id) = store_with(0.6, 0.2);
        let recorded = store
            .record_application(&id, &DecisionId::generate(), ApplicationOutcome::Success)
            .unwrap();
        assert!((recorded.insight.confidence_score.value() - 0.68).abs() < 1e-12);
        assert_eq!(recorded.insight.application_count, 1);
        assert!(recorded.score_changed());
    }

    #[test]
    fn test_pending_counts_but_keeps_score() {
        let (store, id) = store_with(0.6, 0.2);
        let recorded = store
            .record_application(&id, &DecisionId::generate(), ApplicationOutcome::Pending)
            .unwrap();
        assert_eq!(recorded.insight.application_count, 1);
        assert_eq!(recorded.insight.confidence_score.value(), 0.6);
        assert!(recorded.application.resolved_at.is_none());
    }

    #[test]
    fn test_resolve_pending_updates_once() {
        let (store, id) = store_with(0.5, 0.5);
        let recorded = store
            .record_application(&id, &DecisionId::generate(), ApplicationOutcome::Pending)
            .unwrap();

        let resolved = store
            .resolve_application(&recorded.application.id, ApplicationOutcome::Failure)
            .unwrap();
        assert_eq!(resolved.insight.confidence_score.value(), 0.25);
        assert_eq!(resolved.insight.application_count, 1);
        assert!(resolved.application.resolved_at.is_some());

        let err = store
            .resolve_application(&recorded.application.id, ApplicationOutcome::Success)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(store.get(&id).unwrap().confidence_score.value(), 0.25);
    }

    #[test]
    fn test_unknown_ids() {
        let (store, _) = store_with(0.5, 0.2);
        let err = store
            .record_application(
                &InsightId::new("missing"),
                &DecisionId::generate(),
                ApplicationOutcome::Success,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = store
            .resolve_application(&ApplicationId::generate(), ApplicationOutcome::Success)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_catalog_count_is_reset_on_register() {
        let store = InsightStore::new(&InsightConfig::default()).unwrap();
        let mut insight = Insight::new(
            "stale",
            InsightType::OfferResponse,
            Confidence::new(0.4).unwrap(),
        );
        insight.application_count = 42;
        store.register_insight(insight).unwrap();
        assert_eq!(store.get(&InsightId::new("stale")).unwrap().application_count, 0);
    }

    fn outcome_strategy() -> impl Strategy<Value = ApplicationOutcome> {
        prop_oneof![
            Just(ApplicationOutcome::Success),
            Just(ApplicationOutcome::PartialSuccess),
            Just(ApplicationOutcome::Pending),
            Just(ApplicationOutcome::Failure),
        ]
    }

    proptest! {
        #[test]
        fn property_score_bounded_and_count_matches_history(
            start in 0.0f64..=1.0,
            alpha in 0.01f64..=1.0,
            outcomes in proptest::collection::vec(outcome_strategy(), 0..40),
        ) {
            let (store, id) = store_with(start, alpha);
            for outcome in &outcomes {
                store.record_application(&id, &DecisionId::generate(), *outcome).unwrap();
                let insight = store.get(&id).unwrap();
                let score = insight.confidence_score.value();
                prop_assert!((0.0..=1.0).contains(&score));
            }
            let insight = store.get(&id).unwrap();
            let history = store.applications_for(&id).unwrap();
            prop_assert_eq!(insight.application_count as usize, history.len());
            prop_assert_eq!(history.len(), outcomes.len());
        }
    }
}
