//! End-to-end scenarios against the assembled brain

use brain_pipeline::{BrainEvent, BrainSettings, StrategyBrain};
use brain_types::{
    ApplicationOutcome, Approver, BrainMode, Channel, ChannelId, Confidence, DecisionType,
    ErrorKind, HealthStatus, Insight, InsightId, InsightType, Priority, Signal, Stage,
};
use chrono::{Duration, Utc};

fn brain(mode: BrainMode) -> StrategyBrain {
    let brain = StrategyBrain::new(&BrainSettings {
        mode,
        ..Default::default()
    })
    .unwrap();
    brain
        .register_channel(Channel::new("email", 10_000.0, 4_000.0).with_name("Email"))
        .unwrap();
    brain
        .register_channel(Channel::new("paid-search", 20_000.0, 12_500.0))
        .unwrap();
    brain
        .register_insight(Insight::new(
            "weekend-ctr",
            InsightType::Timing,
            Confidence::new(0.6).unwrap(),
        ))
        .unwrap();
    brain
}

#[test]
fn training_mode_never_executes_without_approval() {
    let brain = brain(BrainMode::Training);

    for (priority, confidence) in [
        (Priority::Low, 1.0),
        (Priority::Medium, 0.9),
        (Priority::High, 0.99),
    ] {
        let decision = brain
            .submit_signal(
                Signal::new(DecisionType::ChannelPause)
                    .with_priority(priority)
                    .with_channel("paid-search"),
            )
            .unwrap();
        brain
            .advance_to_analyzing(&decision.id, Confidence::new(confidence).unwrap(), None)
            .unwrap();
        let proposed = brain.propose(&decision.id).unwrap();
        assert_eq!(proposed.stage, Stage::Proposed);
    }

    assert!(brain
        .list_decisions()
        .iter()
        .all(|d| d.stage != Stage::Executing && d.approved_by.is_none()));
    assert_eq!(brain.get_brain_status().approvals_required, 3);
}

#[test]
fn autonomous_holds_low_confidence_high_priority() {
    let brain = brain(BrainMode::Autonomous);
    let decision = brain
        .submit_signal(
            Signal::new(DecisionType::BudgetReallocation)
                .with_priority(Priority::High)
                .with_metric("cpa", 81.5)
                .with_allocation("paid-search", 15_000.0),
        )
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.4).unwrap(), None)
        .unwrap();

    let proposed = brain.propose(&decision.id).unwrap();
    assert_eq!(proposed.stage, Stage::Proposed);
    assert!(proposed.awaiting_approval());
    let channel = brain
        .ledger()
        .get_channel(&ChannelId::new("paid-search"))
        .unwrap();
    assert_eq!(channel.budget.allocated(), 20_000.0);
}

#[test]
fn adjusting_budget_below_spend_fails_the_decision() {
    let brain = brain(BrainMode::Training);
    let err = brain
        .adjust_channel_budget(&ChannelId::new("email"), 3_000.0, "ops")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientRemaining);

    let decisions = brain.list_decisions();
    assert_eq!(decisions.len(), 1);
    let failed = &decisions[0];
    assert_eq!(failed.stage, Stage::Failed);
    assert!(failed.actual_result.is_some());

    let channel = brain.ledger().get_channel(&ChannelId::new("email")).unwrap();
    assert_eq!(channel.budget.allocated(), 10_000.0);
    assert_eq!(channel.budget.remaining(), 6_000.0);
    assert!((channel.budget.utilization_percent() - 40.0).abs() < 1e-9);
}

#[test]
fn success_application_moves_score_by_learning_rate() {
    let brain = brain(BrainMode::Autonomous);
    let decision = brain
        .submit_signal(Signal::new(DecisionType::OfferTesting).informed_by("weekend-ctr"))
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.8).unwrap(), None)
        .unwrap();
    brain.propose(&decision.id).unwrap();

    let completed = brain
        .complete(
            &decision.id,
            "weekend send lifted opens",
            &[(InsightId::new("weekend-ctr"), ApplicationOutcome::Success)],
        )
        .unwrap();
    let insight = &completed.applications[0].insight;
    assert!((insight.confidence_score.value() - 0.68).abs() < 1e-12);
    assert_eq!(insight.application_count, 1);
}

#[test]
fn pending_application_updates_score_once_resolved() {
    let brain = brain(BrainMode::Training);
    let decision = brain
        .submit_signal(Signal::new(DecisionType::OfferEvolution))
        .unwrap();
    let insight_id = InsightId::new("weekend-ctr");

    let pending = brain
        .record_insight_application(&insight_id, &decision.id, ApplicationOutcome::Pending)
        .unwrap();
    assert_eq!(pending.insight.confidence_score.value(), 0.6);

    let resolved = brain
        .resolve_insight_application(&pending.application.id, ApplicationOutcome::Success)
        .unwrap();
    assert!((resolved.insight.confidence_score.value() - 0.68).abs() < 1e-12);
    assert_eq!(resolved.insight.application_count, 1);
}

#[test]
fn unattended_high_priority_proposal_is_escalated_once() {
    let brain = brain(BrainMode::Training);
    let decision = brain
        .submit_signal(
            Signal::new(DecisionType::ChannelPause)
                .with_priority(Priority::High)
                .with_channel("email"),
        )
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.9).unwrap(), None)
        .unwrap();
    brain.propose(&decision.id).unwrap();

    let later = Utc::now() + Duration::seconds(901);
    let first = brain.sweep_escalations(later);
    assert_eq!(first.escalated, vec![decision.id.clone()]);
    let escalated = brain.get_decision(&decision.id).unwrap();
    assert_eq!(escalated.stage, Stage::Escalated);

    let second = brain.sweep_escalations(later + Duration::seconds(30));
    assert!(second.escalated.is_empty());
    assert_eq!(brain.get_decision(&decision.id).unwrap(), escalated);

    let status = brain.get_brain_status();
    assert_eq!(status.escalated_count, 1);
    assert_eq!(status.health_status, HealthStatus::Warning);
}

#[test]
fn double_escalate_yields_one_escalation() {
    let brain = brain(BrainMode::Training);
    let decision = brain
        .submit_signal(Signal::new(DecisionType::ConstraintResponse))
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.3).unwrap(), None)
        .unwrap();

    assert!(brain.escalate(&decision.id, "needs legal review").unwrap());
    assert!(!brain.escalate(&decision.id, "needs legal review").unwrap());

    let history = brain.get_decision(&decision.id).unwrap().history;
    assert_eq!(history.iter().filter(|t| t.to == Stage::Escalated).count(), 1);
}

#[test]
fn mode_switch_does_not_regate_held_decisions() {
    let brain = brain(BrainMode::Training);
    let decision = brain
        .submit_signal(Signal::new(DecisionType::ChannelPause).with_channel("email"))
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.95).unwrap(), None)
        .unwrap();
    brain.propose(&decision.id).unwrap();

    brain.switch_mode(BrainMode::Autonomous);
    let held = brain.get_decision(&decision.id).unwrap();
    assert_eq!(held.stage, Stage::Proposed);

    let executed = brain
        .approve(&decision.id, Approver::human("lee"))
        .unwrap();
    assert_eq!(executed.stage, Stage::Executing);
}

#[test]
fn stale_live_decision_is_flagged_but_left_to_its_caller() {
    let brain = brain(BrainMode::Autonomous);
    let decision = brain
        .submit_signal(
            Signal::new(DecisionType::ChannelPause)
                .with_channel("email")
                .informed_by("weekend-ctr"),
        )
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.9).unwrap(), None)
        .unwrap();
    brain.propose(&decision.id).unwrap();

    let later = Utc::now() + Duration::seconds(301);
    assert_eq!(brain.pipeline().status(later).health_status, HealthStatus::Critical);

    let report = brain.reconcile(later);
    assert_eq!(report.examined, 0);
    assert_eq!(
        brain.get_decision(&decision.id).unwrap().stage,
        Stage::Executing
    );

    // The feedback still lands when the caller finishes
    let completed = brain
        .complete(
            &decision.id,
            "cpa back under target",
            &[(InsightId::new("weekend-ctr"), ApplicationOutcome::Success)],
        )
        .unwrap();
    assert_eq!(completed.decision.stage, Stage::Completed);
    let score = completed.applications[0].insight.confidence_score.value();
    assert!((score - 0.68).abs() < 1e-12);
    assert_eq!(brain.pipeline().status(later).health_status, HealthStatus::Healthy);
}

#[test]
fn approving_an_older_reallocation_after_a_newer_one_fails_it() {
    let brain = brain(BrainMode::Training);
    let mut ids = Vec::new();
    for allocated in [12_000.0, 11_000.0] {
        let decision = brain
            .submit_signal(
                Signal::new(DecisionType::BudgetReallocation).with_allocation("email", allocated),
            )
            .unwrap();
        brain
            .advance_to_analyzing(&decision.id, Confidence::new(0.6).unwrap(), None)
            .unwrap();
        brain.propose(&decision.id).unwrap();
        ids.push(decision.id);
    }

    brain.approve(&ids[1], Approver::human("lee")).unwrap();
    let err = brain.approve(&ids[0], Approver::human("lee")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidChannelState);

    let older = brain.get_decision(&ids[0]).unwrap();
    assert_eq!(older.stage, Stage::Failed);
    assert!(older.actual_result.unwrap().contains("superseded"));
    let email = brain.ledger().get_channel(&ChannelId::new("email")).unwrap();
    assert_eq!(email.budget.allocated(), 11_000.0);
    assert_eq!(email.last_applied_sequence, Some(older.sequence + 1));
}

#[tokio::test]
async fn lifecycle_emits_events() {
    let brain = brain(BrainMode::Supervised);
    let mut events = brain.subscribe();

    let decision = brain
        .submit_signal(Signal::new(DecisionType::CampaignScale).with_allocation("email", 12_000.0))
        .unwrap();
    brain
        .advance_to_analyzing(&decision.id, Confidence::new(0.8).unwrap(), None)
        .unwrap();
    brain.propose(&decision.id).unwrap();

    let mut saw_ledger = false;
    while let Ok(envelope) = events.try_recv() {
        if let BrainEvent::LedgerApplied { receipt, .. } = envelope.event {
            assert_eq!(receipt.changes[0].allocated, 12_000.0);
            saw_ledger = true;
        }
    }
    assert!(saw_ledger);
}
