mod common;

use common::*;
use oris::error::ServiceError;
use oris::notifications::NotificationEvent;
use oris::risk::{
    ActingUser, Paging, PlanChanges, PlanStatus, Priority, RiskChanges, RiskFilter, RiskSort,
    RiskStatus, RiskStore, SortOrder, CASCADE_COMMENT, CREATED_COMMENT, FIRST_PLAN_COMMENT,
};

#[actix_rt::test]
async fn test_new_risk_is_open_with_creation_entry() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Wet floor", "Warehouse", Priority::Low), REPORTER)
        .await
        .unwrap();

    assert_eq!(risk.status, RiskStatus::Open);
    assert_eq!(risk.history_logs.len(), 1);
    assert_eq!(risk.history_logs[0].status, RiskStatus::Open);
    assert_eq!(risk.history_logs[0].updated_by, REPORTER);
    assert_eq!(risk.history_logs[0].comment, CREATED_COMMENT);
    assert!(h.notifier.sent().is_empty());
}

#[actix_rt::test]
async fn test_invalid_risk_is_rejected_and_not_stored() {
    let h = harness();
    let mut input = new_risk("Wet floor", "Warehouse", Priority::Low);
    input.title = "Wet".to_string();
    input.location = "  ".to_string();

    match h.engine.create_risk(input, REPORTER).await {
        Err(ServiceError::Validation(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["location", "title"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    let all = h.store.find_risks(&RiskFilter::default()).await.unwrap();
    assert!(all.is_empty());
}

#[actix_rt::test]
async fn test_critical_risk_notifies_every_admin() {
    let h = harness();
    h.engine
        .create_risk(new_risk("Exposed wiring", "Plant B", Priority::Critical), REPORTER)
        .await
        .unwrap();

    let mut recipients = h.notifier.recipients_of("newCriticalRisk");
    recipients.sort();
    assert_eq!(recipients, vec![ADMIN, SECOND_ADMIN]);
}

#[actix_rt::test]
async fn test_failed_notifications_do_not_fail_the_write() {
    let h = harness_with(RecordingNotifier::failing());
    let risk = h
        .engine
        .create_risk(new_risk("Exposed wiring", "Plant B", Priority::Critical), REPORTER)
        .await
        .unwrap();

    assert_eq!(h.notifier.sent().len(), 2);
    assert!(h.store.find_risk(risk.id).await.unwrap().is_some());
}

#[actix_rt::test]
async fn test_first_plan_moves_risk_to_treatment_once() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Loose railing", "Stairs", Priority::High), REPORTER)
        .await
        .unwrap();

    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), ActingUser::user(REPORTER))
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Pending);
    assert_eq!(plan.history_logs.len(), 1);
    assert_eq!(plan.history_logs[0].updated_by, RESPONSIBLE);
    assert_eq!(plan.history_logs[0].comment, CREATED_COMMENT);

    let risk = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk.status, RiskStatus::InTreatment);
    assert_eq!(risk.history_logs.len(), 2);
    assert_eq!(risk.history_logs[1].comment, FIRST_PLAN_COMMENT);

    h.engine
        .create_action_plan(new_plan(risk.id, date(2030, 2, 10)), ActingUser::user(REPORTER))
        .await
        .unwrap();
    let detail = h.engine.get_risk(risk.id).await.unwrap();
    assert_eq!(detail.risk.history_logs.len(), 2);
    assert_eq!(detail.action_plans.len(), 2);
}

#[actix_rt::test]
async fn test_plan_for_missing_risk_is_not_found() {
    let h = harness();
    let result = h
        .engine
        .create_action_plan(new_plan(99, date(2030, 1, 10)), ActingUser::user(REPORTER))
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}

#[actix_rt::test]
async fn test_completing_last_plan_resolves_risk() {
    let h = harness();
    let mut input = new_risk("Blocked exit", "Hall 2", Priority::Medium);
    input.assigned_to = Some(ASSIGNEE);
    let risk = h.engine.create_risk(input, REPORTER).await.unwrap();
    let actor = ActingUser::user(RESPONSIBLE);

    let first = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), actor)
        .await
        .unwrap();
    let second = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 20)), actor)
        .await
        .unwrap();

    h.engine
        .update_action_plan_status(first.id, PlanStatus::Completed, None, actor)
        .await
        .unwrap();
    let risk_now = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk_now.status, RiskStatus::InTreatment);

    h.engine
        .update_action_plan_status(second.id, PlanStatus::InProgress, Some("started".into()), actor)
        .await
        .unwrap();
    h.engine
        .update_action_plan_status(second.id, PlanStatus::Completed, None, actor)
        .await
        .unwrap();

    let resolved = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(resolved.status, RiskStatus::Resolved);
    let last = resolved.history_logs.last().unwrap();
    assert_eq!(last.status, RiskStatus::Resolved);
    assert_eq!(last.comment, CASCADE_COMMENT);
    assert_eq!(last.updated_by, RESPONSIBLE);

    assert_eq!(h.notifier.recipients_of("riskStatusChanged"), vec![ASSIGNEE]);
}

#[actix_rt::test]
async fn test_general_plan_update_also_cascades() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Broken ladder", "Store room", Priority::Low), REPORTER)
        .await
        .unwrap();
    let actor = ActingUser::user(RESPONSIBLE);
    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), actor)
        .await
        .unwrap();

    let changes = PlanChanges {
        status: Some(PlanStatus::Completed),
        comment: Some("ladder replaced".into()),
        ..Default::default()
    };
    let plan = h.engine.update_action_plan(plan.id, changes, actor).await.unwrap();
    assert_eq!(plan.history_logs.last().unwrap().comment, "ladder replaced");

    let risk = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk.status, RiskStatus::Resolved);
}

#[actix_rt::test]
async fn test_cascade_skips_already_resolved_risk() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Broken ladder", "Store room", Priority::Low), REPORTER)
        .await
        .unwrap();
    let actor = ActingUser::user(RESPONSIBLE);
    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), actor)
        .await
        .unwrap();
    h.engine
        .update_risk_status(risk.id, RiskStatus::Resolved, Some("handled on site".into()), actor)
        .await
        .unwrap();
    let before = h.engine.get_risk(risk.id).await.unwrap().risk.history_logs.len();

    h.engine
        .update_action_plan_status(plan.id, PlanStatus::Completed, None, actor)
        .await
        .unwrap();

    let after = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(after.status, RiskStatus::Resolved);
    assert_eq!(after.history_logs.len(), before);
}

#[actix_rt::test]
async fn test_cascade_failure_keeps_plan_completed() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Gas smell", "Kitchen", Priority::High), REPORTER)
        .await
        .unwrap();
    let actor = ActingUser::user(RESPONSIBLE);
    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), actor)
        .await
        .unwrap();

    h.store.fail_risk_writes(true);
    let plan = h
        .engine
        .update_action_plan_status(plan.id, PlanStatus::Completed, None, actor)
        .await
        .unwrap();
    h.store.fail_risk_writes(false);

    assert_eq!(plan.status, PlanStatus::Completed);
    let stored_plan = h.engine.get_action_plan(plan.id).await.unwrap();
    assert_eq!(stored_plan.status, PlanStatus::Completed);
    let risk = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk.status, RiskStatus::InTreatment);
}

#[actix_rt::test]
async fn test_first_plan_transition_failure_keeps_plan() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Gas smell", "Kitchen", Priority::High), REPORTER)
        .await
        .unwrap();

    h.store.fail_risk_writes(true);
    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), ActingUser::user(REPORTER))
        .await
        .unwrap();
    h.store.fail_risk_writes(false);

    assert!(h.engine.get_action_plan(plan.id).await.is_ok());
    let risk = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk.status, RiskStatus::Open);
    assert_eq!(risk.history_logs.len(), 1);
}

#[actix_rt::test]
async fn test_status_change_appends_entry_with_default_comment() {
    let h = harness();
    let mut input = new_risk("Noise", "Workshop", Priority::Medium);
    input.assigned_to = Some(ASSIGNEE);
    let risk = h.engine.create_risk(input, REPORTER).await.unwrap();

    let risk = h
        .engine
        .update_risk_status(risk.id, RiskStatus::Cancelled, None, ActingUser::admin(ADMIN))
        .await
        .unwrap();
    assert_eq!(risk.status, RiskStatus::Cancelled);
    let last = risk.history_logs.last().unwrap();
    assert_eq!(last.status, RiskStatus::Cancelled);
    assert_eq!(last.updated_by, ADMIN);
    assert_eq!(last.comment, "status changed to Cancelled");
    assert_eq!(h.notifier.recipients_of("riskStatusChanged"), vec![ASSIGNEE]);

    // Same status again is a no-op.
    let again = h
        .engine
        .update_risk_status(risk.id, RiskStatus::Cancelled, None, ActingUser::admin(ADMIN))
        .await
        .unwrap();
    assert_eq!(again.history_logs.len(), 2);
}

#[actix_rt::test]
async fn test_short_status_comment_is_rejected() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Noise", "Workshop", Priority::Medium), REPORTER)
        .await
        .unwrap();
    let result = h
        .engine
        .update_risk_status(risk.id, RiskStatus::Resolved, Some("ok".into()), ActingUser::user(REPORTER))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
    let stored = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(stored.status, RiskStatus::Open);
}

#[actix_rt::test]
async fn test_padded_comment_is_judged_by_its_trimmed_text() {
    let h = harness();
    let actor = ActingUser::user(REPORTER);
    let risk = h
        .engine
        .create_risk(new_risk("Loose cable", "Office", Priority::Low), REPORTER)
        .await
        .unwrap();
    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 1)), ActingUser::user(RESPONSIBLE))
        .await
        .unwrap();

    let padded = Some(" a  ".to_string());
    let by_update = h
        .engine
        .update_risk(
            risk.id,
            RiskChanges {
                status: Some(RiskStatus::Cancelled),
                comment: padded.clone(),
                ..Default::default()
            },
            actor,
        )
        .await;
    let by_status = h
        .engine
        .update_risk_status(risk.id, RiskStatus::Cancelled, padded.clone(), actor)
        .await;
    let by_plan_update = h
        .engine
        .update_action_plan(
            plan.id,
            PlanChanges {
                status: Some(PlanStatus::InProgress),
                comment: padded.clone(),
                ..Default::default()
            },
            actor,
        )
        .await;
    let by_plan_status = h
        .engine
        .update_action_plan_status(plan.id, PlanStatus::InProgress, padded, actor)
        .await;
    for result in [
        by_update.map(|_| ()),
        by_status.map(|_| ()),
        by_plan_update.map(|_| ()),
        by_plan_status.map(|_| ()),
    ] {
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    let updated = h
        .engine
        .update_risk(
            risk.id,
            RiskChanges {
                status: Some(RiskStatus::Cancelled),
                comment: Some("  dup  ".to_string()),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(updated.status, RiskStatus::Cancelled);
    assert_eq!(updated.history_logs.last().unwrap().comment, "dup");
}

#[actix_rt::test]
async fn test_reclassification_to_critical_notifies_admins() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Cracked beam", "Depot", Priority::Medium), REPORTER)
        .await
        .unwrap();

    let changes = RiskChanges {
        priority: Some(Priority::Critical),
        ..Default::default()
    };
    h.engine
        .update_risk(risk.id, changes.clone(), ActingUser::user(REPORTER))
        .await
        .unwrap();
    assert_eq!(h.notifier.recipients_of("riskReclassifiedAsCritical").len(), 2);

    // Already critical: no second round.
    h.engine
        .update_risk(risk.id, changes, ActingUser::user(REPORTER))
        .await
        .unwrap();
    assert_eq!(h.notifier.recipients_of("riskReclassifiedAsCritical").len(), 2);

    let (_, event) = &h.notifier.sent()[0];
    match event {
        NotificationEvent::RiskReclassifiedAsCritical { risk_id, updated_by, .. } => {
            assert_eq!(*risk_id, risk.id);
            assert_eq!(*updated_by, REPORTER);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[actix_rt::test]
async fn test_status_always_matches_last_history_entry() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Slippery ramp", "Dock", Priority::Low), REPORTER)
        .await
        .unwrap();
    let actor = ActingUser::user(REPORTER);

    let plan = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), actor)
        .await
        .unwrap();
    h.engine
        .update_risk(
            risk.id,
            RiskChanges {
                status: Some(RiskStatus::Open),
                comment: Some("reopened for review".into()),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();
    h.engine
        .update_action_plan_status(plan.id, PlanStatus::Completed, None, actor)
        .await
        .unwrap();

    let risk = h.engine.get_risk(risk.id).await.unwrap().risk;
    assert_eq!(risk.status, risk.history_logs.last().unwrap().status);
    assert_eq!(risk.status, RiskStatus::Resolved);
    let plan = h.engine.get_action_plan(plan.id).await.unwrap();
    assert_eq!(plan.status, plan.history_logs.last().unwrap().status);
}

#[actix_rt::test]
async fn test_delete_guards() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Falling tiles", "Roof", Priority::High), REPORTER)
        .await
        .unwrap();

    let result = h.engine.delete_risk(risk.id, ActingUser::user(REPORTER)).await;
    assert!(matches!(result, Err(ServiceError::Forbidden)));

    let result = h.engine.delete_risk(999, ActingUser::admin(ADMIN)).await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));

    h.engine
        .create_action_plan(new_plan(risk.id, date(2030, 1, 10)), ActingUser::user(REPORTER))
        .await
        .unwrap();
    let result = h.engine.delete_risk(risk.id, ActingUser::admin(ADMIN)).await;
    assert!(matches!(result, Err(ServiceError::ReferentialIntegrity(_))));
    assert!(h.store.find_risk(risk.id).await.unwrap().is_some());
}

#[actix_rt::test]
async fn test_delete_risk_without_plans() {
    let h = harness();
    let risk = h
        .engine
        .create_risk(new_risk("Falling tiles", "Roof", Priority::High), REPORTER)
        .await
        .unwrap();
    h.engine
        .delete_risk(risk.id, ActingUser::admin(ADMIN))
        .await
        .unwrap();
    assert!(matches!(
        h.engine.get_risk(risk.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[actix_rt::test]
async fn test_list_risks_filters_and_pages() {
    let h = harness();
    for (title, location, priority) in [
        ("Wet floor", "Warehouse North", Priority::Low),
        ("Loose cable", "warehouse south", Priority::High),
        ("Broken glass", "Office", Priority::High),
    ] {
        h.engine
            .create_risk(new_risk(title, location, priority), REPORTER)
            .await
            .unwrap();
    }

    let filter = RiskFilter {
        location: Some("WAREHOUSE".into()),
        ..Default::default()
    };
    let listing = h
        .engine
        .list_risks(&filter, RiskSort::Title, SortOrder::Asc, Paging { page: 1, limit: 10 })
        .await
        .unwrap();
    let titles: Vec<_> = listing.items.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Loose cable", "Wet floor"]);

    let filter = RiskFilter {
        priority: Some(Priority::High),
        ..Default::default()
    };
    let listing = h
        .engine
        .list_risks(&filter, RiskSort::Title, SortOrder::Desc, Paging { page: 2, limit: 1 })
        .await
        .unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(listing.pages, 2);
    assert_eq!(listing.items[0].title, "Broken glass");
}
