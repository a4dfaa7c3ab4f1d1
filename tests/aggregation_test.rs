mod common;

use chrono::{Datelike, NaiveDateTime, Utc};
use common::*;
use oris::risk::{
    ActingUser, DateWindow, HistoryLog, PlanStatus, Priority, RiskCategory, RiskReport,
    RiskStatus, RiskStore, CREATED_COMMENT,
};
use oris::stats;

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(10, 0, 0).unwrap()
}

/// A risk created at `created` and, optionally, resolved at `resolved`.
fn stored_risk(location: &str, created: NaiveDateTime, resolved: Option<NaiveDateTime>) -> RiskReport {
    let mut risk = RiskReport {
        id: 0,
        title: format!("Hazard at {}", location),
        description: "seen during the weekly walk".to_string(),
        category: RiskCategory::Environmental,
        location: location.to_string(),
        priority: Priority::Medium,
        status: RiskStatus::Open,
        reporter_id: REPORTER,
        assigned_to: None,
        evidence_files: vec![],
        history_logs: vec![HistoryLog::new(RiskStatus::Open, REPORTER, CREATED_COMMENT, created)],
        created_at: created,
        updated_at: created,
    };
    if let Some(resolved) = resolved {
        risk.push_status(RiskStatus::Resolved, ADMIN, "fixed", resolved);
    }
    risk
}

#[actix_rt::test]
async fn test_groups_by_location_and_category() {
    let h = harness();
    let actor = ActingUser::user(REPORTER);
    for (location, priority) in [
        ("Dock", Priority::Critical),
        ("Dock", Priority::Low),
        ("Lab", Priority::High),
    ] {
        h.engine
            .create_risk(new_risk("Spilled oil", location, priority), REPORTER)
            .await
            .unwrap();
    }
    let lab = h
        .engine
        .list_risks(
            &oris::risk::RiskFilter {
                location: Some("Lab".into()),
                ..Default::default()
            },
            Default::default(),
            Default::default(),
            Default::default(),
        )
        .await
        .unwrap()
        .items
        .remove(0);
    h.engine
        .update_risk_status(lab.id, RiskStatus::Cancelled, None, actor)
        .await
        .unwrap();

    let groups = stats::risks_by_location(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, "Dock");
    assert_eq!(groups[0].total, 2);
    assert_eq!(groups[0].open, 2);
    assert_eq!(groups[0].critical, Some(1));
    assert_eq!(groups[1].key, "Lab");
    assert_eq!(groups[1].cancelled, 1);
    assert_eq!(groups[1].critical, Some(0));

    let categories = stats::risks_by_category(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].key, "Infrastructure");
    assert_eq!(categories[0].total, 3);
    assert_eq!(categories[0].critical, None);
}

#[actix_rt::test]
async fn test_window_end_day_is_inclusive() {
    let h = harness();
    for created in [at(2024, 3, 1), at(2024, 3, 31), at(2024, 4, 1)] {
        h.store.insert_risk(stored_risk("Yard", created, None)).await.unwrap();
    }

    let march = DateWindow::new(Some(date(2024, 3, 1)), Some(date(2024, 3, 31)));
    let groups = stats::risks_by_location(h.store.as_ref(), march).await.unwrap();
    assert_eq!(groups[0].total, 2);

    let summary = stats::risk_summary(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(summary.total_risks, 3);
    assert_eq!(summary.by_status["Open"], 3);
    assert_eq!(summary.by_status["Resolved"], 0);
    assert_eq!(summary.action_plans.total, 0);
}

#[actix_rt::test]
async fn test_average_resolution_time() {
    let h = harness();
    let store = h.store.as_ref();
    store
        .insert_risk(stored_risk("A", at(2024, 1, 1), Some(at(2024, 1, 5))))
        .await
        .unwrap();
    store
        .insert_risk(stored_risk("B", at(2024, 1, 10), Some(at(2024, 1, 12))))
        .await
        .unwrap();
    store
        .insert_risk(stored_risk("C", at(2024, 1, 10), Some(at(2024, 1, 11))))
        .await
        .unwrap();
    // Resolved without any Resolved entry in its history.
    let mut odd = stored_risk("D", at(2024, 1, 3), None);
    odd.status = RiskStatus::Resolved;
    store.insert_risk(odd).await.unwrap();
    store.insert_risk(stored_risk("E", at(2024, 1, 3), None)).await.unwrap();

    let result = stats::average_resolution_time(store, DateWindow::default())
        .await
        .unwrap();
    assert_eq!(result.total_resolved_risks, 4);
    assert_eq!(result.risks_with_valid_history, 3);
    assert!((result.average_resolution_time_days - 7.0 / 3.0).abs() < 1e-9);
}

#[actix_rt::test]
async fn test_resolution_time_is_idempotent() {
    let h = harness();
    let store = h.store.as_ref();
    for (location, created, resolved) in [
        ("A", at(2024, 2, 1), Some(at(2024, 2, 4))),
        ("B", at(2024, 2, 10), Some(at(2024, 2, 11))),
        ("C", at(2024, 2, 12), None),
        ("D", at(2024, 3, 2), Some(at(2024, 3, 9))),
    ] {
        store
            .insert_risk(stored_risk(location, created, resolved))
            .await
            .unwrap();
    }

    let february = DateWindow::new(Some(date(2024, 2, 1)), Some(date(2024, 2, 29)));
    let first = stats::average_resolution_time(store, february).await.unwrap();
    let second = stats::average_resolution_time(store, february).await.unwrap();

    assert_eq!(first.total_resolved_risks, 2);
    assert_eq!(first.total_resolved_risks, second.total_resolved_risks);
    assert_eq!(first.risks_with_valid_history, second.risks_with_valid_history);
    assert!((first.average_resolution_time_days - second.average_resolution_time_days).abs() < 1e-9);
    assert!((first.average_resolution_time_days - 2.0).abs() < 1e-9);
}

#[actix_rt::test]
async fn test_resolution_time_without_resolved_risks_is_zero() {
    let h = harness();
    h.store
        .insert_risk(stored_risk("A", at(2024, 1, 1), None))
        .await
        .unwrap();
    let result = stats::average_resolution_time(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(result.average_resolution_time_days, 0.0);
    assert_eq!(result.total_resolved_risks, 0);
}

#[actix_rt::test]
async fn test_action_plan_compliance() {
    let h = harness();
    let actor = ActingUser::user(RESPONSIBLE);
    let risk = h
        .engine
        .create_risk(new_risk("Leaking pipe", "Basement", Priority::High), REPORTER)
        .await
        .unwrap();

    // Completion happens today, so a deadline in the past makes it late.
    let on_time = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2099, 1, 1)), actor)
        .await
        .unwrap();
    let late = h
        .engine
        .create_action_plan(new_plan(risk.id, date(2020, 1, 1)), actor)
        .await
        .unwrap();
    h.engine
        .create_action_plan(new_plan(risk.id, date(2099, 1, 1)), actor)
        .await
        .unwrap();

    for plan in [&on_time, &late] {
        h.engine
            .update_action_plan_status(plan.id, PlanStatus::Completed, None, actor)
            .await
            .unwrap();
    }

    let result = stats::action_plan_compliance(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(result.total_completed_plans, 2);
    assert_eq!(result.on_time_plans, 1);
    assert_eq!(result.late_plans, 1);
    assert!((result.compliance_rate_percentage - 50.0).abs() < 1e-9);

    let summary = stats::risk_summary(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(summary.action_plans.total, 3);
    assert_eq!(summary.action_plans.by_status["Completed"], 2);
    assert_eq!(summary.action_plans.by_status["Pending"], 1);
    assert_eq!(summary.action_plans.by_status["InProgress"], 0);
}

#[actix_rt::test]
async fn test_compliance_without_completed_plans_is_zero() {
    let h = harness();
    let result = stats::action_plan_compliance(h.store.as_ref(), DateWindow::default())
        .await
        .unwrap();
    assert_eq!(result.total_completed_plans, 0);
    assert_eq!(result.compliance_rate_percentage, 0.0);
}

#[actix_rt::test]
async fn test_monthly_evolution() {
    let h = harness();
    let store = h.store.as_ref();
    store
        .insert_risk(stored_risk("A", at(2023, 2, 1), Some(at(2023, 3, 1))))
        .await
        .unwrap();
    store.insert_risk(stored_risk("B", at(2023, 2, 20), None)).await.unwrap();
    store.insert_risk(stored_risk("C", at(2023, 12, 31), None)).await.unwrap();
    store.insert_risk(stored_risk("D", at(2024, 1, 1), None)).await.unwrap();

    let evolution = stats::monthly_risk_evolution(store, 2023).await.unwrap();
    assert_eq!(evolution.year, 2023);
    assert_eq!(evolution.months.len(), 12);
    assert_eq!(evolution.months[1].month, 2);
    assert_eq!(evolution.months[1].count, 2);
    assert_eq!(evolution.months[1].resolved, 1);
    assert_eq!(evolution.months[2].count, 0);
    assert_eq!(evolution.months[11].count, 1);
    let total: u64 = evolution.months.iter().map(|m| m.count).sum();
    assert_eq!(total, 3);
}

#[actix_rt::test]
async fn test_rollup_of_current_month_sees_engine_writes() {
    let h = harness();
    h.engine
        .create_risk(new_risk("Frayed cable", "Office", Priority::Low), REPORTER)
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let window = DateWindow::new(today.with_day(1), Some(today));
    let rollup = stats::rollup(h.store.as_ref(), window).await.unwrap();
    assert_eq!(rollup.summary.total_risks, 1);
    assert_eq!(rollup.by_location[0].key, "Office");
    assert_eq!(rollup.summary.by_priority["Low"], 1);
}
