mod common;

use common::*;
use oris::app_config::JobsConfig;
use oris::jobs::{self, Schedule};
use oris::notifications::NotificationEvent;
use oris::risk::{
    ActingUser, HistoryLog, PlanStatus, Priority, RiskCategory, RiskReport, RiskStatus,
    RiskStore, UserContact, CREATED_COMMENT,
};
use oris::storage::local::LocalStorage;

/// A risk with plans due on each of the given days.
async fn risk_with_plans(h: &Harness, deadlines: &[(u32, u32)]) -> Vec<i32> {
    let risk = h
        .engine
        .create_risk(new_risk("Blocked drain", "Car park", Priority::Medium), REPORTER)
        .await
        .unwrap();
    let mut ids = Vec::new();
    for (m, d) in deadlines {
        let plan = h
            .engine
            .create_action_plan(new_plan(risk.id, date(2030, *m, *d)), ActingUser::user(REPORTER))
            .await
            .unwrap();
        ids.push(plan.id);
    }
    ids
}

#[actix_rt::test]
async fn test_overdue_sweep_notifies_responsible_and_admins() {
    let h = harness();
    let ids = risk_with_plans(&h, &[(6, 5), (6, 10), (6, 1)]).await;
    // A completed plan is never overdue.
    h.engine
        .update_action_plan_status(ids[2], PlanStatus::Completed, None, ActingUser::user(RESPONSIBLE))
        .await
        .unwrap();
    h.notifier.clear();

    let overdue = jobs::overdue_sweep(&h.engine, date(2030, 6, 10)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, ids[0]);

    let mut recipients = h.notifier.recipients_of("actionPlanOverdue");
    recipients.sort();
    assert_eq!(recipients, vec![ADMIN, SECOND_ADMIN, RESPONSIBLE]);

    let (_, event) = &h.notifier.sent()[0];
    match event {
        NotificationEvent::ActionPlanOverdue {
            plan_id,
            days_overdue,
            responsible,
            ..
        } => {
            assert_eq!(*plan_id, ids[0]);
            assert_eq!(*days_overdue, 5);
            assert_eq!(
                responsible.as_ref(),
                Some(&UserContact {
                    id: RESPONSIBLE,
                    name: "Rui Responsible".to_string(),
                    email: "rui.responsible@oris.test".to_string(),
                })
            );
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Sweeps never touch the plans.
    let plan = h.engine.get_action_plan(ids[0]).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Pending);
    assert_eq!(plan.history_logs.len(), 1);
}

#[actix_rt::test]
async fn test_upcoming_sweep_covers_window_inclusive() {
    let h = harness();
    let ids = risk_with_plans(&h, &[(6, 9), (6, 10), (6, 13), (6, 14)]).await;
    h.notifier.clear();

    let upcoming = jobs::upcoming_deadline_sweep(&h.engine, date(2030, 6, 10), 3)
        .await
        .unwrap();
    let found: Vec<i32> = upcoming.iter().map(|p| p.id).collect();
    assert_eq!(found, vec![ids[1], ids[2]]);

    assert_eq!(
        h.notifier.recipients_of("actionPlanDeadlineWarning"),
        vec![RESPONSIBLE, RESPONSIBLE]
    );
    let warnings: Vec<(i64, Option<String>)> = h
        .notifier
        .sent()
        .into_iter()
        .filter_map(|(_, e)| match e {
            NotificationEvent::ActionPlanDeadlineWarning {
                days_remaining,
                risk_title,
                ..
            } => Some((days_remaining, risk_title)),
            _ => None,
        })
        .collect();
    let title = Some("Blocked drain".to_string());
    assert_eq!(warnings, vec![(0, title.clone()), (3, title)]);
}

#[actix_rt::test]
async fn test_sweeps_survive_notification_failures() {
    let h = harness_with(RecordingNotifier::failing());
    risk_with_plans(&h, &[(6, 1)]).await;

    let overdue = jobs::overdue_sweep(&h.engine, date(2030, 6, 10)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(h.notifier.recipients_of("actionPlanOverdue").len(), 3);
}

fn april_risk(day: u32, location: &str) -> RiskReport {
    let created = date(2024, 4, day).and_hms_opt(12, 0, 0).unwrap();
    RiskReport {
        id: 0,
        title: format!("Hazard at {}", location),
        description: "seen during the weekly walk".to_string(),
        category: RiskCategory::Conduct,
        location: location.to_string(),
        priority: Priority::High,
        status: RiskStatus::Open,
        reporter_id: REPORTER,
        assigned_to: None,
        evidence_files: vec![],
        history_logs: vec![HistoryLog::new(RiskStatus::Open, REPORTER, CREATED_COMMENT, created)],
        created_at: created,
        updated_at: created,
    }
}

#[actix_rt::test]
async fn test_monthly_snapshot_exports_previous_month() {
    let h = harness();
    h.store.insert_risk(april_risk(1, "Canteen")).await.unwrap();
    h.store.insert_risk(april_risk(30, "Canteen")).await.unwrap();
    h.store.insert_risk(april_risk(30, "Garage")).await.unwrap();
    let mut may = april_risk(1, "Garage");
    may.created_at = date(2024, 5, 1).and_hms_opt(1, 0, 0).unwrap();
    h.store.insert_risk(may).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let storage =
        LocalStorage::new(dir.path().to_path_buf(), "http://files.test/".to_string()).unwrap();
    let now = date(2024, 5, 1).and_hms_opt(3, 0, 0).unwrap();

    let url = jobs::monthly_snapshot(h.store.as_ref(), &storage, now)
        .await
        .unwrap();
    assert_eq!(url, "http://files.test/reports/report_2024_4.json");

    let body = std::fs::read(dir.path().join("reports/report_2024_4.json")).unwrap();
    let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["period"]["month"], "April");
    assert_eq!(report["period"]["year"], 2024);
    assert_eq!(report["period"]["start_date"], "2024-04-01");
    assert_eq!(report["period"]["end_date"], "2024-04-30");
    assert_eq!(report["summary"]["total_risks"], 3);
    assert_eq!(report["by_location"][0]["key"], "Canteen");
    assert_eq!(report["by_location"][0]["total"], 2);
}

#[actix_rt::test]
async fn test_schedule_runs_each_job_once() {
    let h = harness();
    risk_with_plans(&h, &[(6, 1)]).await;
    h.notifier.clear();

    let dir = tempfile::tempdir().unwrap();
    let storage =
        LocalStorage::new(dir.path().to_path_buf(), "http://files.test".to_string()).unwrap();
    let config = JobsConfig::default();
    let mut schedule = Schedule::default();

    let morning = date(2030, 6, 10).and_hms_opt(9, 0, 0).unwrap();
    schedule.tick(&config, &h.engine, &storage, morning).await;
    assert_eq!(h.notifier.recipients_of("actionPlanOverdue").len(), 3);
    assert!(dir.path().join("reports/report_2030_5.json").exists());

    let evening = date(2030, 6, 10).and_hms_opt(20, 0, 0).unwrap();
    schedule.tick(&config, &h.engine, &storage, evening).await;
    assert_eq!(h.notifier.recipients_of("actionPlanOverdue").len(), 3);
    assert_eq!(schedule.last_daily, Some(date(2030, 6, 10)));
    assert_eq!(schedule.last_monthly, Some((2030, 6)));
}
