//! Periodic work: deadline sweeps, the monthly report snapshot and the
//! scheduler that drives them.
//!
//! Sweeps only read plans and emit notifications. Overdue is computed from
//! the deadline each time, never stored as a status.

use crate::app_config::{self, JobsConfig};
use crate::db::try_get_db_pool;
use crate::notifications::{deliver, deliver_all, NotificationEvent};
use crate::orm::report_snapshots;
use crate::risk::{ActionPlan, DateWindow, PlanFilter, PlanStatus, RiskEngine, RiskStore};
use crate::stats::{self, Compliance, ResolutionTime, RiskSummary, StatusBreakdown};
use crate::storage::{report_key, ObjectStorage, StorageError};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DbErr};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub enum JobError {
    Database(DbErr),
    Storage(StorageError),
    Encode(serde_json::Error),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Database(e) => write!(f, "database: {}", e),
            JobError::Storage(e) => write!(f, "storage: {}", e),
            JobError::Encode(e) => write!(f, "encoding: {}", e),
        }
    }
}

impl std::error::Error for JobError {}

impl From<DbErr> for JobError {
    fn from(e: DbErr) -> Self {
        JobError::Database(e)
    }
}

impl From<StorageError> for JobError {
    fn from(e: StorageError) -> Self {
        JobError::Storage(e)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        JobError::Encode(e)
    }
}

/// Plans past their deadline and not Completed. Each one is announced to
/// its responsible user and to every administrator.
pub async fn overdue_sweep(engine: &RiskEngine, today: NaiveDate) -> Result<Vec<ActionPlan>, DbErr> {
    let store = engine.store();
    let plans = store
        .find_action_plans(&PlanFilter {
            status_not: Some(PlanStatus::Completed),
            deadline_before: Some(today),
            ..Default::default()
        })
        .await?;

    let admins = match store.admin_ids().await {
        Ok(admins) => admins,
        Err(e) => {
            log::warn!("Overdue sweep could not look up administrators: {}", e);
            Vec::new()
        }
    };

    for plan in &plans {
        let responsible = match store.user_contact(plan.responsible_id).await {
            Ok(contact) => contact,
            Err(e) => {
                log::warn!("Could not load responsible user {}: {}", plan.responsible_id, e);
                None
            }
        };
        let event = NotificationEvent::ActionPlanOverdue {
            plan_id: plan.id,
            risk_id: plan.risk_id,
            description: plan.description.clone(),
            deadline: plan.deadline,
            days_overdue: (today - plan.deadline).num_days(),
            responsible,
        };
        deliver(engine.notifier(), plan.responsible_id, event.clone()).await;
        deliver_all(engine.notifier(), &admins, &event).await;
    }

    log::info!("Overdue sweep for {}: {} plan(s) found", today, plans.len());
    Ok(plans)
}

/// Plans due within `[today, today + window_days]` and not Completed. Only
/// the responsible user is told.
pub async fn upcoming_deadline_sweep(
    engine: &RiskEngine,
    today: NaiveDate,
    window_days: i64,
) -> Result<Vec<ActionPlan>, DbErr> {
    let plans = engine
        .store()
        .find_action_plans(&PlanFilter {
            status_not: Some(PlanStatus::Completed),
            deadline_from: Some(today),
            deadline_to: Some(today + Duration::days(window_days)),
            ..Default::default()
        })
        .await?;

    let mut titles: HashMap<i32, Option<String>> = HashMap::new();
    for plan in &plans {
        if !titles.contains_key(&plan.risk_id) {
            let title = match engine.store().find_risk(plan.risk_id).await {
                Ok(risk) => risk.map(|r| r.title),
                Err(e) => {
                    log::warn!("Could not load risk {} for its title: {}", plan.risk_id, e);
                    None
                }
            };
            titles.insert(plan.risk_id, title);
        }

        let event = NotificationEvent::ActionPlanDeadlineWarning {
            plan_id: plan.id,
            risk_id: plan.risk_id,
            risk_title: titles.get(&plan.risk_id).cloned().flatten(),
            description: plan.description.clone(),
            deadline: plan.deadline,
            days_remaining: (plan.deadline - today).num_days(),
        };
        deliver(engine.notifier(), plan.responsible_id, event).await;
    }

    log::info!(
        "Upcoming deadline sweep for {}: {} plan(s) found",
        today,
        plans.len()
    );
    Ok(plans)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub month: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// The point-in-time document exported once a month.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub period: ReportPeriod,
    pub summary: RiskSummary,
    pub by_location: Vec<StatusBreakdown>,
    pub by_category: Vec<StatusBreakdown>,
    pub resolution_time: ResolutionTime,
    pub action_plan_compliance: Compliance,
    pub generated_at: NaiveDateTime,
}

/// First and last day of the calendar month before `today`.
pub fn previous_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first_of_this = today.with_day(1).unwrap_or(today);
    let last = first_of_this.pred_opt().unwrap_or(first_of_this);
    let first = last.with_day(1).unwrap_or(last);
    (first, last)
}

pub async fn build_monthly_report(
    store: &dyn RiskStore,
    now: NaiveDateTime,
) -> Result<MonthlyReport, DbErr> {
    let (start_date, end_date) = previous_month(now.date());
    let rollup = stats::rollup(store, DateWindow::new(Some(start_date), Some(end_date))).await?;

    Ok(MonthlyReport {
        period: ReportPeriod {
            month: start_date.format("%B").to_string(),
            year: start_date.year(),
            start_date,
            end_date,
        },
        summary: rollup.summary,
        by_location: rollup.by_location,
        by_category: rollup.by_category,
        resolution_time: rollup.resolution_time,
        action_plan_compliance: rollup.compliance,
        generated_at: now,
    })
}

async fn export_monthly_report(
    store: &dyn RiskStore,
    storage: &dyn ObjectStorage,
    now: NaiveDateTime,
) -> Result<String, JobError> {
    let report = build_monthly_report(store, now).await?;
    let (year, month) = (report.period.start_date.year(), report.period.start_date.month());
    let document = serde_json::to_value(&report)?;
    let body = serde_json::to_vec_pretty(&document)?;

    let url = storage
        .upload(body, &report_key(year, month), "application/json")
        .await?;

    if let Some(db) = try_get_db_pool() {
        report_snapshots::ActiveModel {
            year: Set(year),
            month: Set(month as i32),
            url: Set(url.clone()),
            document: Set(document),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    Ok(url)
}

/// Exports the previous month's report. Failures are logged and dropped.
pub async fn monthly_snapshot(
    store: &dyn RiskStore,
    storage: &dyn ObjectStorage,
    now: NaiveDateTime,
) -> Option<String> {
    match export_monthly_report(store, storage, now).await {
        Ok(url) => {
            log::info!("Monthly report exported: {}", url);
            Some(url)
        }
        Err(e) => {
            log::error!("Monthly report export failed: {}", e);
            None
        }
    }
}

/// Whether the daily sweeps should run at `now`.
pub fn daily_due(last_run: Option<NaiveDate>, now: NaiveDateTime, hour: u32) -> bool {
    now.hour() >= hour && last_run != Some(now.date())
}

/// Whether the monthly snapshot should run at `now`. A run missed on the
/// configured day is caught up later in the same month.
pub fn monthly_due(last_run: Option<(i32, u32)>, now: NaiveDateTime, day: u32, hour: u32) -> bool {
    (now.day(), now.hour()) >= (day, hour) && last_run != Some((now.year(), now.month()))
}

/// In-memory record of what already ran.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    pub last_daily: Option<NaiveDate>,
    pub last_monthly: Option<(i32, u32)>,
}

impl Schedule {
    pub async fn tick(
        &mut self,
        config: &JobsConfig,
        engine: &RiskEngine,
        storage: &dyn ObjectStorage,
        now: NaiveDateTime,
    ) {
        if daily_due(self.last_daily, now, config.daily_hour) {
            self.last_daily = Some(now.date());
            if let Err(e) = overdue_sweep(engine, now.date()).await {
                log::error!("Overdue sweep failed: {}", e);
            }
            if let Err(e) =
                upcoming_deadline_sweep(engine, now.date(), config.upcoming_window_days).await
            {
                log::error!("Upcoming deadline sweep failed: {}", e);
            }
        }

        if monthly_due(self.last_monthly, now, config.monthly_day, config.monthly_hour) {
            self.last_monthly = Some((now.year(), now.month()));
            monthly_snapshot(engine.store(), storage, now).await;
        }
    }
}

/// Runs the scheduler on the actix runtime, along with rate limiter cleanup.
pub fn spawn_scheduler(engine: Arc<RiskEngine>, storage: Arc<dyn ObjectStorage>) {
    let config = app_config::jobs();
    if !config.enabled {
        log::info!("Scheduled jobs are disabled");
        return;
    }

    actix_web::rt::spawn(async move {
        let mut schedule = Schedule::default();
        let mut interval =
            actix_web::rt::time::interval(std::time::Duration::from_secs(config.tick_seconds.max(1)));
        loop {
            interval.tick().await;
            schedule
                .tick(&config, &engine, storage.as_ref(), Utc::now().naive_utc())
                .await;
            crate::rate_limit::cleanup();
            log::debug!("Scheduler tick completed");
        }
    });
}
