//! Read-only rollups over risks and action plans.
//!
//! Each rollup is a pure function over already-loaded records plus an async
//! wrapper that loads them through a [`RiskStore`]. All of them take a
//! creation-date window; an empty window means everything.

use crate::risk::{
    ActionPlan, DateWindow, PlanFilter, PlanStatus, Priority, RiskCategory, RiskFilter,
    RiskReport, RiskStatus, RiskStore,
};
use chrono::Datelike;
use sea_orm::{DbErr, Iterable};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts for one location or category, split by current status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub key: String,
    pub total: u64,
    pub open: u64,
    pub in_treatment: u64,
    pub resolved: u64,
    pub cancelled: u64,
    /// Only filled for location groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<u64>,
}

impl StatusBreakdown {
    fn add(&mut self, risk: &RiskReport) {
        self.total += 1;
        match risk.status {
            RiskStatus::Open => self.open += 1,
            RiskStatus::InTreatment => self.in_treatment += 1,
            RiskStatus::Resolved => self.resolved += 1,
            RiskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolutionTime {
    pub average_resolution_time_days: f64,
    pub total_resolved_risks: u64,
    pub risks_with_valid_history: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Compliance {
    pub total_completed_plans: u64,
    pub on_time_plans: u64,
    pub late_plans: u64,
    pub compliance_rate_percentage: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub month: u32,
    pub count: u64,
    pub resolved: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyEvolution {
    pub year: i32,
    pub months: Vec<MonthBucket>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanTotals {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub total_risks: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub action_plans: PlanTotals,
}

fn sorted_groups(groups: BTreeMap<String, StatusBreakdown>) -> Vec<StatusBreakdown> {
    // BTreeMap yields keys ascending and the sort is stable.
    let mut groups: Vec<StatusBreakdown> = groups.into_values().collect();
    groups.sort_by(|a, b| b.total.cmp(&a.total));
    groups
}

pub fn group_by_location(risks: &[RiskReport]) -> Vec<StatusBreakdown> {
    let mut groups: BTreeMap<String, StatusBreakdown> = BTreeMap::new();
    for risk in risks {
        let group = groups
            .entry(risk.location.clone())
            .or_insert_with(|| StatusBreakdown {
                key: risk.location.clone(),
                critical: Some(0),
                ..Default::default()
            });
        group.add(risk);
        if risk.priority == Priority::Critical {
            *group.critical.get_or_insert(0) += 1;
        }
    }
    sorted_groups(groups)
}

pub fn group_by_category(risks: &[RiskReport]) -> Vec<StatusBreakdown> {
    let mut groups: BTreeMap<String, StatusBreakdown> = BTreeMap::new();
    for risk in risks {
        let key = risk.category.as_str().to_string();
        groups
            .entry(key.clone())
            .or_insert_with(|| StatusBreakdown {
                key,
                ..Default::default()
            })
            .add(risk);
    }
    sorted_groups(groups)
}

/// Mean whole days from creation to first resolution over currently
/// Resolved risks. Risks whose history never reached Resolved are left out
/// of the mean entirely.
pub fn resolution_time(risks: &[RiskReport]) -> ResolutionTime {
    let resolved: Vec<&RiskReport> = risks
        .iter()
        .filter(|r| r.status == RiskStatus::Resolved)
        .collect();
    let days: Vec<i64> = resolved.iter().filter_map(|r| r.resolution_days()).collect();

    let average = if days.is_empty() {
        0.0
    } else {
        days.iter().sum::<i64>() as f64 / days.len() as f64
    };

    ResolutionTime {
        average_resolution_time_days: average,
        total_resolved_risks: resolved.len() as u64,
        risks_with_valid_history: days.len() as u64,
    }
}

/// Share of Completed plans whose first completion timestamp is not after
/// the deadline. A deadline is the midnight that starts its day.
pub fn compliance(plans: &[ActionPlan]) -> Compliance {
    let (mut on_time, mut late) = (0u64, 0u64);
    for plan in plans.iter().filter(|p| p.status == PlanStatus::Completed) {
        if plan.completed_at().is_none() {
            continue;
        }
        if plan.completed_on_time() {
            on_time += 1;
        } else {
            late += 1;
        }
    }

    let total = on_time + late;
    let rate = if total == 0 {
        0.0
    } else {
        on_time as f64 / total as f64 * 100.0
    };

    Compliance {
        total_completed_plans: total,
        on_time_plans: on_time,
        late_plans: late,
        compliance_rate_percentage: rate,
    }
}

/// Twelve buckets of risks created in `year`; `resolved` counts those of
/// them that are Resolved now.
pub fn monthly_evolution(risks: &[RiskReport], year: i32) -> MonthlyEvolution {
    let mut months: Vec<MonthBucket> = (1..=12)
        .map(|month| MonthBucket {
            month,
            ..Default::default()
        })
        .collect();

    for risk in risks.iter().filter(|r| r.created_at.year() == year) {
        let bucket = &mut months[risk.created_at.month0() as usize];
        bucket.count += 1;
        if risk.status == RiskStatus::Resolved {
            bucket.resolved += 1;
        }
    }

    MonthlyEvolution { year, months }
}

fn zeroed<E: Iterable + ToString>() -> BTreeMap<String, u64> {
    E::iter().map(|e| (e.to_string(), 0)).collect()
}

pub fn summary(risks: &[RiskReport], plans: &[ActionPlan]) -> RiskSummary {
    let mut by_status = zeroed::<RiskStatus>();
    let mut by_priority = zeroed::<Priority>();
    let mut by_category = zeroed::<RiskCategory>();
    for risk in risks {
        *by_status.entry(risk.status.to_string()).or_default() += 1;
        *by_priority.entry(risk.priority.to_string()).or_default() += 1;
        *by_category.entry(risk.category.to_string()).or_default() += 1;
    }

    let mut plans_by_status = zeroed::<PlanStatus>();
    for plan in plans {
        *plans_by_status.entry(plan.status.to_string()).or_default() += 1;
    }

    RiskSummary {
        total_risks: risks.len() as u64,
        by_status,
        by_priority,
        by_category,
        action_plans: PlanTotals {
            total: plans.len() as u64,
            by_status: plans_by_status,
        },
    }
}

async fn risks_in(store: &dyn RiskStore, window: DateWindow) -> Result<Vec<RiskReport>, DbErr> {
    store.find_risks(&RiskFilter::created_within(window)).await
}

async fn plans_in(store: &dyn RiskStore, window: DateWindow) -> Result<Vec<ActionPlan>, DbErr> {
    store
        .find_action_plans(&PlanFilter {
            created: window,
            ..Default::default()
        })
        .await
}

pub async fn risks_by_location(
    store: &dyn RiskStore,
    window: DateWindow,
) -> Result<Vec<StatusBreakdown>, DbErr> {
    Ok(group_by_location(&risks_in(store, window).await?))
}

pub async fn risks_by_category(
    store: &dyn RiskStore,
    window: DateWindow,
) -> Result<Vec<StatusBreakdown>, DbErr> {
    Ok(group_by_category(&risks_in(store, window).await?))
}

pub async fn average_resolution_time(
    store: &dyn RiskStore,
    window: DateWindow,
) -> Result<ResolutionTime, DbErr> {
    let filter = RiskFilter {
        status: Some(RiskStatus::Resolved),
        created: window,
        ..Default::default()
    };
    Ok(resolution_time(&store.find_risks(&filter).await?))
}

pub async fn action_plan_compliance(
    store: &dyn RiskStore,
    window: DateWindow,
) -> Result<Compliance, DbErr> {
    let filter = PlanFilter {
        status: Some(PlanStatus::Completed),
        created: window,
        ..Default::default()
    };
    Ok(compliance(&store.find_action_plans(&filter).await?))
}

pub async fn monthly_risk_evolution(
    store: &dyn RiskStore,
    year: i32,
) -> Result<MonthlyEvolution, DbErr> {
    let window = DateWindow::new(
        chrono::NaiveDate::from_ymd_opt(year, 1, 1),
        chrono::NaiveDate::from_ymd_opt(year, 12, 31),
    );
    Ok(monthly_evolution(&risks_in(store, window).await?, year))
}

pub async fn risk_summary(store: &dyn RiskStore, window: DateWindow) -> Result<RiskSummary, DbErr> {
    let risks = risks_in(store, window).await?;
    let plans = plans_in(store, window).await?;
    Ok(summary(&risks, &plans))
}

/// Everything the periodic report carries for one window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rollup {
    pub summary: RiskSummary,
    pub by_location: Vec<StatusBreakdown>,
    pub by_category: Vec<StatusBreakdown>,
    pub resolution_time: ResolutionTime,
    pub compliance: Compliance,
}

pub async fn rollup(store: &dyn RiskStore, window: DateWindow) -> Result<Rollup, DbErr> {
    let risks = risks_in(store, window).await?;
    let plans = plans_in(store, window).await?;
    Ok(Rollup {
        summary: summary(&risks, &plans),
        by_location: group_by_location(&risks),
        by_category: group_by_category(&risks),
        resolution_time: resolution_time(&risks),
        compliance: compliance(&plans),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{HistoryLog, CREATED_COMMENT};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn risk(location: &str, category: RiskCategory, priority: Priority, created: NaiveDateTime) -> RiskReport {
        RiskReport {
            id: 0,
            title: "Exposed wiring".into(),
            description: "Wires hanging from the ceiling".into(),
            category,
            location: location.into(),
            priority,
            status: RiskStatus::Open,
            reporter_id: 1,
            assigned_to: None,
            evidence_files: vec![],
            history_logs: vec![HistoryLog::new(RiskStatus::Open, 1, CREATED_COMMENT, created)],
            created_at: created,
            updated_at: created,
        }
    }

    fn plan(deadline: NaiveDate, completed: Option<NaiveDateTime>) -> ActionPlan {
        let created = at(1, 1, 8);
        let mut plan = ActionPlan {
            id: 0,
            risk_id: 1,
            responsible_id: 2,
            description: "Fix the wiring properly".into(),
            deadline,
            status: PlanStatus::Pending,
            evidence_files: vec![],
            history_logs: vec![HistoryLog::new(PlanStatus::Pending, 2, CREATED_COMMENT, created)],
            created_at: created,
            updated_at: created,
        };
        if let Some(done) = completed {
            plan.push_status(PlanStatus::Completed, 2, "done", done);
        }
        plan
    }

    #[test]
    fn test_location_groups_sorted_by_total_then_name() {
        let mut resolved = risk("Dock", RiskCategory::Other, Priority::Critical, at(1, 2, 8));
        resolved.push_status(RiskStatus::Resolved, 1, "ok", at(1, 3, 8));
        let risks = vec![
            risk("Yard", RiskCategory::Other, Priority::Low, at(1, 1, 8)),
            risk("Dock", RiskCategory::Conduct, Priority::Low, at(1, 1, 8)),
            resolved,
            risk("Annex", RiskCategory::Other, Priority::Low, at(1, 1, 8)),
        ];

        let groups = group_by_location(&risks);
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Dock", "Annex", "Yard"]);
        assert_eq!(groups[0].total, 2);
        assert_eq!(groups[0].open, 1);
        assert_eq!(groups[0].resolved, 1);
        assert_eq!(groups[0].critical, Some(1));

        let by_category = group_by_category(&risks);
        assert_eq!(by_category[0].key, "Other");
        assert_eq!(by_category[0].total, 3);
        assert_eq!(by_category[0].critical, None);
    }

    #[test]
    fn test_resolution_time_skips_risks_without_resolved_entry() {
        let mut two_days = risk("A", RiskCategory::Other, Priority::Low, at(1, 1, 8));
        two_days.push_status(RiskStatus::Resolved, 1, "ok", at(1, 3, 8));
        let mut four_days = risk("A", RiskCategory::Other, Priority::Low, at(1, 1, 8));
        four_days.push_status(RiskStatus::Resolved, 1, "ok", at(1, 4, 9));
        // Status says Resolved but the history was never written.
        let mut no_history = risk("A", RiskCategory::Other, Priority::Low, at(1, 1, 8));
        no_history.status = RiskStatus::Resolved;

        let result = resolution_time(&[two_days, four_days, no_history]);
        assert_eq!(result.total_resolved_risks, 3);
        assert_eq!(result.risks_with_valid_history, 2);
        assert!((result.average_resolution_time_days - 3.0).abs() < 1e-9);

        let empty = resolution_time(&[]);
        assert_eq!(empty.average_resolution_time_days, 0.0);
    }

    #[test]
    fn test_compliance_compares_completion_time_with_deadline_midnight() {
        let deadline = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let plans = vec![
            // later the same day is already late
            plan(deadline, Some(at(1, 10, 23))),
            plan(deadline, Some(at(1, 11, 0))),
            plan(deadline, Some(at(1, 10, 0))),
            plan(deadline, Some(at(1, 5, 12))),
            plan(deadline, None),
        ];

        let result = compliance(&plans);
        assert_eq!(result.total_completed_plans, 4);
        assert_eq!(result.on_time_plans, 2);
        assert_eq!(result.late_plans, 2);
        assert!((result.compliance_rate_percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_evolution_zero_fills() {
        let mut resolved = risk("A", RiskCategory::Other, Priority::Low, at(3, 5, 8));
        resolved.push_status(RiskStatus::Resolved, 1, "ok", at(4, 1, 8));
        let risks = vec![
            resolved,
            risk("A", RiskCategory::Other, Priority::Low, at(3, 9, 8)),
            risk("A", RiskCategory::Other, Priority::Low, at(12, 31, 23)),
        ];

        let evolution = monthly_evolution(&risks, 2024);
        assert_eq!(evolution.months.len(), 12);
        assert_eq!(evolution.months[2], MonthBucket { month: 3, count: 2, resolved: 1 });
        assert_eq!(evolution.months[3], MonthBucket { month: 4, count: 0, resolved: 0 });
        assert_eq!(evolution.months[11].count, 1);
        assert_eq!(monthly_evolution(&risks, 2023).months.iter().map(|m| m.count).sum::<u64>(), 0);
    }

    #[test]
    fn test_summary_lists_every_enum_value() {
        let risks = vec![risk("A", RiskCategory::Conduct, Priority::High, at(1, 1, 8))];
        let plans = vec![plan(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), None)];

        let result = summary(&risks, &plans);
        assert_eq!(result.total_risks, 1);
        assert_eq!(result.by_status.len(), 4);
        assert_eq!(result.by_status["Open"], 1);
        assert_eq!(result.by_status["Cancelled"], 0);
        assert_eq!(result.by_priority["High"], 1);
        assert_eq!(result.by_category["Conduct"], 1);
        assert_eq!(result.action_plans.total, 1);
        assert_eq!(result.action_plans.by_status["Pending"], 1);
        assert_eq!(result.action_plans.by_status["Completed"], 0);
    }
}
