//! Occupational risk reports, their action plans and the lifecycle rules
//! binding the two.
//!
//! Both entities carry an append-only `history_logs` audit trail. The
//! top-level `status` always equals the status of the last history entry;
//! the only way to change a status is [`RiskReport::push_status`] or
//! [`ActionPlan::push_status`], which keep the two in step.

pub mod engine;
pub mod store;

pub use crate::orm::action_plans::PlanStatus;
pub use crate::orm::risk_reports::{Priority, RiskCategory, RiskStatus};
pub use engine::{ActingUser, RiskEngine};
pub use store::{DatabaseStore, MemoryStore, RiskStore, UserContact};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// Comment on the first history entry of every risk and plan.
pub const CREATED_COMMENT: &str = "created";
/// Comment on the Open -> InTreatment entry added when the first plan arrives.
pub const FIRST_PLAN_COMMENT: &str = "auto-transitioned on first action plan";
/// Comment on the Resolved entry added when the last plan completes.
pub const CASCADE_COMMENT: &str = "auto-resolved after all action plans were completed";

/// One audit entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog<S> {
    pub status: S,
    pub updated_by: i32,
    pub comment: String,
    pub timestamp: NaiveDateTime,
}

impl<S> HistoryLog<S> {
    pub fn new(status: S, updated_by: i32, comment: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            status,
            updated_by,
            comment: comment.into(),
            timestamp,
        }
    }
}

/// First entry in `logs` with the given status.
pub fn first_entry_with<S: PartialEq>(logs: &[HistoryLog<S>], status: S) -> Option<&HistoryLog<S>> {
    logs.iter().find(|log| log.status == status)
}

/// The status and audit-trail length a writer loaded. Stores only accept a
/// save while the stored record still has both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Revision<S> {
    pub status: S,
    pub history_len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<crate::storage::StoredFile> for EvidenceFile {
    fn from(file: crate::storage::StoredFile) -> Self {
        Self {
            url: file.url,
            name: file.original_name,
            kind: file.content_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiskReport {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: RiskCategory,
    pub location: String,
    pub priority: Priority,
    pub status: RiskStatus,
    pub reporter_id: i32,
    pub assigned_to: Option<i32>,
    pub evidence_files: Vec<EvidenceFile>,
    pub history_logs: Vec<HistoryLog<RiskStatus>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RiskReport {
    /// Sets the status and records who changed it.
    pub fn push_status(&mut self, status: RiskStatus, by: i32, comment: impl Into<String>, at: NaiveDateTime) {
        self.status = status;
        self.history_logs.push(HistoryLog::new(status, by, comment, at));
        self.updated_at = at;
    }

    pub fn revision(&self) -> Revision<RiskStatus> {
        Revision {
            status: self.status,
            history_len: self.history_logs.len(),
        }
    }

    /// Whole days (rounded up) from the creation entry to the first
    /// Resolved entry. None when the history never reached Resolved.
    pub fn resolution_days(&self) -> Option<i64> {
        let created = self.history_logs.first()?;
        let resolved = first_entry_with(&self.history_logs, RiskStatus::Resolved)?;
        let secs = (resolved.timestamp - created.timestamp).num_seconds().abs();
        Some((secs + 86_399) / 86_400)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionPlan {
    pub id: i32,
    pub risk_id: i32,
    pub responsible_id: i32,
    pub description: String,
    pub deadline: NaiveDate,
    pub status: PlanStatus,
    pub evidence_files: Vec<EvidenceFile>,
    pub history_logs: Vec<HistoryLog<PlanStatus>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ActionPlan {
    pub fn push_status(&mut self, status: PlanStatus, by: i32, comment: impl Into<String>, at: NaiveDateTime) {
        self.status = status;
        self.history_logs.push(HistoryLog::new(status, by, comment, at));
        self.updated_at = at;
    }

    pub fn revision(&self) -> Revision<PlanStatus> {
        Revision {
            status: self.status,
            history_len: self.history_logs.len(),
        }
    }

    /// Time of the first Completed entry, if the plan was ever completed.
    pub fn completed_at(&self) -> Option<NaiveDateTime> {
        first_entry_with(&self.history_logs, PlanStatus::Completed).map(|log| log.timestamp)
    }

    /// Completed no later than the start of the deadline day.
    pub fn completed_on_time(&self) -> bool {
        match (self.completed_at(), self.deadline.and_hms_opt(0, 0, 0)) {
            (Some(done), Some(due)) => done <= due,
            _ => false,
        }
    }
}

/// A risk together with its action plans.
#[derive(Clone, Debug, Serialize)]
pub struct RiskDetail {
    #[serde(flatten)]
    pub risk: RiskReport,
    pub action_plans: Vec<ActionPlan>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Comments are judged by their trimmed text.
pub(crate) fn comment_length(value: &str) -> Result<(), ValidationError> {
    if value.trim().chars().count() < 3 {
        let mut err = ValidationError::new("length");
        err.message = Some("comment must be at least 3 characters".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewRisk {
    #[validate(length(min = 5, max = 100, message = "title must be between 5 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: String,
    pub category: RiskCategory,
    #[validate(custom = "not_blank")]
    pub location: String,
    pub priority: Priority,
    #[serde(default)]
    pub assigned_to: Option<i32>,
    #[serde(default)]
    pub evidence_files: Vec<EvidenceFile>,
}

/// Partial update of a risk. Absent fields are left alone.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct RiskChanges {
    #[validate(length(min = 5, max = 100, message = "title must be between 5 and 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: Option<String>,
    pub category: Option<RiskCategory>,
    #[validate(custom = "not_blank")]
    pub location: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<i32>,
    pub status: Option<RiskStatus>,
    #[validate(custom = "comment_length")]
    pub comment: Option<String>,
    /// Appended to the existing evidence.
    #[serde(default)]
    pub evidence_files: Vec<EvidenceFile>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewActionPlan {
    pub risk_id: i32,
    #[serde(alias = "responsible")]
    pub responsible_id: i32,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: String,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub evidence_files: Vec<EvidenceFile>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct PlanChanges {
    #[serde(default, alias = "responsible")]
    pub responsible_id: Option<i32>,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub status: Option<PlanStatus>,
    #[validate(custom = "comment_length")]
    pub comment: Option<String>,
    #[serde(default)]
    pub evidence_files: Vec<EvidenceFile>,
}

/// Body of the status endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusChange<S> {
    pub status: S,
    pub comment: Option<String>,
}

/// Creation-date window. Both ends are calendar days; the end day is
/// included in full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DateWindow {
    #[serde(alias = "startDate")]
    pub start_date: Option<NaiveDate>,
    #[serde(alias = "endDate")]
    pub end_date: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self { start_date, end_date }
    }

    /// Inclusive lower bound and exclusive upper bound.
    pub fn bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        let start = self.start_date.and_then(|d| d.and_hms_opt(0, 0, 0));
        let end = self
            .end_date
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        (start, end)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let (start, end) = self.bounds();
        start.map_or(true, |s| at >= s) && end.map_or(true, |e| at < e)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RiskFilter {
    pub status: Option<RiskStatus>,
    pub priority: Option<Priority>,
    pub category: Option<RiskCategory>,
    /// Case-insensitive substring match.
    pub location: Option<String>,
    pub reporter_id: Option<i32>,
    pub assigned_to: Option<i32>,
    pub created: DateWindow,
}

impl RiskFilter {
    pub fn created_within(window: DateWindow) -> Self {
        Self {
            created: window,
            ..Default::default()
        }
    }

    pub fn matches(&self, risk: &RiskReport) -> bool {
        self.status.map_or(true, |s| risk.status == s)
            && self.priority.map_or(true, |p| risk.priority == p)
            && self.category.map_or(true, |c| risk.category == c)
            && self.location.as_ref().map_or(true, |l| {
                risk.location.to_lowercase().contains(&l.to_lowercase())
            })
            && self.reporter_id.map_or(true, |r| risk.reporter_id == r)
            && self.assigned_to.map_or(true, |a| risk.assigned_to == Some(a))
            && self.created.contains(risk.created_at)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlanFilter {
    pub risk_id: Option<i32>,
    pub responsible_id: Option<i32>,
    pub status: Option<PlanStatus>,
    /// Matches plans whose status is anything but this one.
    pub status_not: Option<PlanStatus>,
    pub created: DateWindow,
    pub deadline_from: Option<NaiveDate>,
    pub deadline_to: Option<NaiveDate>,
    /// Strict upper bound on the deadline.
    pub deadline_before: Option<NaiveDate>,
}

impl PlanFilter {
    pub fn matches(&self, plan: &ActionPlan) -> bool {
        self.risk_id.map_or(true, |r| plan.risk_id == r)
            && self.responsible_id.map_or(true, |r| plan.responsible_id == r)
            && self.status.map_or(true, |s| plan.status == s)
            && self.status_not.map_or(true, |s| plan.status != s)
            && self.created.contains(plan.created_at)
            && self.deadline_from.map_or(true, |d| plan.deadline >= d)
            && self.deadline_to.map_or(true, |d| plan.deadline <= d)
            && self.deadline_before.map_or(true, |d| plan.deadline < d)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSort {
    #[default]
    #[serde(alias = "createdAt")]
    CreatedAt,
    #[serde(alias = "updatedAt")]
    UpdatedAt,
    Title,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSort {
    #[default]
    #[serde(alias = "createdAt")]
    CreatedAt,
    #[serde(alias = "updatedAt")]
    UpdatedAt,
    Deadline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paging {
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl Paging {
    /// Clamps client input into a usable page request. The page is capped
    /// so the offset always fits a signed 64-bit SQL OFFSET.
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64, max_limit: u64) -> Self {
        let limit = limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
        Self {
            page: page.unwrap_or(1).clamp(1, i64::MAX as u64 / limit),
            limit,
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// One page of results.
#[derive(Clone, Debug, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, total: u64, paging: Paging) -> Self {
        Self {
            items,
            total,
            page: paging.page,
            limit: paging.limit,
            pages: (total + paging.limit - 1) / paging.limit,
        }
    }
}

/// Parses a canonical name or a Portuguese label, ignoring case.
macro_rules! labelled_enum {
    ($ty:ty { $($variant:ident => $name:literal $(| $label:literal)*),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($name) $(|| s.to_lowercase() == $label.to_lowercase())* {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("unknown {} '{}'", stringify!($ty), s))
            }
        }
    };
}

labelled_enum!(RiskStatus {
    Open => "Open" | "Aberto",
    InTreatment => "InTreatment" | "Em Tratamento",
    Resolved => "Resolved" | "Resolvido",
    Cancelled => "Cancelled" | "Cancelado",
});

labelled_enum!(Priority {
    Low => "Low" | "Baixa",
    Medium => "Medium" | "Média" | "Media",
    High => "High" | "Alta",
    Critical => "Critical" | "Crítica" | "Critica",
});

labelled_enum!(RiskCategory {
    Infrastructure => "Infrastructure" | "Infraestrutura",
    Conduct => "Conduct" | "Conduta",
    Environmental => "Environmental" | "Ambiental",
    Other => "Other" | "Outro",
});

labelled_enum!(PlanStatus {
    Pending => "Pending" | "Pendente",
    InProgress => "InProgress" | "Em Andamento",
    Completed => "Completed" | "Concluído" | "Concluido",
});
