//! The lifecycle engine: every write to a risk or an action plan goes
//! through here so that statuses, audit trails and the cross-entity
//! transitions stay consistent.
//!
//! Two cross-entity transitions exist:
//! - the first action plan attached to an Open risk moves it to InTreatment;
//! - completing the last incomplete plan of a risk resolves the risk.
//!
//! Both are a second single-record write after the first one committed. If
//! that second write fails the first one stands and the failure is logged.

use super::{
    comment_length, ActionPlan, HistoryLog, Listing, NewActionPlan, NewRisk, Paging, PlanChanges,
    PlanFilter, PlanSort, PlanStatus, Priority, Revision, RiskChanges, RiskDetail, RiskFilter,
    RiskReport, RiskSort, RiskStatus, RiskStore, SortOrder, CASCADE_COMMENT, CREATED_COMMENT,
    FIRST_PLAN_COMMENT,
};
use crate::error::{ServiceError, ServiceResult};
use crate::notifications::{deliver, deliver_all, NotificationEvent, Notifier};
use chrono::{NaiveDateTime, Utc};
use sea_orm::DbErr;
use std::sync::Arc;
use validator::Validate;

/// Who is performing a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActingUser {
    pub id: i32,
    pub is_admin: bool,
}

impl ActingUser {
    pub fn user(id: i32) -> Self {
        Self { id, is_admin: false }
    }

    pub fn admin(id: i32) -> Self {
        Self { id, is_admin: true }
    }
}

pub struct RiskEngine {
    store: Arc<dyn RiskStore>,
    notifier: Arc<dyn Notifier>,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn status_comment(comment: Option<String>, status: impl std::fmt::Display) -> String {
    match comment {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => format!("status changed to {}", status),
    }
}

fn check_comment(comment: &Option<String>) -> ServiceResult<()> {
    match comment.as_deref().map(comment_length) {
        Some(Err(_)) => Err(ServiceError::invalid(
            "comment",
            "comment must be at least 3 characters",
        )),
        _ => Ok(()),
    }
}

impl RiskEngine {
    pub fn new(store: Arc<dyn RiskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &dyn RiskStore {
        self.store.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    async fn load_risk(&self, id: i32) -> ServiceResult<RiskReport> {
        self.store
            .find_risk(id)
            .await?
            .ok_or(ServiceError::NotFound("Risk report"))
    }

    async fn load_plan(&self, id: i32) -> ServiceResult<ActionPlan> {
        self.store
            .find_action_plan(id)
            .await?
            .ok_or(ServiceError::NotFound("Action plan"))
    }

    async fn save_risk(
        &self,
        risk: &RiskReport,
        expected: Revision<RiskStatus>,
    ) -> ServiceResult<()> {
        if !self.store.save_risk(risk, expected).await? {
            return Err(ServiceError::Conflict(
                "Risk report was modified concurrently, reload and retry".to_string(),
            ));
        }
        Ok(())
    }

    async fn save_plan(
        &self,
        plan: &ActionPlan,
        expected: Revision<PlanStatus>,
    ) -> ServiceResult<()> {
        if !self.store.save_action_plan(plan, expected).await? {
            return Err(ServiceError::Conflict(
                "Action plan was modified concurrently, reload and retry".to_string(),
            ));
        }
        Ok(())
    }

    /// Fans out to every administrator. Never fails.
    pub async fn notify_admins(&self, event: NotificationEvent) {
        match self.store.admin_ids().await {
            Ok(admins) => deliver_all(self.notifier.as_ref(), &admins, &event).await,
            Err(e) => log::warn!(
                "Could not look up administrators for {}: {}",
                event.event_name(),
                e
            ),
        }
    }

    async fn notify_assignee(&self, risk: &RiskReport, updated_by: i32) {
        if let Some(assignee) = risk.assigned_to {
            let event = NotificationEvent::RiskStatusChanged {
                risk_id: risk.id,
                title: risk.title.clone(),
                status: risk.status,
                updated_by,
            };
            deliver(self.notifier.as_ref(), assignee, event).await;
        }
    }

    pub async fn create_risk(&self, input: NewRisk, reporter_id: i32) -> ServiceResult<RiskReport> {
        input.validate()?;

        let at = now();
        let risk = RiskReport {
            id: 0,
            title: input.title,
            description: input.description,
            category: input.category,
            location: input.location.trim().to_string(),
            priority: input.priority,
            status: RiskStatus::Open,
            reporter_id,
            assigned_to: input.assigned_to,
            evidence_files: input.evidence_files,
            history_logs: vec![HistoryLog::new(
                RiskStatus::Open,
                reporter_id,
                CREATED_COMMENT,
                at,
            )],
            created_at: at,
            updated_at: at,
        };
        let risk = self.store.insert_risk(risk).await?;
        log::info!("Risk {} created by user {}", risk.id, reporter_id);

        if risk.priority == Priority::Critical {
            self.notify_admins(NotificationEvent::NewCriticalRisk {
                risk_id: risk.id,
                title: risk.title.clone(),
                location: risk.location.clone(),
                reporter_id,
            })
            .await;
        }

        Ok(risk)
    }

    pub async fn get_risk(&self, id: i32) -> ServiceResult<RiskDetail> {
        let risk = self.load_risk(id).await?;
        let action_plans = self
            .store
            .find_action_plans(&PlanFilter {
                risk_id: Some(id),
                ..Default::default()
            })
            .await?;
        Ok(RiskDetail { risk, action_plans })
    }

    pub async fn list_risks(
        &self,
        filter: &RiskFilter,
        sort: RiskSort,
        order: SortOrder,
        paging: Paging,
    ) -> ServiceResult<Listing<RiskReport>> {
        Ok(self.store.page_risks(filter, sort, order, paging).await?)
    }

    /// General update. Absent fields are untouched, evidence is appended.
    pub async fn update_risk(
        &self,
        id: i32,
        changes: RiskChanges,
        acting: ActingUser,
    ) -> ServiceResult<RiskReport> {
        changes.validate()?;

        let mut risk = self.load_risk(id).await?;
        let expected = risk.revision();
        let was_critical = risk.priority == Priority::Critical;
        let at = now();

        if let Some(title) = changes.title {
            risk.title = title;
        }
        if let Some(description) = changes.description {
            risk.description = description;
        }
        if let Some(category) = changes.category {
            risk.category = category;
        }
        if let Some(location) = changes.location {
            risk.location = location.trim().to_string();
        }
        if let Some(priority) = changes.priority {
            risk.priority = priority;
        }
        if changes.assigned_to.is_some() {
            risk.assigned_to = changes.assigned_to;
        }
        risk.evidence_files.extend(changes.evidence_files);

        let status_changed = match changes.status {
            Some(status) if status != risk.status => {
                risk.push_status(status, acting.id, status_comment(changes.comment, status), at);
                true
            }
            _ => false,
        };
        risk.updated_at = at;

        self.save_risk(&risk, expected).await?;
        log::info!("Risk {} updated by user {}", risk.id, acting.id);

        if !was_critical && risk.priority == Priority::Critical {
            self.notify_admins(NotificationEvent::RiskReclassifiedAsCritical {
                risk_id: risk.id,
                title: risk.title.clone(),
                location: risk.location.clone(),
                updated_by: acting.id,
            })
            .await;
        }
        if status_changed {
            self.notify_assignee(&risk, acting.id).await;
        }

        Ok(risk)
    }

    /// Direct status change. Does not look at the risk's action plans.
    pub async fn update_risk_status(
        &self,
        id: i32,
        status: RiskStatus,
        comment: Option<String>,
        acting: ActingUser,
    ) -> ServiceResult<RiskReport> {
        check_comment(&comment)?;

        let mut risk = self.load_risk(id).await?;
        if risk.status == status {
            return Ok(risk);
        }

        let expected = risk.revision();
        risk.push_status(status, acting.id, status_comment(comment, status), now());
        self.save_risk(&risk, expected).await?;
        log::info!(
            "Risk {} moved {} -> {} by user {}",
            risk.id,
            expected.status,
            status,
            acting.id
        );

        self.notify_assignee(&risk, acting.id).await;
        Ok(risk)
    }

    /// Administrators only, and only once no plan references the risk.
    pub async fn delete_risk(&self, id: i32, actor: ActingUser) -> ServiceResult<()> {
        if !actor.is_admin {
            return Err(ServiceError::Forbidden);
        }

        self.load_risk(id).await?;
        let plans = self.store.count_action_plans(id).await?;
        if plans > 0 {
            return Err(ServiceError::ReferentialIntegrity(format!(
                "Risk report still has {} action plan(s)",
                plans
            )));
        }

        if !self.store.delete_risk(id).await? {
            return Err(ServiceError::NotFound("Risk report"));
        }
        log::info!("Risk {} deleted by admin {}", id, actor.id);
        Ok(())
    }

    pub async fn create_action_plan(
        &self,
        input: NewActionPlan,
        acting: ActingUser,
    ) -> ServiceResult<ActionPlan> {
        input.validate()?;

        let risk = self.load_risk(input.risk_id).await?;

        let at = now();
        let plan = ActionPlan {
            id: 0,
            risk_id: risk.id,
            responsible_id: input.responsible_id,
            description: input.description,
            deadline: input.deadline,
            status: PlanStatus::Pending,
            evidence_files: input.evidence_files,
            // The creation entry names the responsible party, not the caller.
            history_logs: vec![HistoryLog::new(
                PlanStatus::Pending,
                input.responsible_id,
                CREATED_COMMENT,
                at,
            )],
            created_at: at,
            updated_at: at,
        };
        let plan = self.store.insert_action_plan(plan).await?;
        log::info!(
            "Action plan {} created on risk {} by user {}",
            plan.id,
            risk.id,
            acting.id
        );

        if risk.status == RiskStatus::Open {
            if let Err(e) = self.start_treatment(risk, acting.id).await {
                log::error!(
                    "Action plan {} committed but risk {} was not moved to InTreatment: {}",
                    plan.id,
                    plan.risk_id,
                    e
                );
            }
        }

        Ok(plan)
    }

    /// Open -> InTreatment, applied only if the risk is still Open.
    async fn start_treatment(&self, mut risk: RiskReport, by: i32) -> Result<(), DbErr> {
        let expected = risk.revision();
        risk.push_status(RiskStatus::InTreatment, by, FIRST_PLAN_COMMENT, now());
        if self.store.save_risk(&risk, expected).await? {
            log::info!("Risk {} moved to InTreatment by first action plan", risk.id);
        } else {
            log::debug!("Risk {} left Open before its first plan landed", risk.id);
        }
        Ok(())
    }

    pub async fn get_action_plan(&self, id: i32) -> ServiceResult<ActionPlan> {
        self.load_plan(id).await
    }

    /// NotFound unless the risk exists.
    pub async fn require_risk(&self, id: i32) -> ServiceResult<()> {
        self.load_risk(id).await.map(drop)
    }

    /// NotFound unless the action plan exists.
    pub async fn require_action_plan(&self, id: i32) -> ServiceResult<()> {
        self.load_plan(id).await.map(drop)
    }

    pub async fn list_action_plans(
        &self,
        filter: &PlanFilter,
        sort: PlanSort,
        order: SortOrder,
        paging: Paging,
    ) -> ServiceResult<Listing<ActionPlan>> {
        Ok(self.store.page_action_plans(filter, sort, order, paging).await?)
    }

    /// General update. A status change runs the same path as
    /// [`RiskEngine::update_action_plan_status`].
    pub async fn update_action_plan(
        &self,
        id: i32,
        changes: PlanChanges,
        acting: ActingUser,
    ) -> ServiceResult<ActionPlan> {
        changes.validate()?;

        let mut plan = self.load_plan(id).await?;
        let expected = plan.revision();
        let at = now();

        if let Some(responsible_id) = changes.responsible_id {
            plan.responsible_id = responsible_id;
        }
        if let Some(description) = changes.description {
            plan.description = description;
        }
        if let Some(deadline) = changes.deadline {
            plan.deadline = deadline;
        }
        plan.evidence_files.extend(changes.evidence_files);

        let completed = match changes.status {
            Some(status) if status != plan.status => {
                plan.push_status(status, acting.id, status_comment(changes.comment, status), at);
                status == PlanStatus::Completed
            }
            _ => false,
        };
        plan.updated_at = at;

        self.save_plan(&plan, expected).await?;
        log::info!("Action plan {} updated by user {}", plan.id, acting.id);

        if completed {
            self.cascade_completion(&plan, acting.id).await;
        }
        Ok(plan)
    }

    pub async fn update_action_plan_status(
        &self,
        id: i32,
        status: PlanStatus,
        comment: Option<String>,
        acting: ActingUser,
    ) -> ServiceResult<ActionPlan> {
        check_comment(&comment)?;

        let mut plan = self.load_plan(id).await?;
        if plan.status == status {
            return Ok(plan);
        }

        let expected = plan.revision();
        plan.push_status(status, acting.id, status_comment(comment, status), now());
        self.save_plan(&plan, expected).await?;
        log::info!(
            "Action plan {} moved {} -> {} by user {}",
            plan.id,
            expected.status,
            status,
            acting.id
        );

        if status == PlanStatus::Completed {
            self.cascade_completion(&plan, acting.id).await;
        }
        Ok(plan)
    }

    /// Resolves the parent risk when `plan` was the last incomplete one.
    /// The plan is already committed; failures here are logged only.
    async fn cascade_completion(&self, plan: &ActionPlan, by: i32) {
        match self.try_cascade(plan, by).await {
            Ok(Some(risk)) => self.notify_assignee(&risk, by).await,
            Ok(None) => (),
            Err(e) => log::error!(
                "Cascade failed: action plan {} is Completed but risk {} was not resolved: {}",
                plan.id,
                plan.risk_id,
                e
            ),
        }
    }

    async fn try_cascade(&self, plan: &ActionPlan, by: i32) -> Result<Option<RiskReport>, DbErr> {
        let remaining = self
            .store
            .count_incomplete_siblings(plan.risk_id, plan.id)
            .await?;
        if remaining > 0 {
            log::debug!(
                "Risk {} still has {} incomplete action plan(s)",
                plan.risk_id,
                remaining
            );
            return Ok(None);
        }

        let Some(mut risk) = self.store.find_risk(plan.risk_id).await? else {
            log::warn!("Action plan {} references missing risk {}", plan.id, plan.risk_id);
            return Ok(None);
        };
        if risk.status == RiskStatus::Resolved {
            return Ok(None);
        }

        let expected = risk.revision();
        risk.push_status(RiskStatus::Resolved, by, CASCADE_COMMENT, now());
        if !self.store.save_risk(&risk, expected).await? {
            log::warn!(
                "Risk {} changed while resolving it after action plan {}",
                risk.id,
                plan.id
            );
            return Ok(None);
        }

        log::info!(
            "Risk {} resolved after its last action plan {} completed",
            risk.id,
            plan.id
        );
        Ok(Some(risk))
    }
}
