//! sea-orm backed store.

use super::{RiskStore, UserContact};
use crate::orm::{action_plans, risk_reports, users};
use crate::risk::{
    ActionPlan, Listing, Paging, PlanFilter, PlanSort, PlanStatus, Revision, RiskFilter,
    RiskReport, RiskSort, RiskStatus, SortOrder,
};
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Order, SimpleExpr};
use sea_orm::{
    entity::*, query::*, ActiveValue::Set, Condition, DatabaseConnection, DbErr, PaginatorTrait,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

/// Store over the application database.
#[derive(Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Json, DbErr> {
    serde_json::to_value(value).map_err(|e| DbErr::Custom(format!("json encode: {}", e)))
}

/// Both tables name their audit column `history_logs`.
fn history_len_is(len: usize) -> SimpleExpr {
    Expr::cust_with_values("jsonb_array_length(history_logs) = ?", vec![len as i32])
}

fn from_json<T: DeserializeOwned>(value: Json) -> Result<T, DbErr> {
    serde_json::from_value(value).map_err(|e| DbErr::Custom(format!("json decode: {}", e)))
}

fn risk_from_model(m: risk_reports::Model) -> Result<RiskReport, DbErr> {
    Ok(RiskReport {
        id: m.id,
        title: m.title,
        description: m.description,
        category: m.category,
        location: m.location,
        priority: m.priority,
        status: m.status,
        reporter_id: m.reporter_id,
        assigned_to: m.assigned_to,
        evidence_files: from_json(m.evidence_files)?,
        history_logs: from_json(m.history_logs)?,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn plan_from_model(m: action_plans::Model) -> Result<ActionPlan, DbErr> {
    Ok(ActionPlan {
        id: m.id,
        risk_id: m.risk_id,
        responsible_id: m.responsible_id,
        description: m.description,
        deadline: m.deadline,
        status: m.status,
        evidence_files: from_json(m.evidence_files)?,
        history_logs: from_json(m.history_logs)?,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn risk_condition(filter: &RiskFilter) -> Condition {
    let mut cond = Condition::all();
    if let Some(status) = filter.status {
        cond = cond.add(risk_reports::Column::Status.eq(status));
    }
    if let Some(priority) = filter.priority {
        cond = cond.add(risk_reports::Column::Priority.eq(priority));
    }
    if let Some(category) = filter.category {
        cond = cond.add(risk_reports::Column::Category.eq(category));
    }
    if let Some(ref location) = filter.location {
        cond = cond.add(Expr::cust_with_values(
            "risk_reports.location ILIKE ?",
            vec![format!("%{}%", location)],
        ));
    }
    if let Some(reporter) = filter.reporter_id {
        cond = cond.add(risk_reports::Column::ReporterId.eq(reporter));
    }
    if let Some(assignee) = filter.assigned_to {
        cond = cond.add(risk_reports::Column::AssignedTo.eq(assignee));
    }
    let (start, end) = filter.created.bounds();
    if let Some(start) = start {
        cond = cond.add(risk_reports::Column::CreatedAt.gte(start));
    }
    if let Some(end) = end {
        cond = cond.add(risk_reports::Column::CreatedAt.lt(end));
    }
    cond
}

fn plan_condition(filter: &PlanFilter) -> Condition {
    let mut cond = Condition::all();
    if let Some(risk_id) = filter.risk_id {
        cond = cond.add(action_plans::Column::RiskId.eq(risk_id));
    }
    if let Some(responsible) = filter.responsible_id {
        cond = cond.add(action_plans::Column::ResponsibleId.eq(responsible));
    }
    if let Some(status) = filter.status {
        cond = cond.add(action_plans::Column::Status.eq(status));
    }
    if let Some(status) = filter.status_not {
        cond = cond.add(action_plans::Column::Status.ne(status));
    }
    let (start, end) = filter.created.bounds();
    if let Some(start) = start {
        cond = cond.add(action_plans::Column::CreatedAt.gte(start));
    }
    if let Some(end) = end {
        cond = cond.add(action_plans::Column::CreatedAt.lt(end));
    }
    if let Some(from) = filter.deadline_from {
        cond = cond.add(action_plans::Column::Deadline.gte(from));
    }
    if let Some(to) = filter.deadline_to {
        cond = cond.add(action_plans::Column::Deadline.lte(to));
    }
    if let Some(before) = filter.deadline_before {
        cond = cond.add(action_plans::Column::Deadline.lt(before));
    }
    cond
}

fn sea_order(order: SortOrder) -> Order {
    match order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    }
}

#[async_trait]
impl RiskStore for DatabaseStore {
    async fn insert_risk(&self, risk: RiskReport) -> Result<RiskReport, DbErr> {
        let model = risk_reports::ActiveModel {
            title: Set(risk.title.clone()),
            description: Set(risk.description.clone()),
            category: Set(risk.category),
            location: Set(risk.location.clone()),
            priority: Set(risk.priority),
            status: Set(risk.status),
            reporter_id: Set(risk.reporter_id),
            assigned_to: Set(risk.assigned_to),
            evidence_files: Set(to_json(&risk.evidence_files)?),
            history_logs: Set(to_json(&risk.history_logs)?),
            created_at: Set(risk.created_at),
            updated_at: Set(risk.updated_at),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        risk_from_model(model)
    }

    async fn find_risk(&self, id: i32) -> Result<Option<RiskReport>, DbErr> {
        risk_reports::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(risk_from_model)
            .transpose()
    }

    async fn save_risk(
        &self,
        risk: &RiskReport,
        expected: Revision<RiskStatus>,
    ) -> Result<bool, DbErr> {
        let res = risk_reports::Entity::update_many()
            .col_expr(risk_reports::Column::Title, Expr::value(risk.title.clone()))
            .col_expr(
                risk_reports::Column::Description,
                Expr::value(risk.description.clone()),
            )
            .col_expr(risk_reports::Column::Category, Expr::value(risk.category))
            .col_expr(
                risk_reports::Column::Location,
                Expr::value(risk.location.clone()),
            )
            .col_expr(risk_reports::Column::Priority, Expr::value(risk.priority))
            .col_expr(risk_reports::Column::Status, Expr::value(risk.status))
            .col_expr(risk_reports::Column::AssignedTo, Expr::value(risk.assigned_to))
            .col_expr(
                risk_reports::Column::EvidenceFiles,
                Expr::value(to_json(&risk.evidence_files)?),
            )
            .col_expr(
                risk_reports::Column::HistoryLogs,
                Expr::value(to_json(&risk.history_logs)?),
            )
            .col_expr(risk_reports::Column::UpdatedAt, Expr::value(risk.updated_at))
            .filter(risk_reports::Column::Id.eq(risk.id))
            .filter(risk_reports::Column::Status.eq(expected.status))
            .filter(history_len_is(expected.history_len))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    async fn delete_risk(&self, id: i32) -> Result<bool, DbErr> {
        let res = risk_reports::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected == 1)
    }

    async fn find_risks(&self, filter: &RiskFilter) -> Result<Vec<RiskReport>, DbErr> {
        risk_reports::Entity::find()
            .filter(risk_condition(filter))
            .order_by_asc(risk_reports::Column::CreatedAt)
            .order_by_asc(risk_reports::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(risk_from_model)
            .collect()
    }

    async fn page_risks(
        &self,
        filter: &RiskFilter,
        sort: RiskSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<RiskReport>, DbErr> {
        let column = match sort {
            RiskSort::CreatedAt => risk_reports::Column::CreatedAt,
            RiskSort::UpdatedAt => risk_reports::Column::UpdatedAt,
            RiskSort::Title => risk_reports::Column::Title,
        };
        let paginator = risk_reports::Entity::find()
            .filter(risk_condition(filter))
            .order_by(column, sea_order(order))
            .order_by(risk_reports::Column::Id, sea_order(order))
            .paginate(&self.db, paging.limit as usize);

        let total = paginator.num_items().await? as u64;
        let items = paginator
            .fetch_page(paging.page.saturating_sub(1) as usize)
            .await?
            .into_iter()
            .map(risk_from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Listing::new(items, total, paging))
    }

    async fn insert_action_plan(&self, plan: ActionPlan) -> Result<ActionPlan, DbErr> {
        let model = action_plans::ActiveModel {
            risk_id: Set(plan.risk_id),
            responsible_id: Set(plan.responsible_id),
            description: Set(plan.description.clone()),
            deadline: Set(plan.deadline),
            status: Set(plan.status),
            evidence_files: Set(to_json(&plan.evidence_files)?),
            history_logs: Set(to_json(&plan.history_logs)?),
            created_at: Set(plan.created_at),
            updated_at: Set(plan.updated_at),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        plan_from_model(model)
    }

    async fn find_action_plan(&self, id: i32) -> Result<Option<ActionPlan>, DbErr> {
        action_plans::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(plan_from_model)
            .transpose()
    }

    async fn save_action_plan(
        &self,
        plan: &ActionPlan,
        expected: Revision<PlanStatus>,
    ) -> Result<bool, DbErr> {
        // risk_id is never written after insert.
        let res = action_plans::Entity::update_many()
            .col_expr(
                action_plans::Column::ResponsibleId,
                Expr::value(plan.responsible_id),
            )
            .col_expr(
                action_plans::Column::Description,
                Expr::value(plan.description.clone()),
            )
            .col_expr(action_plans::Column::Deadline, Expr::value(plan.deadline))
            .col_expr(action_plans::Column::Status, Expr::value(plan.status))
            .col_expr(
                action_plans::Column::EvidenceFiles,
                Expr::value(to_json(&plan.evidence_files)?),
            )
            .col_expr(
                action_plans::Column::HistoryLogs,
                Expr::value(to_json(&plan.history_logs)?),
            )
            .col_expr(action_plans::Column::UpdatedAt, Expr::value(plan.updated_at))
            .filter(action_plans::Column::Id.eq(plan.id))
            .filter(action_plans::Column::Status.eq(expected.status))
            .filter(history_len_is(expected.history_len))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    async fn find_action_plans(&self, filter: &PlanFilter) -> Result<Vec<ActionPlan>, DbErr> {
        action_plans::Entity::find()
            .filter(plan_condition(filter))
            .order_by_asc(action_plans::Column::CreatedAt)
            .order_by_asc(action_plans::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(plan_from_model)
            .collect()
    }

    async fn page_action_plans(
        &self,
        filter: &PlanFilter,
        sort: PlanSort,
        order: SortOrder,
        paging: Paging,
    ) -> Result<Listing<ActionPlan>, DbErr> {
        let column = match sort {
            PlanSort::CreatedAt => action_plans::Column::CreatedAt,
            PlanSort::UpdatedAt => action_plans::Column::UpdatedAt,
            PlanSort::Deadline => action_plans::Column::Deadline,
        };
        let paginator = action_plans::Entity::find()
            .filter(plan_condition(filter))
            .order_by(column, sea_order(order))
            .order_by(action_plans::Column::Id, sea_order(order))
            .paginate(&self.db, paging.limit as usize);

        let total = paginator.num_items().await? as u64;
        let items = paginator
            .fetch_page(paging.page.saturating_sub(1) as usize)
            .await?
            .into_iter()
            .map(plan_from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Listing::new(items, total, paging))
    }

    async fn count_action_plans(&self, risk_id: i32) -> Result<u64, DbErr> {
        let count = action_plans::Entity::find()
            .filter(action_plans::Column::RiskId.eq(risk_id))
            .count(&self.db)
            .await?;
        Ok(count as u64)
    }

    async fn count_incomplete_siblings(&self, risk_id: i32, exclude: i32) -> Result<u64, DbErr> {
        let count = action_plans::Entity::find()
            .filter(action_plans::Column::RiskId.eq(risk_id))
            .filter(action_plans::Column::Id.ne(exclude))
            .filter(action_plans::Column::Status.ne(PlanStatus::Completed))
            .count(&self.db)
            .await?;
        Ok(count as u64)
    }

    async fn admin_ids(&self) -> Result<Vec<i32>, DbErr> {
        let admins = users::Entity::find()
            .filter(users::Column::Role.eq(users::Role::Admin))
            .all(&self.db)
            .await?;
        Ok(admins.into_iter().map(|u| u.id).collect())
    }

    async fn user_contact(&self, id: i32) -> Result<Option<UserContact>, DbErr> {
        Ok(users::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(|u| UserContact {
                id: u.id,
                name: u.name,
                email: u.email,
            }))
    }
}
