//! Action plans attached to risk reports.

use super::upload::{attach_evidence, json_or_form, EvidenceTarget, JsonOrForm};
use crate::app_config;
use crate::error::ServiceError;
use crate::middleware::ClientCtx;
use crate::risk::{
    DateWindow, NewActionPlan, Paging, PlanChanges, PlanFilter, PlanSort, PlanStatus,
    RiskEngine, SortOrder, StatusChange,
};
use crate::storage::ObjectStorage;
use actix_web::{get, patch, post, put, web, Error, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(create_action_plan)
        .service(list_action_plans)
        .service(view_action_plan)
        .service(update_action_plan)
        .service(update_action_plan_status);
}

const NUMERIC_FIELDS: &[&str] = &["risk_id", "responsible_id", "responsible"];

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    #[serde(alias = "riskId")]
    risk_id: Option<i32>,
    #[serde(alias = "responsible")]
    responsible_id: Option<i32>,
    status: Option<PlanStatus>,
    #[serde(alias = "startDate")]
    start_date: Option<NaiveDate>,
    #[serde(alias = "endDate")]
    end_date: Option<NaiveDate>,
    #[serde(alias = "deadlineFrom")]
    deadline_from: Option<NaiveDate>,
    #[serde(alias = "deadlineTo")]
    deadline_to: Option<NaiveDate>,
    #[serde(alias = "sortBy")]
    sort: Option<PlanSort>,
    order: Option<SortOrder>,
    page: Option<u64>,
    limit: Option<u64>,
}

impl PlanQuery {
    fn filter(&self) -> PlanFilter {
        PlanFilter {
            risk_id: self.risk_id,
            responsible_id: self.responsible_id,
            status: self.status,
            created: DateWindow::new(self.start_date, self.end_date),
            deadline_from: self.deadline_from,
            deadline_to: self.deadline_to,
            ..Default::default()
        }
    }

    fn paging(&self) -> Paging {
        let limits = app_config::limits();
        Paging::new(self.page, self.limit, limits.default_page_size, limits.max_page_size)
    }
}

/// POST /action-plans - JSON, or multipart with evidence files
///
/// The first plan of an Open risk moves the risk to InTreatment.
#[post("/action-plans")]
pub async fn create_action_plan(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    body: JsonOrForm<NewActionPlan>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    let (mut input, files) = json_or_form(body, NUMERIC_FIELDS).await?;
    input.validate().map_err(ServiceError::from)?;

    let target = EvidenceTarget::NewPlan { risk_id: input.risk_id };
    let uploaded =
        attach_evidence(&engine, storage.get_ref().as_ref(), actor.id, target, files).await?;
    input.evidence_files.extend(uploaded);

    Ok(super::created(engine.create_action_plan(input, actor).await?))
}

#[get("/action-plans")]
pub async fn list_action_plans(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    query: web::Query<PlanQuery>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let listing = engine
        .list_action_plans(
            &query.filter(),
            query.sort.unwrap_or_default(),
            query.order.unwrap_or_default(),
            query.paging(),
        )
        .await?;
    Ok(super::success(listing))
}

#[get("/action-plans/{id}")]
pub async fn view_action_plan(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(engine.get_action_plan(*id).await?))
}

#[put("/action-plans/{id}")]
pub async fn update_action_plan(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    id: web::Path<i32>,
    body: JsonOrForm<PlanChanges>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    let (mut changes, files) = json_or_form(body, NUMERIC_FIELDS).await?;
    changes.validate().map_err(ServiceError::from)?;

    let target = EvidenceTarget::Plan(*id);
    let uploaded =
        attach_evidence(&engine, storage.get_ref().as_ref(), actor.id, target, files).await?;
    changes.evidence_files.extend(uploaded);

    Ok(super::success(
        engine.update_action_plan(*id, changes, actor).await?,
    ))
}

/// PATCH /action-plans/{id}/status
///
/// Completing the last open plan of a risk resolves the risk.
#[patch("/action-plans/{id}/status")]
pub async fn update_action_plan_status(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
    form: web::Json<StatusChange<PlanStatus>>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    let StatusChange { status, comment } = form.into_inner();
    Ok(super::success(
        engine
            .update_action_plan_status(*id, status, comment, actor)
            .await?,
    ))
}
