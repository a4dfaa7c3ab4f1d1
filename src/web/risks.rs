//! Occupational risk reports.

use super::upload::{attach_evidence, json_or_form, EvidenceTarget, JsonOrForm};
use crate::app_config;
use crate::error::ServiceError;
use crate::middleware::ClientCtx;
use crate::risk::{
    DateWindow, NewRisk, Paging, Priority, RiskCategory, RiskChanges, RiskEngine,
    RiskFilter, RiskSort, RiskStatus, SortOrder, StatusChange,
};
use crate::storage::ObjectStorage;
use actix_web::{delete, get, patch, post, put, web, Error, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(create_risk)
        .service(list_risks)
        .service(view_risk)
        .service(update_risk)
        .service(update_risk_status)
        .service(delete_risk);
}

const NUMERIC_FIELDS: &[&str] = &["assigned_to"];

#[derive(Debug, Default, Deserialize)]
pub struct RiskQuery {
    status: Option<RiskStatus>,
    priority: Option<Priority>,
    category: Option<RiskCategory>,
    location: Option<String>,
    #[serde(alias = "reporterId")]
    reporter_id: Option<i32>,
    #[serde(alias = "assignedTo")]
    assigned_to: Option<i32>,
    #[serde(alias = "startDate")]
    start_date: Option<NaiveDate>,
    #[serde(alias = "endDate")]
    end_date: Option<NaiveDate>,
    #[serde(alias = "sortBy")]
    sort: Option<RiskSort>,
    order: Option<SortOrder>,
    page: Option<u64>,
    limit: Option<u64>,
}

impl RiskQuery {
    fn filter(&self) -> RiskFilter {
        RiskFilter {
            status: self.status,
            priority: self.priority,
            category: self.category,
            location: self
                .location
                .as_ref()
                .map(|l| l.trim().to_owned())
                .filter(|l| !l.is_empty()),
            reporter_id: self.reporter_id,
            assigned_to: self.assigned_to,
            created: DateWindow::new(self.start_date, self.end_date),
        }
    }

    fn paging(&self) -> Paging {
        let limits = app_config::limits();
        Paging::new(self.page, self.limit, limits.default_page_size, limits.max_page_size)
    }
}

/// POST /risks - JSON, or multipart with evidence files
#[post("/risks")]
pub async fn create_risk(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    body: JsonOrForm<NewRisk>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let (mut input, files) = json_or_form(body, NUMERIC_FIELDS).await?;
    input.validate().map_err(ServiceError::from)?;

    let target = EvidenceTarget::NewRisk;
    let uploaded =
        attach_evidence(&engine, storage.get_ref().as_ref(), user_id, target, files).await?;
    input.evidence_files.extend(uploaded);

    Ok(super::created(engine.create_risk(input, user_id).await?))
}

#[get("/risks")]
pub async fn list_risks(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    query: web::Query<RiskQuery>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let listing = engine
        .list_risks(
            &query.filter(),
            query.sort.unwrap_or_default(),
            query.order.unwrap_or_default(),
            query.paging(),
        )
        .await?;
    Ok(super::success(listing))
}

/// GET /risks/{id} - the risk together with its action plans
#[get("/risks/{id}")]
pub async fn view_risk(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(engine.get_risk(*id).await?))
}

#[put("/risks/{id}")]
pub async fn update_risk(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    id: web::Path<i32>,
    body: JsonOrForm<RiskChanges>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    let (mut changes, files) = json_or_form(body, NUMERIC_FIELDS).await?;
    changes.validate().map_err(ServiceError::from)?;

    let target = EvidenceTarget::Risk(*id);
    let uploaded =
        attach_evidence(&engine, storage.get_ref().as_ref(), actor.id, target, files).await?;
    changes.evidence_files.extend(uploaded);

    Ok(super::success(engine.update_risk(*id, changes, actor).await?))
}

#[patch("/risks/{id}/status")]
pub async fn update_risk_status(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
    form: web::Json<StatusChange<RiskStatus>>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    let StatusChange { status, comment } = form.into_inner();
    Ok(super::success(
        engine.update_risk_status(*id, status, comment, actor).await?,
    ))
}

#[delete("/risks/{id}")]
pub async fn delete_risk(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
) -> Result<HttpResponse, Error> {
    let actor = client.actor()?;
    engine.delete_risk(*id, actor).await?;
    Ok(super::done("Risk report deleted successfully"))
}
