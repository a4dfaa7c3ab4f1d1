//! Read-only aggregations over risks and action plans.

use crate::error::ServiceError;
use crate::middleware::ClientCtx;
use crate::risk::{DateWindow, RiskEngine};
use crate::stats;
use actix_web::{get, web, Error, HttpResponse};
use chrono::{Datelike, Utc};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_summary)
        .service(view_by_location)
        .service(view_by_category)
        .service(view_resolution_time)
        .service(view_compliance)
        .service(view_monthly_evolution);
}

#[get("/risk-reports/risks-summary")]
pub async fn view_summary(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    window: web::Query<DateWindow>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let summary = stats::risk_summary(engine.store(), *window)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(summary))
}

#[get("/risk-reports/risks-by-location")]
pub async fn view_by_location(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    window: web::Query<DateWindow>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let groups = stats::risks_by_location(engine.store(), *window)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(groups))
}

#[get("/risk-reports/risks-by-category")]
pub async fn view_by_category(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    window: web::Query<DateWindow>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let groups = stats::risks_by_category(engine.store(), *window)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(groups))
}

#[get("/risk-reports/average-resolution-time")]
pub async fn view_resolution_time(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    window: web::Query<DateWindow>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let time = stats::average_resolution_time(engine.store(), *window)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(time))
}

#[get("/risk-reports/action-plan-compliance")]
pub async fn view_compliance(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    window: web::Query<DateWindow>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let compliance = stats::action_plan_compliance(engine.store(), *window)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(compliance))
}

#[derive(Deserialize)]
pub struct YearQuery {
    year: Option<i32>,
}

/// GET /risk-reports/monthly-evolution?year=2024 - defaults to this year
#[get("/risk-reports/monthly-evolution")]
pub async fn view_monthly_evolution(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    query: web::Query<YearQuery>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    let year = query.year.unwrap_or_else(|| Utc::now().year());
    let evolution = stats::monthly_risk_evolution(engine.store(), year)
        .await
        .map_err(ServiceError::from)?;
    Ok(super::success(evolution))
}
