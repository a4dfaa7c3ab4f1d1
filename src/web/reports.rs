//! General workplace occurrence reports.

use super::upload::{read_form, store_files};
use crate::error::ServiceError;
use crate::middleware::ClientCtx;
use crate::occurrences::{self, NewComment, NewOccurrence, OccurrenceChanges, OccurrenceFilter, Resolution};
use crate::risk::EvidenceFile;
use crate::storage::ObjectStorage;
use actix_multipart::Multipart;
use actix_web::{get, patch, post, web, Error, HttpResponse};
use std::sync::Arc;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(create_report)
        .service(list_reports)
        .service(view_stats)
        .service(view_report)
        .service(update_report)
        .service(add_comment)
        .service(resolve_report);
}

/// POST /reports - multipart form; an optional `photo` part is attached
#[post("/reports")]
pub async fn create_report(
    client: ClientCtx,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let form = read_form(payload).await?;
    let input: NewOccurrence = form.parse(&[])?;
    input.validate().map_err(ServiceError::from)?;

    let stored = store_files(storage.get_ref().as_ref(), user_id, "reports", form.files).await?;
    let attachments: Vec<EvidenceFile> = stored.into_iter().map(EvidenceFile::from).collect();

    Ok(super::created(
        occurrences::create(user_id, input, attachments).await?,
    ))
}

#[get("/reports")]
pub async fn list_reports(
    client: ClientCtx,
    query: web::Query<OccurrenceFilter>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(occurrences::list(&query).await?))
}

#[get("/reports/stats")]
pub async fn view_stats(client: ClientCtx) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(occurrences::stats().await?))
}

#[get("/reports/{id}")]
pub async fn view_report(client: ClientCtx, id: web::Path<i32>) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(occurrences::get(*id).await?))
}

#[patch("/reports/{id}")]
pub async fn update_report(
    client: ClientCtx,
    id: web::Path<i32>,
    form: web::Json<OccurrenceChanges>,
) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(
        occurrences::update(*id, form.into_inner()).await?,
    ))
}

#[post("/reports/{id}/comments")]
pub async fn add_comment(
    client: ClientCtx,
    id: web::Path<i32>,
    form: web::Json<NewComment>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::created(
        occurrences::add_comment(*id, user_id, form.into_inner()).await?,
    ))
}

#[post("/reports/{id}/resolve")]
pub async fn resolve_report(
    client: ClientCtx,
    id: web::Path<i32>,
    form: web::Json<Resolution>,
) -> Result<HttpResponse, Error> {
    let admin_id = client.require_admin()?;
    Ok(super::success(
        occurrences::resolve(*id, admin_id, form.into_inner()).await?,
    ))
}
