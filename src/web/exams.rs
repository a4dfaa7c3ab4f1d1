//! Medical exam uploads and administrator review.

use super::upload::{read_form, store_files};
use crate::error::ServiceError;
use crate::exams::{self, ExamFields, ExamReview};
use crate::middleware::ClientCtx;
use crate::orm::exams::ExamType;
use crate::risk::RiskEngine;
use crate::storage::ObjectStorage;
use actix_multipart::Multipart;
use actix_web::{delete, get, patch, post, web, Error, HttpResponse};
use chrono::Utc;
use std::sync::Arc;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Fixed segments first; `/exams/{id}` would swallow them.
    conf.service(upload_exam)
        .service(list_exams)
        .service(view_validity)
        .service(list_exams_by_type)
        .service(view_exam)
        .service(delete_exam)
        .service(review_exam);
}

/// POST /exams - multipart form with one `file` part
#[post("/exams")]
pub async fn upload_exam(
    client: ClientCtx,
    storage: web::Data<Arc<dyn ObjectStorage>>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let form = read_form(payload).await?;

    let fields: ExamFields = form.parse(&[])?;
    let exam = exams::validate_fields(fields, Utc::now().date_naive())?;

    if form.files.len() != 1 {
        return Err(ServiceError::invalid("file", "Exactly one exam file is required").into());
    }

    let stored = store_files(storage.get_ref().as_ref(), user_id, "exams", form.files).await?;
    let file = stored
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::invalid("file", "Exactly one exam file is required"))?;

    Ok(super::created(exams::create_exam(user_id, exam, file).await?))
}

#[get("/exams")]
pub async fn list_exams(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(exams::list_for_user(user_id, None).await?))
}

/// GET /exams/validity - per exam type, whether an unexpired exam exists
#[get("/exams/validity")]
pub async fn view_validity(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        exams::validity_for_user(user_id, Utc::now().date_naive()).await?,
    ))
}

#[get("/exams/type/{exam_type}")]
pub async fn list_exams_by_type(
    client: ClientCtx,
    exam_type: web::Path<ExamType>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        exams::list_for_user(user_id, Some(exam_type.into_inner())).await?,
    ))
}

#[get("/exams/{id}")]
pub async fn view_exam(client: ClientCtx, id: web::Path<i32>) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(exams::get_for_user(user_id, *id).await?))
}

#[delete("/exams/{id}")]
pub async fn delete_exam(client: ClientCtx, id: web::Path<i32>) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    exams::delete_for_user(user_id, *id).await?;
    Ok(super::done("Exam deleted successfully"))
}

#[patch("/exams/{id}/status")]
pub async fn review_exam(
    client: ClientCtx,
    engine: web::Data<RiskEngine>,
    id: web::Path<i32>,
    form: web::Json<ExamReview>,
) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(
        exams::review(*id, form.into_inner(), engine.notifier()).await?,
    ))
}
