//! Medical exam uploads, review and validity tracking.

use crate::db::get_db_pool;
use crate::error::{FieldError, ServiceError, ServiceResult};
use crate::notifications::{deliver, NotificationEvent, Notifier};
use crate::orm::exams::{self, ExamStatus, ExamType};
use crate::storage::StoredFile;
use chrono::{NaiveDate, Utc};
use sea_orm::{entity::*, query::*, ActiveValue::Set, Iterable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Raw text fields of an exam upload form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExamFields {
    #[serde(alias = "type")]
    pub exam_type: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "performedAt")]
    pub performed_at: Option<String>,
    #[serde(alias = "expiresAt")]
    pub expires_at: Option<String>,
}

/// Checked exam metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewExam {
    pub exam_type: ExamType,
    pub description: Option<String>,
    pub performed_at: NaiveDate,
    pub expires_at: NaiveDate,
}

fn parse_type(raw: &str) -> Option<ExamType> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase())).ok()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Accept a bare date or the date part of an ISO timestamp.
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

/// Collects every problem with the form at once.
pub fn validate_fields(fields: ExamFields, today: NaiveDate) -> ServiceResult<NewExam> {
    let mut errors = Vec::new();

    let exam_type = match fields.exam_type.as_deref().map(parse_type) {
        Some(Some(t)) => Some(t),
        _ => {
            errors.push(FieldError::new("type", "Invalid exam type"));
            None
        }
    };

    let performed_at = match fields.performed_at.as_deref() {
        None => {
            errors.push(FieldError::new("performed_at", "Performed date is required"));
            None
        }
        Some(raw) => match parse_date(raw) {
            None => {
                errors.push(FieldError::new("performed_at", "Invalid performed date format"));
                None
            }
            Some(d) if d > today => {
                errors.push(FieldError::new(
                    "performed_at",
                    "Performed date cannot be in the future",
                ));
                None
            }
            Some(d) => Some(d),
        },
    };

    let expires_at = match fields.expires_at.as_deref() {
        None => {
            errors.push(FieldError::new("expires_at", "Expiration date is required"));
            None
        }
        Some(raw) => match (parse_date(raw), performed_at) {
            (None, _) => {
                errors.push(FieldError::new("expires_at", "Invalid expiration date format"));
                None
            }
            (Some(e), Some(p)) if e <= p => {
                errors.push(FieldError::new(
                    "expires_at",
                    "Expiration date must be after performed date",
                ));
                None
            }
            (Some(e), _) => Some(e),
        },
    };

    let description = fields
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description
        .as_ref()
        .map_or(false, |d| d.chars().count() > MAX_DESCRIPTION_CHARS)
    {
        errors.push(FieldError::new(
            "description",
            "Description must be at most 500 characters",
        ));
    }

    match (exam_type, performed_at, expires_at) {
        (Some(exam_type), Some(performed_at), Some(expires_at)) if errors.is_empty() => {
            Ok(NewExam {
                exam_type,
                description,
                performed_at,
                expires_at,
            })
        }
        _ => Err(ServiceError::Validation(errors)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Validity {
    pub valid: bool,
    pub expires_at: Option<NaiveDate>,
}

/// Per exam type: valid while some exam of that type has not expired,
/// reporting the latest expiry among those.
pub fn validity_by_type(exams: &[exams::Model], today: NaiveDate) -> BTreeMap<&'static str, Validity> {
    ExamType::iter()
        .map(|exam_type| {
            let latest = exams
                .iter()
                .filter(|e| e.exam_type == exam_type && e.expires_at > today)
                .map(|e| e.expires_at)
                .max();
            (
                exam_type.as_str(),
                Validity {
                    valid: latest.is_some(),
                    expires_at: latest,
                },
            )
        })
        .collect()
}

pub async fn create_exam(user_id: i32, exam: NewExam, file: StoredFile) -> ServiceResult<exams::Model> {
    let now = Utc::now().naive_utc();
    let model = exams::ActiveModel {
        user_id: Set(user_id),
        exam_type: Set(exam.exam_type),
        file_url: Set(file.url),
        file_original_name: Set(file.original_name),
        file_mime_type: Set(file.content_type),
        file_size: Set(file.size as i64),
        description: Set(exam.description),
        performed_at: Set(exam.performed_at),
        expires_at: Set(exam.expires_at),
        status: Set(ExamStatus::Pending),
        results: Set(None),
        doctor_notes: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await?;

    log::info!("Exam {} uploaded by user {}", model.id, user_id);
    Ok(model)
}

pub async fn list_for_user(user_id: i32, exam_type: Option<ExamType>) -> ServiceResult<Vec<exams::Model>> {
    let mut query = exams::Entity::find().filter(exams::Column::UserId.eq(user_id));
    if let Some(exam_type) = exam_type {
        query = query.filter(exams::Column::ExamType.eq(exam_type));
    }
    Ok(query
        .order_by_desc(exams::Column::PerformedAt)
        .all(get_db_pool())
        .await?)
}

/// Only the owner can see an exam; anyone else gets NotFound.
pub async fn get_for_user(user_id: i32, exam_id: i32) -> ServiceResult<exams::Model> {
    exams::Entity::find_by_id(exam_id)
        .filter(exams::Column::UserId.eq(user_id))
        .one(get_db_pool())
        .await?
        .ok_or(ServiceError::NotFound("Exam"))
}

pub async fn delete_for_user(user_id: i32, exam_id: i32) -> ServiceResult<()> {
    let result = exams::Entity::delete_many()
        .filter(exams::Column::Id.eq(exam_id))
        .filter(exams::Column::UserId.eq(user_id))
        .exec(get_db_pool())
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound("Exam"));
    }
    log::info!("Exam {} deleted by user {}", exam_id, user_id);
    Ok(())
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExamReview {
    pub status: ExamStatus,
    pub results: Option<String>,
    #[serde(alias = "doctorNotes")]
    pub doctor_notes: Option<String>,
}

/// Administrator review. The owner is told about the new status.
pub async fn review(exam_id: i32, input: ExamReview, notifier: &dyn Notifier) -> ServiceResult<exams::Model> {
    let db = get_db_pool();
    let exam = exams::Entity::find_by_id(exam_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("Exam"))?;

    let mut active: exams::ActiveModel = exam.into();
    active.status = Set(input.status);
    if input.results.is_some() {
        active.results = Set(input.results);
    }
    if input.doctor_notes.is_some() {
        active.doctor_notes = Set(input.doctor_notes);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    let exam = active.update(db).await?;

    deliver(
        notifier,
        exam.user_id,
        NotificationEvent::ExamStatusChanged {
            exam_id: exam.id,
            exam_type: exam.exam_type,
            status: exam.status,
        },
    )
    .await;

    Ok(exam)
}

pub async fn validity_for_user(user_id: i32, today: NaiveDate) -> ServiceResult<BTreeMap<&'static str, Validity>> {
    let exams = list_for_user(user_id, None).await?;
    Ok(validity_by_type(&exams, today))
}
