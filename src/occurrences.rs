//! General workplace occurrence reports: logistics problems, structural
//! issues, suggestions and complaints, with comments and a resolution.

use crate::db::get_db_pool;
use crate::error::{ServiceError, ServiceResult};
use crate::orm::reports::{self, Impact, OccurrencePriority, OccurrenceStatus, OccurrenceType};
use crate::orm::{report_comments, users};
use crate::risk::{DateWindow, EvidenceFile};
use chrono::Utc;
use sea_orm::{entity::*, query::*, ActiveValue::Set, FromQueryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Location is required".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewOccurrence {
    #[serde(rename = "type")]
    pub report_type: OccurrenceType,
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 20, message = "Description must be at least 20 characters long"))]
    pub description: String,
    #[validate(custom = "not_blank")]
    pub location: String,
    pub impact: Impact,
    #[serde(default)]
    pub priority: Option<OccurrencePriority>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OccurrenceChanges {
    #[serde(rename = "type")]
    pub report_type: Option<OccurrenceType>,
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 20, message = "Description must be at least 20 characters long"))]
    pub description: Option<String>,
    #[validate(custom = "not_blank")]
    pub location: Option<String>,
    pub impact: Option<Impact>,
    pub priority: Option<OccurrencePriority>,
    pub status: Option<OccurrenceStatus>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 5, message = "Comment must be at least 5 characters long"))]
    pub text: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct Resolution {
    #[validate(length(min = 20, message = "Resolution description must be at least 20 characters long"))]
    pub description: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OccurrenceFilter {
    #[serde(rename = "type")]
    pub report_type: Option<OccurrenceType>,
    pub status: Option<OccurrenceStatus>,
    pub impact: Option<Impact>,
    #[serde(flatten)]
    pub created: DateWindow,
}

#[derive(Clone, Debug, Serialize, FromQueryResult)]
pub struct CommentView {
    pub id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub text: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Clone, Debug, Serialize)]
pub struct OccurrenceDetail {
    #[serde(flatten)]
    pub report: reports::Model,
    pub comments: Vec<CommentView>,
}

pub async fn create(
    user_id: i32,
    input: NewOccurrence,
    attachments: Vec<EvidenceFile>,
) -> ServiceResult<reports::Model> {
    input.validate()?;

    let now = Utc::now().naive_utc();
    let report = reports::ActiveModel {
        user_id: Set(Some(user_id)),
        report_type: Set(input.report_type),
        title: Set(input.title.trim().to_string()),
        description: Set(input.description.trim().to_string()),
        location: Set(input.location.trim().to_string()),
        impact: Set(input.impact),
        priority: Set(input.priority),
        attachments: Set(serde_json::json!(attachments)),
        status: Set(OccurrenceStatus::Pendente),
        resolution_description: Set(None),
        resolved_at: Set(None),
        resolved_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await?;

    log::info!("Occurrence {} reported by user {}", report.id, user_id);
    Ok(report)
}

/// Newest first.
pub async fn list(filter: &OccurrenceFilter) -> ServiceResult<Vec<reports::Model>> {
    let mut query = reports::Entity::find();
    if let Some(t) = filter.report_type {
        query = query.filter(reports::Column::ReportType.eq(t));
    }
    if let Some(s) = filter.status {
        query = query.filter(reports::Column::Status.eq(s));
    }
    if let Some(i) = filter.impact {
        query = query.filter(reports::Column::Impact.eq(i));
    }
    let (start, end) = filter.created.bounds();
    if let Some(start) = start {
        query = query.filter(reports::Column::CreatedAt.gte(start));
    }
    if let Some(end) = end {
        query = query.filter(reports::Column::CreatedAt.lt(end));
    }
    Ok(query
        .order_by_desc(reports::Column::CreatedAt)
        .all(get_db_pool())
        .await?)
}

async fn load(id: i32) -> ServiceResult<reports::Model> {
    reports::Entity::find_by_id(id)
        .one(get_db_pool())
        .await?
        .ok_or(ServiceError::NotFound("Report"))
}

pub async fn get(id: i32) -> ServiceResult<OccurrenceDetail> {
    let report = load(id).await?;
    let comments = report_comments::Entity::find()
        .select_only()
        .column(report_comments::Column::Id)
        .column(report_comments::Column::UserId)
        .column_as(users::Column::Name, "user_name")
        .column(report_comments::Column::Text)
        .column(report_comments::Column::CreatedAt)
        .join(
            JoinType::LeftJoin,
            report_comments::Entity::belongs_to(users::Entity)
                .from(report_comments::Column::UserId)
                .to(users::Column::Id)
                .into(),
        )
        .filter(report_comments::Column::ReportId.eq(id))
        .order_by_asc(report_comments::Column::CreatedAt)
        .into_model::<CommentView>()
        .all(get_db_pool())
        .await?;
    Ok(OccurrenceDetail { report, comments })
}

pub async fn update(id: i32, changes: OccurrenceChanges) -> ServiceResult<reports::Model> {
    changes.validate()?;

    let mut active: reports::ActiveModel = load(id).await?.into();
    if let Some(t) = changes.report_type {
        active.report_type = Set(t);
    }
    if let Some(title) = changes.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = changes.description {
        active.description = Set(description.trim().to_string());
    }
    if let Some(location) = changes.location {
        active.location = Set(location.trim().to_string());
    }
    if let Some(impact) = changes.impact {
        active.impact = Set(impact);
    }
    if changes.priority.is_some() {
        active.priority = Set(changes.priority);
    }
    if let Some(status) = changes.status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(active.update(get_db_pool()).await?)
}

pub async fn add_comment(id: i32, user_id: i32, input: NewComment) -> ServiceResult<OccurrenceDetail> {
    input.validate()?;
    load(id).await?;

    report_comments::ActiveModel {
        report_id: Set(id),
        user_id: Set(user_id),
        text: Set(input.text.trim().to_string()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await?;

    get(id).await
}

pub async fn resolve(id: i32, admin_id: i32, input: Resolution) -> ServiceResult<reports::Model> {
    input.validate()?;

    let now = Utc::now().naive_utc();
    let mut active: reports::ActiveModel = load(id).await?.into();
    active.status = Set(OccurrenceStatus::Resolvido);
    active.resolution_description = Set(Some(input.description.trim().to_string()));
    active.resolved_at = Set(Some(now));
    active.resolved_by = Set(Some(admin_id));
    active.updated_at = Set(now);
    let report = active.update(get_db_pool()).await?;

    log::info!("Occurrence {} resolved by admin {}", id, admin_id);
    Ok(report)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    #[serde(rename = "type")]
    pub report_type: OccurrenceType,
    pub status: OccurrenceStatus,
    pub priority: Option<OccurrencePriority>,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OccurrenceStats {
    pub by_type_and_status: Vec<GroupCount>,
    pub by_impact: BTreeMap<Impact, u64>,
}

pub fn stats_of(reports: &[reports::Model]) -> OccurrenceStats {
    let mut groups: BTreeMap<(OccurrenceType, OccurrenceStatus, Option<OccurrencePriority>), u64> =
        BTreeMap::new();
    let mut by_impact: BTreeMap<Impact, u64> = BTreeMap::new();
    for report in reports {
        *groups
            .entry((report.report_type, report.status, report.priority))
            .or_default() += 1;
        *by_impact.entry(report.impact).or_default() += 1;
    }

    OccurrenceStats {
        by_type_and_status: groups
            .into_iter()
            .map(|((report_type, status, priority), count)| GroupCount {
                report_type,
                status,
                priority,
                count,
            })
            .collect(),
        by_impact,
    }
}

pub async fn stats() -> ServiceResult<OccurrenceStats> {
    let all = reports::Entity::find().all(get_db_pool()).await?;
    Ok(stats_of(&all))
}
