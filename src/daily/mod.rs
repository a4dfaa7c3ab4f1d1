//! Daily health pills and check-ins.
//!
//! Every user gets a stable selection of pills per calendar day. The
//! selection is a seeded shuffle, so it can be recomputed on check-in and
//! points are always taken from the server's pill values.

use crate::db::get_db_pool;
use crate::error::{ServiceError, ServiceResult};
use crate::orm::{checkins, pills, users};
use chrono::{NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ActiveValue::Set, FromQueryResult, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Seed for one user's selection on one day.
pub fn daily_seed(user_id: i32, date: NaiveDate) -> u64 {
    let hash = blake3::hash(format!("{}{}", user_id, date.format("%Y-%m-%d")).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// The pills `user_id` sees on `date`. Depends only on its inputs: the
/// pills are ordered by id before the seeded shuffle.
pub fn daily_selection(
    user_id: i32,
    date: NaiveDate,
    mut pills: Vec<pills::Model>,
    count: usize,
) -> Vec<pills::Model> {
    pills.sort_by_key(|p| p.id);
    let mut rng = StdRng::seed_from_u64(daily_seed(user_id, date));
    pills.shuffle(&mut rng);
    pills.truncate(count);
    pills
}

#[derive(Clone, Debug, Deserialize)]
pub struct TaskInput {
    pub id: i32,
    pub completed: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckinInput {
    pub tasks: Vec<TaskInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: i32,
    pub completed: bool,
    pub points: i32,
}

/// Points for the submitted tasks, priced from `selection`. Unknown ids and
/// repeated ids are rejected.
pub fn score_tasks(selection: &[pills::Model], tasks: &[TaskInput]) -> ServiceResult<Vec<TaskResult>> {
    if tasks.is_empty() {
        return Err(ServiceError::invalid("tasks", "at least one task is required"));
    }

    let values: HashMap<i32, i32> = selection.iter().map(|p| (p.id, p.points)).collect();
    let mut seen = Vec::with_capacity(tasks.len());
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        let Some(points) = values.get(&task.id) else {
            return Err(ServiceError::invalid(
                "tasks",
                &format!("task {} is not part of today's selection", task.id),
            ));
        };
        if seen.contains(&task.id) {
            return Err(ServiceError::invalid(
                "tasks",
                &format!("task {} was submitted twice", task.id),
            ));
        }
        seen.push(task.id);
        results.push(TaskResult {
            id: task.id,
            completed: task.completed,
            points: if task.completed { *points } else { 0 },
        });
    }
    Ok(results)
}

pub async fn todays_pills(user_id: i32, date: NaiveDate, count: usize) -> ServiceResult<Vec<pills::Model>> {
    let all = pills::Entity::find().all(get_db_pool()).await?;
    Ok(daily_selection(user_id, date, all, count))
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckinOutcome {
    pub points_earned: i32,
    pub total_score: i32,
    pub tasks: Vec<TaskResult>,
}

/// Records the day's check-in and adds the points to the user's score.
pub async fn checkin(
    user_id: i32,
    date: NaiveDate,
    input: CheckinInput,
    count: usize,
) -> ServiceResult<CheckinOutcome> {
    let db = get_db_pool();

    let existing = checkins::Entity::find()
        .filter(checkins::Column::UserId.eq(user_id))
        .filter(checkins::Column::Date.eq(date))
        .count(db)
        .await?;
    if existing > 0 {
        return Err(ServiceError::Conflict(
            "Check-in already completed today".to_string(),
        ));
    }

    let selection = todays_pills(user_id, date, count).await?;
    let tasks = score_tasks(&selection, &input.tasks)?;
    let points_earned: i32 = tasks.iter().map(|t| t.points).sum();

    let txn = db.begin().await?;
    checkins::ActiveModel {
        user_id: Set(user_id),
        date: Set(date),
        tasks: Set(serde_json::json!(tasks)),
        points_earned: Set(points_earned),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    users::Entity::update_many()
        .col_expr(
            users::Column::Score,
            Expr::col(users::Column::Score).add(points_earned),
        )
        .filter(users::Column::Id.eq(user_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    let total_score = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .map(|u| u.score)
        .ok_or(ServiceError::NotFound("User"))?;

    log::info!("User {} checked in for {}: +{} points", user_id, date, points_earned);
    Ok(CheckinOutcome {
        points_earned,
        total_score,
        tasks,
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct ScoreAndRank {
    pub score: i32,
    pub rank: u64,
}

/// Rank is one more than the number of users with a strictly higher score.
pub async fn score_and_rank(user_id: i32) -> ServiceResult<ScoreAndRank> {
    let db = get_db_pool();
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(ServiceError::NotFound("User"))?;
    let higher = users::Entity::find()
        .filter(users::Column::Score.gt(user.score))
        .count(db)
        .await?;
    Ok(ScoreAndRank {
        score: user.score,
        rank: higher as u64 + 1,
    })
}

#[derive(Clone, Debug, Serialize, FromQueryResult)]
pub struct LeaderboardEntry {
    pub id: i32,
    pub name: String,
    pub score: i32,
}

pub async fn leaderboard(limit: u64) -> ServiceResult<Vec<LeaderboardEntry>> {
    Ok(users::Entity::find()
        .select_only()
        .column(users::Column::Id)
        .column(users::Column::Name)
        .column(users::Column::Score)
        .order_by_desc(users::Column::Score)
        .order_by_asc(users::Column::Id)
        .limit(limit)
        .into_model::<LeaderboardEntry>()
        .all(get_db_pool())
        .await?)
}

pub async fn checkin_history(user_id: i32, limit: u64) -> ServiceResult<Vec<checkins::Model>> {
    Ok(checkins::Entity::find()
        .filter(checkins::Column::UserId.eq(user_id))
        .order_by_desc(checkins::Column::Date)
        .limit(limit)
        .all(get_db_pool())
        .await?)
}
