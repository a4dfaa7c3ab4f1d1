//! Accounts: registration, login, profile and health data, privacy settings
//! and the administrator views over users and exams.

use crate::app_config;
use crate::db::get_db_pool;
use crate::error::{ServiceError, ServiceResult};
use crate::orm::exams::{self, ExamStatus};
use crate::orm::users::{self, Gender, Role};
use crate::session::{hash_password, verify_password};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ActiveValue::Set, DbErr, FromQueryResult, TransactionTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Full years between `birth_date` and `today`.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Body mass index rounded to two decimals. Height is in metres.
pub fn bmi(weight: Option<f64>, height: Option<f64>) -> Option<f64> {
    match (weight, height) {
        (Some(w), Some(h)) if h > 0.0 => Some((w / (h * h) * 100.0).round() / 100.0),
        _ => None,
    }
}

/// Parses `"120/80"` into (systolic, diastolic).
pub fn parse_blood_pressure(raw: &str) -> ServiceResult<(i32, i32)> {
    let invalid = || ServiceError::invalid("blood_pressure", "Invalid blood pressure format. Expected '120/80'");

    let (systolic, diastolic) = raw.split_once('/').ok_or_else(invalid)?;
    let systolic: i32 = systolic.trim().parse().map_err(|_| invalid())?;
    let diastolic: i32 = diastolic.trim().parse().map_err(|_| invalid())?;
    if systolic < 0 || diastolic < 0 {
        return Err(invalid());
    }
    Ok((systolic, diastolic))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password_length(password: &str) -> ServiceResult<()> {
    let min = app_config::security().min_password_length as usize;
    if password.chars().count() < min {
        return Err(ServiceError::invalid(
            "password",
            &format!("Password must be at least {} characters long", min),
        ));
    }
    Ok(())
}

async fn find_by_id(id: i32) -> ServiceResult<users::Model> {
    users::Entity::find_by_id(id)
        .one(get_db_pool())
        .await?
        .ok_or(ServiceError::NotFound("User"))
}

async fn ensure_email_free(email: &str, except: Option<i32>) -> ServiceResult<()> {
    let mut query = users::Entity::find().filter(users::Column::Email.eq(email));
    if let Some(id) = except {
        query = query.filter(users::Column::Id.ne(id));
    }
    if query.count(get_db_pool()).await? > 0 {
        return Err(ServiceError::Conflict("Email already registered".to_string()));
    }
    Ok(())
}

async fn insert_user(
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    birth_date: Option<NaiveDate>,
    phone: Option<String>,
) -> ServiceResult<users::Model> {
    check_password_length(password)?;
    ensure_email_free(email, None).await?;

    let hash = hash_password(password).map_err(|e| {
        log::error!("Failed to hash password: {}", e);
        ServiceError::Database(DbErr::Custom("password hashing failed".to_string()))
    })?;

    let now = Utc::now().naive_utc();
    let user = users::ActiveModel {
        name: Set(name.trim().to_string()),
        email: Set(email.to_string()),
        password: Set(hash),
        role: Set(role),
        birth_date: Set(birth_date),
        phone: Set(phone),
        flu_symptoms: Set(false),
        score: Set(0),
        share_health_data: Set(false),
        share_activity: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await?;

    Ok(user)
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    pub password: String,
    #[serde(default, alias = "birthDate")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Public sign-up always creates a regular user.
pub async fn register(input: Registration) -> ServiceResult<users::Model> {
    input.validate()?;
    let email = normalize_email(&input.email);
    let user = insert_user(
        &input.name,
        &email,
        &input.password,
        Role::User,
        input.birth_date,
        input.phone,
    )
    .await?;

    log::info!("New user registered: {} (user_id: {})", email, user.id);
    Ok(user)
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginResultStatus {
    Success,
    BadEmail,
    BadPassword,
}

pub struct LoginResult {
    pub result: LoginResultStatus,
    pub user: Option<users::Model>,
}

impl LoginResult {
    fn success(user: users::Model) -> Self {
        Self {
            result: LoginResultStatus::Success,
            user: Some(user),
        }
    }

    fn fail(result: LoginResultStatus) -> Self {
        Self { result, user: None }
    }
}

/// Checks credentials and stamps `last_login` on success.
pub async fn login(email: &str, password: &str) -> Result<LoginResult, DbErr> {
    let db = get_db_pool();
    let user = users::Entity::find()
        .filter(users::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?;

    let user = match user {
        Some(user) => user,
        None => return Ok(LoginResult::fail(LoginResultStatus::BadEmail)),
    };

    if !verify_password(password, &user.password) {
        return Ok(LoginResult::fail(LoginResultStatus::BadPassword));
    }

    let mut active: users::ActiveModel = user.into();
    active.last_login = Set(Some(Utc::now().naive_utc()));
    let user = active.update(db).await?;

    Ok(LoginResult::success(user))
}

pub async fn get_profile(user_id: i32) -> ServiceResult<users::Model> {
    find_by_id(user_id).await
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProfileChanges {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: Option<String>,
    pub company: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    #[serde(alias = "birthDate")]
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
}

pub async fn update_profile(user_id: i32, changes: ProfileChanges) -> ServiceResult<users::Model> {
    changes.validate()?;

    let mut active: users::ActiveModel = find_by_id(user_id).await?.into();
    if let Some(name) = changes.name {
        active.name = Set(name.trim().to_string());
    }
    if changes.company.is_some() {
        active.company = Set(changes.company);
    }
    if changes.department.is_some() {
        active.department = Set(changes.department);
    }
    if changes.position.is_some() {
        active.position = Set(changes.position);
    }
    if changes.phone.is_some() {
        active.phone = Set(changes.phone);
    }
    if changes.birth_date.is_some() {
        active.birth_date = Set(changes.birth_date);
    }
    if changes.gender.is_some() {
        active.gender = Set(changes.gender);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(active.update(get_db_pool()).await?)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthData {
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub blood_pressure: Option<BloodPressure>,
    pub last_checkup: Option<NaiveDate>,
    pub sleep_quality: Option<String>,
    pub mood: Option<String>,
    pub flu_symptoms: bool,
}

impl From<&users::Model> for HealthData {
    fn from(user: &users::Model) -> Self {
        let blood_pressure = match (user.systolic, user.diastolic) {
            (Some(systolic), Some(diastolic)) => Some(BloodPressure { systolic, diastolic }),
            _ => None,
        };
        Self {
            weight: user.weight,
            height: user.height,
            bmi: bmi(user.weight, user.height),
            blood_pressure,
            last_checkup: user.last_checkup,
            sleep_quality: user.sleep_quality.clone(),
            mood: user.mood.clone(),
            flu_symptoms: user.flu_symptoms,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthView {
    pub health_data: HealthData,
    pub score: i32,
}

pub async fn get_health(user_id: i32) -> ServiceResult<HealthView> {
    let user = find_by_id(user_id).await?;
    Ok(HealthView {
        health_data: HealthData::from(&user),
        score: user.score,
    })
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct HealthChanges {
    #[validate(range(min = 0.0, message = "Weight must be a positive number"))]
    pub weight: Option<f64>,
    #[validate(range(min = 0.0, message = "Height must be a positive number"))]
    pub height: Option<f64>,
    #[serde(alias = "bloodPressure")]
    pub blood_pressure: Option<String>,
    #[serde(alias = "lastCheckup")]
    pub last_checkup: Option<NaiveDate>,
    #[serde(alias = "sleepQuality")]
    pub sleep_quality: Option<String>,
    pub mood: Option<String>,
    #[serde(alias = "fluSymptoms")]
    pub flu_symptoms: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthUpdate {
    pub updated_fields: Vec<&'static str>,
    pub health_data: HealthData,
}

pub async fn update_health(user_id: i32, changes: HealthChanges) -> ServiceResult<HealthUpdate> {
    changes.validate()?;
    let pressure = changes
        .blood_pressure
        .as_deref()
        .map(parse_blood_pressure)
        .transpose()?;

    let mut active: users::ActiveModel = find_by_id(user_id).await?.into();
    let mut updated_fields = Vec::new();
    if changes.weight.is_some() {
        active.weight = Set(changes.weight);
        updated_fields.push("weight");
    }
    if changes.height.is_some() {
        active.height = Set(changes.height);
        updated_fields.push("height");
    }
    if let Some((systolic, diastolic)) = pressure {
        active.systolic = Set(Some(systolic));
        active.diastolic = Set(Some(diastolic));
        updated_fields.push("blood_pressure");
    }
    if changes.last_checkup.is_some() {
        active.last_checkup = Set(changes.last_checkup);
        updated_fields.push("last_checkup");
    }
    if changes.sleep_quality.is_some() {
        active.sleep_quality = Set(changes.sleep_quality);
        updated_fields.push("sleep_quality");
    }
    if changes.mood.is_some() {
        active.mood = Set(changes.mood);
        updated_fields.push("mood");
    }
    if let Some(flu) = changes.flu_symptoms {
        active.flu_symptoms = Set(flu);
        updated_fields.push("flu_symptoms");
    }

    if updated_fields.is_empty() {
        return Err(ServiceError::invalid(
            "body",
            "No valid health data provided for update",
        ));
    }

    active.updated_at = Set(Utc::now().naive_utc());
    let user = active.update(get_db_pool()).await?;
    Ok(HealthUpdate {
        updated_fields,
        health_data: HealthData::from(&user),
    })
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrivacySettings {
    #[serde(alias = "shareHealthData")]
    pub share_health_data: Option<bool>,
    #[serde(alias = "shareActivity")]
    pub share_activity: Option<bool>,
}

pub async fn update_privacy(user_id: i32, changes: PrivacySettings) -> ServiceResult<PrivacySettings> {
    let mut active: users::ActiveModel = find_by_id(user_id).await?.into();
    if let Some(share) = changes.share_health_data {
        active.share_health_data = Set(share);
    }
    if let Some(share) = changes.share_activity {
        active.share_activity = Set(share);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    let user = active.update(get_db_pool()).await?;
    Ok(PrivacySettings {
        share_health_data: Some(user.share_health_data),
        share_activity: Some(user.share_activity),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dashboard {
    pub id: i32,
    pub name: String,
    pub age: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub score: i32,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sleep_quality: String,
    pub mood: String,
    pub flu_symptoms: bool,
    pub department: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
}

impl Dashboard {
    pub fn of(user: &users::Model, today: NaiveDate) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            age: user.birth_date.map(|b| age_on(b, today)),
            birth_date: user.birth_date,
            score: user.score,
            weight: user.weight,
            height: user.height,
            sleep_quality: user.sleep_quality.clone().unwrap_or_else(|| "boa".to_string()),
            mood: user.mood.clone().unwrap_or_else(|| "bom".to_string()),
            flu_symptoms: user.flu_symptoms,
            department: user.department.clone(),
            company: user.company.clone(),
            position: user.position.clone(),
        }
    }
}

pub async fn dashboard(user_id: i32, today: NaiveDate) -> ServiceResult<Dashboard> {
    let user = find_by_id(user_id).await?;
    Ok(Dashboard::of(&user, today))
}

/// Newest first.
pub async fn list_users() -> ServiceResult<Vec<users::Model>> {
    Ok(users::Entity::find()
        .order_by_desc(users::Column::CreatedAt)
        .all(get_db_pool())
        .await?)
}

pub async fn get_user(id: i32) -> ServiceResult<users::Model> {
    find_by_id(id).await
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

pub async fn create_user(input: NewUser) -> ServiceResult<users::Model> {
    input.validate()?;
    let email = normalize_email(&input.email);
    let user = insert_user(
        &input.name,
        &email,
        &input.password,
        input.role.unwrap_or(Role::User),
        None,
        None,
    )
    .await?;

    log::info!("Admin created user {} (role {:?})", user.id, user.role);
    Ok(user)
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserChanges {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
}

pub async fn update_user(id: i32, changes: UserChanges) -> ServiceResult<users::Model> {
    changes.validate()?;

    let mut active: users::ActiveModel = find_by_id(id).await?.into();
    if let Some(name) = changes.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = changes.email {
        let email = normalize_email(&email);
        ensure_email_free(&email, Some(id)).await?;
        active.email = Set(email);
    }
    if let Some(role) = changes.role {
        active.role = Set(role);
    }
    if let Some(password) = changes.password {
        check_password_length(&password)?;
        let hash = hash_password(&password).map_err(|e| {
            log::error!("Failed to hash password: {}", e);
            ServiceError::Database(DbErr::Custom("password hashing failed".to_string()))
        })?;
        active.password = Set(hash);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(active.update(get_db_pool()).await?)
}

/// Removes the user together with their exams.
pub async fn delete_user(id: i32) -> ServiceResult<()> {
    let db = get_db_pool();
    find_by_id(id).await?;

    let txn = db.begin().await?;
    let exams_deleted = exams::Entity::delete_many()
        .filter(exams::Column::UserId.eq(id))
        .exec(&txn)
        .await?
        .rows_affected;
    users::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    log::info!("Deleted user {} and {} exams", id, exams_deleted);
    Ok(())
}

#[derive(Clone, Debug, Serialize, FromQueryResult)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

#[derive(Clone, Debug, Serialize, FromQueryResult)]
pub struct TopUser {
    pub id: i32,
    pub name: String,
    pub score: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SystemStats {
    pub total_users: u64,
    pub recent_users: u64,
    pub active_users: u64,
    pub total_exams: u64,
    pub pending_exams: u64,
    pub expired_exams: u64,
    pub expiring_soon: u64,
    pub exams_by_type: Vec<GroupCount>,
    pub exams_by_status: Vec<GroupCount>,
    pub top_users: Vec<TopUser>,
}

pub const RECENT_DAYS: i64 = 30;
pub const EXPIRING_SOON_DAYS: i64 = 15;

async fn exam_counts_by(column: exams::Column) -> Result<Vec<GroupCount>, DbErr> {
    exams::Entity::find()
        .select_only()
        .column_as(column, "key")
        .column_as(Expr::col(exams::Column::Id).count(), "count")
        .group_by(column)
        .order_by_asc(column)
        .into_model::<GroupCount>()
        .all(get_db_pool())
        .await
}

pub async fn system_stats(now: NaiveDateTime) -> ServiceResult<SystemStats> {
    let db = get_db_pool();
    let today = now.date();
    let since = now - Duration::days(RECENT_DAYS);
    let soon = today + Duration::days(EXPIRING_SOON_DAYS);

    let total_users = users::Entity::find()
        .filter(users::Column::Role.eq(Role::User))
        .count(db)
        .await?;
    let recent_users = users::Entity::find()
        .filter(users::Column::CreatedAt.gte(since))
        .count(db)
        .await?;
    let active_users = users::Entity::find()
        .filter(users::Column::LastLogin.gte(since))
        .count(db)
        .await?;

    let total_exams = exams::Entity::find().count(db).await?;
    let pending_exams = exams::Entity::find()
        .filter(exams::Column::Status.eq(ExamStatus::Pending))
        .count(db)
        .await?;
    // An exam expiring today is already expired.
    let expired_exams = exams::Entity::find()
        .filter(exams::Column::ExpiresAt.lte(today))
        .count(db)
        .await?;
    let expiring_soon = exams::Entity::find()
        .filter(exams::Column::ExpiresAt.gt(today))
        .filter(exams::Column::ExpiresAt.lte(soon))
        .count(db)
        .await?;

    let exams_by_type = exam_counts_by(exams::Column::ExamType).await?;
    let exams_by_status = exam_counts_by(exams::Column::Status).await?;

    let top_users = users::Entity::find()
        .select_only()
        .column(users::Column::Id)
        .column(users::Column::Name)
        .column(users::Column::Score)
        .filter(users::Column::Role.eq(Role::User))
        .order_by_desc(users::Column::Score)
        .limit(5)
        .into_model::<TopUser>()
        .all(db)
        .await?;

    Ok(SystemStats {
        total_users: total_users as u64,
        recent_users: recent_users as u64,
        active_users: active_users as u64,
        total_exams: total_exams as u64,
        pending_exams: pending_exams as u64,
        expired_exams: expired_exams as u64,
        expiring_soon: expiring_soon as u64,
        exams_by_type,
        exams_by_status,
        top_users,
    })
}
