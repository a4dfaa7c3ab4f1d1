//! The logged-in user's own account.

use crate::middleware::ClientCtx;
use crate::user::{self, HealthChanges, PrivacySettings, ProfileChanges};
use actix_web::{get, patch, web, Error, HttpResponse};
use chrono::Utc;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_profile)
        .service(update_profile)
        .service(view_health)
        .service(update_health)
        .service(update_privacy)
        .service(view_dashboard);
}

#[get("/users/profile")]
pub async fn view_profile(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(user::get_profile(user_id).await?))
}

#[patch("/users/profile")]
pub async fn update_profile(
    client: ClientCtx,
    form: web::Json<ProfileChanges>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        user::update_profile(user_id, form.into_inner()).await?,
    ))
}

#[get("/users/health")]
pub async fn view_health(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(user::get_health(user_id).await?))
}

#[patch("/users/health")]
pub async fn update_health(
    client: ClientCtx,
    form: web::Json<HealthChanges>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        user::update_health(user_id, form.into_inner()).await?,
    ))
}

#[patch("/users/privacy")]
pub async fn update_privacy(
    client: ClientCtx,
    form: web::Json<PrivacySettings>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        user::update_privacy(user_id, form.into_inner()).await?,
    ))
}

#[get("/users/dashboard")]
pub async fn view_dashboard(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let today = Utc::now().date_naive();
    Ok(super::success(user::dashboard(user_id, today).await?))
}
