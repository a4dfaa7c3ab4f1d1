//! Administrator user management and system statistics.

use crate::middleware::ClientCtx;
use crate::user::{self, NewUser, UserChanges};
use actix_web::{delete, get, patch, post, web, Error, HttpResponse};
use chrono::Utc;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_users)
        .service(view_user)
        .service(create_user)
        .service(update_user)
        .service(delete_user)
        .service(view_stats);
}

#[get("/admin/users")]
pub async fn list_users(client: ClientCtx) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(user::list_users().await?))
}

#[get("/admin/users/{id}")]
pub async fn view_user(client: ClientCtx, id: web::Path<i32>) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(user::get_user(*id).await?))
}

#[post("/admin/users")]
pub async fn create_user(
    client: ClientCtx,
    form: web::Json<NewUser>,
) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::created(user::create_user(form.into_inner()).await?))
}

#[patch("/admin/users/{id}")]
pub async fn update_user(
    client: ClientCtx,
    id: web::Path<i32>,
    form: web::Json<UserChanges>,
) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(
        user::update_user(*id, form.into_inner()).await?,
    ))
}

#[delete("/admin/users/{id}")]
pub async fn delete_user(client: ClientCtx, id: web::Path<i32>) -> Result<HttpResponse, Error> {
    let admin_id = client.require_admin()?;
    user::delete_user(*id).await?;
    log::info!("Admin {} deleted user {}", admin_id, id);
    Ok(super::done("User deleted successfully"))
}

#[get("/admin/stats")]
pub async fn view_stats(client: ClientCtx) -> Result<HttpResponse, Error> {
    client.require_admin()?;
    Ok(super::success(
        user::system_stats(Utc::now().naive_utc()).await?,
    ))
}
