use crate::app_config;
use crate::daily::{self, CheckinInput};
use crate::middleware::ClientCtx;
use actix_web::{get, post, web, Error, HttpResponse};
use chrono::Utc;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_pills)
        .service(post_checkin)
        .service(view_checkin_history)
        .service(view_score)
        .service(view_leaderboard);
}

const LEADERBOARD_SIZE: u64 = 10;
const HISTORY_SIZE: u64 = 30;

/// GET /daily/pills - The caller's pills for today
#[get("/daily/pills")]
pub async fn view_pills(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let today = Utc::now().date_naive();
    let pills = daily::todays_pills(user_id, today, app_config::limits().daily_pill_count).await?;
    Ok(super::success(serde_json::json!({
        "date": today,
        "pills": pills,
    })))
}

#[post("/daily/checkin")]
pub async fn post_checkin(
    client: ClientCtx,
    form: web::Json<CheckinInput>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    let today = Utc::now().date_naive();
    let outcome = daily::checkin(
        user_id,
        today,
        form.into_inner(),
        app_config::limits().daily_pill_count,
    )
    .await?;
    Ok(super::created(outcome))
}

#[get("/daily/checkin/history")]
pub async fn view_checkin_history(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(
        daily::checkin_history(user_id, HISTORY_SIZE).await?,
    ))
}

#[get("/daily/score")]
pub async fn view_score(client: ClientCtx) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;
    Ok(super::success(daily::score_and_rank(user_id).await?))
}

#[get("/daily/leaderboard")]
pub async fn view_leaderboard(client: ClientCtx) -> Result<HttpResponse, Error> {
    client.require_login()?;
    Ok(super::success(daily::leaderboard(LEADERBOARD_SIZE).await?))
}
