//! Registration, login and logout over the cookie session.

use crate::error::ServiceError;
use crate::middleware::ClientCtx;
use crate::rate_limit;
use crate::session::{end_session, start_session};
use crate::user::{self, LoginResultStatus, Registration};
use actix_session::Session;
use actix_web::{post, web, Error, HttpRequest, HttpResponse};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(register).service(login).service(logout);
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_owned()
}

#[post("/auth/register")]
pub async fn register(
    req: HttpRequest,
    session: Session,
    form: web::Json<Registration>,
) -> Result<HttpResponse, Error> {
    let ip = client_ip(&req);
    if let Err(e) = rate_limit::check_registration_rate_limit(&ip) {
        log::warn!("Rate limit exceeded for registration: ip={}", ip);
        return Err(ServiceError::from(e).into());
    }

    let user = user::register(form.into_inner()).await?;
    start_session(&session, user.id)?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "data": { "user": user },
    })))
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[post("/auth/login")]
pub async fn login(
    req: HttpRequest,
    session: Session,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, Error> {
    let ip = client_ip(&req);
    if form.email.trim().is_empty() || form.password.is_empty() {
        return Err(ServiceError::invalid("email", "Email and password are required").into());
    }
    if let Err(e) = rate_limit::check_login_rate_limit(&ip, &form.email) {
        log::warn!("Rate limit exceeded for login: ip={}", ip);
        return Err(ServiceError::from(e).into());
    }

    let result = user::login(&form.email, &form.password)
        .await
        .map_err(ServiceError::from)?;

    match (result.result, result.user) {
        (LoginResultStatus::Success, Some(user)) => {
            rate_limit::clear_login_attempts(&ip, &form.email);
            start_session(&session, user.id)?;
            log::info!("User {} logged in", user.id);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "data": { "user": user },
            })))
        }
        (status, _) => {
            log::debug!("Failed login for {}: {:?}", form.email, status);
            Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "message": "Invalid credentials",
            })))
        }
    }
}

#[post("/auth/logout")]
pub async fn logout(client: ClientCtx, session: Session) -> Result<HttpResponse, Error> {
    client.require_login()?;
    end_session(&session);
    Ok(super::done("Logged out successfully"))
}
