pub mod action_plans;
pub mod admin;
pub mod alive;
pub mod auth;
pub mod daily;
pub mod error;
pub mod exams;
pub mod notifications_ws;
pub mod reports;
pub mod risk_reports;
pub mod risks;
pub mod upload;
pub mod users;

use actix_web::HttpResponse;
use serde::Serialize;

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Route resolution stops at the first match. Each module registers its
    // fixed paths (`/exams/validity`, `/reports/stats`) before `{id}`.
    alive::configure(conf);
    auth::configure(conf);
    users::configure(conf);
    admin::configure(conf);
    daily::configure(conf);
    exams::configure(conf);
    reports::configure(conf);
    risk_reports::configure(conf);
    risks::configure(conf);
    action_plans::configure(conf);
    notifications_ws::configure(conf);
}

/// `200 {success: true, data}`
pub fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": data }))
}

/// `201 {success: true, data}`
pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(serde_json::json!({ "success": true, "data": data }))
}

/// `200 {success: true, message}`
pub fn done(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "message": message }))
}
