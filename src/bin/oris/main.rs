use actix::Actor;
use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{time, Key, SameSite};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use oris::app_config;
use oris::db::{get_db_pool, init_db};
use oris::middleware::ClientCtx;
use oris::notifications::WsNotifier;
use oris::risk::{DatabaseStore, RiskEngine};
use oris::storage::ObjectStorage;
use oris::web::notifications_ws::NotificationServer;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    init_our_mods();
    init_db(std::env::var("DATABASE_URL").expect("DATABASE_URL must be set.")).await;

    let secret_key = match std::env::var("SECRET_KEY") {
        Ok(key) if key.len() >= 64 => Key::from(key.as_bytes()),
        other => {
            let random_string: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(128)
                .map(char::from)
                .collect();
            log::warn!("SECRET_KEY was invalid ({:?}). Session cookies will be invalidated every time the application restarts. A secret key must be at least 64 bytes to be accepted.", other.err());
            Key::from(random_string.as_bytes())
        }
    };

    let storage: Arc<dyn ObjectStorage> =
        oris::storage::from_config(&app_config::storage()).expect("Object storage failed to initialize.");

    let notification_server = NotificationServer::new().start();
    let engine = Arc::new(RiskEngine::new(
        Arc::new(DatabaseStore::new(get_db_pool().clone())),
        Arc::new(WsNotifier::new(notification_server.clone())),
    ));

    oris::jobs::spawn_scheduler(engine.clone(), storage.clone());

    let site = app_config::site();
    let session_ttl = time::Duration::minutes(app_config::security().session_timeout_minutes as i64);
    log::info!("{} listening on {}", site.name, site.bind);

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(Data::from(engine.clone()))
            .app_data(Data::new(storage.clone()))
            .app_data(Data::new(notification_server.clone()))
            .app_data(oris::web::error::json_config())
            .app_data(oris::web::error::query_config())
            .app_data(oris::web::error::path_config())
            // Security headers - applied to all responses
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("X-XSS-Protection", "0"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
                    .add((
                        "Permissions-Policy",
                        "geolocation=(), microphone=(), camera=()",
                    )),
            )
            .wrap(ClientCtx::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(false) // Allow HTTP for development
                    .session_lifecycle(PersistentSession::default().session_ttl(session_ttl))
                    .build(),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .configure(oris::web::configure)
    })
    .bind(site.bind.as_str())?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Initialize all local mods.
pub fn init_our_mods() {
    app_config::init();
    oris::session::init();
    oris::rate_limit::init_rate_limits(&app_config::rate_limit());
}
