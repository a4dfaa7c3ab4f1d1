//! Real-time notification WebSocket
//!
//! - `NotificationServer` keeps one room per user
//! - `NotificationSocket` is one open socket, seated in its user's room
//! - `crate::notifications::WsNotifier` turns lifecycle events into pushes
//!
//! Clients connect to `/notifications.ws` after logging in. They get
//! `{"type":"joined","userId":..}` once seated, then one JSON text frame per
//! event: `{"event": "...", "data": {...}}`.

pub mod connection;
pub mod message;
pub mod server;

use crate::middleware::ClientCtx;
use actix::Addr;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Duration;

pub use connection::NotificationSocket;
pub use message::{NotificationPush, PushToUser};
pub use server::NotificationServer;

/// Heartbeat interval
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Disconnect if nothing was heard for this long
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn configure(conf: &mut web::ServiceConfig) {
    conf.service(notifications_ws);
}

/// GET /notifications.ws
#[get("/notifications.ws")]
pub async fn notifications_ws(
    req: HttpRequest,
    stream: web::Payload,
    client: ClientCtx,
    server: web::Data<Addr<NotificationServer>>,
) -> Result<HttpResponse, Error> {
    let user_id = client.require_login()?;

    log::debug!("User {} connecting to notification WebSocket", user_id);

    ws::start(NotificationSocket::new(user_id, server.get_ref().clone()), &req, stream)
}
