//! Best-effort delivery of lifecycle events to users.
//!
//! Delivery never fails the operation that produced the event. Errors are
//! logged at the call site through [`deliver`] and dropped.

pub mod types;

pub use types::NotificationEvent;

use crate::web::notifications_ws::{NotificationPush, NotificationServer, PushToUser};
use actix::Addr;
use async_trait::async_trait;

#[derive(Debug)]
pub enum NotifyError {
    /// The channel is not running.
    Unavailable,
    /// The channel refused the message.
    Rejected(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Unavailable => write!(f, "notification channel unavailable"),
            NotifyError::Rejected(msg) => write!(f, "notification rejected: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

/// A per-user delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: i32, event: NotificationEvent) -> Result<(), NotifyError>;
}

/// Sends `event` to one user, logging instead of failing.
pub async fn deliver(notifier: &dyn Notifier, user_id: i32, event: NotificationEvent) {
    let name = event.event_name();
    if let Err(e) = notifier.notify(user_id, event).await {
        log::warn!("Failed to deliver {} to user {}: {}", name, user_id, e);
    }
}

/// Sends `event` to each user in turn, logging failures.
pub async fn deliver_all(notifier: &dyn Notifier, user_ids: &[i32], event: &NotificationEvent) {
    for user_id in user_ids {
        deliver(notifier, *user_id, event.clone()).await;
    }
}

/// Pushes events over the notification WebSocket server.
pub struct WsNotifier {
    server: Addr<NotificationServer>,
}

impl WsNotifier {
    pub fn new(server: Addr<NotificationServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    async fn notify(&self, user_id: i32, event: NotificationEvent) -> Result<(), NotifyError> {
        if !self.server.connected() {
            return Err(NotifyError::Unavailable);
        }
        let payload =
            serde_json::to_string(&event).map_err(|e| NotifyError::Rejected(e.to_string()))?;
        self.server
            .try_send(PushToUser {
                user_id,
                push: NotificationPush(payload),
            })
            .map_err(|e| NotifyError::Rejected(e.to_string()))
    }
}

/// Discards every event. Used when no channel is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, user_id: i32, event: NotificationEvent) -> Result<(), NotifyError> {
        log::debug!("Dropping {} for user {}", event.event_name(), user_id);
        Ok(())
    }
}
