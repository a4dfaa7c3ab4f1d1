//! One browser tab listening for its user's notifications.
//!
//! The socket takes a seat in its user's room as soon as it starts and
//! gives it back when it stops. Event pushes are forwarded untouched. The
//! only thing a client may say is `ping`, either bare or as
//! `{"type":"ping"}`; anything else is ignored.

use super::message::{JoinRoom, LeaveRoom, NotificationPush, Seat};
use super::server::NotificationServer;
use super::{CLIENT_TIMEOUT, HEARTBEAT_INTERVAL};
use actix::prelude::*;
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Frames the socket writes on its own behalf, next to the event pushes.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlFrame {
    /// Sent once the socket holds a seat in the user's room.
    Joined {
        #[serde(rename = "userId")]
        user_id: i32,
    },
    Pong,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    Ping,
}

impl ClientCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("ping") {
            return Some(ClientCommand::Ping);
        }
        serde_json::from_str(text).ok()
    }
}

/// When the client was last heard from.
#[derive(Clone, Copy, Debug)]
pub struct Liveness {
    last_seen: Instant,
}

impl Liveness {
    pub fn new(now: Instant) -> Self {
        Self { last_seen: now }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > CLIENT_TIMEOUT
    }
}

pub struct NotificationSocket {
    user_id: i32,
    /// None until the server answers the join.
    seat: Option<Seat>,
    liveness: Liveness,
    server: Addr<NotificationServer>,
}

impl NotificationSocket {
    pub fn new(user_id: i32, server: Addr<NotificationServer>) -> Self {
        Self {
            user_id,
            seat: None,
            liveness: Liveness::new(Instant::now()),
            server,
        }
    }

    fn send_frame(&self, frame: &ControlFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(frame) {
            Ok(text) => ctx.text(text),
            Err(e) => log::warn!("Could not encode {:?} for user {}: {}", frame, self.user_id, e),
        }
    }

    fn watch_liveness(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if act.liveness.expired(Instant::now()) {
                log::debug!("Notification socket of user {} went quiet", act.user_id);
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn take_seat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let join = JoinRoom {
            user_id: self.user_id,
            socket: ctx.address().recipient(),
        };
        self.server
            .send(join)
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(seat) => {
                        act.seat = Some(seat);
                        act.send_frame(&ControlFrame::Joined { user_id: seat.user_id }, ctx);
                    }
                    Err(e) => {
                        log::warn!("User {} could not join their notification room: {}", act.user_id, e);
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }
}

impl Actor for NotificationSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.watch_liveness(ctx);
        self.take_seat(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let Some(seat) = self.seat.take() {
            self.server.do_send(LeaveRoom(seat));
        }
        Running::Stop
    }
}

impl Handler<NotificationPush> for NotificationSocket {
    type Result = ();

    fn handle(&mut self, NotificationPush(event): NotificationPush, ctx: &mut Self::Context) {
        ctx.text(event);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NotificationSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let Ok(msg) = msg else {
            ctx.stop();
            return;
        };
        self.liveness.touch(Instant::now());

        match msg {
            ws::Message::Ping(data) => ctx.pong(&data),
            ws::Message::Text(text) => {
                if ClientCommand::parse(&text) == Some(ClientCommand::Ping) {
                    self.send_frame(&ControlFrame::Pong, ctx);
                }
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            // Fragmented frames are not part of the protocol.
            ws::Message::Continuation(_) => ctx.stop(),
            ws::Message::Pong(_) | ws::Message::Binary(_) | ws::Message::Nop => (),
        }
    }
}
