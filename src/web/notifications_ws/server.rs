//! NotificationServer actor
//!
//! One room per user, holding that user's open sockets. A user with several
//! tabs or devices receives every push on each of them. Empty rooms are
//! dropped.

use super::message::{CountSockets, JoinRoom, LeaveRoom, NotificationPush, PushToUser, Seat};
use actix::prelude::*;
use std::collections::HashMap;

type Room = HashMap<usize, Recipient<NotificationPush>>;

pub struct NotificationServer {
    next_socket_id: usize,
    rooms: HashMap<i32, Room>,
}

impl NotificationServer {
    pub fn new() -> Self {
        log::info!("NotificationServer starting up.");
        Self {
            next_socket_id: 1,
            rooms: HashMap::new(),
        }
    }

    fn open_sockets(&self) -> usize {
        self.rooms.values().map(Room::len).sum()
    }
}

impl Default for NotificationServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for NotificationServer {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(256);
        log::info!("NotificationServer started");
    }
}

impl Handler<JoinRoom> for NotificationServer {
    type Result = MessageResult<JoinRoom>;

    fn handle(&mut self, msg: JoinRoom, _: &mut Context<Self>) -> Self::Result {
        let seat = Seat {
            user_id: msg.user_id,
            socket_id: self.next_socket_id,
        };
        self.next_socket_id += 1;
        self.rooms
            .entry(seat.user_id)
            .or_default()
            .insert(seat.socket_id, msg.socket);

        log::debug!(
            "Socket {} joined room of user {} (open: {})",
            seat.socket_id,
            seat.user_id,
            self.open_sockets()
        );
        MessageResult(seat)
    }
}

impl Handler<LeaveRoom> for NotificationServer {
    type Result = ();

    fn handle(&mut self, LeaveRoom(seat): LeaveRoom, _: &mut Context<Self>) {
        if let Some(room) = self.rooms.get_mut(&seat.user_id) {
            room.remove(&seat.socket_id);
            if room.is_empty() {
                self.rooms.remove(&seat.user_id);
            }
        }
        log::debug!(
            "Socket {} left room of user {} (open: {})",
            seat.socket_id,
            seat.user_id,
            self.open_sockets()
        );
    }
}

impl Handler<PushToUser> for NotificationServer {
    type Result = ();

    fn handle(&mut self, msg: PushToUser, _: &mut Context<Self>) {
        match self.rooms.get(&msg.user_id) {
            Some(room) => room
                .values()
                .for_each(|socket| socket.do_send(msg.push.clone())),
            None => log::debug!("User {} has no open notification sockets", msg.user_id),
        }
    }
}

impl Handler<CountSockets> for NotificationServer {
    type Result = usize;

    fn handle(&mut self, CountSockets(user): CountSockets, _: &mut Context<Self>) -> usize {
        match user {
            Some(user_id) => self.rooms.get(&user_id).map_or(0, Room::len),
            None => self.open_sockets(),
        }
    }
}

impl Supervised for NotificationServer {
    fn restarting(&mut self, _: &mut Context<NotificationServer>) {
        log::warn!("Restarting the NotificationServer.");
    }
}
