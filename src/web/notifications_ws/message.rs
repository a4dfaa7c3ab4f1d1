//! Messages exchanged with the notification server actor

use actix::prelude::*;

/// Where one socket sits: the user's room and the socket's number in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seat {
    pub user_id: i32,
    pub socket_id: usize,
}

/// A socket asks to join its user's room.
pub struct JoinRoom {
    pub user_id: i32,
    pub socket: Recipient<NotificationPush>,
}

impl Message for JoinRoom {
    type Result = Seat;
}

/// A socket gives its seat back.
pub struct LeaveRoom(pub Seat);

impl Message for LeaveRoom {
    type Result = ();
}

/// Serialized event text delivered to one socket.
#[derive(Clone)]
pub struct NotificationPush(pub String);

impl Message for NotificationPush {
    type Result = ();
}

/// Deliver a push to every socket in a user's room.
pub struct PushToUser {
    pub user_id: i32,
    pub push: NotificationPush,
}

impl Message for PushToUser {
    type Result = ();
}

/// Open sockets in one room, or in all rooms when `None`.
pub struct CountSockets(pub Option<i32>);

impl Message for CountSockets {
    type Result = usize;
}
