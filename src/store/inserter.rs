//! Exactly-once insertion of inbound messages into a room's history.

use rand::Rng;

use super::presence;
use crate::models::{IncomingMessage, Message, Room, UserPatch};

/// Prepend `incoming` to the room's newest-first history unless a message
/// with the same id is already there. Returns whether it was inserted.
///
/// `self` is decided against `local_id` as it is right now and never
/// revisited. The message also refreshes its sender's presence entry.
pub fn insert_message<R: Rng + ?Sized>(
    room: &mut Room,
    local_id: Option<&str>,
    incoming: IncomingMessage,
    rng: &mut R,
) -> bool {
    if room.has_message(incoming.id) {
        return false;
    }

    // An old message must not move the sender's last sighting backwards.
    let last_online = match room.users.get(&incoming.sender_id) {
        Some(user) => user.last_online.clone().max(Some(incoming.time.clone())),
        None => Some(incoming.time.clone()),
    };
    presence::update_user(
        room,
        &incoming.sender_id,
        UserPatch {
            name: incoming.sender_name.clone(),
            last_online,
        },
        rng,
    );

    let sender_hue = room.users.get(&incoming.sender_id).map(|u| u.hue);
    let is_self = local_id == Some(incoming.sender_id.as_str());

    room.messages.push_front(Message {
        id: incoming.id,
        time: incoming.time,
        text: incoming.text,
        sender_id: incoming.sender_id,
        sender_name: incoming.sender_name,
        sender_hue,
        is_self,
    });
    true
}
