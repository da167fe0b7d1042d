//! Read-only text rendering of the room store for the terminal.

use crate::models::{Message, Room, Timestamp};
use crate::store::presence::DEFAULT_USER_NAME;
use crate::store::RoomStore;

/// Window title: the newest message in the current room, else the room name.
pub fn title(store: &RoomStore) -> String {
    let Some(name) = store.current_room_name() else {
        return "Chat".to_string();
    };
    match store.current_room().and_then(Room::latest) {
        Some(msg) => format!("{}: {}", display_name(msg.sender_name.as_deref()), msg.text),
        None => format!("Room: {}", name),
    }
}

fn display_name(name: Option<&str>) -> &str {
    name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_USER_NAME)
}

/// A user as shown in a room's member list.
#[derive(Debug, Clone, PartialEq)]
pub struct UserLine<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub hue: u16,
    pub last_online: Option<&'a Timestamp>,
    pub is_self: bool,
}

/// Users of `room`. The local user's entry shows the room's own display
/// name when one is set.
pub fn room_users<'a>(room: &'a Room, sender_id: Option<&str>) -> Vec<UserLine<'a>> {
    room.users
        .iter()
        .map(|(id, user)| {
            let is_self = sender_id == Some(id.as_str());
            let name = match (&room.sender_name, is_self) {
                (Some(own), true) => own.as_str(),
                _ => display_name(user.name.as_deref()),
            };
            UserLine {
                id,
                name,
                hue: user.hue,
                last_online: user.last_online.as_ref(),
                is_self,
            }
        })
        .collect()
}

pub fn user_line(user: &UserLine) -> String {
    let marker = if user.is_self { " (you)" } else { "" };
    match user.last_online.map(Timestamp::clock).filter(|t| !t.is_empty()) {
        Some(time) => format!(
            "{}{}  [id {}, hue {}, online since {}]",
            user.name, marker, user.id, user.hue, time
        ),
        None => format!("{}{}  [id {}, hue {}]", user.name, marker, user.id, user.hue),
    }
}

/// `[HH:MM] name: text`, with the clock left out when the time is unreadable.
pub fn message_line(msg: &Message) -> String {
    let name = display_name(msg.sender_name.as_deref());
    let name = if msg.is_self {
        format!("{} (you)", name)
    } else {
        name.to_string()
    };
    match msg.time.clock() {
        clock if clock.is_empty() => format!("{}: {}", name, msg.text),
        clock => format!("[{}] {}: {}", clock, name, msg.text),
    }
}

/// The newest `limit` messages (all when `None`), oldest first.
pub fn history(room: &Room, limit: Option<usize>) -> Vec<String> {
    let take = limit.unwrap_or(room.messages.len());
    let mut lines: Vec<String> = room.messages.iter().take(take).map(message_line).collect();
    lines.reverse();
    lines
}

/// One line per joined room, the current one starred.
pub fn room_list(store: &RoomStore) -> Vec<String> {
    store
        .rooms()
        .iter()
        .map(|(name, room)| {
            let marker = if store.current_room_name() == Some(name.as_str()) {
                '*'
            } else {
                ' '
            };
            format!(
                "{} {}  ({} messages, {} users)",
                marker,
                name,
                room.messages.len(),
                room.users.len()
            )
        })
        .collect()
}
