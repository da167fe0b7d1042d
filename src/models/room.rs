//! Room model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::{Message, MessageId, User, UserId};

/// A joined room: local identity, history and presence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// The local user's display name in this room.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Newest first, in order of receipt.
    #[serde(default)]
    pub messages: VecDeque<Message>,
    #[serde(default)]
    pub users: BTreeMap<UserId, User>,
}

impl Room {
    pub fn has_message(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Most recently received message.
    pub fn latest(&self) -> Option<&Message> {
        self.messages.front()
    }
}
