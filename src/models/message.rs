//! Message-related models

use serde::{Deserialize, Serialize};

use super::{string_or_number, MessageId, Timestamp, UserId};

/// Chat message as delivered on a room's `message` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub time: Timestamp,
    pub text: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// Chat message as stored in a room, annotated with local context at receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub time: Timestamp,
    pub text: String,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_hue: Option<u16>,
    /// Whether the local user authored this message. Fixed at insertion.
    #[serde(rename = "self", default)]
    pub is_self: bool,
}
