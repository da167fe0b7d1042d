//! User and presence models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{opt_string_or_number, Timestamp, UserId};

/// A user as known within one room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Color hint, 0-359, kept stable for this id within the room.
    pub hue: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_online: Option<Timestamp>,
}

/// Partial update for a user; `None` fields leave the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub last_online: Option<Timestamp>,
}

/// One session (browser, device) of a present user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceMeta {
    #[serde(default)]
    pub online_at: Option<Timestamp>,
}

/// All sessions of one present user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceEntry {
    #[serde(default)]
    pub metas: Vec<PresenceMeta>,
}

impl PresenceEntry {
    /// Latest `online_at` across all sessions, if any session reported one.
    pub fn last_online(&self) -> Option<Timestamp> {
        self.metas.iter().filter_map(|m| m.online_at.clone()).max()
    }
}

/// Full presence snapshot: user id to sessions
pub type PresenceState = BTreeMap<UserId, PresenceEntry>;

/// Incremental presence change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceState,
    #[serde(default)]
    pub leaves: PresenceState,
}

/// Presence event kinds applied to a room
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    State(PresenceState),
    Diff(PresenceDiff),
}

/// `response` of a successful channel join
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinResponse {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub sender_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_online_takes_greatest() {
        let entry: PresenceEntry = serde_json::from_str(
            r#"{"metas":[{"online_at":"t1","phx_ref":"a"},{"online_at":"t2"}]}"#,
        )
        .unwrap();
        assert_eq!(entry.last_online(), Some(Timestamp::from("t2")));
    }

    #[test]
    fn test_last_online_without_timestamps() {
        let entry: PresenceEntry = serde_json::from_str(r#"{"metas":[{}]}"#).unwrap();
        assert_eq!(entry.last_online(), None);
        assert_eq!(PresenceEntry::default().last_online(), None);
    }

    #[test]
    fn test_diff_defaults_missing_sides() {
        let diff: PresenceDiff = serde_json::from_str(r#"{"leaves":{"5":{}}}"#).unwrap();
        assert!(diff.joins.is_empty());
        assert!(diff.leaves.contains_key("5"));
    }

    #[test]
    fn test_join_response_sender_id() {
        let resp: JoinResponse = serde_json::from_str(r#"{"sender_id":42}"#).unwrap();
        assert_eq!(resp.sender_id.as_deref(), Some("42"));
        let resp: JoinResponse = serde_json::from_str(r#"{"sender_id":null}"#).unwrap();
        assert_eq!(resp.sender_id, None);
        let resp: JoinResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp.sender_id, None);
    }
}
