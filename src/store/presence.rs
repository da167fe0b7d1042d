//! Presence reconciliation: keeps a room's `users` map in step with the
//! server's presence snapshots and diffs.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

use crate::models::{PresenceDiff, PresenceEvent, PresenceState, Room, User, UserId, UserPatch};

/// Hues picked for legibility against each other.
pub const HUE_PALETTE: [u16; 8] = [30, 60, 90, 120, 150, 180, 300, 330];

/// Name given to users first seen without one.
pub const DEFAULT_USER_NAME: &str = "Anonymous";

/// Pick the palette hue least used by `users`, ties broken in random order.
pub fn pick_hue<R: Rng + ?Sized>(users: &BTreeMap<UserId, User>, rng: &mut R) -> u16 {
    let mut palette = HUE_PALETTE;
    palette.shuffle(rng);
    palette
        .iter()
        .copied()
        .min_by_key(|hue| users.values().filter(|u| u.hue % 360 == *hue).count())
        .unwrap_or(HUE_PALETTE[0])
}

/// Merge `patch` onto user `id`, creating it with a fresh hue and the default
/// name first if the room doesn't know it yet.
pub fn update_user<R: Rng + ?Sized>(room: &mut Room, id: &str, patch: UserPatch, rng: &mut R) {
    if !room.users.contains_key(id) {
        let hue = pick_hue(&room.users, rng);
        room.users.insert(
            id.to_owned(),
            User {
                hue,
                name: Some(DEFAULT_USER_NAME.to_owned()),
                last_online: None,
            },
        );
    }
    let Some(user) = room.users.get_mut(id) else {
        return;
    };
    if let Some(name) = patch.name {
        user.name = Some(name);
    }
    if let Some(last_online) = patch.last_online {
        user.last_online = Some(last_online);
    }
}

fn update_present<R: Rng + ?Sized>(room: &mut Room, present: PresenceState, rng: &mut R) {
    for (id, entry) in present {
        // Sessions without any timestamp say nothing about the user.
        let Some(last_online) = entry.last_online() else {
            continue;
        };
        update_user(
            room,
            &id,
            UserPatch {
                name: None,
                last_online: Some(last_online),
            },
            rng,
        );
    }
}

/// Replace the room's users with those in a full snapshot.
pub fn apply_state<R: Rng + ?Sized>(room: &mut Room, state: PresenceState, rng: &mut R) {
    room.users.clear();
    update_present(room, state, rng);
}

/// Merge joins and drop leaves.
pub fn apply_diff<R: Rng + ?Sized>(room: &mut Room, diff: PresenceDiff, rng: &mut R) {
    update_present(room, diff.joins, rng);
    for id in diff.leaves.keys() {
        room.users.remove(id);
    }
}

pub fn apply<R: Rng + ?Sized>(room: &mut Room, event: PresenceEvent, rng: &mut R) {
    match event {
        PresenceEvent::State(state) => apply_state(room, state, rng),
        PresenceEvent::Diff(diff) => apply_diff(room, diff, rng),
    }
}
