//! Domain-specific predicates for sync engine tests

use ot_core::rooms::{rooms_of, PubKey, RoomDirectory, RoomId};
use predicates::prelude::*;

/// Directory whose live rooms are exactly `ids`
pub fn live_rooms(ids: &[&str]) -> impl Predicate<RoomDirectory> {
    let mut expected: Vec<RoomId> = ids.iter().map(|&id| RoomId::from(id)).collect();
    expected.sort();
    predicate::function(move |state: &RoomDirectory| {
        let live: Vec<RoomId> = state
            .iter()
            .filter(|(_, room)| room.is_live())
            .map(|(id, _)| id.clone())
            .collect();
        live == expected
    })
}

/// Directory where `id` exists as a tombstone
pub fn tombstoned(id: &str) -> impl Predicate<RoomDirectory> {
    let id = RoomId::from(id);
    predicate::function(move |state: &RoomDirectory| {
        state.get(&id).is_some_and(|room| room.deleted)
    })
}

/// Directory where `key` participates in exactly `count` live rooms
pub fn member_of(key: &str, count: usize) -> impl Predicate<RoomDirectory> {
    let key = PubKey::from(key);
    predicate::function(move |state: &RoomDirectory| rooms_of(state, &key).count() == count)
}

/// Every state in `states` equals the first one
pub fn converged<St: PartialEq>(states: &[St]) -> bool {
    states.windows(2).all(|pair| pair[0] == pair[1])
}
