//! Room directory: set-membership operations with tombstones
//!
//! A room is created once by `Add`, tombstoned by `Delete`, and never
//! resurrected by a concurrent `Add`. `Restore` and `Withdraw` are the
//! inverses of `Delete` and `Add`; they appear when local history is undone
//! or when a conflicting creation has to be rewritten.
//!
//! Deleting a tombstone and re-adding a room with the same participants are
//! accepted but change nothing. [`RoomSystem::apply_effective`] reports them
//! so that callers never queue, and later invert, an operation without effect.

use crate::{OtError, OtSystem, Result, Transformed};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Length of generated room identifiers
pub const ROOM_ID_LENGTH: usize = 32;

/// Room identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

/// Public key of a participant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubKey(pub String);

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        RoomId(id.to_string())
    }
}

impl From<&str> for PubKey {
    fn from(key: &str) -> Self {
        PubKey(key.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A room entry in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub participants: BTreeSet<PubKey>,

    /// Tombstone flag; deleted rooms keep their participants
    pub deleted: bool,
}

impl Room {
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Materialized room directory
pub type RoomDirectory = BTreeMap<RoomId, Room>;

/// Room directory operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomOp {
    /// Create a room (absent → live); a no-op on a live room with the same
    /// participants
    Add {
        id: RoomId,
        participants: BTreeSet<PubKey>,
    },

    /// Tombstone a room (live → deleted); a no-op on a tombstone
    Delete { id: RoomId },

    /// Lift a tombstone (deleted → live)
    Restore { id: RoomId },

    /// Remove a live room entirely (live → absent)
    Withdraw {
        id: RoomId,
        participants: BTreeSet<PubKey>,
    },
}

impl RoomOp {
    pub fn add<I, K>(id: impl Into<RoomId>, participants: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<PubKey>,
    {
        RoomOp::Add {
            id: id.into(),
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn delete(id: impl Into<RoomId>) -> Self {
        RoomOp::Delete { id: id.into() }
    }

    pub fn id(&self) -> &RoomId {
        match self {
            RoomOp::Add { id, .. }
            | RoomOp::Delete { id }
            | RoomOp::Restore { id }
            | RoomOp::Withdraw { id, .. } => id,
        }
    }
}

/// Deterministic identifier of the two-party room between `a` and `b`.
///
/// Keys are sorted before hashing, so both peers derive the same id.
pub fn dialog_room_id(a: &PubKey, b: &PubKey) -> RoomId {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = Sha256::new();
    hasher.update(low.0.as_bytes());
    hasher.update([0u8]);
    hasher.update(high.0.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    RoomId(format!("dialog-{}", &hash[..32]))
}

/// Operations that open a dialog between `me` and `peer`.
///
/// Empty when the room already exists, live or tombstoned.
pub fn create_dialog(state: &RoomDirectory, me: &PubKey, peer: &PubKey) -> Vec<RoomOp> {
    let id = dialog_room_id(me, peer);
    if let Some(room) = state.get(&id) {
        tracing::debug!(room = %id, deleted = room.deleted, "dialog already present");
        return Vec::new();
    }

    vec![RoomOp::Add {
        id,
        participants: [me.clone(), peer.clone()].into_iter().collect(),
    }]
}

/// Operation creating a room with a random identifier. `me` is always a
/// participant.
pub fn create_room<R, I>(rng: &mut R, me: &PubKey, participants: I) -> (RoomId, RoomOp)
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = PubKey>,
{
    let id = RoomId(
        rng.sample_iter(Alphanumeric)
            .take(ROOM_ID_LENGTH)
            .map(char::from)
            .collect(),
    );
    let mut participants: BTreeSet<PubKey> = participants.into_iter().collect();
    participants.insert(me.clone());

    let op = RoomOp::Add {
        id: id.clone(),
        participants,
    };
    (id, op)
}

/// Operations leaving room `id`: empty unless the room is live
pub fn quit_room(state: &RoomDirectory, id: &RoomId) -> Vec<RoomOp> {
    match state.get(id) {
        Some(room) if room.is_live() => vec![RoomOp::Delete { id: id.clone() }],
        _ => Vec::new(),
    }
}

/// True for two-party rooms whose identifier is the dialog id of its pair
pub fn is_dialog(id: &RoomId, room: &Room) -> bool {
    let mut keys = room.participants.iter();
    match (keys.next(), keys.next(), keys.next()) {
        (Some(a), Some(b), None) => *id == dialog_room_id(a, b),
        _ => false,
    }
}

/// Live rooms `key` participates in
pub fn rooms_of<'a>(state: &'a RoomDirectory, key: &'a PubKey) -> impl Iterator<Item = &'a RoomId> {
    state
        .iter()
        .filter(move |(_, room)| room.is_live() && room.participants.contains(key))
        .map(|(id, _)| id)
}

/// Operation algebra of the room directory
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomSystem;

impl OtSystem for RoomSystem {
    type State = RoomDirectory;
    type Op = RoomOp;

    fn apply(&self, state: &mut RoomDirectory, op: &RoomOp) -> Result<()> {
        match op {
            RoomOp::Add { id, participants } => match state.get(id) {
                None => {
                    state.insert(
                        id.clone(),
                        Room {
                            participants: participants.clone(),
                            deleted: false,
                        },
                    );
                    Ok(())
                }
                Some(room) if room.deleted => {
                    Err(OtError::invalid(format!("cannot add room {id}: it is deleted")))
                }
                Some(room) if room.participants == *participants => Ok(()),
                Some(_) => Err(OtError::invalid(format!(
                    "cannot add room {id}: it exists with different participants"
                ))),
            },

            RoomOp::Delete { id } => {
                let room = state
                    .get_mut(id)
                    .ok_or_else(|| OtError::invalid(format!("cannot delete absent room {id}")))?;
                room.deleted = true;
                Ok(())
            }

            RoomOp::Restore { id } => match state.get_mut(id) {
                Some(room) if room.deleted => {
                    room.deleted = false;
                    Ok(())
                }
                Some(_) => Err(OtError::invalid(format!(
                    "cannot restore room {id}: it is not deleted"
                ))),
                None => Err(OtError::invalid(format!("cannot restore absent room {id}"))),
            },

            RoomOp::Withdraw { id, participants } => match state.get(id) {
                Some(room) if room.is_live() && room.participants == *participants => {
                    state.remove(id);
                    Ok(())
                }
                Some(_) => Err(OtError::invalid(format!(
                    "cannot withdraw room {id}: it is deleted or its participants differ"
                ))),
                None => Err(OtError::invalid(format!("cannot withdraw absent room {id}"))),
            },
        }
    }

    fn apply_effective(&self, state: &mut RoomDirectory, op: &RoomOp) -> Result<bool> {
        let unchanged = match (op, state.get(op.id())) {
            (RoomOp::Delete { .. }, Some(room)) => room.deleted,
            (RoomOp::Add { participants, .. }, Some(room)) => {
                room.is_live() && room.participants == *participants
            }
            _ => false,
        };
        self.apply(state, op)?;
        Ok(!unchanged)
    }

    fn invert(&self, op: &RoomOp) -> RoomOp {
        match op {
            RoomOp::Add { id, participants } => RoomOp::Withdraw {
                id: id.clone(),
                participants: participants.clone(),
            },
            RoomOp::Withdraw { id, participants } => RoomOp::Add {
                id: id.clone(),
                participants: participants.clone(),
            },
            RoomOp::Delete { id } => RoomOp::Restore { id: id.clone() },
            RoomOp::Restore { id } => RoomOp::Delete { id: id.clone() },
        }
    }

    fn is_empty(&self, _op: &RoomOp) -> bool {
        // Redundant re-adds are only detectable against a state; squash and
        // transform absorb them instead.
        false
    }

    fn squash(&self, first: &RoomOp, second: &RoomOp) -> Vec<RoomOp> {
        if first.id() != second.id() {
            return vec![first.clone(), second.clone()];
        }

        match (first, second) {
            (RoomOp::Add { participants: a, .. }, RoomOp::Withdraw { participants: b, .. })
            | (RoomOp::Withdraw { participants: a, .. }, RoomOp::Add { participants: b, .. })
                if a == b =>
            {
                Vec::new()
            }
            (RoomOp::Delete { .. }, RoomOp::Restore { .. })
            | (RoomOp::Restore { .. }, RoomOp::Delete { .. }) => Vec::new(),
            (RoomOp::Add { participants: a, .. }, RoomOp::Add { participants: b, .. })
                if a == b =>
            {
                vec![first.clone()]
            }
            (RoomOp::Delete { .. }, RoomOp::Delete { .. }) => vec![first.clone()],
            _ => vec![first.clone(), second.clone()],
        }
    }

    fn transform_pair(&self, left: &RoomOp, right: &RoomOp) -> Result<Transformed<RoomOp>> {
        if left.id() != right.id() {
            return Ok(Transformed::unchanged(left.clone(), right.clone()));
        }
        let id = left.id().clone();

        match (left, right) {
            (RoomOp::Add { participants: a, .. }, RoomOp::Add { participants: b, .. }) => {
                if a == b {
                    Ok(Transformed::new(Vec::new(), Vec::new()))
                } else {
                    // First committed creation wins
                    tracing::debug!(room = %id, "concurrent creation with different participants");
                    Ok(Transformed::new(
                        Vec::new(),
                        vec![
                            RoomOp::Withdraw {
                                id,
                                participants: a.clone(),
                            },
                            right.clone(),
                        ],
                    ))
                }
            }

            // Tombstones and withdrawals dominate a concurrent creation
            (RoomOp::Add { .. }, RoomOp::Delete { .. } | RoomOp::Withdraw { .. }) => {
                Ok(Transformed::new(Vec::new(), vec![right.clone()]))
            }

            (RoomOp::Delete { .. }, RoomOp::Delete { .. })
            | (RoomOp::Restore { .. }, RoomOp::Restore { .. }) => {
                Ok(Transformed::new(Vec::new(), Vec::new()))
            }

            (RoomOp::Withdraw { participants: a, .. }, RoomOp::Withdraw { participants: b, .. }) => {
                if a == b {
                    Ok(Transformed::new(Vec::new(), Vec::new()))
                } else {
                    Err(OtError::transform(format!(
                        "room {id} withdrawn with different participants"
                    )))
                }
            }

            // The withdrawal wins: lift the tombstone, then withdraw
            (RoomOp::Delete { .. }, RoomOp::Withdraw { .. }) => Ok(Transformed::new(
                Vec::new(),
                vec![RoomOp::Restore { id }, right.clone()],
            )),

            (RoomOp::Delete { .. }, RoomOp::Restore { .. }) => {
                Ok(Transformed::new(vec![left.clone()], Vec::new()))
            }

            (RoomOp::Add { .. } | RoomOp::Withdraw { .. }, RoomOp::Restore { .. }) => {
                Err(OtError::transform(format!(
                    "room {id} cannot be both live and deleted in the same base state"
                )))
            }

            (
                RoomOp::Delete { .. } | RoomOp::Withdraw { .. } | RoomOp::Restore { .. },
                RoomOp::Add { .. },
            )
            | (RoomOp::Withdraw { .. } | RoomOp::Restore { .. }, RoomOp::Delete { .. })
            | (RoomOp::Restore { .. }, RoomOp::Withdraw { .. }) => {
                self.transform_pair(right, left).map(Transformed::swap)
            }
        }
    }
}
