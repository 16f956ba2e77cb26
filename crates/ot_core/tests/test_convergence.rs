use ot_core::rooms::{dialog_room_id, PubKey, Room, RoomDirectory, RoomId, RoomOp, RoomSystem};
use ot_core::text::{TextOp, TextSystem};
use ot_core::OtSystem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORDS: &[&str] = &["a", "xy", "é", "lorem", " ", "ok!"];

fn random_text_op(rng: &mut StdRng, doc: &str) -> TextOp {
    let chars: Vec<char> = doc.chars().collect();
    let len = chars.len();
    let word = WORDS[rng.gen_range(0..WORDS.len())];

    if len == 0 || rng.gen_bool(0.4) {
        return TextOp::insert(rng.gen_range(0..=len), word);
    }

    let pos = rng.gen_range(0..len);
    let span = rng.gen_range(1..=(len - pos).min(4));
    let removed: String = chars[pos..pos + span].iter().collect();
    if rng.gen_bool(0.5) {
        TextOp::delete(pos, removed)
    } else {
        TextOp::replace(pos, removed, word)
    }
}

/// A list of operations valid in sequence against `base`
fn random_text_ops(rng: &mut StdRng, base: &str, count: usize) -> Vec<TextOp> {
    let mut doc = base.to_string();
    let mut ops = Vec::with_capacity(count);
    for _ in 0..count {
        let op = random_text_op(rng, &doc);
        TextSystem.apply(&mut doc, &op).unwrap();
        ops.push(op);
    }
    ops
}

fn random_room_ops(rng: &mut StdRng, base: &RoomDirectory, count: usize) -> Vec<RoomOp> {
    let ids = ["r1", "r2", "r3"];
    let keys = ["A", "B", "C"];

    let mut state = base.clone();
    let mut ops = Vec::new();
    for _ in 0..count {
        let id = RoomId::from(ids[rng.gen_range(0..ids.len())]);
        let op = match state.get(&id) {
            None => {
                let first = keys[rng.gen_range(0..keys.len())];
                let second = keys[rng.gen_range(0..keys.len())];
                RoomOp::add(id, [first, second])
            }
            Some(room) if room.deleted => {
                if rng.gen_bool(0.5) {
                    RoomOp::Restore { id }
                } else {
                    RoomOp::delete(id)
                }
            }
            Some(room) => match rng.gen_range(0..10) {
                0..=4 => RoomOp::delete(id),
                5..=6 => RoomOp::Withdraw {
                    id,
                    participants: room.participants.clone(),
                },
                _ => RoomOp::Add {
                    id,
                    participants: room.participants.clone(),
                },
            },
        };
        RoomSystem.apply(&mut state, &op).unwrap();
        ops.push(op);
    }
    ops
}

fn assert_diamond<S>(system: &S, base: &S::State, left: &[S::Op], right: &[S::Op])
where
    S: OtSystem,
    S::State: Clone + PartialEq + std::fmt::Debug,
    S::Op: std::fmt::Debug,
{
    let t = system
        .transform(left, right)
        .unwrap_or_else(|e| panic!("transform failed for {left:?} vs {right:?}: {e}"));

    let mut via_left = base.clone();
    system.apply_all(&mut via_left, left).unwrap();
    system
        .apply_all(&mut via_left, &t.right)
        .unwrap_or_else(|e| panic!("right' invalid for {left:?} vs {right:?}: {e}"));

    let mut via_right = base.clone();
    system.apply_all(&mut via_right, right).unwrap();
    system
        .apply_all(&mut via_right, &t.left)
        .unwrap_or_else(|e| panic!("left' invalid for {left:?} vs {right:?}: {e}"));

    assert_eq!(via_left, via_right, "diverged for {left:?} vs {right:?}");
}

#[test]
fn test_text_convergence_randomized() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..500 {
        let base = if round % 5 == 0 {
            String::new()
        } else {
            "the quick brown fox".to_string()
        };
        let (left_len, right_len) = (rng.gen_range(1..5), rng.gen_range(1..5));
        let left = random_text_ops(&mut rng, &base, left_len);
        let right = random_text_ops(&mut rng, &base, right_len);
        assert_diamond(&TextSystem, &base, &left, &right);
    }
}

#[test]
fn test_room_convergence_randomized() {
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..50 {
            let history = rng.gen_range(0..4);
            let base = random_room_ops(&mut rng, &RoomDirectory::new(), history);
            let mut state = RoomDirectory::new();
            RoomSystem.apply_all(&mut state, &base).unwrap();

            let (left_len, right_len) = (rng.gen_range(1..7), rng.gen_range(1..7));
            let left = random_room_ops(&mut rng, &state, left_len);
            let right = random_room_ops(&mut rng, &state, right_len);
            assert_diamond(&RoomSystem, &state, &left, &right);
        }
    }
}

#[test]
fn test_room_create_then_quit_against_committed_creation() {
    let left = vec![RoomOp::add("r1", ["A", "B"]), RoomOp::delete("r1")];
    let right = vec![RoomOp::add("r1", ["A", "C"])];
    assert_diamond(&RoomSystem, &RoomDirectory::new(), &left, &right);
    assert_diamond(&RoomSystem, &RoomDirectory::new(), &right, &left);
}

#[test]
fn test_text_invertibility() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..300 {
        let base = "invertible ünïcode text".to_string();
        let ops = random_text_ops(&mut rng, &base, 3);

        let mut doc = base.clone();
        TextSystem.apply_all(&mut doc, &ops).unwrap();
        TextSystem
            .apply_all(&mut doc, &TextSystem.invert_all(&ops))
            .unwrap();
        assert_eq!(doc, base);
    }
}

#[test]
fn test_room_invertibility() {
    let live = Room {
        participants: [PubKey::from("A")].into_iter().collect(),
        deleted: false,
    };
    let base: RoomDirectory = [
        (RoomId::from("live"), live.clone()),
        (RoomId::from("gone"), Room { deleted: true, ..live.clone() }),
    ]
    .into_iter()
    .collect();

    let ops = [
        RoomOp::add("new", ["A", "B"]),
        RoomOp::delete("live"),
        RoomOp::Restore { id: "gone".into() },
        RoomOp::Withdraw {
            id: "live".into(),
            participants: live.participants.clone(),
        },
        // accepted without effect
        RoomOp::delete("gone"),
        RoomOp::add("live", ["A"]),
    ];

    for op in &ops {
        let mut state = base.clone();
        let undo = if RoomSystem.apply_effective(&mut state, op).unwrap() {
            vec![RoomSystem.invert(op)]
        } else {
            assert_eq!(state, base, "{op:?} reported no effect");
            Vec::new()
        };
        RoomSystem.apply_all(&mut state, &undo).unwrap();
        assert_eq!(state, base, "{op:?} did not invert");
    }
}

#[test]
fn test_room_invertibility_randomized() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..500 {
        let history = rng.gen_range(0..5);
        let history = random_room_ops(&mut rng, &RoomDirectory::new(), history);
        let mut base = RoomDirectory::new();
        RoomSystem.apply_all(&mut base, &history).unwrap();

        let mut state = base.clone();
        let mut effective = Vec::new();
        for op in random_room_ops(&mut rng, &base, 4) {
            if RoomSystem.apply_effective(&mut state, &op).unwrap() {
                effective.push(op);
            }
        }
        RoomSystem
            .apply_all(&mut state, &RoomSystem.invert_all(&effective))
            .unwrap();
        assert_eq!(state, base);
    }
}

#[test]
fn test_delete_is_idempotent() {
    let mut once = RoomDirectory::new();
    RoomSystem.apply(&mut once, &RoomOp::add("r1", ["A", "B"])).unwrap();
    let mut twice = once.clone();

    RoomSystem.apply(&mut once, &RoomOp::delete("r1")).unwrap();
    RoomSystem.apply(&mut twice, &RoomOp::delete("r1")).unwrap();
    RoomSystem.apply(&mut twice, &RoomOp::delete("r1")).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_delete_dominates_concurrent_add() {
    let mut base = RoomDirectory::new();
    RoomSystem.apply(&mut base, &RoomOp::add("r1", ["A", "B"])).unwrap();

    // One peer re-opens the dialog while the other deletes it
    let left = vec![RoomOp::add("r1", ["A", "B"])];
    let right = vec![RoomOp::delete("r1")];
    assert_diamond(&RoomSystem, &base, &left, &right);

    let t = RoomSystem.transform(&left, &right).unwrap();
    let mut state = base.clone();
    RoomSystem.apply_all(&mut state, &right).unwrap();
    RoomSystem.apply_all(&mut state, &t.left).unwrap();
    assert!(state[&RoomId::from("r1")].deleted);
}

#[test]
fn test_dialog_ids_from_both_peers_converge() {
    let alice = PubKey::from("ed25519:alice");
    let bob = PubKey::from("ed25519:bob");

    let from_alice = ot_core::rooms::create_dialog(&RoomDirectory::new(), &alice, &bob);
    let from_bob = ot_core::rooms::create_dialog(&RoomDirectory::new(), &bob, &alice);
    assert_eq!(from_alice, from_bob);
    assert_eq!(from_alice[0].id(), &dialog_room_id(&alice, &bob));

    let t = RoomSystem.transform(&from_alice, &from_bob).unwrap();
    assert!(t.left.is_empty());
    assert!(t.right.is_empty());
}

#[test]
fn test_operations_are_tagged_on_the_wire() {
    let json = serde_json::to_value(TextOp::insert(1, "X")).unwrap();
    assert_eq!(json, serde_json::json!({"type": "Insert", "pos": 1, "text": "X"}));

    let op: RoomOp =
        serde_json::from_value(serde_json::json!({"type": "Delete", "id": "r1"})).unwrap();
    assert_eq!(op, RoomOp::delete("r1"));
}
