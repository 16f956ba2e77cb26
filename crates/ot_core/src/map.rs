//! Key/value registers, e.g. note titles or file-tree metadata
//!
//! Every operation records the value it replaces, which makes it invertible
//! and lets concurrent writes to one key be ordered by value.

use crate::{OtError, OtSystem, Result, Transformed};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Set `key` from `prev` to `next`; `None` means absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapOp<K, V> {
    pub key: K,
    pub prev: Option<V>,
    pub next: Option<V>,
}

impl<K, V> MapOp<K, V> {
    pub fn new(key: K, prev: Option<V>, next: Option<V>) -> Self {
        Self { key, prev, next }
    }

    pub fn put(key: K, value: V) -> Self {
        Self::new(key, None, Some(value))
    }
}

/// Operation algebra of an ordered key/value map.
///
/// Concurrent writes to the same key resolve to the greater value, with an
/// absent value ordered lowest.
#[derive(Debug, Clone, Copy)]
pub struct MapSystem<K, V> {
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> MapSystem<K, V> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<K, V> Default for MapSystem<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OtSystem for MapSystem<K, V>
where
    K: Ord + Clone + Debug,
    V: Ord + Clone + Debug,
{
    type State = BTreeMap<K, V>;
    type Op = MapOp<K, V>;

    fn apply(&self, state: &mut BTreeMap<K, V>, op: &MapOp<K, V>) -> Result<()> {
        if state.get(&op.key) != op.prev.as_ref() {
            return Err(OtError::invalid(format!(
                "key {:?} holds {:?}, expected {:?}",
                op.key,
                state.get(&op.key),
                op.prev
            )));
        }
        match &op.next {
            Some(value) => state.insert(op.key.clone(), value.clone()),
            None => state.remove(&op.key),
        };
        Ok(())
    }

    fn invert(&self, op: &MapOp<K, V>) -> MapOp<K, V> {
        MapOp::new(op.key.clone(), op.next.clone(), op.prev.clone())
    }

    fn is_empty(&self, op: &MapOp<K, V>) -> bool {
        op.prev == op.next
    }

    fn squash(&self, first: &MapOp<K, V>, second: &MapOp<K, V>) -> Vec<MapOp<K, V>> {
        if first.key == second.key && first.next == second.prev {
            let merged = MapOp::new(first.key.clone(), first.prev.clone(), second.next.clone());
            return if self.is_empty(&merged) {
                Vec::new()
            } else {
                vec![merged]
            };
        }
        vec![first.clone(), second.clone()]
    }

    fn transform_pair(
        &self,
        left: &MapOp<K, V>,
        right: &MapOp<K, V>,
    ) -> Result<Transformed<MapOp<K, V>>> {
        if left.key != right.key {
            return Ok(Transformed::unchanged(left.clone(), right.clone()));
        }
        if left.prev != right.prev {
            return Err(OtError::transform(format!(
                "concurrent writes to {:?} start from different values",
                left.key
            )));
        }

        if left.next == right.next {
            return Ok(Transformed::new(Vec::new(), Vec::new()));
        }

        let key = left.key.clone();
        if left.next > right.next {
            Ok(Transformed::new(
                vec![MapOp::new(key, right.next.clone(), left.next.clone())],
                Vec::new(),
            ))
        } else {
            Ok(Transformed::new(
                Vec::new(),
                vec![MapOp::new(key, left.next.clone(), right.next.clone())],
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Titles = MapSystem<String, String>;

    fn set(key: &str, prev: Option<&str>, next: Option<&str>) -> MapOp<String, String> {
        MapOp::new(
            key.to_string(),
            prev.map(str::to_string),
            next.map(str::to_string),
        )
    }

    #[test]
    fn test_apply_checks_previous_value() {
        let system = Titles::new();
        let mut state = BTreeMap::new();

        system.apply(&mut state, &set("n1", None, Some("Draft"))).unwrap();
        assert!(system.apply(&mut state, &set("n1", None, Some("Other"))).is_err());

        system.apply(&mut state, &set("n1", Some("Draft"), None)).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_concurrent_writes_pick_greater_value() {
        let system = Titles::new();
        let base: BTreeMap<String, String> =
            [("n1".to_string(), "Draft".to_string())].into_iter().collect();
        let left = vec![set("n1", Some("Draft"), Some("Alpha"))];
        let right = vec![set("n1", Some("Draft"), Some("Beta"))];

        let t = system.transform(&left, &right).unwrap();
        assert!(t.left.is_empty());

        let mut a = base.clone();
        system.apply_all(&mut a, &left).unwrap();
        system.apply_all(&mut a, &t.right).unwrap();

        let mut b = base;
        system.apply_all(&mut b, &right).unwrap();
        system.apply_all(&mut b, &t.left).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.get("n1").map(String::as_str), Some("Beta"));
    }

    #[test]
    fn test_write_beats_concurrent_removal() {
        let system = Titles::new();
        let t = system
            .transform_pair(
                &set("n1", Some("Draft"), None),
                &set("n1", Some("Draft"), Some("Final")),
            )
            .unwrap();
        assert!(t.left.is_empty());
        assert_eq!(t.right, vec![set("n1", None, Some("Final"))]);
    }

    #[test]
    fn test_squash_chains_writes() {
        let system = Titles::new();
        let squashed = system.squash_all(&[
            set("n1", None, Some("a")),
            set("n1", Some("a"), Some("b")),
            set("n2", None, Some("x")),
        ]);
        assert_eq!(
            squashed,
            vec![set("n1", None, Some("b")), set("n2", None, Some("x"))]
        );

        assert!(system
            .squash(&set("n1", None, Some("a")), &set("n1", Some("a"), None))
            .is_empty());
    }
}
