//! List-level algorithms derived from the pairwise rules of an [`OtSystem`]

use crate::{OtSystem, Result, Transformed};

/// Apply operations in order, stopping at the first failure.
///
/// On failure the state holds every operation before the failing one.
pub fn apply_all<S: OtSystem + ?Sized>(
    system: &S,
    state: &mut S::State,
    ops: &[S::Op],
) -> Result<()> {
    for op in ops {
        system.apply(state, op)?;
    }
    Ok(())
}

/// Inverse of a whole list: each operation inverted, in reverse order
pub fn invert_all<S: OtSystem + ?Sized>(system: &S, ops: &[S::Op]) -> Vec<S::Op> {
    ops.iter().rev().map(|op| system.invert(op)).collect()
}

/// Fold `squash` over a list, dropping empty operations
pub fn squash_all<S: OtSystem + ?Sized>(system: &S, ops: &[S::Op]) -> Vec<S::Op> {
    let mut squashed: Vec<S::Op> = Vec::with_capacity(ops.len());

    for op in ops {
        if system.is_empty(op) {
            continue;
        }
        match squashed.pop() {
            None => squashed.push(op.clone()),
            Some(last) => squashed.extend(
                system
                    .squash(&last, op)
                    .into_iter()
                    .filter(|op| !system.is_empty(op)),
            ),
        }
    }

    squashed
}

/// Transform two concurrent lists against each other.
///
/// The result satisfies `apply(S, left ++ result.right) == apply(S, right ++ result.left)`
/// whenever every pairwise rule does. Empty operations are dropped from both
/// inputs and outputs.
pub fn transform<S: OtSystem + ?Sized>(
    system: &S,
    left: &[S::Op],
    right: &[S::Op],
) -> Result<Transformed<S::Op>> {
    let left = non_empty(system, left);
    let right = non_empty(system, right);
    transform_lists(system, &left, &right)
}

fn non_empty<S: OtSystem + ?Sized>(system: &S, ops: &[S::Op]) -> Vec<S::Op> {
    ops.iter().filter(|op| !system.is_empty(op)).cloned().collect()
}

fn transform_lists<S: OtSystem + ?Sized>(
    system: &S,
    left: &[S::Op],
    right: &[S::Op],
) -> Result<Transformed<S::Op>> {
    match (left, right) {
        ([], _) => Ok(Transformed::new(Vec::new(), right.to_vec())),
        (_, []) => Ok(Transformed::new(left.to_vec(), Vec::new())),
        ([l], [r]) => {
            let pair = system.transform_pair(l, r)?;
            Ok(Transformed::new(
                non_empty(system, &pair.left),
                non_empty(system, &pair.right),
            ))
        }
        ([first, rest @ ..], _) if !rest.is_empty() => {
            // first against everything, then the rest against what remains of right
            let head = transform_lists(system, std::slice::from_ref(first), right)?;
            let tail = transform_lists(system, rest, &head.right)?;

            let mut rebased = head.left;
            rebased.extend(tail.left);
            Ok(Transformed::new(rebased, tail.right))
        }
        (_, [first, rest @ ..]) => {
            let head = transform_lists(system, left, std::slice::from_ref(first))?;
            let tail = transform_lists(system, &head.left, rest)?;

            let mut rebased = head.right;
            rebased.extend(tail.right);
            Ok(Transformed::new(tail.left, rebased))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OtError;

    /// Integer register with commutative additions
    struct Counter;

    impl OtSystem for Counter {
        type State = i64;
        type Op = i64;

        fn apply(&self, state: &mut i64, op: &i64) -> Result<()> {
            *state = state
                .checked_add(*op)
                .ok_or_else(|| OtError::invalid("counter overflow"))?;
            Ok(())
        }

        fn invert(&self, op: &i64) -> i64 {
            -op
        }

        fn is_empty(&self, op: &i64) -> bool {
            *op == 0
        }

        fn squash(&self, first: &i64, second: &i64) -> Vec<i64> {
            vec![first + second]
        }

        fn transform_pair(&self, left: &i64, right: &i64) -> Result<Transformed<i64>> {
            Ok(Transformed::unchanged(*left, *right))
        }
    }

    #[test]
    fn test_apply_all_and_invert_all() {
        let ops = vec![3, -1, 5];
        let mut state = 10;
        apply_all(&Counter, &mut state, &ops).unwrap();
        assert_eq!(state, 17);

        apply_all(&Counter, &mut state, &invert_all(&Counter, &ops)).unwrap();
        assert_eq!(state, 10);
    }

    #[test]
    fn test_apply_all_stops_at_failure() {
        let mut state = i64::MAX - 1;
        let result = apply_all(&Counter, &mut state, &[1, 1, 1]);
        assert!(result.is_err());
        assert_eq!(state, i64::MAX);
    }

    #[test]
    fn test_squash_all_folds_and_drops_empty() {
        assert_eq!(squash_all(&Counter, &[1, 2, 0, 3]), vec![6]);
        assert_eq!(squash_all(&Counter, &[2, -2]), Vec::<i64>::new());
        assert_eq!(squash_all(&Counter, &[]), Vec::<i64>::new());
    }

    #[test]
    fn test_transform_lists_keeps_all_ops() {
        let t = transform(&Counter, &[1, 2], &[10, 0, 20]).unwrap();
        assert_eq!(t.left, vec![1, 2]);
        assert_eq!(t.right, vec![10, 20]);
    }
}
