//! # Operation algebra
//!
//! Operations and the algebra that reconciles them.
//!
//! ## Architecture
//!
//! - **[`OtSystem`]**: per-domain apply/invert/squash/transform
//! - **[`algorithms`]**: list-level operations derived from the pairwise ones
//! - **Domains**: [`rooms`] (set membership with tombstones), [`text`]
//!   (sequence edits) and [`map`] (key/value registers)
//!
//! ## Usage
//!
//! ```rust
//! use ot_core::text::{TextOp, TextSystem};
//! use ot_core::OtSystem;
//!
//! let system = TextSystem;
//! let local = vec![TextOp::insert(1, "X")];
//! let remote = vec![TextOp::insert(1, "Y")];
//!
//! let t = system.transform(&local, &remote).unwrap();
//!
//! let mut a = "abc".to_string();
//! system.apply_all(&mut a, &local).unwrap();
//! system.apply_all(&mut a, &t.right).unwrap();
//!
//! let mut b = "abc".to_string();
//! system.apply_all(&mut b, &remote).unwrap();
//! system.apply_all(&mut b, &t.left).unwrap();
//!
//! assert_eq!(a, "aYXbc");
//! assert_eq!(a, b);
//! ```

pub mod algorithms;
pub mod map;
pub mod rooms;
pub mod text;

pub use ot_common::{OtError, Result, Revision};

/// Result of transforming two concurrent operation lists.
///
/// `left` is the rebased form of the left list, to be applied after the
/// right one; `right` is the rebased right list, to be applied after the
/// left one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed<Op> {
    pub left: Vec<Op>,
    pub right: Vec<Op>,
}

impl<Op> Transformed<Op> {
    pub fn new(left: Vec<Op>, right: Vec<Op>) -> Self {
        Self { left, right }
    }

    /// Both sides unchanged
    pub fn unchanged(left: Op, right: Op) -> Self {
        Self::new(vec![left], vec![right])
    }

    /// Swap sides, used when a rule is written for the mirrored pair
    pub fn swap(self) -> Self {
        Self::new(self.right, self.left)
    }
}

/// An operation algebra over one kind of state.
///
/// Implementations provide the pairwise rules; the list forms come from
/// [`algorithms`]. `transform_pair` treats `left` as the local operation and
/// `right` as the one already committed by the server, so committed edits
/// win any tie.
pub trait OtSystem {
    type State;
    type Op: Clone;

    /// Apply `op` in place, failing if its preconditions do not hold
    fn apply(&self, state: &mut Self::State, op: &Self::Op) -> Result<()>;

    /// Apply `op` and report whether the state changed.
    ///
    /// `invert` only undoes applications that returned true.
    fn apply_effective(&self, state: &mut Self::State, op: &Self::Op) -> Result<bool> {
        self.apply(state, op)?;
        Ok(!self.is_empty(op))
    }

    fn invert(&self, op: &Self::Op) -> Self::Op;

    /// True for operations with no observable effect
    fn is_empty(&self, op: &Self::Op) -> bool;

    /// Combine two sequential operations into the shortest equivalent list
    fn squash(&self, first: &Self::Op, second: &Self::Op) -> Vec<Self::Op>;

    /// Transform two concurrent operations produced against the same state
    fn transform_pair(&self, left: &Self::Op, right: &Self::Op) -> Result<Transformed<Self::Op>>;

    fn apply_all(&self, state: &mut Self::State, ops: &[Self::Op]) -> Result<()> {
        algorithms::apply_all(self, state, ops)
    }

    fn invert_all(&self, ops: &[Self::Op]) -> Vec<Self::Op> {
        algorithms::invert_all(self, ops)
    }

    fn squash_all(&self, ops: &[Self::Op]) -> Vec<Self::Op> {
        algorithms::squash_all(self, ops)
    }

    fn transform(&self, left: &[Self::Op], right: &[Self::Op]) -> Result<Transformed<Self::Op>> {
        algorithms::transform(self, left, right)
    }
}
