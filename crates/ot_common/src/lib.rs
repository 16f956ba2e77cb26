//! Common types and errors for the OT sync engine
//!
//! This crate provides the shared error taxonomy of the operation algebra and
//! the revision type used by every synchronized resource.

pub mod telemetry;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by the operation algebra
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// An operation's preconditions do not hold against the state it is applied to
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Two operations cannot have been produced against the same base state
    #[error("Transform failed: {0}")]
    Transform(String),
}

impl OtError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        OtError::InvalidOperation(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        OtError::Transform(msg.into())
    }
}

/// Position in the authoritative operation history.
///
/// Revision `0` is genesis; the revision after `n` committed operations is `n`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub const GENESIS: Revision = Revision(0);

    pub fn value(self) -> u64 {
        self.0
    }

    /// Revision reached after appending `count` operations
    pub fn advance(self, count: usize) -> Revision {
        Revision(self.0 + count as u64)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, OtError>;
