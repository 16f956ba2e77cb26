//! Transport adapter contract
//!
//! The engine never talks to the network directly; it drives an
//! implementation of [`Transport`] supplied by the application (HTTP,
//! WebSocket, or the in-process [`crate::MemoryServer`]).

use ot_common::Revision;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Operations committed after a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pulled<Op> {
    /// Revision the server is at after `operations`
    pub revision: Revision,
    pub operations: Vec<Op>,
}

/// Server answer to a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum PushOutcome<Op> {
    /// The batch was appended; `revision` is the revision after it
    Accepted { revision: Revision },

    /// Other clients committed first. `operations` are everything committed
    /// since the client's revision, `revision` is the server's current one.
    Conflict {
        operations: Vec<Op>,
        revision: Revision,
    },
}

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transient; the call is retried
    #[error("network error: {0}")]
    Network(String),

    /// Fatal for the session
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server rejected the request as malformed
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Access to the authoritative operation log of one resource
pub trait Transport<Op>: Send + Sync {
    /// Operations committed after `since`
    fn pull(
        &self,
        since: Revision,
    ) -> impl Future<Output = Result<Pulled<Op>, TransportError>> + Send;

    /// Append `operations`, produced against revision `from`
    fn push(
        &self,
        from: Revision,
        operations: Vec<Op>,
    ) -> impl Future<Output = Result<PushOutcome<Op>, TransportError>> + Send;
}

impl<Op, T> Transport<Op> for Arc<T>
where
    T: Transport<Op>,
{
    fn pull(
        &self,
        since: Revision,
    ) -> impl Future<Output = Result<Pulled<Op>, TransportError>> + Send {
        (**self).pull(since)
    }

    fn push(
        &self,
        from: Revision,
        operations: Vec<Op>,
    ) -> impl Future<Output = Result<PushOutcome<Op>, TransportError>> + Send {
        (**self).push(from, operations)
    }
}
