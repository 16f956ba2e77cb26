//! In-process ordering authority
//!
//! Holds a linear, append-only log and accepts a push only when it was
//! produced against the latest revision, like a real server would.

use crate::transport::{Pulled, PushOutcome, Transport, TransportError};
use ot_common::Revision;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Authoritative operation log kept in memory
#[derive(Debug)]
pub struct MemoryServer<Op> {
    log: Mutex<Vec<Op>>,
}

impl<Op> Default for MemoryServer<Op> {
    fn default() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
        }
    }
}

impl<Op: Clone> MemoryServer<Op> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server seeded with already-committed history
    pub fn with_history(operations: Vec<Op>) -> Self {
        Self {
            log: Mutex::new(operations),
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<Op>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn revision(&self) -> Revision {
        Revision::GENESIS.advance(self.log().len())
    }

    /// Full committed history
    pub fn operations(&self) -> Vec<Op> {
        self.log().clone()
    }

    fn committed_since(log: &[Op], since: Revision) -> Result<Vec<Op>, TransportError> {
        usize::try_from(since.value())
            .ok()
            .and_then(|start| log.get(start..))
            .map(<[Op]>::to_vec)
            .ok_or_else(|| {
                TransportError::Protocol(format!(
                    "revision {since} is ahead of the server (at r{})",
                    log.len()
                ))
            })
    }

    pub fn pull_now(&self, since: Revision) -> Result<Pulled<Op>, TransportError> {
        let log = self.log();
        let operations = Self::committed_since(&log, since)?;
        Ok(Pulled {
            revision: Revision::GENESIS.advance(log.len()),
            operations,
        })
    }

    pub fn push_now(
        &self,
        from: Revision,
        operations: Vec<Op>,
    ) -> Result<PushOutcome<Op>, TransportError> {
        let mut log = self.log();
        let current = Revision::GENESIS.advance(log.len());

        if from != current {
            let missed = Self::committed_since(&log, from)?;
            tracing::debug!(%from, %current, missed = missed.len(), "rejecting stale push");
            return Ok(PushOutcome::Conflict {
                operations: missed,
                revision: current,
            });
        }

        log.extend(operations);
        let revision = Revision::GENESIS.advance(log.len());
        tracing::debug!(%from, %revision, "push accepted");
        Ok(PushOutcome::Accepted { revision })
    }
}

impl<Op> Transport<Op> for MemoryServer<Op>
where
    Op: Clone + Send + Sync,
{
    async fn pull(&self, since: Revision) -> Result<Pulled<Op>, TransportError> {
        self.pull_now(since)
    }

    async fn push(
        &self,
        from: Revision,
        operations: Vec<Op>,
    ) -> Result<PushOutcome<Op>, TransportError> {
        self.push_now(from, operations)
    }
}
