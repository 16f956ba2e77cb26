//! Fault injection for transport adapters

use ot_sync::{Pulled, PushOutcome, Revision, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Wraps a transport and fails scripted calls before they reach it.
///
/// Failed calls never reach the wrapped transport, so a failed push is
/// guaranteed not to have been committed.
pub struct FlakyTransport<T> {
    inner: T,
    push_failures: Mutex<VecDeque<TransportError>>,
    pull_failures: Mutex<VecDeque<TransportError>>,
    push_attempts: AtomicUsize,
    pull_attempts: AtomicUsize,
    accepted_pushes: AtomicUsize,
}

impl<T> FlakyTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            push_failures: Mutex::new(VecDeque::new()),
            pull_failures: Mutex::new(VecDeque::new()),
            push_attempts: AtomicUsize::new(0),
            pull_attempts: AtomicUsize::new(0),
            accepted_pushes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Fail the next `count` pushes with `error`
    pub fn fail_next_pushes(&self, count: usize, error: TransportError) {
        script(&self.push_failures, count, error);
    }

    /// Fail the next `count` pulls with `error`
    pub fn fail_next_pulls(&self, count: usize, error: TransportError) {
        script(&self.pull_failures, count, error);
    }

    /// Pushes attempted, failed ones included
    pub fn push_attempts(&self) -> usize {
        self.push_attempts.load(Ordering::SeqCst)
    }

    pub fn pull_attempts(&self) -> usize {
        self.pull_attempts.load(Ordering::SeqCst)
    }

    /// Pushes the wrapped transport answered with `Accepted`
    pub fn accepted_pushes(&self) -> usize {
        self.accepted_pushes.load(Ordering::SeqCst)
    }
}

fn script(queue: &Mutex<VecDeque<TransportError>>, count: usize, error: TransportError) {
    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
    queue.extend(std::iter::repeat(error).take(count));
}

fn next_failure(queue: &Mutex<VecDeque<TransportError>>) -> Option<TransportError> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

impl<Op, T> Transport<Op> for FlakyTransport<T>
where
    Op: Send,
    T: Transport<Op>,
{
    async fn pull(&self, since: Revision) -> Result<Pulled<Op>, TransportError> {
        self.pull_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = next_failure(&self.pull_failures) {
            return Err(error);
        }
        self.inner.pull(since).await
    }

    async fn push(
        &self,
        from: Revision,
        operations: Vec<Op>,
    ) -> Result<PushOutcome<Op>, TransportError> {
        self.push_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = next_failure(&self.push_failures) {
            return Err(error);
        }

        let outcome = self.inner.push(from, operations).await?;
        if matches!(outcome, PushOutcome::Accepted { .. }) {
            self.accepted_pushes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ot_sync::MemoryServer;

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let transport = FlakyTransport::new(MemoryServer::<u8>::new());
        transport.fail_next_pushes(1, TransportError::Network("reset".into()));
        transport.fail_next_pushes(1, TransportError::Auth("expired".into()));

        assert_eq!(
            transport.push(Revision(0), vec![1u8]).await,
            Err(TransportError::Network("reset".into()))
        );
        assert_eq!(
            transport.push(Revision(0), vec![1u8]).await,
            Err(TransportError::Auth("expired".into()))
        );
        assert!(transport.push(Revision(0), vec![1u8]).await.is_ok());

        assert_eq!(transport.push_attempts(), 3);
        assert_eq!(transport.accepted_pushes(), 1);
        assert_eq!(transport.inner().operations(), vec![1u8]);
    }
}
