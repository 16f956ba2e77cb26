//! Client-side state manager
//!
//! Owns the working state of one resource together with the queues of local
//! operations that the server has not committed yet:
//!
//! - **pending**: added locally, not sent
//! - **inflight**: the batch currently being pushed
//!
//! The working state is always `base + inflight + pending`, where `base` is
//! the state at the last known server revision.

use crate::listeners::{ChangeListener, ListenerId, Listeners, Notification};
use crate::offline::ManagerSnapshot;
use crate::retry::{FixedDelay, RetryPolicy};
use crate::transport::{Pulled, PushOutcome, Transport, TransportError};
use crate::{Result, SyncConfig, SyncError};
use ot_common::{OtError, Revision};
use ot_core::OtSystem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Lifecycle of a [`StateManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// Created, `checkout()` not called yet
    Uninitialized,
    CheckingOut,
    Ready,
    /// A push or pull is outstanding
    Syncing,
    /// Waiting out the retry delay after a network failure
    Retrying,
    /// The server rejected our credentials
    Halted,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    CheckingOut,
    Syncing,
}

struct Inner<S: OtSystem> {
    base: S::State,
    state: S::State,
    revision: Revision,
    inflight: Vec<S::Op>,
    pending: Vec<S::Op>,
    rejected: Vec<OtError>,
    listeners: Listeners<S::State>,
    activity: Option<Activity>,
    retrying: bool,
    checked_out: bool,
    halted: bool,
    closed: bool,
}

impl<S: OtSystem> Inner<S>
where
    S::State: Clone,
{
    fn new(initial: S::State) -> Self {
        Self {
            base: initial.clone(),
            state: initial,
            revision: Revision::GENESIS,
            inflight: Vec::new(),
            pending: Vec::new(),
            rejected: Vec::new(),
            listeners: Listeners::new(),
            activity: None,
            retrying: false,
            checked_out: false,
            halted: false,
            closed: false,
        }
    }

    fn status(&self) -> SyncStatus {
        if self.closed {
            SyncStatus::Closed
        } else if self.halted {
            SyncStatus::Halted
        } else if self.retrying {
            SyncStatus::Retrying
        } else {
            match self.activity {
                Some(Activity::CheckingOut) => SyncStatus::CheckingOut,
                Some(Activity::Syncing) => SyncStatus::Syncing,
                None if self.checked_out => SyncStatus::Ready,
                None => SyncStatus::Uninitialized,
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SyncError::Closed);
        }
        if self.halted {
            return Err(SyncError::Halted);
        }
        Ok(())
    }

    fn ensure_checked_out(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.checked_out {
            return Err(SyncError::NotCheckedOut);
        }
        Ok(())
    }

    fn notification(&self) -> Option<Notification<S::State>> {
        Notification::prepare(&self.listeners, &self.state)
    }

    /// Replace `base` and the queues, recomputing the working state
    fn reset_to(
        &mut self,
        system: &S,
        base: S::State,
        inflight: Vec<S::Op>,
        pending: Vec<S::Op>,
    ) -> ot_common::Result<()> {
        let mut state = base.clone();
        system.apply_all(&mut state, &inflight)?;
        system.apply_all(&mut state, &pending)?;

        self.base = base;
        self.state = state;
        self.inflight = inflight;
        self.pending = pending;
        Ok(())
    }

    /// The server committed the inflight batch as-is
    fn acknowledge(&mut self, system: &S, revision: Revision) -> ot_common::Result<()> {
        let mut base = self.base.clone();
        system.apply_all(&mut base, &self.inflight)?;
        self.base = base;
        self.inflight.clear();
        self.revision = revision;
        Ok(())
    }

    fn transform_queues(
        &self,
        system: &S,
        committed: &[S::Op],
    ) -> ot_common::Result<(Vec<S::Op>, Vec<S::Op>)> {
        let inflight = system.transform(&self.inflight, committed)?;
        let pending = system.transform(&self.pending, &inflight.right)?;
        Ok((inflight.left, pending.left))
    }

    /// Move the local queues on top of operations committed by others.
    ///
    /// Local operations that cannot be rebased are discarded and the error is
    /// returned once; the manager stays at `revision`. Committed operations
    /// that do not apply to `base` halt the manager.
    fn rebase(&mut self, system: &S, committed: &[S::Op], revision: Revision) -> Result<()> {
        let mut base = self.base.clone();
        if let Err(err) = system.apply_all(&mut base, committed) {
            self.halted = true;
            return Err(SyncError::Protocol(format!(
                "committed operations do not apply at {}: {err}",
                self.revision
            )));
        }

        let rebased = self
            .transform_queues(system, committed)
            .and_then(|(inflight, pending)| self.reset_to(system, base.clone(), inflight, pending));
        self.revision = revision;

        if let Err(err) = rebased {
            self.state = base.clone();
            self.base = base;
            self.inflight.clear();
            self.pending.clear();
            return Err(err.into());
        }
        Ok(())
    }
}

fn lock<S: OtSystem>(inner: &Mutex<Inner<S>>) -> MutexGuard<'_, Inner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the activity flags when a checkout, sync or pull finishes, including
/// when its future is dropped mid-flight.
struct ActivityGuard<'a, S: OtSystem> {
    inner: &'a Mutex<Inner<S>>,
}

impl<S: OtSystem> Drop for ActivityGuard<'_, S> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        inner.activity = None;
        inner.retrying = false;
    }
}

/// Synchronizes one resource with its ordering authority.
///
/// Cloning yields another handle to the same manager, so local edits can be
/// added while a clone is awaiting the transport.
///
/// ```rust
/// use ot_core::rooms::{RoomOp, RoomSystem};
/// use ot_sync::{FixedDelay, MemoryServer, StateManager, SyncStatus};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> ot_sync::Result<()> {
/// let server = Arc::new(MemoryServer::<RoomOp>::new());
/// let alice = StateManager::new(RoomSystem, server.clone(), Default::default())
///     .with_client_id("alice")
///     .with_retry_policy(FixedDelay::immediate());
///
/// alice.checkout().await?;
/// alice.add([RoomOp::add("r1", ["alice", "bob"])]);
/// assert_eq!(alice.pending_len(), 1);
///
/// alice.sync().await?;
/// assert_eq!(alice.status(), SyncStatus::Ready);
/// assert_eq!(alice.revision(), server.revision());
/// # Ok(())
/// # }
/// ```
pub struct StateManager<S: OtSystem, T> {
    system: Arc<S>,
    transport: Arc<T>,
    retry: Arc<dyn RetryPolicy>,
    client_id: String,
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S: OtSystem, T> Clone for StateManager<S, T> {
    fn clone(&self) -> Self {
        Self {
            system: Arc::clone(&self.system),
            transport: Arc::clone(&self.transport),
            retry: Arc::clone(&self.retry),
            client_id: self.client_id.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, T> StateManager<S, T>
where
    S: OtSystem + Send + Sync + 'static,
    S::State: Clone + Send + 'static,
    S::Op: Send + Sync + 'static,
    T: Transport<S::Op>,
{
    /// Manager starting from `initial`, the state at genesis.
    ///
    /// Retries network failures forever with [`FixedDelay::DEFAULT_DELAY`].
    pub fn new(system: S, transport: T, initial: S::State) -> Self {
        Self {
            system: Arc::new(system),
            transport: Arc::new(transport),
            retry: Arc::new(FixedDelay::default()),
            client_id: "client".to_string(),
            inner: Arc::new(Mutex::new(Inner::new(initial))),
        }
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Name used in log output
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Apply client id and retry settings from a validated `config`
    pub fn with_config(self, config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(self
            .with_client_id(config.client_id.clone())
            .with_retry_policy(config.retry_policy()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        lock(&self.inner)
    }

    /// Caller must have set `activity` under the lock
    fn activity_guard(&self) -> ActivityGuard<'_, S> {
        ActivityGuard { inner: &self.inner }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().status()
    }

    /// Last server revision incorporated into the base state
    pub fn revision(&self) -> Revision {
        self.lock().revision
    }

    /// Working state: base plus every local operation not yet committed
    pub fn get_state(&self) -> S::State {
        self.lock().state.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.lock().inflight.len()
    }

    /// Load the full committed history and rebase anything added so far on
    /// top of it. A manager that is already checked out is left as is.
    pub async fn checkout(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.ensure_open()?;
            if inner.activity.is_some() {
                return Err(SyncError::Busy);
            }
            if inner.checked_out {
                return Ok(());
            }
            inner.activity = Some(Activity::CheckingOut);
        }
        let _activity = self.activity_guard();

        let pulled = self.pull_with_retry("checkout", Revision::GENESIS).await?;

        let (rebased, notification) = {
            let mut inner = self.lock();
            inner.ensure_open()?;
            let rebased = inner.rebase(&self.system, &pulled.operations, pulled.revision);
            inner.checked_out = !inner.halted;
            (rebased, inner.notification())
        };
        if let Some(notification) = notification {
            notification.fire();
        }
        self.log_rebase_failure(&rebased);
        rebased?;

        tracing::info!(
            client = %self.client_id,
            revision = %pulled.revision,
            operations = pulled.operations.len(),
            "checked out"
        );
        Ok(())
    }

    /// Apply local operations optimistically and queue them for the next sync.
    ///
    /// Operations whose preconditions fail are dropped; the error is reported
    /// by the next [`sync`](Self::sync). Operations that leave the state
    /// unchanged are not queued.
    pub fn add(&self, operations: impl IntoIterator<Item = S::Op>) {
        let notification = {
            let mut inner = self.lock();
            if inner.closed {
                tracing::warn!(client = %self.client_id, "ignoring operations added after close");
                return;
            }

            let inner = &mut *inner;
            let mut applied = 0usize;
            for op in operations {
                match self.system.apply_effective(&mut inner.state, &op) {
                    Ok(true) => {
                        inner.pending.push(op);
                        applied += 1;
                    }
                    Ok(false) => {
                        tracing::debug!(client = %self.client_id, "skipping operation without effect");
                    }
                    Err(err) => {
                        tracing::warn!(client = %self.client_id, error = %err, "dropping local operation");
                        inner.rejected.push(err);
                    }
                }
            }

            if applied == 0 {
                return;
            }
            tracing::debug!(client = %self.client_id, applied, pending = inner.pending.len(), "operations added");
            inner.notification()
        };

        if let Some(notification) = notification {
            notification.fire();
        }
    }

    /// Push local operations, rebasing them until the server accepts them.
    ///
    /// Returns immediately when nothing is queued or when another sync is
    /// already outstanding.
    pub async fn sync(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.ensure_checked_out()?;

            if !inner.rejected.is_empty() {
                let mut rejected = std::mem::take(&mut inner.rejected);
                return Err(rejected.swap_remove(0).into());
            }
            if inner.activity.is_some() {
                tracing::debug!(client = %self.client_id, "sync already in progress");
                return Ok(());
            }
            if inner.inflight.is_empty() {
                if inner.pending.is_empty() {
                    return Ok(());
                }
                let pending = std::mem::take(&mut inner.pending);
                inner.inflight = self.system.squash_all(&pending);
                if inner.inflight.is_empty() {
                    tracing::debug!(client = %self.client_id, "pending operations cancelled out");
                    return Ok(());
                }
            }
            inner.activity = Some(Activity::Syncing);
        }
        let _activity = self.activity_guard();

        loop {
            let (from, batch) = {
                let inner = self.lock();
                (inner.revision, inner.inflight.clone())
            };

            tracing::debug!(client = %self.client_id, %from, operations = batch.len(), "pushing");
            let outcome = self.push_with_retry(from, &batch).await?;

            match outcome {
                PushOutcome::Accepted { revision } => {
                    let notification = {
                        let mut inner = self.lock();
                        inner.acknowledge(&self.system, revision)?;
                        inner.notification()
                    };
                    tracing::info!(client = %self.client_id, %revision, operations = batch.len(), "push accepted");
                    if let Some(notification) = notification {
                        notification.fire();
                    }
                    return Ok(());
                }
                PushOutcome::Conflict {
                    operations,
                    revision,
                } => {
                    let (rebased, notification, done) = {
                        let mut inner = self.lock();
                        let rebased = inner.rebase(&self.system, &operations, revision);
                        (rebased, inner.notification(), inner.inflight.is_empty())
                    };
                    if let Some(notification) = notification {
                        notification.fire();
                    }
                    self.log_rebase_failure(&rebased);
                    rebased?;

                    tracing::info!(
                        client = %self.client_id,
                        %revision,
                        committed = operations.len(),
                        "rebased onto concurrent operations"
                    );
                    if done {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Fetch operations committed by others and rebase local queues onto
    /// them without pushing. Returns the number of operations fetched.
    pub async fn pull(&self) -> Result<usize> {
        let since = {
            let mut inner = self.lock();
            inner.ensure_checked_out()?;
            if inner.activity.is_some() {
                return Ok(0);
            }
            inner.activity = Some(Activity::Syncing);
            inner.revision
        };
        let _activity = self.activity_guard();

        let pulled = self.pull_with_retry("pull", since).await?;
        if pulled.operations.is_empty() && pulled.revision == since {
            return Ok(0);
        }

        let (rebased, notification) = {
            let mut inner = self.lock();
            let rebased = inner.rebase(&self.system, &pulled.operations, pulled.revision);
            (rebased, inner.notification())
        };
        if let Some(notification) = notification {
            notification.fire();
        }
        self.log_rebase_failure(&rebased);
        rebased?;

        tracing::debug!(
            client = %self.client_id,
            revision = %pulled.revision,
            operations = pulled.operations.len(),
            "pulled"
        );
        Ok(pulled.operations.len())
    }

    /// Discard pending operations, undoing them on the working state.
    /// Returns how many were discarded; the inflight batch is untouched.
    pub fn reset(&self) -> Result<usize> {
        let (discarded, notification) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(SyncError::Closed);
            }
            inner.rejected.clear();
            if inner.pending.is_empty() {
                return Ok(0);
            }

            let mut state = inner.state.clone();
            let undo = self.system.invert_all(&inner.pending);
            self.system.apply_all(&mut state, &undo)?;

            inner.state = state;
            let discarded = std::mem::take(&mut inner.pending).len();
            (discarded, inner.notification())
        };

        tracing::info!(client = %self.client_id, discarded, "pending operations discarded");
        if let Some(notification) = notification {
            notification.fire();
        }
        Ok(discarded)
    }

    /// Register `listener`; registering the same `Arc` again returns its existing id
    pub fn add_change_listener(&self, listener: ChangeListener<S::State>) -> ListenerId {
        self.lock().listeners.add(listener)
    }

    /// Returns false if `id` was not registered
    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(id)
    }

    /// Capture revision, base state and queues for a later [`restore`](Self::restore)
    pub fn snapshot(&self) -> Result<ManagerSnapshot<S::State, S::Op>> {
        let inner = self.lock();
        inner.ensure_checked_out()?;
        Ok(ManagerSnapshot {
            revision: inner.revision,
            base: inner.base.clone(),
            inflight: inner.inflight.clone(),
            pending: inner.pending.clone(),
        })
    }

    /// Resume from a snapshot instead of checking out.
    ///
    /// Operations committed since the snapshot are picked up by the next
    /// sync or pull.
    pub fn restore(&self, snapshot: ManagerSnapshot<S::State, S::Op>) -> Result<()> {
        let notification = {
            let mut inner = self.lock();
            inner.ensure_open()?;
            if inner.activity.is_some() {
                return Err(SyncError::Busy);
            }

            let ManagerSnapshot {
                revision,
                base,
                inflight,
                pending,
            } = snapshot;
            inner.reset_to(&self.system, base, inflight, pending)?;
            inner.revision = revision;
            inner.rejected.clear();
            inner.checked_out = true;
            inner.notification()
        };

        tracing::info!(client = %self.client_id, revision = %self.revision(), "restored from snapshot");
        if let Some(notification) = notification {
            notification.fire();
        }
        Ok(())
    }

    /// Tear down: listeners are dropped and every later call fails with
    /// [`SyncError::Closed`]. A sync waiting to retry stops at its next wake-up.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.listeners.clear();
        tracing::info!(
            client = %self.client_id,
            pending = inner.pending.len(),
            inflight = inner.inflight.len(),
            "state manager closed"
        );
    }

    /// Sync then pull every `period` until `shutdown` turns true, its sender
    /// is dropped, or the manager is closed.
    ///
    /// Recoverable failures are logged and retried on the next tick; fatal
    /// ones end the loop.
    pub async fn run_periodic(
        &self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(client = %self.client_id, ?period, "periodic sync started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sync_and_pull().await {
                        Ok(()) => {}
                        Err(SyncError::Closed) => return Ok(()),
                        Err(err) if err.is_fatal() => {
                            tracing::error!(client = %self.client_id, error = %err, "periodic sync stopped");
                            return Err(err);
                        }
                        Err(err) => {
                            tracing::warn!(client = %self.client_id, error = %err, "periodic sync failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(client = %self.client_id, "periodic sync stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn log_rebase_failure(&self, rebased: &Result<()>) {
        match rebased {
            Ok(()) => {}
            Err(err @ SyncError::Protocol(_)) => {
                tracing::error!(client = %self.client_id, error = %err, "server history rejected, halting");
            }
            Err(err) => {
                tracing::warn!(client = %self.client_id, error = %err, "local operations discarded, rebase failed");
            }
        }
    }

    async fn sync_and_pull(&self) -> Result<()> {
        self.sync().await?;
        self.pull().await?;
        Ok(())
    }

    async fn pull_with_retry(
        &self,
        action: &'static str,
        since: Revision,
    ) -> Result<Pulled<S::Op>> {
        let mut attempt = 0u32;
        loop {
            self.lock().ensure_open()?;
            match self.transport.pull(since).await {
                Ok(pulled) => {
                    self.lock().retrying = false;
                    return Ok(pulled);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.retry_delay(action, attempt, err)?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn push_with_retry(&self, from: Revision, batch: &[S::Op]) -> Result<PushOutcome<S::Op>> {
        let mut attempt = 0u32;
        loop {
            self.lock().ensure_open()?;
            match self.transport.push(from, batch.to_vec()).await {
                Ok(outcome) => {
                    self.lock().retrying = false;
                    return Ok(outcome);
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.retry_delay("push", attempt, err)?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// How long to wait after the `attempt`-th failed transport call, or the
    /// error to surface instead. Only network failures are retried.
    fn retry_delay(
        &self,
        action: &'static str,
        attempt: u32,
        err: TransportError,
    ) -> Result<Duration> {
        match err {
            TransportError::Network(reason) => {
                let mut inner = self.lock();
                let Some(delay) = self.retry.next_delay(attempt) else {
                    inner.retrying = false;
                    tracing::warn!(client = %self.client_id, action, attempt, error = %reason, "giving up");
                    return Err(SyncError::RetriesExhausted {
                        attempts: attempt,
                        last_error: reason,
                    });
                };

                inner.retrying = true;
                tracing::warn!(
                    client = %self.client_id,
                    action,
                    attempt,
                    ?delay,
                    error = %reason,
                    "transport call failed, retrying"
                );
                Ok(delay)
            }
            TransportError::Auth(reason) => {
                self.lock().halted = true;
                tracing::error!(client = %self.client_id, action, error = %reason, "authentication failed, halting");
                Err(SyncError::Auth(reason))
            }
            TransportError::Protocol(reason) => {
                tracing::error!(client = %self.client_id, action, error = %reason, "protocol violation");
                Err(SyncError::Protocol(reason))
            }
        }
    }
}
