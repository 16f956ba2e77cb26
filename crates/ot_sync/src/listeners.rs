//! Change listeners scoped to one state manager

use std::sync::Arc;

/// Callback invoked with the new state after every mutation
pub type ChangeListener<St> = Arc<dyn Fn(&St) + Send + Sync>;

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered listener registry.
///
/// Registering the same `Arc` twice yields the same id; removing an unknown
/// id is a no-op.
pub(crate) struct Listeners<St> {
    entries: Vec<(ListenerId, ChangeListener<St>)>,
    next_id: u64,
}

impl<St> Listeners<St> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add(&mut self, listener: ChangeListener<St>) -> ListenerId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &listener))
        {
            return *id;
        }

        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners in registration order, detached from the registry
    pub fn snapshot(&self) -> Vec<ChangeListener<St>> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// A pending notification: the state to publish and who to publish it to.
///
/// Built while the manager is locked, fired after the lock is released so
/// listeners may call back into the manager.
pub(crate) struct Notification<St> {
    state: St,
    listeners: Vec<ChangeListener<St>>,
}

impl<St: Clone> Notification<St> {
    pub fn prepare(listeners: &Listeners<St>, state: &St) -> Option<Self> {
        if listeners.is_empty() {
            return None;
        }
        Some(Self {
            state: state.clone(),
            listeners: listeners.snapshot(),
        })
    }

    pub fn fire(self) {
        for listener in &self.listeners {
            listener(&self.state);
        }
    }
}
