use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::channel::ChannelName;

/// Listener callback. Receives the decoded notification arguments.
pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handle identifying one registration, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    handler: Handler,
    once: bool,
}

/// Per-session listener bookkeeping, keyed by channel.
///
/// Listeners on the same channel fire in registration order. Dispatch is
/// synchronous: every listener runs on the caller's task before `dispatch`
/// returns. A panicking listener is logged and does not stop the others.
///
/// The registry does no reference counting; the facade above it decides when
/// to issue `LISTEN` / `UNLISTEN`.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ChannelName, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every notification on `channel`.
    pub fn add<F>(&self, channel: ChannelName, handler: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.insert(channel, Arc::new(handler), false)
    }

    /// Register `handler` for the next notification on `channel` only.
    pub fn add_once<F>(&self, channel: ChannelName, handler: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.insert(channel, Arc::new(handler), true)
    }

    fn insert(&self, channel: ChannelName, handler: Handler, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(channel)
            .or_default()
            .push(Entry { id, handler, once });
        id
    }

    /// Remove one registration. Returns `false` if it was not registered.
    pub fn remove(&self, channel: &ChannelName, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(channel);
        }
        removed
    }

    pub fn listener_count(&self, channel: &ChannelName) -> usize {
        self.lock().get(channel).map_or(0, Vec::len)
    }

    /// Channels with at least one registered listener.
    pub fn channels(&self) -> Vec<ChannelName> {
        self.lock().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Invoke every listener of `channel` with `args`.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, channel: &ChannelName, args: &[Value]) -> usize {
        self.dispatch_with(channel, args, |_| {})
    }

    /// Like [`dispatch`](Self::dispatch), calling `before_once` right before
    /// each one-shot listener fires. One-shot listeners are unregistered
    /// before any listener runs.
    pub fn dispatch_with(
        &self,
        channel: &ChannelName,
        args: &[Value],
        mut before_once: impl FnMut(&ChannelName),
    ) -> usize {
        let snapshot: Vec<(Handler, bool)> = {
            let mut listeners = self.lock();
            let Some(entries) = listeners.get_mut(channel) else {
                return 0;
            };
            let snapshot = entries
                .iter()
                .map(|entry| (entry.handler.clone(), entry.once))
                .collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                listeners.remove(channel);
            }
            snapshot
        };

        for (handler, once) in &snapshot {
            if *once {
                before_once(channel);
            }
            if catch_unwind(AssertUnwindSafe(|| handler(args))).is_err() {
                tracing::error!(channel = %channel, "listener panicked, continuing with remaining listeners");
            }
        }
        snapshot.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelName, Vec<Entry>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .lock()
            .iter()
            .map(|(channel, entries)| (channel.to_string(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry").field("listeners", &counts).finish()
    }
}
