//! State-change listeners — the planner's hook into every `TaskStatus`
//! transition a `TaskHandle` publishes.
//!
//! Callbacks never run under the handle's lock (§5): a mutation computes
//! what changed, releases the lock, then fires listeners. Listener
//! addition is protected by its own lock so a listener can subscribe from
//! inside another listener's callback without deadlocking.

use std::fmt;
use std::sync::Arc;

use rtc_shared::model::TaskStatus;

/// Fired on every state transition a `TaskHandle` publishes, including the
/// synthetic one produced by `TaskHandle::fail`.
pub trait StateChangeListener: Send + Sync {
    fn on_state_change(&self, status: &TaskStatus);
}

impl<F> StateChangeListener for F
where
    F: Fn(&TaskStatus) + Send + Sync,
{
    fn on_state_change(&self, status: &TaskStatus) {
        (self)(status)
    }
}

impl fmt::Debug for dyn StateChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn StateChangeListener")
    }
}

/// Thread-safe, append-only registry of listeners for one task.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: parking_lot::Mutex<Vec<Arc<dyn StateChangeListener>>>,
}

impl ListenerRegistry {
    pub fn add(&self, listener: Arc<dyn StateChangeListener>) {
        self.listeners.lock().push(listener);
    }

    /// Snapshot the current listener list and notify each one. Taking a
    /// clone of the `Arc`s up front means a listener that registers
    /// another listener mid-notification doesn't see it fire in the same
    /// round, and doesn't require holding the registry's lock while
    /// running arbitrary callback code.
    pub fn notify(&self, status: &TaskStatus) {
        let snapshot: Vec<_> = self.listeners.lock().clone();
        for listener in snapshot {
            listener.on_state_change(status);
        }
    }
}
