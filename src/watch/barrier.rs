use super::platform::WakeLock;
use crate::core::models::PinId;
use std::collections::HashSet;

/// Holds the wake lock while background loads are outstanding.
///
/// `pending` is `None` when no background cycle is in flight, and
/// `Some(empty)` while a cycle is being enumerated but nothing has
/// started yet.
pub struct WakeBarrier {
    pending: Option<HashSet<PinId>>,
    wake_lock: Box<dyn WakeLock>,
    held: bool,
}

impl WakeBarrier {
    pub fn new(wake_lock: Box<dyn WakeLock>) -> Self {
        Self {
            pending: None,
            wake_lock,
            held: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, HashSet::len)
    }

    /// Starts a new batch. A batch still in flight is abandoned first.
    pub fn begin(&mut self) {
        if self.is_running() {
            tracing::warn!(
                pending = self.pending_len(),
                "Background cycle started before the previous one finished"
            );
            self.abandon();
        }
        self.pending = Some(HashSet::new());
    }

    pub fn track(&mut self, id: PinId) {
        if let Some(pending) = self.pending.as_mut() {
            pending.insert(id);
        }
    }

    /// Finishes enumeration: acquires the lock if anything started,
    /// otherwise ends the batch without touching the lock.
    pub fn commit(&mut self) {
        match self.pending.as_ref() {
            Some(pending) if !pending.is_empty() => {
                tracing::debug!(pending = pending.len(), "Acquiring wake lock for background cycle");
                self.wake_lock.acquire();
                self.held = true;
            }
            Some(_) => {
                tracing::debug!("Background cycle started no loads");
                self.pending = None;
            }
            None => {}
        }
    }

    /// Records that `id` finished loading. Releases the lock once the batch
    /// drains.
    pub fn complete(&mut self, id: PinId) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if !pending.remove(&id) {
            return;
        }
        if pending.is_empty() {
            self.finish();
        }
    }

    /// Drops `id` from the batch without waiting for its load.
    pub fn forget(&mut self, id: PinId) {
        self.complete(id);
    }

    /// Ends the batch now, releasing the lock if held.
    pub fn abandon(&mut self) {
        if self.is_running() {
            tracing::debug!(pending = self.pending_len(), "Abandoning background cycle");
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.pending = None;
        if self.held {
            tracing::debug!("Releasing wake lock");
            self.wake_lock.release();
            self.held = false;
        }
    }
}
