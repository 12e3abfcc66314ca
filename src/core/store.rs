use crate::core::error::PersistenceError;
use crate::core::models::{Loadable, Pin, PinId};
use crate::storage::PinRepository;

/// Ordered pin collection. The in-memory list is authoritative; writes to
/// the record store that fail are retried on the next mutation.
pub struct PinStore {
    pins: Vec<Pin>,
    repository: Box<dyn PinRepository>,
    next_id: u32,
    needs_flush: bool,
    pending_deletes: Vec<PinId>,
}

impl PinStore {
    pub fn load(repository: Box<dyn PinRepository>) -> Self {
        let mut pins = repository.get_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load pins, starting empty");
            Vec::new()
        });
        pins.sort_by_key(|p| p.order);

        let next_id = pins.iter().map(|p| p.id.0).max().unwrap_or(0) + 1;
        let mut store = Self {
            pins,
            repository,
            next_id,
            needs_flush: false,
            pending_deletes: Vec::new(),
        };

        if store.pins.iter().enumerate().any(|(i, p)| p.order != i as i32) {
            store.reorder();
        }
        tracing::info!(count = store.pins.len(), "Loaded pins");
        store
    }

    /// Inserts `pin` ahead of existing pins unless it carries its own order.
    /// Returns `None` when a pin for the same thread already exists.
    pub fn add(&mut self, mut pin: Pin) -> Option<PinId> {
        if self.find_by_loadable(&pin.loadable).is_some() {
            return None;
        }
        self.retry_pending();

        pin.order = pin.order.max(0);
        for existing in &mut self.pins {
            existing.order += 1;
        }

        pin.id = PinId(self.next_id);
        self.next_id += 1;
        let id = pin.id;

        let result = self.repository.create(&pin);
        self.record_failure("create", result);

        self.pins.push(pin);
        self.pins.sort_by_key(|p| p.order);
        self.reorder();
        Some(id)
    }

    pub fn remove(&mut self, id: PinId) -> Option<Pin> {
        let index = self.pins.iter().position(|p| p.id == id)?;
        self.retry_pending();
        let pin = self.pins.remove(index);

        if let Err(e) = self.repository.delete(id) {
            tracing::warn!(pin_id = %id, error = %e, "Failed to delete pin record");
            self.pending_deletes.push(id);
        }

        self.reorder();
        Some(pin)
    }

    pub fn all(&self) -> &[Pin] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn ids(&self) -> Vec<PinId> {
        self.pins.iter().map(|p| p.id).collect()
    }

    pub fn find_by_loadable(&self, loadable: &Loadable) -> Option<&Pin> {
        self.pins.iter().find(|p| &p.loadable == loadable)
    }

    pub fn find_by_id(&self, id: PinId) -> Option<&Pin> {
        self.pins.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: PinId) -> Option<&mut Pin> {
        self.pins.iter_mut().find(|p| p.id == id)
    }

    /// Reassigns `order` densely following the current sequence and
    /// persists every pin.
    pub fn reorder(&mut self) {
        for (i, pin) in self.pins.iter_mut().enumerate() {
            pin.order = i as i32;
        }
        self.flush();
    }

    /// Moves a pin to `to_index` (clamped) and re-densifies.
    pub fn move_pin(&mut self, id: PinId, to_index: usize) -> bool {
        let Some(from) = self.pins.iter().position(|p| p.id == id) else {
            return false;
        };
        let pin = self.pins.remove(from);
        let to = to_index.min(self.pins.len());
        self.pins.insert(to, pin);
        self.reorder();
        true
    }

    /// Writes a single pin's fields.
    pub fn persist(&mut self, id: PinId) {
        self.retry_pending();
        let Some(pin) = self.pins.iter().find(|p| p.id == id) else {
            return;
        };
        let result = self.repository.update(pin);
        self.record_failure("update", result);
    }

    /// Writes every pin in one bulk update.
    pub fn flush(&mut self) {
        self.retry_deletes();
        match self.repository.bulk_update(&self.pins) {
            Ok(()) => self.needs_flush = false,
            Err(e) => {
                tracing::warn!(error = %e, count = self.pins.len(), "Bulk pin update failed");
                self.needs_flush = true;
            }
        }
    }

    pub fn needs_flush(&self) -> bool {
        self.needs_flush || !self.pending_deletes.is_empty()
    }

    fn retry_pending(&mut self) {
        if self.needs_flush() {
            tracing::debug!("Retrying pending pin persistence");
            self.flush();
        }
    }

    fn retry_deletes(&mut self) {
        let pending = std::mem::take(&mut self.pending_deletes);
        for id in pending {
            if let Err(e) = self.repository.delete(id) {
                tracing::warn!(pin_id = %id, error = %e, "Pin record delete still failing");
                self.pending_deletes.push(id);
            }
        }
    }

    fn record_failure(&mut self, operation: &str, result: Result<(), PersistenceError>) {
        if let Err(e) = result {
            tracing::warn!(operation, error = %e, "Pin persistence failed");
            self.needs_flush = true;
        }
    }
}
