use super::PinRepository;
use crate::core::error::PersistenceError;
use crate::core::models::{Pin, PinId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MemoryInner {
    records: BTreeMap<PinId, Pin>,
    writes: usize,
    failing: bool,
}

/// Volatile record store. Clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryPinRepository {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryPinRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pins(pins: Vec<Pin>) -> Self {
        let repo = Self::new();
        repo.lock().records = pins.into_iter().map(|p| (p.id, p)).collect();
        repo
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, apply: impl FnOnce(&mut BTreeMap<PinId, Pin>)) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(PersistenceError::Unavailable("memory store set to fail".into()));
        }
        apply(&mut inner.records);
        inner.writes += 1;
        Ok(())
    }

    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    #[cfg(test)]
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    #[cfg(test)]
    pub fn record(&self, id: PinId) -> Option<Pin> {
        self.lock().records.get(&id).cloned()
    }
}

impl PinRepository for MemoryPinRepository {
    fn get_all(&self) -> Result<Vec<Pin>, PersistenceError> {
        Ok(self.lock().records.values().cloned().collect())
    }

    fn create(&mut self, pin: &Pin) -> Result<(), PersistenceError> {
        self.write(|records| {
            records.insert(pin.id, pin.clone());
        })
    }

    fn update(&mut self, pin: &Pin) -> Result<(), PersistenceError> {
        let known = self.lock().records.contains_key(&pin.id);
        if !known {
            return Err(PersistenceError::NotFound(pin.id));
        }
        self.write(|records| {
            records.insert(pin.id, pin.clone());
        })
    }

    fn delete(&mut self, id: PinId) -> Result<(), PersistenceError> {
        self.write(|records| {
            records.remove(&id);
        })
    }

    fn bulk_update(&mut self, pins: &[Pin]) -> Result<(), PersistenceError> {
        self.write(|records| {
            for pin in pins {
                records.insert(pin.id, pin.clone());
            }
        })
    }
}
