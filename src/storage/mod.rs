mod json;
mod memory;

use crate::core::error::PersistenceError;
use crate::core::models::{Pin, PinId};

pub use json::JsonPinRepository;
pub use memory::MemoryPinRepository;

/// Key-ordered record store holding pins by id.
///
/// Implementations may write synchronously or hand work off; callers never
/// depend on persistence completing before in-memory state moves on.
pub trait PinRepository: Send {
    fn get_all(&self) -> Result<Vec<Pin>, PersistenceError>;
    fn create(&mut self, pin: &Pin) -> Result<(), PersistenceError>;
    fn update(&mut self, pin: &Pin) -> Result<(), PersistenceError>;
    fn delete(&mut self, id: PinId) -> Result<(), PersistenceError>;
    fn bulk_update(&mut self, pins: &[Pin]) -> Result<(), PersistenceError>;
}
