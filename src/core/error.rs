use crate::core::models::PinId;
use thiserror::Error;

/// Failure reported by a thread loader for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The thread was deleted or pruned. Watching it again is pointless.
    #[error("thread not found")]
    NotFound,

    /// Network, parse or rate-limit failure; the next cycle retries.
    #[error("transient load failure: {0}")]
    Transient(String),
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound)
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("pin store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pin store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("pin {0} is not in the record store")]
    NotFound(PinId),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_not_found_is_terminal() {
        assert!(LoadError::NotFound.is_not_found());
        assert!(!LoadError::Transient("503".into()).is_not_found());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PersistenceError::NotFound(PinId(3)).to_string(),
            "pin 3 is not in the record store"
        );
        assert_eq!(
            LoadError::Transient("timeout".into()).to_string(),
            "transient load failure: timeout"
        );
    }
}
