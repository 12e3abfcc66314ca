use super::PinRepository;
use crate::core::error::PersistenceError;
use crate::core::models::{Pin, PinId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Record store kept as a single JSON array on disk, rewritten atomically.
pub struct JsonPinRepository {
    path: PathBuf,
    records: BTreeMap<PinId, Pin>,
}

impl JsonPinRepository {
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("pinwatch").join("pins.json"))
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let records = if path.exists() {
            read_records(&path)?
        } else {
            tracing::info!(?path, "Pin file not found, starting empty");
            BTreeMap::new()
        };

        Ok(Self { path, records })
    }

    /// Reads the pin file without keeping a handle, for one-shot CLI use.
    pub fn read_all(path: &Path) -> Result<Vec<Pin>, PersistenceError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_records(path)?.into_values().collect())
    }

    fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pins: Vec<&Pin> = self.records.values().collect();
        let content = serde_json::to_string_pretty(&pins)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::trace!(path = ?self.path, count = pins.len(), "Saved pins");
        Ok(())
    }
}

fn read_records(path: &Path) -> Result<BTreeMap<PinId, Pin>, PersistenceError> {
    let content = std::fs::read_to_string(path)?;
    let pins: Vec<Pin> = serde_json::from_str(&content)?;
    Ok(pins.into_iter().map(|p| (p.id, p)).collect())
}

impl PinRepository for JsonPinRepository {
    fn get_all(&self) -> Result<Vec<Pin>, PersistenceError> {
        Ok(self.records.values().cloned().collect())
    }

    fn create(&mut self, pin: &Pin) -> Result<(), PersistenceError> {
        self.records.insert(pin.id, pin.clone());
        self.save()
    }

    fn update(&mut self, pin: &Pin) -> Result<(), PersistenceError> {
        match self.records.get_mut(&pin.id) {
            Some(record) => *record = pin.clone(),
            None => return Err(PersistenceError::NotFound(pin.id)),
        }
        self.save()
    }

    fn delete(&mut self, id: PinId) -> Result<(), PersistenceError> {
        self.records.remove(&id);
        self.save()
    }

    fn bulk_update(&mut self, pins: &[Pin]) -> Result<(), PersistenceError> {
        for pin in pins {
            self.records.insert(pin.id, pin.clone());
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Loadable;

    fn pin(id: u32, board: &str) -> Pin {
        let mut pin = Pin::new(Loadable::new(board, u64::from(id) * 10), "t");
        pin.id = PinId(id);
        pin
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonPinRepository::open(dir.path().join("pins.json")).unwrap();
        assert!(repo.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pins.json");

        let mut repo = JsonPinRepository::open(&path).unwrap();
        repo.create(&pin(2, "g")).unwrap();
        repo.create(&pin(1, "v")).unwrap();
        let mut changed = pin(2, "g");
        changed.watch_new_count = 12;
        repo.update(&changed).unwrap();
        repo.delete(PinId(1)).unwrap();

        let reopened = JsonPinRepository::open(&path).unwrap();
        let pins = reopened.get_all().unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].watch_new_count, 12);
        assert_eq!(JsonPinRepository::read_all(&path).unwrap(), pins);
    }

    #[test]
    fn test_bulk_update_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        let mut repo = JsonPinRepository::open(&path).unwrap();
        repo.bulk_update(&[pin(1, "a"), pin(2, "b")]).unwrap();

        let ids: Vec<PinId> = JsonPinRepository::read_all(&path)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![PinId(1), PinId(2)]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonPinRepository::open(&path),
            Err(PersistenceError::Serialize(_))
        ));
    }
}
