//! Sled-backed persistence (spec.md §6 "Persisted state layout").
//!
//! Three trees: `encounters` (keyed by a monotonic big-endian sequence
//! number, so sled's natural key ordering gives append order), `secrets`
//! (the long-term shared secret and serial number), and `metadata` (the
//! small settings record). The `InfectionLookup` cache is deliberately not
//! here — spec.md §6 places it as a raw file, not a sled value, since its
//! size may reach "tens of MB"; see `lookup.rs`.

use c19x_core::types::Encounter;
use sled::Db;
use std::path::Path;
use thiserror::Error;

/// Storage errors (spec §7 `StoreError`).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Sled-backed persistence for the engine's device-resident state.
pub struct Storage {
    db: Db,
    encounters: sled::Tree,
    secrets: sled::Tree,
    metadata: sled::Tree,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        let encounters = db.open_tree("encounters")?;
        let secrets = db.open_tree("secrets")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self { db, encounters, secrets, metadata })
    }

    /// Insert an encounter row under its monotonic sequence key.
    pub fn put_encounter(&self, seq: u64, encounter: &Encounter) -> Result<()> {
        let value = postcard::to_allocvec(encounter)?;
        self.encounters.insert(seq.to_be_bytes(), value)?;
        Ok(())
    }

    /// Remove a single encounter row by sequence key.
    pub fn remove_encounter(&self, seq: u64) -> Result<()> {
        self.encounters.remove(seq.to_be_bytes())?;
        Ok(())
    }

    /// Iterate all encounter rows in append (key) order.
    pub fn all_encounters(&self) -> impl Iterator<Item = Result<(u64, Encounter)>> + '_ {
        self.encounters.iter().map(|result| {
            let (key, bytes) = result?;
            let seq = u64::from_be_bytes(key.as_ref().try_into().unwrap_or([0; 8]));
            let encounter: Encounter = postcard::from_bytes(&bytes)?;
            Ok((seq, encounter))
        })
    }

    pub fn encounter_count(&self) -> usize {
        self.encounters.len()
    }

    pub fn put_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.secrets.insert(key, value)?;
        Ok(())
    }

    pub fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.get(key)?.map(|v| v.to_vec()))
    }

    pub fn put_metadata(&self, key: &str, value: &[u8]) -> Result<()> {
        self.metadata.insert(key, value)?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.metadata.get(key)?.map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_encounter_round_trip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let encounter = Encounter {
            timestamp: 1_700_000_000_000,
            beacon_code: c19x_core::types::BeaconCode(7),
            rssi: -55,
        };
        storage.put_encounter(0, &encounter).unwrap();
        assert_eq!(storage.encounter_count(), 1);

        let rows: Vec<_> = storage.all_encounters().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![(0, encounter)]);
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        assert_eq!(storage.get_metadata("retention_days").unwrap(), None);
        storage.put_metadata("retention_days", b"14").unwrap();
        assert_eq!(storage.get_metadata("retention_days").unwrap(), Some(b"14".to_vec()));
    }

    #[test]
    fn test_secrets_round_trip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage.put_secret("sharedSecret", &[0x42; 32]).unwrap();
        assert_eq!(storage.get_secret("sharedSecret").unwrap(), Some(vec![0x42; 32]));
    }
}
