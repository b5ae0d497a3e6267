//! Infection lookup cache: a server-published bitset membership oracle,
//! cached on disk and replaced atomically (spec §4.7, §6, §7 `LookupCorrupt`).

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Opaque bitset indexed by `|BeaconCode| mod (8 * len)` (spec §3, §4.7).
#[derive(Clone, Debug, Default)]
pub struct InfectionLookup {
    bitset: Vec<u8>,
}

impl InfectionLookup {
    /// The all-clear lookup used before any download has completed, or when
    /// a corrupt download must be ignored (spec §7 `LookupCorrupt` policy).
    pub fn empty() -> Self {
        Self { bitset: Vec::new() }
    }

    /// Validate and wrap a freshly downloaded bitset. Rejects a bitset
    /// shorter than one byte (spec §7 `LookupCorrupt`: "bitset shorter than
    /// one byte or index out of range").
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::LookupCorrupt("bitset shorter than one byte".to_string()));
        }
        Ok(Self { bitset: bytes })
    }

    pub fn len_bytes(&self) -> usize {
        self.bitset.len()
    }

    /// Bit `index` of the bitset, counting from the least significant bit of
    /// byte 0 (so byte `[0x80]` has bit 7 set, matching spec §8 Scenario
    /// S6's reference value).
    pub fn is_set(&self, index: usize) -> bool {
        if self.bitset.is_empty() {
            return false;
        }
        let byte = self.bitset[index / 8];
        byte & (1 << (index % 8)) != 0
    }
}

/// On-disk single-file cache at `<cache_dir>/lookup`, replaced by atomic
/// write-rename (spec §6).
pub struct LookupCache {
    path: PathBuf,
}

impl LookupCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self { path: cache_dir.as_ref().join("lookup") }
    }

    /// Load the cached lookup, falling back to `InfectionLookup::empty()` if
    /// the file is missing or corrupt (spec §7: "ignore the lookup ... until
    /// next refresh").
    pub fn load(&self) -> InfectionLookup {
        match fs::read(&self.path) {
            Ok(bytes) => InfectionLookup::from_bytes(bytes).unwrap_or_else(|err| {
                warn!(?err, "lookup cache: corrupt on disk, treating as all-clear");
                InfectionLookup::empty()
            }),
            Err(_) => InfectionLookup::empty(),
        }
    }

    /// Validate and atomically replace the cached lookup (spec §6: "writes
    /// atomic (write-rename)"). A corrupt download never touches the cache
    /// file, so the previous cache is retained.
    pub fn replace_atomic(&self, bytes: &[u8]) -> Result<InfectionLookup> {
        let lookup = InfectionLookup::from_bytes(bytes.to_vec())?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Scenario S6 (spec §8): `[0x80]` marks bit 7 infectious, bit 0 clear.
    #[test]
    fn test_s6_bit_layout() {
        let lookup = InfectionLookup::from_bytes(vec![0x80]).unwrap();
        assert!(lookup.is_set(7));
        assert!(!lookup.is_set(0));
    }

    #[test]
    fn test_empty_bytes_rejected() {
        assert!(InfectionLookup::from_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_atomic_replace_and_reload() {
        let dir = tempdir().unwrap();
        let cache = LookupCache::new(dir.path());
        assert_eq!(cache.load().len_bytes(), 0);

        cache.replace_atomic(&[0x01]).unwrap();
        let reloaded = cache.load();
        assert!(reloaded.is_set(0));
    }

    #[test]
    fn test_corrupt_replace_retains_previous() {
        let dir = tempdir().unwrap();
        let cache = LookupCache::new(dir.path());
        cache.replace_atomic(&[0x01]).unwrap();

        assert!(cache.replace_atomic(&[]).is_err());
        // The on-disk file from the prior successful replace is untouched.
        let reloaded = cache.load();
        assert!(reloaded.is_set(0));
    }
}
