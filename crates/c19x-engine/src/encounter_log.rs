//! Append-only, retention-windowed encounter log (spec §4.6).
//!
//! Persisted rows live in `storage.rs`'s `encounters` tree, keyed by a
//! monotonic sequence number so sled's key ordering matches append order.
//! A `parking_lot::RwLock<BTreeMap<...>>` mirrors the store in memory so
//! `count_today`/`snapshot` are O(log n) and reads are served from a
//! consistent copy-on-read view (spec §5, §9 "the in-memory cache must be
//! kept strictly consistent with the store").

use crate::storage::Storage;
use c19x_core::types::{BeaconCode, Encounter};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Append-only, time-ordered record of observed peer beacon codes.
pub struct EncounterLog {
    storage: Arc<Storage>,
    rows: RwLock<BTreeMap<u64, Encounter>>,
    next_seq: RwLock<u64>,
    /// Rows that failed to persist; retried on the next `append` (spec §7
    /// `StoreError`: "retain in-memory row; retry on next append; never
    /// silently drop data").
    pending_retries: RwLock<Vec<(u64, Encounter)>>,
}

impl EncounterLog {
    /// Load existing rows from `storage` and resume sequence numbering after
    /// the highest one found.
    pub fn open(storage: Arc<Storage>) -> crate::storage::Result<Self> {
        let mut rows = BTreeMap::new();
        let mut max_seq = 0u64;
        for result in storage.all_encounters() {
            let (seq, encounter) = result?;
            max_seq = max_seq.max(seq);
            rows.insert(seq, encounter);
        }
        let next_seq = if rows.is_empty() { 0 } else { max_seq + 1 };
        Ok(Self {
            storage,
            rows: RwLock::new(rows),
            next_seq: RwLock::new(next_seq),
            pending_retries: RwLock::new(Vec::new()),
        })
    }

    /// Append one encounter. Total, atomic with respect to the in-memory
    /// index, and thread-safe (spec §4.6).
    pub fn append(&self, timestamp: i64, beacon_code: BeaconCode, rssi: i32) {
        self.retry_pending();

        let encounter = Encounter { timestamp, beacon_code, rssi };
        let seq = {
            let mut next = self.next_seq.write();
            let seq = *next;
            *next += 1;
            seq
        };

        self.rows.write().insert(seq, encounter);

        if let Err(err) = self.storage.put_encounter(seq, &encounter) {
            error!(?err, seq, "encounter log: store write failed, will retry next append");
            self.pending_retries.write().push((seq, encounter));
        }
    }

    fn retry_pending(&self) {
        let pending = std::mem::take(&mut *self.pending_retries.write());
        for (seq, encounter) in pending {
            if let Err(err) = self.storage.put_encounter(seq, &encounter) {
                warn!(?err, seq, "encounter log: retry still failing");
                self.pending_retries.write().push((seq, encounter));
            }
        }
    }

    /// Remove all encounters with `timestamp < t` (spec §4.6 retention).
    pub fn delete_before(&self, t: i64) {
        let to_remove: Vec<u64> = self
            .rows
            .read()
            .iter()
            .filter(|(_, e)| e.timestamp < t)
            .map(|(seq, _)| *seq)
            .collect();

        let mut rows = self.rows.write();
        for seq in &to_remove {
            rows.remove(seq);
        }
        drop(rows);

        for seq in to_remove {
            if let Err(err) = self.storage.remove_encounter(seq) {
                error!(?err, seq, "encounter log: retention delete failed on store");
            }
        }
    }

    /// A consistent copy-on-read view of every stored encounter, in append
    /// order (spec §4.6).
    pub fn snapshot(&self) -> Vec<Encounter> {
        self.rows.read().values().copied().collect()
    }

    /// Count encounters whose timestamp falls within the UTC day containing
    /// `now_millis`, optionally excluding weak-signal encounters at or below
    /// `rssi_threshold` (spec §4.6).
    pub fn count_today(&self, now_millis: i64, rssi_threshold: Option<i32>) -> usize {
        let today = now_millis.div_euclid(MILLIS_PER_DAY);
        self.rows
            .read()
            .values()
            .filter(|e| e.timestamp.div_euclid(MILLIS_PER_DAY) == today)
            .filter(|e| rssi_threshold.map_or(true, |threshold| e.rssi > threshold))
            .count()
    }
}
