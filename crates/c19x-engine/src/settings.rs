//! Small key-value settings record (spec §6 "Persisted state layout"),
//! backed by `storage.rs`'s `metadata` tree — one sled key per field,
//! mirroring `gossipd::storage::Storage`'s metadata-tree usage and
//! `gossipd::config::Config`'s persisted `NodeState`.

use crate::storage::Storage;
use c19x_core::types::{AdviceState, UserStatus};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_RETENTION_DAYS: u32 = 14;
pub const DEFAULT_ROTATION_INTERVAL_MINUTES: u32 = 30;

/// Device-resident settings (spec §3's `Settings` addition, §6's "small
/// settings" key list).
pub struct Settings {
    storage: Arc<Storage>,
}

impl Settings {
    pub fn open(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn retention_days(&self) -> u32 {
        self.get_u32("retention_days").unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    pub fn set_retention_days(&self, days: u32) {
        self.put_u32("retention_days", days);
    }

    pub fn rotation_interval_minutes(&self) -> u32 {
        self.get_u32("rotation_interval_minutes").unwrap_or(DEFAULT_ROTATION_INTERVAL_MINUTES)
    }

    pub fn set_rotation_interval_minutes(&self, minutes: u32) {
        self.put_u32("rotation_interval_minutes", minutes);
    }

    /// `rotation_interval_minutes` converted to a `Duration` at this
    /// boundary — minutes are the unit of record, `Duration` is only ever
    /// constructed here (spec §9 Open Question: "rotation interval units").
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_minutes() as u64 * 60)
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_days() as u64 * 86_400)
    }

    pub fn rssi_threshold(&self) -> Option<i32> {
        self.get_i32("rssi_threshold")
    }

    pub fn set_rssi_threshold(&self, threshold: Option<i32>) {
        match threshold {
            Some(value) => self.put_i32("rssi_threshold", value),
            None => {
                let _ = self.storage.put_metadata("rssi_threshold", &[]);
            }
        }
    }

    pub fn advice_default(&self) -> AdviceState {
        self.get_metadata("advice_default")
            .and_then(|bytes| postcard::from_bytes(&bytes).ok())
            .unwrap_or(AdviceState::Stay)
    }

    pub fn set_advice_default(&self, advice: AdviceState) {
        if let Ok(bytes) = postcard::to_allocvec(&advice) {
            let _ = self.storage.put_metadata("advice_default", &bytes);
        }
    }

    pub fn status(&self) -> UserStatus {
        self.get_metadata("status")
            .and_then(|bytes| postcard::from_bytes(&bytes).ok())
            .unwrap_or(UserStatus::Normal)
    }

    pub fn set_status(&self, status: UserStatus, now_millis: i64) {
        if let Ok(bytes) = postcard::to_allocvec(&status) {
            let _ = self.storage.put_metadata("status", &bytes);
        }
        self.put_i64("last_status_update", now_millis);
    }

    pub fn last_status_update(&self) -> Option<i64> {
        self.get_i64("last_status_update")
    }

    pub fn last_contact_update(&self) -> Option<i64> {
        self.get_i64("last_contact_update")
    }

    pub fn set_last_contact_update(&self, now_millis: i64) {
        self.put_i64("last_contact_update", now_millis);
    }

    pub fn last_advice_update(&self) -> Option<i64> {
        self.get_i64("last_advice_update")
    }

    pub fn set_last_advice_update(&self, now_millis: i64) {
        self.put_i64("last_advice_update", now_millis);
    }

    fn get_metadata(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.get_metadata(key).ok().flatten()
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_metadata(key).and_then(|b| b.as_slice().try_into().ok()).map(u32::from_be_bytes)
    }

    fn put_u32(&self, key: &str, value: u32) {
        let _ = self.storage.put_metadata(key, &value.to_be_bytes());
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        let bytes = self.get_metadata(key)?;
        if bytes.is_empty() {
            return None;
        }
        bytes.as_slice().try_into().ok().map(i32::from_be_bytes)
    }

    fn put_i32(&self, key: &str, value: i32) {
        let _ = self.storage.put_metadata(key, &value.to_be_bytes());
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_metadata(key).and_then(|b| b.as_slice().try_into().ok()).map(i64::from_be_bytes)
    }

    fn put_i64(&self, key: &str, value: i64) {
        let _ = self.storage.put_metadata(key, &value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_settings() -> (Settings, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        (Settings::open(storage), dir)
    }

    #[test]
    fn test_defaults() {
        let (settings, _dir) = open_settings();
        assert_eq!(settings.retention_days(), DEFAULT_RETENTION_DAYS);
        assert_eq!(settings.rotation_interval_minutes(), DEFAULT_ROTATION_INTERVAL_MINUTES);
        assert_eq!(settings.rssi_threshold(), None);
        assert_eq!(settings.status(), UserStatus::Normal);
        assert_eq!(settings.advice_default(), AdviceState::Stay);
    }

    #[test]
    fn test_round_trip() {
        let (settings, _dir) = open_settings();
        settings.set_retention_days(7);
        settings.set_rssi_threshold(Some(-70));
        settings.set_status(UserStatus::ConfirmedPositive, 1_000);

        assert_eq!(settings.retention_days(), 7);
        assert_eq!(settings.rssi_threshold(), Some(-70));
        assert_eq!(settings.status(), UserStatus::ConfirmedPositive);
        assert_eq!(settings.last_status_update(), Some(1_000));
    }

    #[test]
    fn test_rotation_interval_minutes_to_duration() {
        let (settings, _dir) = open_settings();
        settings.set_rotation_interval_minutes(5);
        assert_eq!(settings.rotation_interval(), Duration::from_secs(300));
    }
}
