//! Core data model for the C19X proximity protocol (spec §3).

use serde::{Deserialize, Serialize};

/// Number of days a [`DayCodeSchedule`](crate::day_code::DayCodeSchedule)
/// precomputes, starting at the epoch.
pub const MAX_DAYS: u32 = 3650;

/// Epoch for [`DayIndex`]: 2020-01-01T00:00:00Z, as Unix seconds.
pub const EPOCH_UNIX_SECS: i64 = 1_577_836_800;

/// Number of beacon codes expanded from a single day's seed (spec §4.2).
pub const BEACON_CODES_PER_DAY: usize = 240;

/// Mask applied to a 256-bit digest to produce a non-negative 63-bit integer:
/// `2^63 - 1`.
pub const CODE_MODULUS: u64 = (1u64 << 63) - 1;

/// Number of days since [`EPOCH_UNIX_SECS`], in `[0, MAX_DAYS)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayIndex(pub u32);

/// A per-day secret: one element of the reverse-chained hash sequence
/// (spec §4.1). Always in `[0, 2^63)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayCode(pub u64);

/// `H(reverse_bytes(DayCode))`, publishable to drive on-device matching
/// without disclosing the `DayCode` itself (spec §4.2).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconCodeSeed(pub [u8; 32]);

impl std::fmt::Debug for BeaconCodeSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BeaconCodeSeed({})", hex::encode(self.0))
    }
}

/// A short-lived pseudonym broadcast by a device. Always in `[0, 2^63)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconCode(pub u64);

impl BeaconCode {
    /// Index this code would land on in a lookup bitset of `len` bytes,
    /// per spec §4.7: `|code| mod (8 * len)`.
    pub fn lookup_index(&self, bitset_len_bytes: usize) -> usize {
        let bits = (bitset_len_bytes as u64).saturating_mul(8);
        if bits == 0 {
            return 0;
        }
        (self.0 % bits) as usize
    }
}

/// A timestamped, signal-strength-annotated observation of a peer's beacon
/// code (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub beacon_code: BeaconCode,
    /// Signed dBm reading.
    pub rssi: i32,
}

/// Overall health status the user has reported, feeding `RiskAnalyser::advice`
/// (spec §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    #[default]
    Normal,
    Symptomatic,
    ConfirmedPositive,
}

/// Result of comparing the encounter log against the infection lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactStatus {
    Ok,
    Infectious,
}

/// Government-configured default advice when no exposure is detected and the
/// user's own status is normal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdviceState {
    Stay,
    SelfIsolate,
}
