//! Per-peer identity, state, and the receiver's connection state machine
//! (spec §3 PeerState, §4.5).

use c19x_core::types::BeaconCode;

/// Opaque platform handle for a physically observed peer (e.g. a CoreBluetooth
/// peripheral identifier or an Android device address). The protocol never
/// interprets its contents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub String);

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Freshness window: a cached peer `BeaconCode` must be rediscovered after
/// this many milliseconds (spec §4.5 policy 3).
pub const FRESHNESS_WINDOW_MILLIS: i64 = 30 * 60 * 1000;

/// Per-peer connection state (spec §4.5's state machine diagram).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    New,
    ConnectPending,
    ReadingRssi,
    DiscoveringCharacteristic,
    Detected,
    Disconnecting,
    Idle,
}

/// One physically-observed peer (spec §3).
#[derive(Clone, Debug)]
pub struct PeerState {
    pub handle: PeerHandle,
    pub last_rssi: Option<i32>,
    pub last_beacon_code: Option<BeaconCode>,
    /// Unix millis when `last_beacon_code` was acquired.
    pub code_acquired_at: Option<i64>,
    pub conn_state: ConnState,
    /// Unix millis of the last `conn_state` transition, used to detect a
    /// per-peer operation that has exceeded the timeout (spec §4.5
    /// "Any --(timeout 8s | failure)--> Disconnecting").
    pub state_since: i64,
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl PeerState {
    pub fn new(handle: PeerHandle) -> Self {
        Self {
            handle,
            last_rssi: None,
            last_beacon_code: None,
            code_acquired_at: None,
            conn_state: ConnState::New,
            state_since: now_millis(),
        }
    }

    /// Move to a new connection state, resetting the per-state timeout
    /// clock.
    pub fn transition(&mut self, state: ConnState) {
        self.conn_state = state;
        self.state_since = now_millis();
    }

    /// Whether this peer has been stuck in a non-terminal state for longer
    /// than `timeout` (spec §4.5/§7 PeerTimeout, default 8s).
    pub fn is_timed_out(&self, timeout_millis: i64, now: i64) -> bool {
        matches!(
            self.conn_state,
            ConnState::ConnectPending | ConnState::ReadingRssi | ConnState::DiscoveringCharacteristic
        ) && now - self.state_since >= timeout_millis
    }

    /// Record a freshly discovered beacon code. Does not touch `last_rssi`:
    /// an RSSI read earlier in the same cycle must survive code acquisition,
    /// since emission requires both to be present at once (spec §4.5 policy
    /// 4 invalidates the cached RSSI only on emission, in
    /// `invalidate_rssi_after_emit`).
    pub fn record_code(&mut self, code: BeaconCode, now_millis: i64) {
        self.last_beacon_code = Some(code);
        self.code_acquired_at = Some(now_millis);
    }

    pub fn record_rssi(&mut self, rssi: i32) {
        self.last_rssi = Some(rssi);
    }

    /// A cached code expires when the calendar day has rolled over (codes
    /// roll over at midnight UTC) or 30 minutes have elapsed, whichever is
    /// sooner (spec §4.5 policy 3, glossary "Freshness window").
    pub fn is_code_expired(&self, now_millis: i64) -> bool {
        match (self.last_beacon_code, self.code_acquired_at) {
            (Some(_), Some(acquired_at)) => {
                let day_changed = day_index(acquired_at) != day_index(now_millis);
                let window_elapsed = now_millis - acquired_at >= FRESHNESS_WINDOW_MILLIS;
                day_changed || window_elapsed
            }
            _ => true,
        }
    }

    /// A cycle is ready to emit a Detection iff RSSI is fresh and the code is
    /// known and unexpired (spec §4.5 policy 4).
    pub fn ready_to_emit(&self, now_millis: i64) -> bool {
        self.last_rssi.is_some() && !self.is_code_expired(now_millis)
    }

    /// Invalidate the cached RSSI after emission, retaining the code until it
    /// expires (spec §4.5 policy 4).
    pub fn invalidate_rssi_after_emit(&mut self) {
        self.last_rssi = None;
    }
}

fn day_index(unix_millis: i64) -> i64 {
    unix_millis.div_euclid(86_400_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_without_code() {
        let peer = PeerState::new(PeerHandle("p1".into()));
        assert!(peer.is_code_expired(0));
    }

    #[test]
    fn test_not_expired_within_window() {
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        peer.record_code(BeaconCode(7), 1_000_000);
        assert!(!peer.is_code_expired(1_000_000 + 60_000));
    }

    /// Scenario S4 (spec §8): detection of code 7 at time T, then at
    /// T + 31 min the code must be considered expired.
    #[test]
    fn test_s4_code_expiry_after_31_minutes() {
        let t: i64 = 1_700_000_000_000;
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        peer.record_code(BeaconCode(7), t);
        let t_plus_31_min = t + 31 * 60 * 1000;
        assert!(peer.is_code_expired(t_plus_31_min));
    }

    #[test]
    fn test_expired_across_midnight_even_within_30_minutes() {
        // 2024-01-02T00:00:00Z in millis is a multiple of a day; cross it
        // with only a few minutes elapsed.
        let day_boundary: i64 = 86_400_000 * 2;
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        peer.record_code(BeaconCode(7), day_boundary - 60_000);
        assert!(peer.is_code_expired(day_boundary + 60_000));
    }

    #[test]
    fn test_ready_to_emit_requires_rssi_and_fresh_code() {
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        assert!(!peer.ready_to_emit(0));
        peer.record_code(BeaconCode(7), 0);
        assert!(!peer.ready_to_emit(0));
        peer.record_rssi(-55);
        assert!(peer.ready_to_emit(0));
    }

    #[test]
    fn test_record_code_preserves_rssi_read_earlier_in_cycle() {
        // First-contact order (spec §4.5): RssiRead then CharacteristicDiscovered.
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        peer.record_rssi(-55);
        peer.record_code(BeaconCode(7), 0);
        assert!(peer.ready_to_emit(0));
    }

    #[test]
    fn test_invalidate_rssi_after_emit_retains_code() {
        let mut peer = PeerState::new(PeerHandle("p1".into()));
        peer.record_code(BeaconCode(7), 0);
        peer.record_rssi(-55);
        peer.invalidate_rssi_after_emit();
        assert!(peer.last_rssi.is_none());
        assert!(peer.last_beacon_code.is_some());
    }
}
