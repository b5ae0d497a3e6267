//! Error types for the wireless proximity protocol layer (spec §7).

use crate::peer::PeerHandle;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Radio adapter not powered on. Policy: defer the operation; resume on
    /// the power-on callback.
    #[error("radio is not powered on")]
    RadioOff,

    /// No beacon code table could be produced for the current day.
    /// Policy: log; do not rotate; do not crash.
    #[error("beacon schedule unavailable: {0}")]
    ScheduleUnavailable(#[from] c19x_core::Error),

    /// Discovered service/characteristic does not match the expected shape.
    /// Policy: disconnect the peer; keep scanning.
    #[error("protocol mismatch from peer {0}")]
    ProtocolMismatch(PeerHandle),

    /// No response within the per-peer timeout. Policy: disconnect;
    /// reconnect on next cycle.
    #[error("peer {0} timed out")]
    PeerTimeout(PeerHandle),

    /// Platform indicates a peer is permanently unreachable. Policy: drop
    /// the `PeerState`.
    #[error("peer {0} is permanently unreachable")]
    InvalidPeer(PeerHandle),
}
