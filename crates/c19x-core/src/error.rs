//! Error types for the key schedules and identifier codec.

use thiserror::Error;

/// Result type alias using our [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by `c19x-core` (spec §7, the schedule-fatal subset).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// `DayIndex` outside `[0, MAX_DAYS)`.
    #[error("day index {0} out of range")]
    OutOfRange(u32),

    /// No beacon code table could be produced for the current day.
    #[error("beacon schedule unavailable: {0}")]
    ScheduleUnavailable(String),
}
