use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the device-resident engine (spec §7, the storage/lookup
/// subset not already covered by `c19x_core::Error`/`c19x_net::Error`).
#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] crate::storage::StorageError),
    #[error("infection lookup corrupt: {0}")]
    LookupCorrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
