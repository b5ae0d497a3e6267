//! C19X device-resident engine core.
//!
//! Owns the parts of the daemon that sit behind the wireless protocol layer
//! (`c19x-net`): persistent encounter storage, the infection lookup cache,
//! the risk analyser, settings, and the controller that drives the
//! rotation/retention timers and the daily sync hand-off.

pub mod controller;
pub mod encounter_log;
pub mod error;
pub mod lookup;
pub mod risk_analyser;
pub mod settings;
pub mod storage;

pub use controller::{Controller, SeedSync};
pub use encounter_log::EncounterLog;
pub use error::{Error, Result};
pub use lookup::{InfectionLookup, LookupCache};
pub use risk_analyser::{analyse, RiskAssessment};
pub use settings::Settings;
pub use storage::Storage;
