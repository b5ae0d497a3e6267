//! Daemon configuration for `c19xd`.

use clap::Parser;
use std::path::PathBuf;

/// c19xd - C19X proximity engine daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "c19xd")]
#[command(about = "C19X decentralised proximity tracing daemon")]
pub struct Config {
    /// Data directory for persistent storage (encounter log, settings, secrets)
    #[arg(short, long, default_value = "./data/c19x", env = "C19X_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Beacon rotation interval in minutes
    #[arg(long, default_value = "30")]
    pub rotation_interval_minutes: u32,

    /// Encounter retention window in days
    #[arg(long, default_value = "14")]
    pub retention_days: u32,

    /// RSSI threshold (dBm); encounters at or below this are ignored by the analyser
    #[arg(long)]
    pub rssi_threshold: Option<i32>,

    /// Daily infection lookup sync interval in seconds
    #[arg(long, default_value = "86400")]
    pub sync_interval_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be greater than zero");
        }
        if self.rotation_interval_minutes == 0 {
            anyhow::bail!("rotation_interval_minutes must be greater than zero");
        }
        Ok(())
    }
}
