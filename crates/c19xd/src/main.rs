//! c19xd - C19X decentralised proximity tracing daemon
//!
//! Composition root: wires the day/beacon code schedules (`c19x-core`), the
//! wireless protocol layer (`c19x-net`), and the device-resident engine
//! (`c19x-engine`) into one running process. No platform `RadioAdapter`
//! ships with this repository (spec.md §1 places the platform wireless
//! radio out of scope), so this binary runs against the in-memory `sim`
//! radio — useful for local operation and integration testing until a real
//! adapter is wired in.

mod config;

use c19x_core::beacon_code::BeaconCodeSchedule;
use c19x_core::day_code::DayCodeSchedule;
use c19x_engine::{Controller, EncounterLog, LookupCache, SeedSync, Settings, Storage};
use c19x_net::radio::run_radio_queue;
use c19x_net::sim::SimRadio;
use c19x_net::{Receiver, ReceiverConfig, ReceiverEvent, Transmitter, TransmitterEvent};
use clap::Parser;
use config::Config;
use parking_lot::RwLock;
use rand::RngCore;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Stand-in for the out-of-scope daily infection-lookup HTTP client
/// (spec.md §1). Always reports "nothing new" until a real client is wired
/// in; `c19x-engine::controller::SeedSync` is the extension point.
struct NoSeedSync;

impl SeedSync for NoSeedSync {
    async fn download_seed(&self) -> std::io::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn wall_clock_unix_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("c19xd=info".parse().unwrap()))
        .init();

    let config = Config::parse();
    if let Err(err) = config.validate() {
        error!("invalid configuration: {}", err);
        return ExitCode::FAILURE;
    }

    info!("c19xd v{} - C19X proximity engine daemon", env!("CARGO_PKG_VERSION"));

    let storage = match Storage::open(&config.data_dir) {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            error!("failed to open storage: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let shared_secret = load_or_create_shared_secret(&storage);
    let serial_number = load_or_create_serial_number(&storage);
    info!(serial_number = %serial_number, "device identity loaded");
    let day_schedule = DayCodeSchedule::derive(&shared_secret);
    let today = match day_schedule.today(wall_clock_unix_secs()) {
        Ok(today) => today,
        Err(err) => {
            error!("day schedule unavailable: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let day_code = match day_schedule.day_code(today) {
        Ok(code) => code,
        Err(err) => {
            error!("no day code for today: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let beacon_schedule = Arc::new(RwLock::new(Some(BeaconCodeSchedule::new(today, day_code))));

    let settings = Arc::new(Settings::open(storage.clone()));
    settings.set_retention_days(config.retention_days);
    settings.set_rotation_interval_minutes(config.rotation_interval_minutes);
    settings.set_rssi_threshold(config.rssi_threshold);

    let encounter_log = match EncounterLog::open(storage.clone()) {
        Ok(log) => Arc::new(log),
        Err(err) => {
            error!("failed to open encounter log: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let lookup_cache = Arc::new(LookupCache::new(&config.data_dir));

    // Single radio work queue (spec.md §5): one consumer task draining the
    // command channel against one owned `SimRadio` instance.
    let (radio_events_tx, radio_events_rx) = mpsc::channel(256);
    let (commands_tx, commands_rx) = mpsc::channel(256);
    let radio = SimRadio::new(radio_events_tx);
    tokio::spawn(run_radio_queue(radio.clone(), commands_rx));

    // Radio callbacks are single-consumer (`mpsc`); fan them out to both the
    // transmitter and receiver halves of the protocol.
    let (transmitter_radio_tx, transmitter_radio_rx) = mpsc::channel(256);
    let (receiver_radio_tx, receiver_radio_rx) = mpsc::channel(256);
    tokio::spawn(fan_out_radio_events(radio_events_rx, transmitter_radio_tx, receiver_radio_tx));

    let (transmitter_events_tx, mut transmitter_events_rx) = mpsc::channel(256);
    let transmitter =
        Arc::new(Transmitter::new(commands_tx.clone(), transmitter_events_tx, beacon_schedule));
    tokio::spawn(transmitter.clone().run(transmitter_radio_rx));

    let (receiver_events_tx, mut receiver_events_rx) = mpsc::channel(256);
    let receiver = Arc::new(Receiver::new(commands_tx, receiver_events_tx, ReceiverConfig::default()));
    tokio::spawn(receiver.clone().run(receiver_radio_rx));

    {
        let encounter_log = encounter_log.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            while let Some(event) = transmitter_events_rx.recv().await {
                if let TransmitterEvent::Detection { beacon_code, rssi } = event {
                    let now = wall_clock_unix_secs() * 1000;
                    encounter_log.append(now, beacon_code, rssi);
                    settings.set_last_contact_update(now);
                }
            }
        });
    }
    {
        let encounter_log = encounter_log.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            while let Some(ReceiverEvent::Detection { beacon_code, rssi }) = receiver_events_rx.recv().await {
                let now = wall_clock_unix_secs() * 1000;
                encounter_log.append(now, beacon_code, rssi);
                settings.set_last_contact_update(now);
            }
        });
    }

    radio.power_on().await;
    receiver.start_scan().await;

    let controller =
        Controller::new(transmitter, encounter_log, lookup_cache, settings, NoSeedSync);
    let rotation_handle = controller.spawn_rotation_task();
    let sync_handle = controller.spawn_sync_task(Duration::from_secs(config.sync_interval_secs));

    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal");

    controller.shutdown();
    rotation_handle.abort();
    sync_handle.abort();

    if let Err(err) = storage.flush() {
        error!("failed to flush storage: {}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Duplicate each radio event onto both the transmitter's and receiver's
/// input channels, since `mpsc::Receiver` is single-consumer but the sim
/// radio only has one event sink (spec.md §5: both halves observe the same
/// radio callback stream).
async fn fan_out_radio_events(
    mut events: mpsc::Receiver<c19x_net::RadioEvent>,
    transmitter_tx: mpsc::Sender<c19x_net::RadioEvent>,
    receiver_tx: mpsc::Sender<c19x_net::RadioEvent>,
) {
    while let Some(event) = events.recv().await {
        let _ = transmitter_tx.send(event.clone()).await;
        let _ = receiver_tx.send(event).await;
    }
}

/// Load the persisted shared secret, or mint a fresh 32-byte one on first
/// run (spec.md §3: "created at registration"; the registration HTTP client
/// itself is out of scope, so this stands in for it locally).
fn load_or_create_shared_secret(storage: &Storage) -> Vec<u8> {
    if let Ok(Some(secret)) = storage.get_secret("sharedSecret") {
        return secret;
    }
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    if let Err(err) = storage.put_secret("sharedSecret", &secret) {
        error!("failed to persist shared secret: {}", err);
    }
    secret
}

/// Load the persisted device serial number, or mint a fresh one on first run
/// (spec.md §6: "secure-store, keys \"serialNumber\" and \"sharedSecret\"").
/// Issued by the out-of-scope registration server in a full deployment; this
/// stands in for it locally the same way `load_or_create_shared_secret` does.
fn load_or_create_serial_number(storage: &Storage) -> String {
    if let Ok(Some(bytes)) = storage.get_secret("serialNumber") {
        if let Ok(serial) = String::from_utf8(bytes) {
            return serial;
        }
    }
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    let serial = hex::encode(raw);
    if let Err(err) = storage.put_secret("serialNumber", serial.as_bytes()) {
        error!("failed to persist serial number: {}", err);
    }
    serial
}
