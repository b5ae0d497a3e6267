//! Thin controller: rotation/retention timers and the daily sync hand-off
//! (spec §4.8), modeled on `gossipd::server::Server`'s
//! `spawn_sync_task`/`spawn_prune_task` interval-task pattern.

use crate::encounter_log::EncounterLog;
use crate::lookup::{InfectionLookup, LookupCache};
use crate::risk_analyser::{self, RiskAssessment};
use crate::settings::Settings;
use c19x_net::peer::now_millis;
use c19x_net::Transmitter;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Boundary trait for the out-of-scope daily lookup download (spec §1:
/// "the registration/status HTTP client" and the seed download are external
/// collaborators). This repo owns only the trait and a test double.
#[allow(async_fn_in_trait)]
pub trait SeedSync: Send + Sync + 'static {
    async fn download_seed(&self) -> std::io::Result<Vec<u8>>;
}

/// Owns the rotation timer, retention timer, and daily sync hand-off;
/// forwards radio-directed work to the `Transmitter` over the single radio
/// queue and never touches it directly (spec §5).
pub struct Controller<S: SeedSync> {
    transmitter: Arc<Transmitter>,
    encounter_log: Arc<EncounterLog>,
    lookup_cache: Arc<LookupCache>,
    settings: Arc<Settings>,
    seed_sync: Arc<S>,
    lookup: Arc<RwLock<InfectionLookup>>,
    last_assessment: Arc<RwLock<Option<RiskAssessment>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: SeedSync> Controller<S> {
    pub fn new(
        transmitter: Arc<Transmitter>,
        encounter_log: Arc<EncounterLog>,
        lookup_cache: Arc<LookupCache>,
        settings: Arc<Settings>,
        seed_sync: S,
    ) -> Self {
        let lookup = lookup_cache.load();
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            transmitter,
            encounter_log,
            lookup_cache,
            settings,
            seed_sync: Arc::new(seed_sync),
            lookup: Arc::new(RwLock::new(lookup)),
            last_assessment: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn last_assessment(&self) -> Option<RiskAssessment> {
        *self.last_assessment.read()
    }

    /// Re-run the analyser against the current encounter snapshot and
    /// cached lookup. Pure except for the read of shared state (spec §4.7:
    /// "invoked after lookup download and after encounter log changes").
    pub fn refresh_risk_assessment(&self) -> RiskAssessment {
        let snapshot = self.encounter_log.snapshot();
        let lookup = self.lookup.read().clone();
        let assessment = risk_analyser::analyse(
            &snapshot,
            &lookup,
            self.settings.rssi_threshold(),
            self.settings.status(),
            self.settings.advice_default(),
        );
        *self.last_assessment.write() = Some(assessment);
        self.settings.set_last_contact_update(now_millis());
        self.settings.set_last_advice_update(now_millis());
        assessment
    }

    /// Rotation tick: `BEACON_ROTATION_INTERVAL` ± 2 minute jitter, drawn
    /// fresh every tick (spec §4.8), driving both beacon rotation and
    /// retention enforcement.
    pub fn spawn_rotation_task(&self) -> tokio::task::JoinHandle<()> {
        let transmitter = self.transmitter.clone();
        let encounter_log = self.encounter_log.clone();
        let settings = self.settings.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let jitter_secs: i64 = rand::thread_rng().gen_range(-120..=120);
                let base_secs = settings.rotation_interval().as_secs() as i64;
                let delay_secs = (base_secs + jitter_secs).max(1) as u64;

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {
                        if let Err(err) = transmitter.update_beacon_code().await {
                            warn!(?err, "controller: rotation tick failed, retrying next tick");
                        }

                        let cutoff = now_millis() - settings.retention_window().as_millis() as i64;
                        encounter_log.delete_before(cutoff);
                        debug!("controller: rotation tick complete");
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    /// Daily sync: download the current `InfectionLookup` and re-run the
    /// analyser on completion (spec §4.8).
    pub fn spawn_sync_task(&self, sync_interval: Duration) -> tokio::task::JoinHandle<()> {
        let seed_sync = self.seed_sync.clone();
        let lookup_cache = self.lookup_cache.clone();
        let lookup = self.lookup.clone();
        let encounter_log = self.encounter_log.clone();
        let settings = self.settings.clone();
        let last_assessment = self.last_assessment.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(sync_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match seed_sync.download_seed().await {
                            Ok(bytes) => match lookup_cache.replace_atomic(&bytes) {
                                Ok(fresh) => {
                                    *lookup.write() = fresh.clone();
                                    let snapshot = encounter_log.snapshot();
                                    let assessment = risk_analyser::analyse(
                                        &snapshot,
                                        &fresh,
                                        settings.rssi_threshold(),
                                        settings.status(),
                                        settings.advice_default(),
                                    );
                                    *last_assessment.write() = Some(assessment);
                                    info!(?assessment, "controller: daily sync complete");
                                }
                                Err(err) => warn!(?err, "controller: lookup corrupt, keeping previous cache"),
                            },
                            Err(err) => warn!(?err, "controller: seed download failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use c19x_net::radio::run_radio_queue;
    use c19x_net::sim::SimRadio;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    struct FixedSeedSync {
        bytes: Vec<u8>,
        calls: AtomicUsize,
    }

    impl SeedSync for FixedSeedSync {
        async fn download_seed(&self) -> std::io::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.bytes.clone())
        }
    }

    fn build_controller(
        dir: &std::path::Path,
        seed_sync: FixedSeedSync,
    ) -> Controller<FixedSeedSync> {
        let storage = Arc::new(Storage::open(dir).unwrap());
        let encounter_log = Arc::new(EncounterLog::open(storage.clone()).unwrap());
        let settings = Arc::new(Settings::open(storage));
        let lookup_cache = Arc::new(LookupCache::new(dir));

        let (radio_events_tx, _radio_events_rx) = mpsc::channel(8);
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let radio = SimRadio::new(radio_events_tx);
        tokio::spawn(run_radio_queue(radio, commands_rx));
        let (transmitter_events_tx, _transmitter_events_rx) = mpsc::channel(8);
        let schedule = Arc::new(RwLock::new(None));
        let transmitter = Arc::new(Transmitter::new(commands_tx, transmitter_events_tx, schedule));

        Controller::new(transmitter, encounter_log, lookup_cache, settings, seed_sync)
    }

    #[tokio::test]
    async fn test_sync_task_refreshes_assessment() {
        let dir = tempdir().unwrap();
        let seed_sync = FixedSeedSync { bytes: vec![0x80], calls: AtomicUsize::new(0) };
        let controller = build_controller(dir.path(), seed_sync);

        controller.encounter_log.append(now_millis(), c19x_core::types::BeaconCode(7), -55);

        let handle = controller.spawn_sync_task(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.shutdown();
        let _ = handle.await;

        let assessment = controller.last_assessment().expect("assessment recorded");
        assert_eq!(assessment.exposure_count, 1);
    }

    #[test]
    fn test_refresh_risk_assessment_synchronous() {
        let dir = tempdir().unwrap();
        let seed_sync = FixedSeedSync { bytes: vec![0x80], calls: AtomicUsize::new(0) };
        let controller = build_controller(dir.path(), seed_sync);
        controller.encounter_log.append(now_millis(), c19x_core::types::BeaconCode(8), -55);

        let assessment = controller.refresh_risk_assessment();
        assert_eq!(assessment.contact_count, 1);
        assert_eq!(assessment.exposure_count, 0);
    }
}
