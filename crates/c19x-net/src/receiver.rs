//! Receiver: discovers peers advertising the Service identifier, reads
//! signal strength, extracts their BeaconCode, and emits Detection events
//! (spec §4.5).

use crate::peer::{now_millis, ConnState, PeerHandle, PeerState};
use crate::radio::{RadioCommand, RadioEvent};
use c19x_core::identifier::{decode_beacon_code, matches_service, CharacteristicId, SERVICE_ID};
use c19x_core::types::BeaconCode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events the receiver emits to its subscriber.
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    Detection { beacon_code: BeaconCode, rssi: i32 },
}

/// Tunable policy knobs (spec §4.5 policy 1, §7).
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    /// Lower bound on the delay before issuing a connect request, 4-60s.
    pub connection_delay: Duration,
    /// Scan-shift re-scan delay after any discovery callback (spec §4.5
    /// policy 2), fixed at 8s.
    pub scan_shift_delay: Duration,
    /// Per-peer operation timeout (connect / RSSI read), fixed at 8s.
    pub peer_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            connection_delay: Duration::from_secs(4),
            scan_shift_delay: Duration::from_secs(8),
            peer_timeout: Duration::from_secs(8),
        }
    }
}

pub struct Receiver {
    commands: mpsc::Sender<RadioCommand>,
    events: mpsc::Sender<ReceiverEvent>,
    peers: Arc<RwLock<HashMap<PeerHandle, PeerState>>>,
    config: ReceiverConfig,
    scan_shift_generation: Arc<AtomicU64>,
}

impl Receiver {
    pub fn new(
        commands: mpsc::Sender<RadioCommand>,
        events: mpsc::Sender<ReceiverEvent>,
        config: ReceiverConfig,
    ) -> Self {
        Self {
            commands,
            events,
            peers: Arc::new(RwLock::new(HashMap::new())),
            config,
            scan_shift_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Begin continuous discovery; idempotent (spec §4.5).
    pub async fn start_scan(&self) {
        let _ = self.commands.send(RadioCommand::StartScan).await;
    }

    /// Re-issue a connection request for peers not connected, or a fresh
    /// RSSI read for peers that are (spec §4.5).
    pub async fn reconnect(&self) {
        let snapshot: Vec<(PeerHandle, ConnState)> = self
            .peers
            .read()
            .iter()
            .map(|(h, p)| (h.clone(), p.conn_state))
            .collect();

        for (handle, state) in snapshot {
            match state {
                ConnState::Idle | ConnState::New => {
                    self.begin_connect(handle).await;
                }
                ConnState::ReadingRssi | ConnState::Detected => {
                    let _ = self
                        .commands
                        .send(RadioCommand::ReadRssi { peer: handle })
                        .await;
                }
                _ => {}
            }
        }
    }

    async fn begin_connect(&self, peer: PeerHandle) {
        {
            let mut peers = self.peers.write();
            let state = peers.entry(peer.clone()).or_insert_with(|| PeerState::new(peer.clone()));
            state.transition(ConnState::ConnectPending);
        }
        let _ = self
            .commands
            .send(RadioCommand::Connect { peer, delay: self.config.connection_delay })
            .await;
    }

    /// Schedule a single-shot re-scan 8s from now, cancelling any previously
    /// scheduled shift (spec §4.5 policy 2).
    fn schedule_scan_shift(&self) {
        let generation = self.scan_shift_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let counter = self.scan_shift_generation.clone();
        let commands = self.commands.clone();
        let delay = self.config.scan_shift_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if counter.load(Ordering::SeqCst) == generation {
                let _ = commands.send(RadioCommand::StartScan).await;
            }
        });
    }

    async fn prune_invalid(&self, peer: &PeerHandle) {
        self.peers.write().remove(peer);
        debug!(%peer, "receiver: pruned invalid peer");
    }

    async fn disconnect_and_idle(&self, peer: &PeerHandle) {
        let _ = self.commands.send(RadioCommand::Disconnect { peer: peer.clone() }).await;
        if let Some(state) = self.peers.write().get_mut(peer) {
            state.transition(ConnState::Idle);
        }
    }

    /// Try to emit a Detection for `peer` if it has both a fresh RSSI and an
    /// unexpired code (spec §4.5 policy 4); on emission, invalidate the
    /// cached RSSI, issue the trigger write, and disconnect.
    async fn maybe_emit(&self, peer: &PeerHandle) {
        let now = now_millis();
        let emission = {
            let mut peers = self.peers.write();
            let Some(state) = peers.get_mut(peer) else { return };
            if !state.ready_to_emit(now) {
                return;
            }
            let beacon_code = state.last_beacon_code.unwrap();
            let rssi = state.last_rssi.unwrap();
            state.invalidate_rssi_after_emit();
            state.transition(ConnState::Detected);
            (beacon_code, rssi)
        };

        let (beacon_code, rssi) = emission;
        let _ = self.events.send(ReceiverEvent::Detection { beacon_code, rssi }).await;

        // Trigger write: a zero-length write wakes the peer's transmitter
        // (spec §4.5 policy 5), then we disconnect.
        let _ = self
            .commands
            .send(RadioCommand::Write { peer: peer.clone(), payload: Vec::new() })
            .await;
        self.disconnect_and_idle(peer).await;
    }

    /// Handle one radio event, driving the per-peer state machine.
    async fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered { peer } => {
                let is_new = { !self.peers.read().contains_key(&peer) };
                if is_new {
                    self.peers.write().insert(peer.clone(), PeerState::new(peer.clone()));
                }
                self.schedule_scan_shift();
                self.begin_connect(peer).await;
            }
            RadioEvent::Connected { peer } => {
                if let Some(state) = self.peers.write().get_mut(&peer) {
                    state.transition(ConnState::ReadingRssi);
                }
                let _ = self.commands.send(RadioCommand::ReadRssi { peer }).await;
            }
            RadioEvent::ConnectFailed { peer, invalid } => {
                if invalid {
                    self.prune_invalid(&peer).await;
                } else {
                    if let Some(state) = self.peers.write().get_mut(&peer) {
                        state.transition(ConnState::Idle);
                    }
                    warn!(%peer, "receiver: connect failed, will reconnect");
                }
            }
            RadioEvent::RssiRead { peer, rssi } => {
                let needs_characteristic = {
                    let mut peers = self.peers.write();
                    let Some(state) = peers.get_mut(&peer) else { return };
                    state.record_rssi(rssi);
                    state.is_code_expired(now_millis())
                };
                if needs_characteristic {
                    if let Some(state) = self.peers.write().get_mut(&peer) {
                        state.transition(ConnState::DiscoveringCharacteristic);
                    }
                    let _ = self
                        .commands
                        .send(RadioCommand::DiscoverCharacteristic { peer: peer.clone() })
                        .await;
                } else {
                    self.maybe_emit(&peer).await;
                }
            }
            RadioEvent::CharacteristicDiscovered { peer, characteristic } => {
                self.handle_characteristic(peer, characteristic).await;
            }
            RadioEvent::ProtocolMismatch { peer } => {
                warn!(%peer, "receiver: protocol mismatch, disconnecting");
                self.disconnect_and_idle(&peer).await;
            }
            RadioEvent::Disconnected { peer } => {
                if let Some(state) = self.peers.write().get_mut(&peer) {
                    state.transition(ConnState::Idle);
                }
            }
            RadioEvent::PoweredOn => {
                self.start_scan().await;
            }
            RadioEvent::PoweredOff => {
                // Fail-closed: in-flight connections are treated as lost;
                // PeerState is retained (spec §4.5).
                let handles: Vec<PeerHandle> = self.peers.read().keys().cloned().collect();
                for handle in handles {
                    if let Some(state) = self.peers.write().get_mut(&handle) {
                        state.transition(ConnState::Idle);
                    }
                }
            }
            RadioEvent::WriteAcked { .. } | RadioEvent::WriteFailed { .. } => {}
            RadioEvent::IncomingWrite { .. } => {}
        }
    }

    async fn handle_characteristic(&self, peer: PeerHandle, characteristic: CharacteristicId) {
        if !matches_service(SERVICE_ID, &characteristic) {
            warn!(%peer, "receiver: characteristic does not match expected service");
            self.disconnect_and_idle(&peer).await;
            return;
        }
        let code = decode_beacon_code(&characteristic);
        {
            let mut peers = self.peers.write();
            if let Some(state) = peers.get_mut(&peer) {
                state.record_code(code, now_millis());
            }
        }
        self.maybe_emit(&peer).await;
    }

    /// Check all peers for an expired per-operation timeout and disconnect
    /// them (spec §4.5/§7 PeerTimeout). Intended to be called periodically.
    pub async fn sweep_timeouts(&self) {
        let now = now_millis();
        let timed_out: Vec<PeerHandle> = self
            .peers
            .read()
            .iter()
            .filter(|(_, state)| {
                state.is_timed_out(self.config.peer_timeout.as_millis() as i64, now)
            })
            .map(|(handle, _)| handle.clone())
            .collect();

        for peer in timed_out {
            warn!(%peer, "receiver: peer timed out");
            self.disconnect_and_idle(&peer).await;
        }
    }

    /// Drive the receiver from the shared radio event stream, with a
    /// periodic timeout sweep alongside it.
    pub async fn run(self: Arc<Self>, mut radio_events: mpsc::Receiver<RadioEvent>) {
        let mut sweep = tokio::time::interval(self.config.peer_timeout);
        loop {
            tokio::select! {
                event = radio_events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_timeouts().await;
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn peer_state(&self, peer: &PeerHandle) -> Option<PeerState> {
        self.peers.read().get(peer).cloned()
    }
}
