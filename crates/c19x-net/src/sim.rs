//! In-memory `RadioAdapter` used by tests and local development. Models a
//! single physical radio shared by a transmitter and a receiver, with
//! scripted peer fixtures instead of a real BLE stack.

use crate::peer::PeerHandle;
use crate::radio::{RadioAdapter, RadioEvent};
use c19x_core::identifier::{CharacteristicId, ServiceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone, Debug)]
struct SimPeer {
    characteristic: CharacteristicId,
    rssi: i32,
    connected: bool,
    invalid: bool,
}

/// Deterministic, script-driven radio double. Test code calls
/// [`SimRadio::add_peer`]/[`SimRadio::power_on`]/etc. to set up fixtures,
/// then drives the `RadioAdapter` trait methods exactly as the real
/// transmitter/receiver would, and asserts on the resulting `RadioEvent`
/// stream.
#[derive(Clone)]
pub struct SimRadio {
    events: mpsc::Sender<RadioEvent>,
    powered_on: Arc<RwLock<bool>>,
    peers: Arc<RwLock<HashMap<PeerHandle, SimPeer>>>,
    advertised: Arc<RwLock<Option<ServiceId>>>,
}

impl SimRadio {
    pub fn new(events: mpsc::Sender<RadioEvent>) -> Self {
        Self {
            events,
            powered_on: Arc::new(RwLock::new(true)),
            peers: Arc::new(RwLock::new(HashMap::new())),
            advertised: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn power_on(&self) {
        *self.powered_on.write() = true;
        let _ = self.events.send(RadioEvent::PoweredOn).await;
    }

    pub async fn power_off(&self) {
        *self.powered_on.write() = false;
        let _ = self.events.send(RadioEvent::PoweredOff).await;
    }

    /// Register a peer fixture: it will be "discoverable", connect
    /// successfully, and report the given characteristic/RSSI.
    pub fn add_peer(&self, peer: PeerHandle, characteristic: CharacteristicId, rssi: i32) {
        self.peers.write().insert(
            peer,
            SimPeer { characteristic, rssi, connected: false, invalid: false },
        );
    }

    /// Mark a peer as permanently unreachable: the next connect attempt
    /// reports an invalid-peer failure (spec §7 InvalidPeer).
    pub fn mark_invalid(&self, peer: &PeerHandle) {
        if let Some(p) = self.peers.write().get_mut(peer) {
            p.invalid = true;
        }
    }

    /// Simulate a discovery callback for a registered peer.
    pub async fn discover(&self, peer: PeerHandle) {
        let _ = self.events.send(RadioEvent::Discovered { peer }).await;
    }

    /// Simulate an out-of-band 12-byte write arriving at our advertised
    /// characteristic (spec §4.4 `on_write`).
    pub async fn deliver_write(&self, payload: Vec<u8>) {
        let _ = self.events.send(RadioEvent::IncomingWrite { payload }).await;
    }

    pub fn advertised_service(&self) -> Option<ServiceId> {
        *self.advertised.read()
    }
}

impl RadioAdapter for SimRadio {
    async fn is_powered_on(&self) -> bool {
        *self.powered_on.read()
    }

    async fn register_service(&self, _service: ServiceId, _characteristic: CharacteristicId) {}

    async fn advertise(&self, service: ServiceId) {
        *self.advertised.write() = Some(service);
    }

    async fn stop_advertising(&self) {
        *self.advertised.write() = None;
    }

    async fn write_ack(&self, success: bool) {
        debug!(success, "sim radio: acked incoming write");
    }

    async fn start_scan(&self) {
        let already_connected: Vec<PeerHandle> = self
            .peers
            .read()
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(handle, _)| handle.clone())
            .collect();
        for peer in already_connected {
            let _ = self.events.send(RadioEvent::Discovered { peer }).await;
        }
    }

    async fn connected_peers(&self, _service: ServiceId) -> Vec<PeerHandle> {
        self.peers
            .read()
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    async fn connect(&self, peer: PeerHandle, _delay: Duration) {
        let mut peers = self.peers.write();
        match peers.get_mut(&peer) {
            Some(p) if p.invalid => {
                drop(peers);
                let _ = self
                    .events
                    .send(RadioEvent::ConnectFailed { peer, invalid: true })
                    .await;
            }
            Some(p) => {
                p.connected = true;
                drop(peers);
                let _ = self.events.send(RadioEvent::Connected { peer }).await;
            }
            None => {
                drop(peers);
                let _ = self
                    .events
                    .send(RadioEvent::ConnectFailed { peer, invalid: false })
                    .await;
            }
        }
    }

    async fn read_rssi(&self, peer: PeerHandle) {
        let rssi = self.peers.read().get(&peer).map(|p| p.rssi);
        match rssi {
            Some(rssi) => {
                let _ = self.events.send(RadioEvent::RssiRead { peer, rssi }).await;
            }
            None => {
                let _ = self
                    .events
                    .send(RadioEvent::ConnectFailed { peer, invalid: false })
                    .await;
            }
        }
    }

    async fn discover_characteristic(&self, peer: PeerHandle) {
        let characteristic = self.peers.read().get(&peer).map(|p| p.characteristic);
        match characteristic {
            Some(characteristic) => {
                let _ = self
                    .events
                    .send(RadioEvent::CharacteristicDiscovered { peer, characteristic })
                    .await;
            }
            None => {
                let _ = self.events.send(RadioEvent::ProtocolMismatch { peer }).await;
            }
        }
    }

    async fn write(&self, peer: PeerHandle, _payload: Vec<u8>) {
        let _ = self.events.send(RadioEvent::WriteAcked { peer }).await;
    }

    async fn disconnect(&self, peer: PeerHandle) {
        if let Some(p) = self.peers.write().get_mut(&peer) {
            p.connected = false;
        }
        let _ = self.events.send(RadioEvent::Disconnected { peer }).await;
    }
}
