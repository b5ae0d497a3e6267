//! The abstracted platform wireless radio capability (spec §1: "the
//! platform wireless radio (treated as a capability providing {advertise,
//! scan, connect, discoverServices, discoverCharacteristics, readRSSI,
//! writeValue})") plus the single radio work queue that serialises every
//! command issued against it (spec §5).
//!
//! Real platform adapters (CoreBluetooth, BluetoothGatt, ...) deliver their
//! results as delegate callbacks on their own schedule, arbitrarily after
//! the call that triggered them and possibly across a host-process
//! suspension (spec §5 "Suspension and ordering"). `RadioAdapter` mirrors
//! that: command methods return as soon as the platform has accepted the
//! request, and results arrive later as `RadioEvent`s on a shared channel.

use crate::peer::PeerHandle;
use c19x_core::identifier::{CharacteristicId, ServiceId};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Commands issued against the radio. Every command is funneled through a
/// single `mpsc::Sender<RadioCommand>` so they execute FIFO, one at a time
/// (spec §5: "all radio-directed commands ... must be serialised on a
/// single radio work queue").
#[derive(Debug, Clone)]
pub enum RadioCommand {
    RegisterService {
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    Advertise {
        service: ServiceId,
    },
    StopAdvertising,
    StartScan,
    Connect {
        peer: PeerHandle,
        delay: Duration,
    },
    ReadRssi {
        peer: PeerHandle,
    },
    DiscoverCharacteristic {
        peer: PeerHandle,
    },
    Write {
        peer: PeerHandle,
        payload: Vec<u8>,
    },
    Disconnect {
        peer: PeerHandle,
    },
    /// Respond to an `IncomingWrite` on our advertised characteristic:
    /// `success = false` reports an invalid-length write back to the writer
    /// (spec §4.4 `on_write`); any other well-formed length is accepted and
    /// ignored.
    WriteAck {
        success: bool,
    },
}

/// Events delivered back from the radio, in any order and at any later
/// time, including an `IncomingWrite` from a receive-only peer writing to
/// our advertised characteristic (spec §4.4 `on_write`).
#[derive(Debug, Clone)]
pub enum RadioEvent {
    PoweredOn,
    PoweredOff,
    Discovered { peer: PeerHandle },
    Connected { peer: PeerHandle },
    ConnectFailed { peer: PeerHandle, invalid: bool },
    RssiRead { peer: PeerHandle, rssi: i32 },
    CharacteristicDiscovered {
        peer: PeerHandle,
        characteristic: CharacteristicId,
    },
    ProtocolMismatch { peer: PeerHandle },
    WriteAcked { peer: PeerHandle },
    WriteFailed { peer: PeerHandle },
    Disconnected { peer: PeerHandle },
    IncomingWrite { payload: Vec<u8> },
}

/// A platform wireless radio. Methods issue a request and return once the
/// platform has accepted it; the outcome arrives later as a `RadioEvent`
/// pushed onto the channel the adapter was constructed with.
#[allow(async_fn_in_trait)]
pub trait RadioAdapter: Send + Sync + 'static {
    async fn is_powered_on(&self) -> bool;
    async fn register_service(&self, service: ServiceId, characteristic: CharacteristicId);
    async fn advertise(&self, service: ServiceId);
    async fn stop_advertising(&self);
    async fn write_ack(&self, success: bool);

    async fn start_scan(&self);
    async fn connected_peers(&self, service: ServiceId) -> Vec<PeerHandle>;
    async fn connect(&self, peer: PeerHandle, delay: Duration);
    async fn read_rssi(&self, peer: PeerHandle);
    async fn discover_characteristic(&self, peer: PeerHandle);
    async fn write(&self, peer: PeerHandle, payload: Vec<u8>);
    async fn disconnect(&self, peer: PeerHandle);
}

/// Drain `commands` against `adapter`, one at a time, forever. This is the
/// radio work queue's single consumer task, modeled on
/// `terrain-gossip-net::transport::Transport::run`'s single-owning-task
/// shape: one task exclusively owns the radio resource.
pub async fn run_radio_queue<R: RadioAdapter>(
    adapter: R,
    mut commands: mpsc::Receiver<RadioCommand>,
) {
    while let Some(command) = commands.recv().await {
        debug!(?command, "radio queue: executing command");
        match command {
            RadioCommand::RegisterService { service, characteristic } => {
                adapter.register_service(service, characteristic).await
            }
            RadioCommand::Advertise { service } => adapter.advertise(service).await,
            RadioCommand::StopAdvertising => adapter.stop_advertising().await,
            RadioCommand::StartScan => adapter.start_scan().await,
            RadioCommand::Connect { peer, delay } => adapter.connect(peer, delay).await,
            RadioCommand::ReadRssi { peer } => adapter.read_rssi(peer).await,
            RadioCommand::DiscoverCharacteristic { peer } => {
                adapter.discover_characteristic(peer).await
            }
            RadioCommand::Write { peer, payload } => adapter.write(peer, payload).await,
            RadioCommand::Disconnect { peer } => adapter.disconnect(peer).await,
            RadioCommand::WriteAck { success } => adapter.write_ack(success).await,
        }
    }
    warn!("radio queue: command channel closed, queue task exiting");
}
