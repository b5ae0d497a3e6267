//! Transmitter: publishes the current `BeaconCode` and answers writes from
//! receive-only peers (spec §4.4).

use crate::error::{Error, Result};
use crate::radio::{RadioCommand, RadioEvent};
use c19x_core::beacon_code::BeaconCodeSchedule;
use c19x_core::identifier::{encode_characteristic_id, SERVICE_ID};
use c19x_core::types::BeaconCode;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events the transmitter emits to its subscriber.
#[derive(Debug, Clone)]
pub enum TransmitterEvent {
    /// A receive-only peer reported itself via a 12-byte write (spec §4.4:
    /// "this is how receive-only peers report themselves").
    Detection { beacon_code: BeaconCode, rssi: i32 },
    /// A rotation attempt failed; it will be retried on the next tick.
    RotationFailed,
}

/// Parse a 12-byte write payload: little-endian `{i64 beaconCode, i32 rssi}`
/// (spec §6 wire format).
fn parse_write_payload(payload: &[u8]) -> Option<(BeaconCode, i32)> {
    if payload.len() != 12 {
        return None;
    }
    let mut code_bytes = [0u8; 8];
    code_bytes.copy_from_slice(&payload[0..8]);
    let code = i64::from_le_bytes(code_bytes);

    let mut rssi_bytes = [0u8; 4];
    rssi_bytes.copy_from_slice(&payload[8..12]);
    let rssi = i32::from_le_bytes(rssi_bytes);

    Some((BeaconCode(code as u64), rssi))
}

pub struct Transmitter {
    commands: mpsc::Sender<RadioCommand>,
    events: mpsc::Sender<TransmitterEvent>,
    schedule: Arc<RwLock<Option<BeaconCodeSchedule>>>,
    powered_on: Arc<RwLock<bool>>,
}

impl Transmitter {
    pub fn new(
        commands: mpsc::Sender<RadioCommand>,
        events: mpsc::Sender<TransmitterEvent>,
        schedule: Arc<RwLock<Option<BeaconCodeSchedule>>>,
    ) -> Self {
        Self { commands, events, schedule, powered_on: Arc::new(RwLock::new(false)) }
    }

    /// Stop advertising, drop the service registration, register a fresh
    /// one carrying the current `BeaconCode`, and resume advertising — all
    /// as one atomic rotation (spec §4.4).
    pub async fn update_beacon_code(&self) -> Result<()> {
        if !*self.powered_on.read() {
            return Err(Error::RadioOff);
        }

        let code = {
            let guard = self.schedule.read();
            guard.as_ref().map(|s| s.current())
        };
        let Some(code) = code else {
            return Err(Error::ScheduleUnavailable(c19x_core::Error::ScheduleUnavailable(
                "no beacon code schedule for today".to_string(),
            )));
        };

        let characteristic = encode_characteristic_id(SERVICE_ID, code);

        let _ = self.commands.send(RadioCommand::StopAdvertising).await;
        let _ = self
            .commands
            .send(RadioCommand::RegisterService { service: SERVICE_ID, characteristic })
            .await;
        let _ = self.commands.send(RadioCommand::Advertise { service: SERVICE_ID }).await;

        debug!(beacon_code = code.0, "transmitter: rotated advertised code");
        Ok(())
    }

    /// Notification from the platform that the radio has been powered back
    /// on; re-advertise if so (spec §4.4).
    pub async fn on_radio_restored(&self) {
        if *self.powered_on.read() {
            if let Err(err) = self.update_beacon_code().await {
                warn!(?err, "transmitter: rotation after radio restore failed");
                let _ = self.events.send(TransmitterEvent::RotationFailed).await;
            }
        }
    }

    /// Handle an incoming write to our advertised characteristic (spec
    /// §4.4 `on_write`). A well-formed 12-byte payload reports a receive-only
    /// peer's detection of us; any other length is a liveness ping, accepted
    /// and ignored.
    pub async fn on_write(&self, payload: &[u8]) {
        match parse_write_payload(payload) {
            Some((beacon_code, rssi)) => {
                let _ = self.commands.send(RadioCommand::WriteAck { success: true }).await;
                let _ = self
                    .events
                    .send(TransmitterEvent::Detection { beacon_code, rssi })
                    .await;
            }
            None => {
                let _ = self.commands.send(RadioCommand::WriteAck { success: false }).await;
            }
        }
    }

    /// Drive the transmitter from the shared radio event stream: re-advertise
    /// on power-on/off transitions, and dispatch incoming writes.
    pub async fn run(self: Arc<Self>, mut radio_events: mpsc::Receiver<RadioEvent>) {
        while let Some(event) = radio_events.recv().await {
            match event {
                RadioEvent::PoweredOn => {
                    *self.powered_on.write() = true;
                    self.on_radio_restored().await;
                }
                RadioEvent::PoweredOff => {
                    *self.powered_on.write() = false;
                }
                RadioEvent::IncomingWrite { payload } => {
                    self.on_write(&payload).await;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write_payload_valid() {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&7i64.to_le_bytes());
        payload.extend_from_slice(&(-55i32).to_le_bytes());
        let (code, rssi) = parse_write_payload(&payload).unwrap();
        assert_eq!(code, BeaconCode(7));
        assert_eq!(rssi, -55);
    }

    #[test]
    fn test_parse_write_payload_wrong_length() {
        assert!(parse_write_payload(&[0u8; 11]).is_none());
        assert!(parse_write_payload(&[0u8; 13]).is_none());
    }

    #[tokio::test]
    async fn test_update_beacon_code_fails_when_radio_off() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let (evt_tx, _evt_rx) = mpsc::channel(8);
        let schedule = Arc::new(RwLock::new(None));
        let transmitter = Transmitter::new(cmd_tx, evt_tx, schedule);
        let result = transmitter.update_beacon_code().await;
        assert!(matches!(result, Err(Error::RadioOff)));
    }

    #[tokio::test]
    async fn test_on_write_emits_detection_for_valid_payload() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (evt_tx, mut evt_rx) = mpsc::channel(8);
        let schedule = Arc::new(RwLock::new(None));
        let transmitter = Transmitter::new(cmd_tx, evt_tx, schedule);

        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&7i64.to_le_bytes());
        payload.extend_from_slice(&(-55i32).to_le_bytes());
        transmitter.on_write(&payload).await;

        match cmd_rx.recv().await.unwrap() {
            RadioCommand::WriteAck { success } => assert!(success),
            other => panic!("unexpected command: {other:?}"),
        }
        match evt_rx.recv().await.unwrap() {
            TransmitterEvent::Detection { beacon_code, rssi } => {
                assert_eq!(beacon_code, BeaconCode(7));
                assert_eq!(rssi, -55);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_on_write_rejects_invalid_length() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (evt_tx, _evt_rx) = mpsc::channel(8);
        let schedule = Arc::new(RwLock::new(None));
        let transmitter = Transmitter::new(cmd_tx, evt_tx, schedule);

        transmitter.on_write(&[0u8; 5]).await;
        match cmd_rx.recv().await.unwrap() {
            RadioCommand::WriteAck { success } => assert!(!success),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
