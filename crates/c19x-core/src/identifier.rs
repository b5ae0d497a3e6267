//! Service/characteristic identifier codec (spec §4.3).
//!
//! The wireless layer exposes 128-bit service/characteristic identifiers,
//! each treated as the concatenation `(upper: 64, lower: 64)` in big-endian
//! order. The service identifier is a single fixed constant shared by every
//! peer; the characteristic identifier carries the upper 64 bits of the
//! service identifier followed by the current `BeaconCode`, zero-extended to
//! 64 bits. A receiver recovers the code from `lower64(characteristic_id)`
//! alone, with no explicit characteristic read.

use crate::types::BeaconCode;

/// 128-bit GATT service identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub [u8; 16]);

/// 128-bit GATT characteristic identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicId(pub [u8; 16]);

/// The fixed service identifier advertised by every peer:
/// `0022D481-83FE-1F13-0000-000000000000` (spec §8 Scenario S2).
pub const SERVICE_ID: ServiceId = ServiceId([
    0x00, 0x22, 0xd4, 0x81, 0x83, 0xfe, 0x1f, 0x13, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
]);

impl ServiceId {
    /// The upper 64 bits, as they appear in a characteristic identifier.
    pub fn upper64(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.0[..8]);
        out
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceId({})", self)
    }
}

impl std::fmt::Debug for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CharacteristicId({})", self)
    }
}

/// Encode a beacon code into the characteristic identifier advertised
/// alongside `service`: `upper = upper64(service)`, `lower = beacon_code`.
pub fn encode_characteristic_id(service: ServiceId, code: BeaconCode) -> CharacteristicId {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&service.upper64());
    bytes[8..].copy_from_slice(&code.0.to_be_bytes());
    CharacteristicId(bytes)
}

/// Recover the `BeaconCode` a receiver observes as `lower64(characteristic_id)`.
pub fn decode_beacon_code(id: &CharacteristicId) -> BeaconCode {
    let mut code_bytes = [0u8; 8];
    code_bytes.copy_from_slice(&id.0[8..]);
    BeaconCode(u64::from_be_bytes(code_bytes))
}

/// `true` if `id`'s upper 64 bits match `service`'s — used by the receiver
/// to reject a discovered characteristic whose shape doesn't match the
/// expected service (spec §7 ProtocolMismatch).
pub fn matches_service(service: ServiceId, id: &CharacteristicId) -> bool {
    id.0[..8] == service.upper64()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S2 (spec §8): Service = 0022D481-83FE-1F13-0000-000000000000,
    /// BeaconCode = 42; encode then decode must recover 42.
    #[test]
    fn test_s2_round_trip_identifier() {
        let code = BeaconCode(42);
        let id = encode_characteristic_id(SERVICE_ID, code);
        assert_eq!(decode_beacon_code(&id), code);
    }

    #[test]
    fn test_round_trip_all_zero_code() {
        let code = BeaconCode(0);
        let id = encode_characteristic_id(SERVICE_ID, code);
        assert_eq!(decode_beacon_code(&id), code);
    }

    #[test]
    fn test_round_trip_max_63_bit_code() {
        let code = BeaconCode((1u64 << 63) - 1);
        let id = encode_characteristic_id(SERVICE_ID, code);
        assert_eq!(decode_beacon_code(&id), code);
    }

    #[test]
    fn test_characteristic_carries_service_upper_bits() {
        let id = encode_characteristic_id(SERVICE_ID, BeaconCode(7));
        assert!(matches_service(SERVICE_ID, &id));
    }

    #[test]
    fn test_mismatched_service_detected() {
        let other = ServiceId([0xffu8; 16]);
        let id = encode_characteristic_id(SERVICE_ID, BeaconCode(7));
        assert!(!matches_service(other, &id));
    }
}
