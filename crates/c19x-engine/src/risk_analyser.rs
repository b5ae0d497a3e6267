//! Pure risk analysis over an encounter snapshot and an infection lookup
//! (spec §4.7). Takes data in, returns a verdict — no I/O, no locking,
//! invoked after a lookup download and after encounter log changes.

use crate::lookup::InfectionLookup;
use c19x_core::types::{AdviceState, ContactStatus, Encounter, UserStatus};

/// Output of one analysis pass (spec §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiskAssessment {
    pub contact_count: usize,
    pub exposure_count: usize,
    pub contact_status: ContactStatus,
    pub advice: AdviceState,
}

/// Compute a `RiskAssessment` from an encounter snapshot and the current
/// infection lookup. The lookup is a compressed membership oracle: the
/// server never learns which encounters the device examined (spec §4.7).
pub fn analyse(
    snapshot: &[Encounter],
    lookup: &InfectionLookup,
    rssi_threshold: Option<i32>,
    user_status: UserStatus,
    government_default: AdviceState,
) -> RiskAssessment {
    let contact_count = snapshot.len();

    let exposure_count = snapshot
        .iter()
        .filter(|e| rssi_threshold.map_or(true, |threshold| e.rssi > threshold))
        .filter(|e| {
            let idx = e.beacon_code.lookup_index(lookup.len_bytes());
            lookup.is_set(idx)
        })
        .count();

    let contact_status = if exposure_count == 0 { ContactStatus::Ok } else { ContactStatus::Infectious };

    let advice = if user_status != UserStatus::Normal {
        AdviceState::SelfIsolate
    } else if exposure_count > 0 {
        AdviceState::SelfIsolate
    } else {
        government_default
    };

    RiskAssessment { contact_count, exposure_count, contact_status, advice }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c19x_core::types::BeaconCode;

    /// Scenario S6 (spec §8).
    #[test]
    fn test_s6_risk_analyser() {
        let snapshot = vec![
            Encounter { timestamp: 1_700_000_000_000, beacon_code: BeaconCode(7), rssi: -55 },
            Encounter { timestamp: 1_700_000_000_000, beacon_code: BeaconCode(8), rssi: -55 },
        ];
        let lookup = InfectionLookup::from_bytes(vec![0x80]).unwrap();

        let result = analyse(&snapshot, &lookup, None, UserStatus::Normal, AdviceState::Stay);

        assert_eq!(result.contact_count, 2);
        assert_eq!(result.exposure_count, 1);
        assert_eq!(result.contact_status, ContactStatus::Infectious);
        assert_eq!(result.advice, AdviceState::SelfIsolate);
    }

    #[test]
    fn test_no_exposure_uses_government_default() {
        let snapshot = vec![Encounter { timestamp: 0, beacon_code: BeaconCode(1), rssi: -55 }];
        let lookup = InfectionLookup::from_bytes(vec![0x00]).unwrap();

        let result = analyse(&snapshot, &lookup, None, UserStatus::Normal, AdviceState::Stay);
        assert_eq!(result.exposure_count, 0);
        assert_eq!(result.contact_status, ContactStatus::Ok);
        assert_eq!(result.advice, AdviceState::Stay);
    }

    #[test]
    fn test_non_normal_status_forces_self_isolate_even_without_exposure() {
        let snapshot: Vec<Encounter> = vec![];
        let lookup = InfectionLookup::empty();

        let result = analyse(&snapshot, &lookup, None, UserStatus::Symptomatic, AdviceState::Stay);
        assert_eq!(result.advice, AdviceState::SelfIsolate);
    }

    #[test]
    fn test_weak_signal_filtered_by_rssi_threshold() {
        let snapshot = vec![Encounter { timestamp: 0, beacon_code: BeaconCode(7), rssi: -90 }];
        let lookup = InfectionLookup::from_bytes(vec![0x80]).unwrap();

        let result = analyse(&snapshot, &lookup, Some(-80), UserStatus::Normal, AdviceState::Stay);
        assert_eq!(result.exposure_count, 0);
    }

    #[test]
    fn test_purity_independent_of_snapshot_order() {
        let a = Encounter { timestamp: 0, beacon_code: BeaconCode(7), rssi: -55 };
        let b = Encounter { timestamp: 1, beacon_code: BeaconCode(8), rssi: -55 };
        let lookup = InfectionLookup::from_bytes(vec![0x80]).unwrap();

        let forward = analyse(&[a, b], &lookup, None, UserStatus::Normal, AdviceState::Stay);
        let reversed = analyse(&[b, a], &lookup, None, UserStatus::Normal, AdviceState::Stay);

        assert_eq!(forward.contact_count, reversed.contact_count);
        assert_eq!(forward.exposure_count, reversed.exposure_count);
    }
}
