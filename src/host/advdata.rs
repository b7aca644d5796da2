//! Raw advertisement-data helpers for host glue.
//!
//! BLE advertising payloads are a sequence of length-prefixed AD
//! structures: `len | type | len-1 payload bytes`. Host stacks that hand
//! the raw payload to their scan callback can wrap it in
//! [`RawAdvertisement`] and pass it straight to the registry.

use crate::host::Advertisement;
use crate::types::{PeerAddress, Uuid};

// AD types we care about.
const AD_UUID16_INCOMPLETE: u8 = 0x02;
const AD_UUID16_COMPLETE: u8 = 0x03;
const AD_UUID128_INCOMPLETE: u8 = 0x06;
const AD_UUID128_COMPLETE: u8 = 0x07;
const AD_NAME_SHORTENED: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;

/// Iterator over the `(ad_type, payload)` structures of a raw
/// advertising payload. Stops at the first malformed entry (zero
/// length or a structure running past the end of the data).
pub struct AdStructures<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.index;
        if i >= self.data.len() {
            return None;
        }
        let len = self.data[i] as usize;
        if len == 0 || i + len >= self.data.len() {
            return None;
        }
        let ad_type = self.data[i + 1];
        let payload = &self.data[i + 2..i + 1 + len];
        self.index = i + 1 + len;
        Some((ad_type, payload))
    }
}

/// Check whether the advertised service lists contain `uuid`.
pub fn service_in_ad(data: &[u8], uuid: &Uuid) -> bool {
    for (ad_type, payload) in AdStructures::new(data) {
        match (ad_type, uuid) {
            (AD_UUID16_INCOMPLETE | AD_UUID16_COMPLETE, Uuid::Uuid16(val)) => {
                let le = val.to_le_bytes();
                if payload.chunks_exact(2).any(|c| c == le) {
                    return true;
                }
            }
            (AD_UUID128_INCOMPLETE | AD_UUID128_COMPLETE, Uuid::Uuid128(bytes)) => {
                if payload.chunks_exact(16).any(|c| c == &bytes[..]) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Extract the complete (preferred) or shortened local name.
pub fn local_name(data: &[u8]) -> Option<&str> {
    let mut shortened = None;
    for (ad_type, payload) in AdStructures::new(data) {
        match ad_type {
            AD_NAME_COMPLETE => return core::str::from_utf8(payload).ok(),
            AD_NAME_SHORTENED => shortened = core::str::from_utf8(payload).ok(),
            _ => {}
        }
    }
    shortened
}

/// [`Advertisement`] over a raw advertising payload, zero-copy.
pub struct RawAdvertisement<'a> {
    pub peer: PeerAddress,
    pub data: &'a [u8],
}

impl<'a> RawAdvertisement<'a> {
    pub fn new(peer: PeerAddress, data: &'a [u8]) -> Self {
        Self { peer, data }
    }
}

impl Advertisement for RawAdvertisement<'_> {
    fn peer(&self) -> PeerAddress {
        self.peer
    }

    fn local_name(&self) -> Option<&str> {
        local_name(self.data)
    }

    fn advertises_service(&self, uuid: &Uuid) -> bool {
        service_in_ad(self.data, uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const HID: Uuid = Uuid::Uuid16(0x1812);

    #[test]
    fn detect_service_uuid_in_advertisement() {
        // AD structure: len=3, type=0x03 (Complete 16-bit UUIDs), UUID=0x1812
        let ad_data = [0x03, 0x03, 0x12, 0x18];
        assert!(service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn no_matching_service_uuid() {
        // Battery Service UUID (0x180F) only
        let ad_data = [0x03, 0x03, 0x0F, 0x18];
        assert!(!service_in_ad(&ad_data, &HID));
        assert!(service_in_ad(&ad_data, &Uuid::Uuid16(0x180F)));
    }

    #[test]
    fn uuid_among_multiple() {
        // 0x180F (Battery), 0x1812 (HID), 0x1801 (GATT)
        let ad_data = [
            0x07, 0x03, // len=7, type=0x03
            0x0F, 0x18, // Battery
            0x12, 0x18, // HID
            0x01, 0x18, // GATT
        ];
        assert!(service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn incomplete_uuid_list_is_checked() {
        let ad_data = [0x03, 0x02, 0x12, 0x18];
        assert!(service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn uuid128_membership() {
        let uuid = Uuid::Uuid128([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, //
            0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        ]);
        let mut ad_data = [0u8; 18];
        ad_data[0] = 17; // len
        ad_data[1] = 0x07; // Complete 128-bit UUIDs
        for i in 0..16 {
            ad_data[2 + i] = i as u8;
        }
        assert!(service_in_ad(&ad_data, &uuid));
        assert!(!service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn empty_advertisement_data() {
        assert!(!service_in_ad(&[], &HID));
        assert_eq!(local_name(&[]), None);
    }

    #[test]
    fn malformed_ad_length_zero() {
        let ad_data = [0x00]; // len=0 stops the walk
        assert!(!service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn truncated_structure_is_ignored() {
        // Claims 5 payload bytes but only 2 follow.
        let ad_data = [0x05, 0x03, 0x12, 0x18];
        assert!(!service_in_ad(&ad_data, &HID));
    }

    #[test]
    fn extract_complete_local_name() {
        let ad_data = [
            0x09, 0x09, // len=9, type=0x09 (Complete Local Name)
            b'K', b'e', b'y', b'b', b'o', b'a', b'r', b'd',
        ];
        assert_eq!(local_name(&ad_data), Some("Keyboard"));
    }

    #[test]
    fn extract_shortened_local_name() {
        let ad_data = [
            0x05, 0x08, // len=5, type=0x08 (Shortened Local Name)
            b'P', b'a', b'd', b' ',
        ];
        assert_eq!(local_name(&ad_data), Some("Pad "));
    }

    #[test]
    fn complete_name_preferred_over_shortened() {
        let ad_data = [
            0x03, 0x08, b'P', b'a', // shortened "Pa"
            0x04, 0x09, b'P', b'a', b'd', // complete "Pad"
        ];
        assert_eq!(local_name(&ad_data), Some("Pad"));
    }

    #[test]
    fn no_name_in_advertisement() {
        // Flags only: LE General Discoverable
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(local_name(&ad_data), None);
    }

    #[test]
    fn raw_advertisement_wrapper() {
        let ad_data = [
            0x03, 0x03, 0x12, 0x18, // HID service
            0x04, 0x09, b'P', b'a', b'd', // name "Pad"
        ];
        let peer = PeerAddress::new(crate::types::AddressKind::Public, [1, 2, 3, 4, 5, 6]);
        let adv = RawAdvertisement::new(peer, &ad_data);
        assert_eq!(adv.peer(), peer);
        assert_eq!(adv.local_name(), Some("Pad"));
        assert!(adv.advertises_service(&HID));
        assert!(!adv.advertises_service(&Uuid::Uuid16(0x180F)));
    }
}
