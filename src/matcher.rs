//! Controller descriptions and advertisement matching.
//!
//! A [`ControllerDescription`] is pure data: an optional advertised name
//! plus up to three channel specs, each naming a GATT locator and a
//! codec function. Per-model behavior lives in the codecs, not in
//! subclasses - every controller type shares the same lifecycle code.
//!
//! The matcher computes, per advertisement, a bitmask of which
//! registered descriptions match, and caches it by peer address. The
//! mask lets the registry defer description selection until the link is
//! bonded, picking in reverse registration order so application-added
//! models outrank the built-in defaults registered at init.

use heapless::Vec;

use crate::config::{MATCH_CACHE_SIZE, MAX_DESCRIPTIONS};
use crate::error::Error;
use crate::host::Advertisement;
use crate::signal::{DecodeFn, EncodeFn};
use crate::types::{BatteryLevel, ControlsState, PeerAddress, Uuid, VibrationCommand};

/// GATT locator of one signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSpec {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// Inbound controls channel: locator plus report decoder.
#[derive(Clone, Copy)]
pub struct ControlsChannel {
    pub channel: ChannelSpec,
    pub decode: DecodeFn<ControlsState>,
}

/// Inbound battery channel: locator plus level decoder.
#[derive(Clone, Copy)]
pub struct BatteryChannel {
    pub channel: ChannelSpec,
    pub decode: DecodeFn<BatteryLevel>,
}

/// Outbound vibration channel: locator plus command encoder.
#[derive(Clone, Copy)]
pub struct VibrationChannel {
    pub channel: ChannelSpec,
    pub encode: EncodeFn<VibrationCommand>,
}

/// Static description of one controller model.
pub struct ControllerDescription {
    /// Advertised complete local name, matched exactly when present.
    pub name: Option<&'static str>,
    pub controls: Option<ControlsChannel>,
    pub battery: Option<BatteryChannel>,
    pub vibration: Option<VibrationChannel>,
    /// Switch the peripheral to HID Report Protocol after bonding.
    pub hid_setup: bool,
}

impl ControllerDescription {
    /// At least one channel must be enabled for a description to be
    /// registrable.
    pub const fn has_enabled_channel(&self) -> bool {
        self.controls.is_some() || self.battery.is_some() || self.vibration.is_some()
    }

    /// Name match (when named) or any enabled channel's service being
    /// advertised.
    pub fn matches<A: Advertisement>(&self, adv: &A) -> bool {
        if let (Some(name), Some(adv_name)) = (self.name, adv.local_name()) {
            if name == adv_name {
                return true;
            }
        }
        let services = [
            self.controls.as_ref().map(|c| c.channel.service),
            self.battery.as_ref().map(|c| c.channel.service),
            self.vibration.as_ref().map(|c| c.channel.service),
        ];
        services
            .iter()
            .flatten()
            .any(|svc| adv.advertises_service(svc))
    }
}

/// Bitmask of matching descriptions, bit index = registration order.
pub type MatchMask = u64;

/// Ordered description table plus the per-peer match cache.
pub struct ControllerMatcher {
    descriptions: Vec<&'static ControllerDescription, MAX_DESCRIPTIONS>,
    /// `(peer, mask)` pairs; last-scan-wins, no expiry, oldest evicted
    /// when full.
    cache: Vec<(PeerAddress, MatchMask), MATCH_CACHE_SIZE>,
}

impl ControllerMatcher {
    pub const fn new() -> Self {
        Self {
            descriptions: Vec::new(),
            cache: Vec::new(),
        }
    }

    /// Register a description. Priority is registration order: later
    /// registrations are checked first at selection time.
    pub fn add_description(&mut self, d: &'static ControllerDescription) -> Result<(), Error> {
        if !d.has_enabled_channel() {
            return Err(Error::NoEnabledChannel);
        }
        self.descriptions
            .push(d)
            .map_err(|_| Error::DescriptionTableFull)
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    /// Match `adv` against every registered description and cache the
    /// resulting mask for the advertising peer.
    pub fn match_advertisement<A: Advertisement>(&mut self, adv: &A) -> MatchMask {
        let mut mask: MatchMask = 0;
        for (i, d) in self.descriptions.iter().enumerate() {
            if d.matches(adv) {
                mask |= 1 << i;
            }
        }
        self.cache_mask(adv.peer(), mask);
        mask
    }

    /// Mask cached by the most recent scan of `peer`, if any.
    pub fn cached_mask(&self, peer: PeerAddress) -> Option<MatchMask> {
        self.cache
            .iter()
            .find(|(p, _)| *p == peer)
            .map(|(_, mask)| *mask)
    }

    /// Highest-priority description set in `mask`: most recently
    /// registered first.
    pub fn select_description(&self, mask: MatchMask) -> Option<&'static ControllerDescription> {
        for i in (0..self.descriptions.len()).rev() {
            if mask & (1 << i) != 0 {
                return Some(self.descriptions[i]);
            }
        }
        None
    }

    fn cache_mask(&mut self, peer: PeerAddress, mask: MatchMask) {
        if let Some(entry) = self.cache.iter_mut().find(|(p, _)| *p == peer) {
            entry.1 = mask;
            return;
        }
        if self.cache.is_full() {
            self.cache.remove(0);
        }
        let _ = self.cache.push((peer, mask));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodeError;
    use crate::types::AddressKind;

    fn decode_controls(_data: &[u8], _out: &mut ControlsState) -> usize {
        0
    }

    fn encode_vibration(_v: &VibrationCommand, _buf: &mut [u8]) -> Result<usize, EncodeError> {
        Err(EncodeError::InvalidValue)
    }

    static HID_PAD: ControllerDescription = ControllerDescription {
        name: Some("Test Pad"),
        controls: Some(ControlsChannel {
            channel: ChannelSpec {
                service: Uuid::Uuid16(0x1812),
                characteristic: Uuid::Uuid16(0x2A4D),
            },
            decode: decode_controls,
        }),
        battery: None,
        vibration: None,
        hid_setup: false,
    };

    static RUMBLE_ONLY: ControllerDescription = ControllerDescription {
        name: None,
        controls: None,
        battery: None,
        vibration: Some(VibrationChannel {
            channel: ChannelSpec {
                service: Uuid::Uuid16(0xFFF0),
                characteristic: Uuid::Uuid16(0xFFF1),
            },
            encode: encode_vibration,
        }),
        hid_setup: false,
    };

    static NO_CHANNELS: ControllerDescription = ControllerDescription {
        name: Some("Empty"),
        controls: None,
        battery: None,
        vibration: None,
        hid_setup: false,
    };

    struct FakeAdv {
        peer: PeerAddress,
        name: Option<&'static str>,
        services: &'static [Uuid],
    }

    impl Advertisement for FakeAdv {
        fn peer(&self) -> PeerAddress {
            self.peer
        }
        fn local_name(&self) -> Option<&str> {
            self.name
        }
        fn advertises_service(&self, uuid: &Uuid) -> bool {
            self.services.contains(uuid)
        }
    }

    fn peer(last: u8) -> PeerAddress {
        PeerAddress::new(AddressKind::Public, [last, 0, 0, 0, 0, 0xC0])
    }

    #[test]
    fn rejects_description_with_no_channels() {
        let mut m = ControllerMatcher::new();
        assert_eq!(m.add_description(&NO_CHANNELS), Err(Error::NoEnabledChannel));
        assert!(m.is_empty());
    }

    #[test]
    fn rejects_registration_past_capacity() {
        let mut m = ControllerMatcher::new();
        for _ in 0..MAX_DESCRIPTIONS {
            m.add_description(&HID_PAD).unwrap();
        }
        assert_eq!(m.add_description(&HID_PAD), Err(Error::DescriptionTableFull));
        assert_eq!(m.len(), MAX_DESCRIPTIONS);
    }

    #[test]
    fn matches_by_name_or_service() {
        let mut m = ControllerMatcher::new();
        m.add_description(&HID_PAD).unwrap(); // bit 0
        m.add_description(&RUMBLE_ONLY).unwrap(); // bit 1

        // Name only, no services advertised.
        let by_name = FakeAdv {
            peer: peer(1),
            name: Some("Test Pad"),
            services: &[],
        };
        assert_eq!(m.match_advertisement(&by_name), 0b01);

        // Service only, unknown name.
        let by_service = FakeAdv {
            peer: peer(2),
            name: Some("Something Else"),
            services: &[Uuid::Uuid16(0xFFF0)],
        };
        assert_eq!(m.match_advertisement(&by_service), 0b10);

        // Both match.
        let both = FakeAdv {
            peer: peer(3),
            name: Some("Test Pad"),
            services: &[Uuid::Uuid16(0xFFF0)],
        };
        assert_eq!(m.match_advertisement(&both), 0b11);
    }

    #[test]
    fn cache_is_last_scan_wins() {
        let mut m = ControllerMatcher::new();
        m.add_description(&HID_PAD).unwrap();
        let p = peer(4);

        let hit = FakeAdv {
            peer: p,
            name: Some("Test Pad"),
            services: &[],
        };
        m.match_advertisement(&hit);
        assert_eq!(m.cached_mask(p), Some(0b1));

        // Same peer scanned again without the name: cache overwritten.
        let miss = FakeAdv {
            peer: p,
            name: None,
            services: &[],
        };
        m.match_advertisement(&miss);
        assert_eq!(m.cached_mask(p), Some(0));
    }

    #[test]
    fn cache_evicts_oldest_when_full() {
        let mut m = ControllerMatcher::new();
        m.add_description(&HID_PAD).unwrap();
        for i in 0..=MATCH_CACHE_SIZE as u8 {
            let adv = FakeAdv {
                peer: peer(10 + i),
                name: Some("Test Pad"),
                services: &[],
            };
            m.match_advertisement(&adv);
        }
        assert_eq!(m.cached_mask(peer(10)), None); // evicted
        assert_eq!(m.cached_mask(peer(10 + MATCH_CACHE_SIZE as u8)), Some(0b1));
    }

    #[test]
    fn selection_prefers_latest_registration() {
        let mut m = ControllerMatcher::new();
        m.add_description(&HID_PAD).unwrap(); // bit 0, built-in
        m.add_description(&RUMBLE_ONLY).unwrap(); // bit 1, app-registered

        let d = m.select_description(0b11).unwrap();
        assert!(core::ptr::eq(d, &RUMBLE_ONLY));
        let d = m.select_description(0b01).unwrap();
        assert!(core::ptr::eq(d, &HID_PAD));
        assert!(m.select_description(0).is_none());
    }
}
