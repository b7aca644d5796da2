//! Outbound signal: value -> encode -> buffer swap -> background write.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::config::{SIGNAL_BUFFER_INITIAL, SIGNAL_BUFFER_MAX};
use crate::error::{EncodeError, Error};
use crate::host::BleLink;
use crate::matcher::ChannelSpec;
use crate::signal::EncodeFn;
use crate::types::{CharacteristicHandle, CharacteristicProps};

struct Buffers {
    /// Encode target for the next `write` call.
    pending: Vec<u8, SIGNAL_BUFFER_MAX>,
    /// Most recently completed encode, awaiting transmission.
    send: Vec<u8, SIGNAL_BUFFER_MAX>,
    /// Logical capacity offered to the encoder; grows geometrically up
    /// to `SIGNAL_BUFFER_MAX` when an encode reports "too short".
    capacity: usize,
}

struct Binding<T, L> {
    link: L,
    characteristic: CharacteristicHandle,
    encode: EncodeFn<T>,
}

impl<T, L: Clone> Clone for Binding<T, L> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            characteristic: self.characteristic,
            encode: self.encode,
        }
    }
}

/// Outbound command channel consuming values of type `T`.
///
/// `write` never blocks on radio I/O: it encodes under the store lock,
/// swaps the encode/send buffer pair by move, and wakes the send step,
/// which transmits outside the lock. A burst of writes coalesces - the
/// send step always transmits the most recently completed encode.
pub struct OutgoingSignal<T: 'static, L: BleLink> {
    store: Mutex<CriticalSectionRawMutex, RefCell<Buffers>>,
    binding: Mutex<CriticalSectionRawMutex, RefCell<Option<Binding<T, L>>>>,
    kick: Signal<CriticalSectionRawMutex, ()>,
}

impl<T: 'static, L: BleLink> OutgoingSignal<T, L> {
    pub const fn new() -> Self {
        Self {
            store: Mutex::new(RefCell::new(Buffers {
                pending: Vec::new(),
                send: Vec::new(),
                capacity: SIGNAL_BUFFER_INITIAL,
            })),
            binding: Mutex::new(RefCell::new(None)),
            kick: Signal::new(),
        }
    }

    /// Bind to the matching remote characteristic (write property
    /// required). Fails when absent or already bound.
    pub async fn init(&self, link: &L, spec: &ChannelSpec, encode: EncodeFn<T>) -> Result<(), Error> {
        if self.is_active() {
            return Err(Error::AlreadyInitialized);
        }
        let chr = link
            .find_characteristic(&spec.service, &spec.characteristic, CharacteristicProps::WRITE)
            .await?;
        self.binding.lock(|b| {
            *b.borrow_mut() = Some(Binding {
                link: link.clone(),
                characteristic: chr,
                encode,
            });
        });
        Ok(())
    }

    /// Release the binding and reset the buffers. Fails without side
    /// effects when not bound.
    pub fn deinit(&self) -> Result<(), Error> {
        let had_binding = self.binding.lock(|b| b.borrow_mut().take().is_some());
        if !had_binding {
            return Err(Error::NotInitialized);
        }
        self.store.lock(|s| {
            let mut s = s.borrow_mut();
            s.pending.clear();
            s.send.clear();
            s.capacity = SIGNAL_BUFFER_INITIAL;
        });
        self.kick.reset();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.binding.lock(|b| b.borrow().is_some())
    }

    pub fn characteristic(&self) -> Option<CharacteristicHandle> {
        self.binding.lock(|b| b.borrow().as_ref().map(|b| b.characteristic))
    }

    /// Encode `value` and queue it for transmission.
    ///
    /// Runs entirely off the radio: encode under the lock, swap, wake
    /// the send step. When the encoder asks for more room the logical
    /// capacity doubles, capped at the configured maximum - at most
    /// O(log(max/initial)) retries per oversized value.
    pub fn write(&self, value: &T) -> Result<(), Error> {
        let encode = self
            .binding
            .lock(|b| b.borrow().as_ref().map(|b| b.encode))
            .ok_or(Error::NotInitialized)?;

        self.store.lock(|s| {
            let s = &mut *s.borrow_mut();
            loop {
                s.pending.clear();
                // Capacity never exceeds the backing array, so this
                // resize cannot fail.
                let _ = s.pending.resize_default(s.capacity);
                match encode(value, &mut s.pending[..]) {
                    Ok(written) => {
                        s.pending.truncate(written);
                        core::mem::swap(&mut s.pending, &mut s.send);
                        return Ok(());
                    }
                    Err(EncodeError::BufferTooShort) => {
                        if s.capacity >= SIGNAL_BUFFER_MAX {
                            warn!("outbound signal: encode exceeds {} byte cap", SIGNAL_BUFFER_MAX);
                            return Err(Error::BufferTooShort);
                        }
                        s.capacity = (s.capacity * 2).min(SIGNAL_BUFFER_MAX);
                    }
                    Err(EncodeError::InvalidValue) => return Err(Error::InvalidValue),
                }
            }
        })?;

        self.kick.signal(());
        Ok(())
    }

    /// One background send step: wait for queued bytes and transmit them
    /// outside the store lock. Write failures are logged, not fatal.
    pub async fn process_next(&self) {
        self.kick.wait().await;
        let Some((link, chr)) = self
            .binding
            .lock(|b| b.borrow().as_ref().map(|b| (b.link.clone(), b.characteristic)))
        else {
            return;
        };
        let mut out: Vec<u8, SIGNAL_BUFFER_MAX> = Vec::new();
        self.store.lock(|s| core::mem::swap(&mut s.borrow_mut().send, &mut out));
        if out.is_empty() {
            return;
        }
        if let Err(e) = link.write_characteristic(chr, &out).await {
            warn!("outbound signal: write failed: {:?}", e);
        }
    }

    /// Background send loop.
    pub async fn run(&self) -> ! {
        loop {
            self.process_next().await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    // A value that encodes to `len` copies of `fill`.
    #[derive(Clone, Copy)]
    struct Blob {
        len: usize,
        fill: u8,
    }

    fn encode_blob(v: &Blob, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if v.len == 0 {
            return Err(EncodeError::InvalidValue);
        }
        if buf.len() < v.len {
            return Err(EncodeError::BufferTooShort);
        }
        buf[..v.len].fill(v.fill);
        Ok(v.len)
    }

    // Unit-struct link so buffer logic is testable without a host.
    #[derive(Clone)]
    struct NullLink;

    impl BleLink for NullLink {
        fn peer(&self) -> crate::types::PeerAddress {
            crate::types::PeerAddress::NONE
        }
        fn request_secure(&self) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        fn request_disconnect(&self) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        fn cancel_connect(&self) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        async fn find_characteristic(
            &self,
            _service: &crate::types::Uuid,
            _characteristic: &crate::types::Uuid,
            _required: CharacteristicProps,
        ) -> Result<CharacteristicHandle, crate::error::HostError> {
            Ok(CharacteristicHandle(1))
        }
        async fn subscribe(&self, _c: CharacteristicHandle) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        async fn unsubscribe(&self, _c: CharacteristicHandle) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        async fn write_characteristic(
            &self,
            _c: CharacteristicHandle,
            _value: &[u8],
        ) -> Result<(), crate::error::HostError> {
            Ok(())
        }
        async fn read_characteristic(
            &self,
            _c: CharacteristicHandle,
            _buf: &mut [u8],
        ) -> Result<usize, crate::error::HostError> {
            Ok(0)
        }
    }

    fn bound() -> OutgoingSignal<Blob, NullLink> {
        let sig = OutgoingSignal::new();
        sig.binding.lock(|b| {
            *b.borrow_mut() = Some(Binding {
                link: NullLink,
                characteristic: CharacteristicHandle(0x30),
                encode: encode_blob,
            });
        });
        sig
    }

    fn queued_bytes(sig: &OutgoingSignal<Blob, NullLink>) -> std::vec::Vec<u8> {
        sig.store.lock(|s| s.borrow().send.iter().copied().collect())
    }

    #[test]
    fn write_requires_binding() {
        let sig: OutgoingSignal<Blob, NullLink> = OutgoingSignal::new();
        assert_eq!(
            sig.write(&Blob { len: 4, fill: 1 }),
            Err(Error::NotInitialized)
        );
    }

    #[test]
    fn write_swaps_encoded_bytes_into_send_buffer() {
        let sig = bound();
        sig.write(&Blob { len: 4, fill: 0xAB }).unwrap();
        assert_eq!(queued_bytes(&sig), vec![0xAB; 4]);
    }

    #[test]
    fn later_write_replaces_queued_bytes() {
        let sig = bound();
        sig.write(&Blob { len: 4, fill: 0x11 }).unwrap();
        sig.write(&Blob { len: 6, fill: 0x22 }).unwrap();
        // Only the most recent encode is ever transmitted.
        assert_eq!(queued_bytes(&sig), vec![0x22; 6]);
    }

    #[test]
    fn buffer_grows_geometrically_for_oversized_values() {
        let sig = bound();
        assert_eq!(sig.store.lock(|s| s.borrow().capacity), SIGNAL_BUFFER_INITIAL);
        sig.write(&Blob { len: 20, fill: 0x33 }).unwrap();
        // 8 -> 16 -> 32
        assert_eq!(sig.store.lock(|s| s.borrow().capacity), 32);
        assert_eq!(queued_bytes(&sig).len(), 20);
    }

    #[test]
    fn growth_stops_at_cap() {
        let sig = bound();
        assert_eq!(
            sig.write(&Blob { len: SIGNAL_BUFFER_MAX + 1, fill: 0x44 }),
            Err(Error::BufferTooShort)
        );
        // Nothing queued from the failed write.
        assert!(queued_bytes(&sig).is_empty());
    }

    #[test]
    fn invalid_value_is_terminal() {
        let sig = bound();
        assert_eq!(sig.write(&Blob { len: 0, fill: 0 }), Err(Error::InvalidValue));
    }

    #[test]
    fn deinit_is_idempotent() {
        let sig = bound();
        assert!(sig.deinit().is_ok());
        assert_eq!(sig.deinit(), Err(Error::NotInitialized));
    }
}
