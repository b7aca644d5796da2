//! Inbound signal: notify -> decode -> cache -> optional callback.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::error::Error;
use crate::host::BleLink;
use crate::matcher::ChannelSpec;
use crate::signal::DecodeFn;
use crate::types::{CharacteristicHandle, CharacteristicProps};

struct Store<T> {
    /// Last successfully decoded value; `None` until the first decode.
    value: Option<T>,
    decode: Option<DecodeFn<T>>,
    characteristic: Option<CharacteristicHandle>,
    callback: Option<fn(T)>,
}

/// Inbound notification channel producing values of type `T`.
///
/// Long-lived: created once per controller slot and re-bound to a fresh
/// link on every reconnect. The subscriber callback registered with
/// [`on_update`](Self::on_update) survives rebinding.
pub struct IncomingSignal<T: Copy + Default + Send + 'static> {
    store: Mutex<CriticalSectionRawMutex, RefCell<Store<T>>>,
    update: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Copy + Default + Send + 'static> IncomingSignal<T> {
    pub const fn new() -> Self {
        Self {
            store: Mutex::new(RefCell::new(Store {
                value: None,
                decode: None,
                characteristic: None,
                callback: None,
            })),
            update: Signal::new(),
        }
    }

    /// Bind to the matching remote characteristic and subscribe.
    ///
    /// Fails when the characteristic is absent, lacks the notify
    /// property, or the channel is already bound.
    pub async fn init<L: BleLink>(
        &self,
        link: &L,
        spec: &ChannelSpec,
        decode: DecodeFn<T>,
    ) -> Result<(), Error> {
        if self.is_active() {
            return Err(Error::AlreadyInitialized);
        }
        let chr = link
            .find_characteristic(&spec.service, &spec.characteristic, CharacteristicProps::NOTIFY)
            .await?;
        link.subscribe(chr).await?;
        self.store.lock(|s| {
            let mut s = s.borrow_mut();
            s.decode = Some(decode);
            s.characteristic = Some(chr);
        });
        Ok(())
    }

    /// Release the binding, unsubscribing first unless the link already
    /// dropped. Fails without side effects when not bound.
    pub async fn deinit<L: BleLink>(&self, link: &L, was_abrupt: bool) -> Result<(), Error> {
        let chr = self.store.lock(|s| {
            let mut s = s.borrow_mut();
            s.decode = None;
            s.characteristic.take()
        });
        let Some(chr) = chr else {
            return Err(Error::NotInitialized);
        };
        if !was_abrupt {
            link.unsubscribe(chr).await?;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.store.lock(|s| s.borrow().characteristic.is_some())
    }

    /// Handle of the bound characteristic, for notification routing.
    pub fn characteristic(&self) -> Option<CharacteristicHandle> {
        self.store.lock(|s| s.borrow().characteristic)
    }

    /// Decode one notification payload. Runs synchronously in the host's
    /// notification context, under the store lock. A failed decode keeps
    /// the previous value.
    pub fn handle_notification(&self, data: &[u8]) {
        self.store.lock(|s| {
            let mut s = s.borrow_mut();
            let Some(decode) = s.decode else {
                return;
            };
            let mut scratch = s.value.unwrap_or_default();
            let consumed = decode(data, &mut scratch);
            if consumed == 0 {
                warn!("inbound signal: decode rejected {} bytes", data.len());
                return;
            }
            s.value = Some(scratch);
            if s.callback.is_some() {
                // Copy travels with the wakeup; the dispatch step never
                // touches the store lock.
                self.update.signal(scratch);
            }
        });
    }

    /// Copy of the last decoded value (default until the first decode).
    /// O(1), never blocks on I/O.
    pub fn read(&self) -> T {
        self.store.lock(|s| s.borrow().value.unwrap_or_default())
    }

    /// Register a best-effort subscriber invoked from the dispatch step
    /// after each successful decode. Only the most recent value is
    /// delivered if decodes outpace the subscriber.
    pub fn on_update(&self, callback: fn(T)) {
        self.store.lock(|s| s.borrow_mut().callback = Some(callback));
    }

    /// One background dispatch step: wait for a decoded value and hand
    /// it to the subscriber outside the store lock.
    pub async fn process_next(&self) {
        let value = self.update.wait().await;
        let callback = self.store.lock(|s| s.borrow().callback);
        if let Some(callback) = callback {
            callback(value);
        }
    }

    /// Background dispatch loop.
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

    fn decode_u16(data: &[u8], out: &mut u16) -> usize {
        if data.len() < 2 {
            return 0;
        }
        *out = u16::from_le_bytes([data[0], data[1]]);
        2
    }

    fn fresh() -> IncomingSignal<u16> {
        let sig = IncomingSignal::new();
        sig.store.lock(|s| {
            let mut s = s.borrow_mut();
            s.decode = Some(decode_u16);
            s.characteristic = Some(CharacteristicHandle(0x10));
        });
        sig
    }

    #[test]
    fn decode_updates_cached_value() {
        let sig = fresh();
        assert_eq!(sig.read(), 0);
        sig.handle_notification(&[0x34, 0x12]);
        assert_eq!(sig.read(), 0x1234);
    }

    #[test]
    fn failed_decode_retains_value() {
        let sig = fresh();
        sig.handle_notification(&[0x34, 0x12]);
        sig.handle_notification(&[0x01]); // too short, decode returns 0
        assert_eq!(sig.read(), 0x1234);
    }

    #[test]
    fn notification_without_binding_is_ignored() {
        let sig: IncomingSignal<u16> = IncomingSignal::new();
        sig.handle_notification(&[0x34, 0x12]);
        assert_eq!(sig.read(), 0);
    }

    #[test]
    fn callback_receives_copy_outside_lock() {
        use portable_atomic::{AtomicU32, Ordering};
        static SEEN: AtomicU32 = AtomicU32::new(0);
        fn on_value(v: u16) {
            SEEN.store(v as u32 | 0x10000, Ordering::SeqCst);
        }

        let sig = fresh();
        sig.on_update(on_value);
        sig.handle_notification(&[0xCD, 0xAB]);
        embassy_futures::block_on(sig.process_next());
        assert_eq!(SEEN.load(Ordering::SeqCst), 0xABCD | 0x10000);
    }
}
