//! Controller session: one physical controller's set of signal channels.
//!
//! Channel bring-up is a strict all-or-nothing transaction in a fixed
//! order (controls, battery, vibration); a failure part-way tears the
//! already-initialized channels down in reverse before reporting it, so
//! no partial session ever survives. Teardown walks the same order in
//! reverse, best-effort through every channel.

use portable_atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::host::BleLink;
use crate::matcher::ControllerDescription;
use crate::signal::{IncomingSignal, OutgoingSignal};
use crate::types::{BatteryLevel, CharacteristicHandle, ControlsState, VibrationCommand};

/// Signal-channel bundle for one controller slot.
pub struct ControllerSession<L: BleLink> {
    controls: IncomingSignal<ControlsState>,
    battery: IncomingSignal<BatteryLevel>,
    vibration: OutgoingSignal<VibrationCommand, L>,
    active: AtomicBool,
}

impl<L: BleLink> ControllerSession<L> {
    pub const fn new() -> Self {
        Self {
            controls: IncomingSignal::new(),
            battery: IncomingSignal::new(),
            vibration: OutgoingSignal::new(),
            active: AtomicBool::new(false),
        }
    }

    pub fn controls(&self) -> &IncomingSignal<ControlsState> {
        &self.controls
    }

    pub fn battery(&self) -> &IncomingSignal<BatteryLevel> {
        &self.battery
    }

    pub fn vibration(&self) -> &OutgoingSignal<VibrationCommand, L> {
        &self.vibration
    }

    /// `true` between a successful `init` and the matching `deinit`.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Initialize every channel the description enables, in order.
    ///
    /// On failure of any step the channels brought up so far are torn
    /// down in reverse (gracefully - the link is still alive) before the
    /// error is returned.
    pub(crate) async fn init(&self, link: &L, desc: &ControllerDescription) -> Result<(), Error> {
        if self.is_active() {
            return Err(Error::AlreadyInitialized);
        }

        if let Some(spec) = &desc.controls {
            self.controls.init(link, &spec.channel, spec.decode).await?;
        }

        if let Some(spec) = &desc.battery {
            if let Err(e) = self.battery.init(link, &spec.channel, spec.decode).await {
                self.rollback_controls(link).await;
                return Err(e);
            }
        }

        if let Some(spec) = &desc.vibration {
            if let Err(e) = self.vibration.init(link, &spec.channel, spec.encode).await {
                self.rollback_battery(link).await;
                self.rollback_controls(link).await;
                return Err(e);
            }
        }

        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// Tear every active channel down in reverse init order.
    ///
    /// Best-effort: a failing channel does not stop the others from
    /// being released. Reports success only when every step succeeded.
    pub(crate) async fn deinit(&self, link: &L, was_abrupt: bool) -> Result<(), Error> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Err(Error::NotInitialized);
        }

        let mut result = Ok(());

        if self.vibration.is_active() {
            if let Err(e) = self.vibration.deinit() {
                result = Err(e);
            }
        }
        if self.battery.is_active() {
            if let Err(e) = self.battery.deinit(link, was_abrupt).await {
                warn!("session: battery channel teardown failed: {:?}", e);
                result = Err(e);
            }
        }
        if self.controls.is_active() {
            if let Err(e) = self.controls.deinit(link, was_abrupt).await {
                warn!("session: controls channel teardown failed: {:?}", e);
                result = Err(e);
            }
        }

        result
    }

    /// Route one raw notification to the owning channel. Returns `false`
    /// when no channel is bound to `chr`.
    pub(crate) fn dispatch_notification(&self, chr: CharacteristicHandle, data: &[u8]) -> bool {
        if self.controls.characteristic() == Some(chr) {
            self.controls.handle_notification(data);
            return true;
        }
        if self.battery.characteristic() == Some(chr) {
            self.battery.handle_notification(data);
            return true;
        }
        false
    }

    async fn rollback_controls(&self, link: &L) {
        if self.controls.is_active() {
            if let Err(e) = self.controls.deinit(link, false).await {
                warn!("session: controls rollback failed: {:?}", e);
            }
        }
    }

    async fn rollback_battery(&self, link: &L) {
        if self.battery.is_active() {
            if let Err(e) = self.battery.deinit(link, false).await {
                warn!("session: battery rollback failed: {:?}", e);
            }
        }
    }
}
