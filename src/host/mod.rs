//! Narrow interface to the underlying BLE host stack.
//!
//! The framework never talks to a radio directly. An application
//! implements these traits over its host stack (SoftDevice, trouble,
//! NimBLE shims, a mock in tests) and forwards the stack's callbacks
//! into the registry:
//!
//! 1. Scan results go to [`ControllerRegistry::handle_scan_result`].
//! 2. Connection lifecycle callbacks become [`ClientEvent`]s pushed via
//!    [`ControllerRegistry::notify_event`].
//! 3. Characteristic notifications go to
//!    [`ControllerRegistry::handle_notification`].
//! 4. Scan-window end (natural or after `stop_scan`) goes to
//!    [`ControllerRegistry::handle_scan_stopped`].
//!
//! [`ClientEvent`]: crate::registry::ClientEvent
//! [`ControllerRegistry::handle_scan_result`]: crate::registry::ControllerRegistry::handle_scan_result
//! [`ControllerRegistry::notify_event`]: crate::registry::ControllerRegistry::notify_event
//! [`ControllerRegistry::handle_notification`]: crate::registry::ControllerRegistry::handle_notification
//! [`ControllerRegistry::handle_scan_stopped`]: crate::registry::ControllerRegistry::handle_scan_stopped

pub mod advdata;

use embassy_time::Duration;

use crate::error::HostError;
use crate::types::{CharacteristicHandle, CharacteristicProps, PeerAddress, Uuid};

/// Central-role capabilities of the host stack.
pub trait BleHost {
    type Link: BleLink;

    /// Start a time-bounded advertising scan. Results stream through the
    /// registry's scan-result entry point; the end of the window must be
    /// reported through its scan-stopped entry point.
    fn start_scan(&self, window: Duration) -> Result<(), HostError>;

    /// Stop a running scan. The host confirms via the scan-stopped path.
    fn stop_scan(&self);

    /// Create a link object for `peer` and begin connecting with the
    /// given timeout. Completion (or failure, including timeout) is
    /// reported asynchronously as a client event.
    fn open_link(&self, peer: PeerAddress, timeout: Duration) -> Result<Self::Link, HostError>;
}

/// One BLE link to a specific peer.
///
/// Cloning must yield another handle to the same underlying connection
/// (host connection objects are reference-like).
#[allow(async_fn_in_trait)]
pub trait BleLink: Clone + Send + 'static {
    fn peer(&self) -> PeerAddress;

    /// Begin the pairing/bonding upgrade. Completion arrives as a
    /// `Bonded` or `BondingFailed` client event.
    fn request_secure(&self) -> Result<(), HostError>;

    /// Request disconnection. Completion arrives as a `Disconnected`
    /// client event.
    fn request_disconnect(&self) -> Result<(), HostError>;

    /// Best-effort cancellation of an in-flight connect. If the connect
    /// completes first this is a no-op; either way the outcome arrives
    /// through the normal event path.
    fn cancel_connect(&self) -> Result<(), HostError>;

    /// Locate a characteristic by service and characteristic UUID whose
    /// properties cover `required`.
    async fn find_characteristic(
        &self,
        service: &Uuid,
        characteristic: &Uuid,
        required: CharacteristicProps,
    ) -> Result<CharacteristicHandle, HostError>;

    /// Enable notifications on a characteristic.
    async fn subscribe(&self, characteristic: CharacteristicHandle) -> Result<(), HostError>;

    /// Disable notifications on a characteristic.
    async fn unsubscribe(&self, characteristic: CharacteristicHandle) -> Result<(), HostError>;

    /// Write a characteristic value.
    async fn write_characteristic(
        &self,
        characteristic: CharacteristicHandle,
        value: &[u8],
    ) -> Result<(), HostError>;

    /// Read a characteristic value into `buf`, returning the length.
    async fn read_characteristic(
        &self,
        characteristic: CharacteristicHandle,
        buf: &mut [u8],
    ) -> Result<usize, HostError>;
}

/// One advertisement as seen during a scan.
pub trait Advertisement {
    fn peer(&self) -> PeerAddress;

    /// Complete or shortened local name, if advertised.
    fn local_name(&self) -> Option<&str>;

    /// `true` when the advertisement's service list contains `uuid`.
    fn advertises_service(&self, uuid: &Uuid) -> bool;
}
