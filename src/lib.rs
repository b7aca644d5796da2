//! blepad - BLE game-controller client framework for embedded hosts.
//!
//! Applications register long-lived controller slots, optionally pinned
//! to a specific peer address, and receive typed input/output signals
//! (stick and button state, battery level, vibration commands) without
//! touching BLE connection mechanics. The framework:
//!
//! 1. **Matches** advertising peripherals against registered controller
//!    descriptions (name or service UUID, bitmask result, priority to
//!    the latest registration).
//! 2. **Arbitrates** a bounded pool of link tokens across the slots,
//!    with lock-free compare-and-swap slot allocation on the scan path.
//! 3. **Drives** each link through connect -> secure-pair -> discovery
//!    -> subscription -> ready -> disconnect, with bounded retry and
//!    full rollback on every failure path.
//! 4. **Transports** signals through generic decode-on-notify /
//!    encode-on-write channels, each backed by a background step and a
//!    mutex-guarded double buffer swapped by move.
//!
//! The BLE host stack itself stays outside: implement [`host::BleHost`]
//! / [`host::BleLink`] over your stack and forward its callbacks into
//! the registry. Everything else - including all of this crate's tests -
//! runs on the host.
//!
//! Communication between tasks is done via embassy-sync channels and
//! signals; the application spawns the runner methods on its executor:
//!
//! ```text
//! scan result -> matcher -> slot CAS + token -> connect
//!     host callbacks -> ClientEvent queue -> registry task
//!         -> session init (signal channels) -> callback dispatcher
//! ```

#![cfg_attr(not(test), no_std)]

// This must go first so the other modules see its macros.
mod fmt;

pub mod autoscan;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod matcher;
pub mod models;
pub mod registry;
pub mod session;
pub mod signal;
pub mod types;

pub use controller::{ConnectionState, Controller, ControllerHook};
pub use dispatch::{CallbackDispatcher, ControllerTransition};
pub use error::{EncodeError, Error, HostError};
pub use matcher::{
    BatteryChannel, ChannelSpec, ControllerDescription, ControlsChannel, MatchMask,
    VibrationChannel,
};
pub use registry::{ClientEvent, ControllerRegistry};
pub use session::ControllerSession;
pub use signal::{DecodeFn, EncodeFn, IncomingSignal, OutgoingSignal};
pub use types::{
    AddressKind, BatteryLevel, Buttons, CharacteristicHandle, CharacteristicProps, ControlsState,
    DPad, PeerAddress, StickPosition, Uuid, VibrationCommand,
};
