//! Controller slot: the long-lived, application-visible controller.
//!
//! A slot is created by the application (typically as a `static`),
//! registered with the registry, and reused across physical reconnects.
//! Binding a slot to a peer is a single compare-and-swap on the packed
//! address field, so the hot scan-result path never serializes behind
//! the registry's structural lock.

use core::cell::{Cell, RefCell};

use embassy_futures::select::select3;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::host::BleLink;
use crate::session::ControllerSession;
use crate::signal::{IncomingSignal, OutgoingSignal};
use crate::types::{BatteryLevel, ControlsState, PeerAddress, VibrationCommand};

/// Link state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Per-controller user callback.
pub type ControllerHook<L> = fn(&'static Controller<L>);

pub(crate) struct HookSet<L: BleLink> {
    pub connecting: Option<ControllerHook<L>>,
    pub connected: Option<ControllerHook<L>>,
    pub connection_failed: Option<ControllerHook<L>>,
    pub disconnected: Option<ControllerHook<L>>,
}

// Manual impls: `fn` pointers are Copy whatever `L` is, but derive would
// demand `L: Copy`.
impl<L: BleLink> Clone for HookSet<L> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<L: BleLink> Copy for HookSet<L> {}

impl<L: BleLink> HookSet<L> {
    const EMPTY: Self = Self {
        connecting: None,
        connected: None,
        connection_failed: None,
        disconnected: None,
    };
}

/// One logical controller slot.
pub struct Controller<L: BleLink> {
    /// Packed address of the bound peer; `0` when free. CAS-allocated.
    allocated: AtomicU64,
    /// Packed address the slot was last *connected* to (reconnect
    /// affinity); `0` when the slot never reached `Connected`.
    last: AtomicU64,
    /// Packed hard restriction; `0` means any peer is acceptable.
    allowed: u64,
    state: AtomicU8,
    pending_deregistration: AtomicBool,
    link: Mutex<CriticalSectionRawMutex, RefCell<Option<L>>>,
    session: ControllerSession<L>,
    hooks: Mutex<CriticalSectionRawMutex, Cell<HookSet<L>>>,
}

impl<L: BleLink> Controller<L> {
    /// A slot that accepts any matching peer.
    pub const fn new() -> Self {
        Self {
            allocated: AtomicU64::new(0),
            last: AtomicU64::new(0),
            allowed: 0,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            pending_deregistration: AtomicBool::new(false),
            link: Mutex::new(RefCell::new(None)),
            session: ControllerSession::new(),
            hooks: Mutex::new(Cell::new(HookSet::EMPTY)),
        }
    }

    /// A slot hard-restricted to one peer address.
    pub const fn restricted_to(peer: PeerAddress) -> Self {
        let mut c = Self::new();
        c.allowed = peer.packed();
        c
    }

    // State accessors

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Address of the currently bound peer, `NONE` when free.
    pub fn peer_address(&self) -> PeerAddress {
        PeerAddress::from_packed(self.allocated.load(Ordering::Acquire))
    }

    /// Address the slot last successfully connected to.
    pub fn last_address(&self) -> PeerAddress {
        PeerAddress::from_packed(self.last.load(Ordering::Acquire))
    }

    /// Configured hard restriction, `NONE` when unrestricted.
    pub fn allowed_address(&self) -> PeerAddress {
        PeerAddress::from_packed(self.allowed)
    }

    // Signals

    pub fn controls(&self) -> &IncomingSignal<ControlsState> {
        self.session.controls()
    }

    pub fn battery(&self) -> &IncomingSignal<BatteryLevel> {
        self.session.battery()
    }

    pub fn vibration(&self) -> &OutgoingSignal<VibrationCommand, L> {
        self.session.vibration()
    }

    pub(crate) fn session(&self) -> &ControllerSession<L> {
        &self.session
    }

    // User callbacks

    pub fn on_connecting(&self, hook: ControllerHook<L>) {
        self.hooks.lock(|h| {
            let mut set = h.get();
            set.connecting = Some(hook);
            h.set(set);
        });
    }

    pub fn on_connected(&self, hook: ControllerHook<L>) {
        self.hooks.lock(|h| {
            let mut set = h.get();
            set.connected = Some(hook);
            h.set(set);
        });
    }

    pub fn on_connection_failed(&self, hook: ControllerHook<L>) {
        self.hooks.lock(|h| {
            let mut set = h.get();
            set.connection_failed = Some(hook);
            h.set(set);
        });
    }

    pub fn on_disconnected(&self, hook: ControllerHook<L>) {
        self.hooks.lock(|h| {
            let mut set = h.get();
            set.disconnected = Some(hook);
            h.set(set);
        });
    }

    pub(crate) fn hooks(&self) -> HookSet<L> {
        self.hooks.lock(|h| h.get())
    }

    /// Drive the slot's background signal steps (controls and battery
    /// dispatch, vibration send). Spawn one task per registered slot.
    pub async fn run(&self) -> ! {
        loop {
            select3(
                self.session.controls().process_next(),
                self.session.battery().process_next(),
                self.session.vibration().process_next(),
            )
            .await;
        }
    }

    // Registry-side slot management

    /// `true` when `peer` is acceptable for this slot.
    pub(crate) fn allows(&self, peer: PeerAddress) -> bool {
        self.allowed == 0 || self.allowed == peer.packed()
    }

    /// `true` when this slot is restricted to exactly `peer`.
    pub(crate) fn restricted_to_peer(&self, peer: PeerAddress) -> bool {
        self.allowed != 0 && self.allowed == peer.packed()
    }

    /// Race-safe allocation: bind the slot to `peer` iff it is free.
    pub(crate) fn try_allocate(&self, peer: PeerAddress) -> bool {
        self.allocated
            .compare_exchange(0, peer.packed(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Undo a fresh allocation that never got a connection attempt.
    pub(crate) fn rollback_allocation(&self) {
        self.allocated.store(0, Ordering::Release);
    }

    /// Release the slot after its link is gone. Updates the sticky
    /// affinity address only when the slot had actually connected.
    /// Returns `false` when the slot was not allocated (double release).
    pub(crate) fn release(&self, remember_peer: bool) -> bool {
        let previous = self.allocated.swap(0, Ordering::AcqRel);
        if previous == 0 {
            return false;
        }
        if remember_peer {
            self.last.store(previous, Ordering::Release);
        }
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
        self.link.lock(|l| *l.borrow_mut() = None);
        true
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn store_link(&self, link: L) {
        self.link.lock(|l| *l.borrow_mut() = Some(link));
    }

    pub(crate) fn link_clone(&self) -> Option<L> {
        self.link.lock(|l| l.borrow().clone())
    }

    pub(crate) fn pending_deregistration(&self) -> bool {
        self.pending_deregistration.load(Ordering::Acquire)
    }

    /// Mark the slot for deregistration. Returns `true` on the first
    /// call, `false` when it was already pending.
    pub(crate) fn mark_pending_deregistration(&self) -> bool {
        !self.pending_deregistration.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_pending_deregistration(&self) {
        self.pending_deregistration.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════
