//! Controller registry: slot pool, link tokens and the per-link state
//! machine.
//!
//! All state mutation is serialized through a single queue of
//! [`ClientEvent`]s consumed by one task - host-stack callbacks are
//! shims that enqueue and return. The only lock-free exception is slot
//! allocation on the scan-result path, a compare-and-swap on the slot's
//! packed address field, so concurrent scan results never serialize
//! behind the (rare) registration/deregistration lock.

use core::cell::RefCell;

use embassy_futures::select::select3;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use portable_atomic::{AtomicUsize, Ordering};

use crate::autoscan::{self, AutoScanState, ScanAction};
use crate::config::{
    CLIENT_EVENT_QUEUE_DEPTH, CONNECT_TIMEOUT, MAX_CONTROLLERS, MAX_LINKS, SCAN_WINDOW,
    SESSION_INIT_ATTEMPTS,
};
use crate::controller::{ConnectionState, Controller};
use crate::dispatch::{CallbackDispatcher, CallbackMessage, ControllerTransition};
use crate::error::Error;
use crate::host::{Advertisement, BleHost, BleLink};
use crate::matcher::{ControllerDescription, ControllerMatcher};
use crate::models::hogp;
use crate::types::{CharacteristicHandle, CharacteristicProps, PeerAddress};

/// Connection lifecycle event raised by the host stack.
///
/// The sole input alphabet of the registry's state machine. Host glue
/// produces these from its stack's callbacks and pushes them through
/// [`ControllerRegistry::notify_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientEvent {
    Connected(PeerAddress),
    Bonded(PeerAddress),
    Disconnected(PeerAddress),
    ConnectionFailed(PeerAddress),
    BondingFailed(PeerAddress),
}

impl ClientEvent {
    pub fn peer(&self) -> PeerAddress {
        match *self {
            ClientEvent::Connected(p)
            | ClientEvent::Bonded(p)
            | ClientEvent::Disconnected(p)
            | ClientEvent::ConnectionFailed(p)
            | ClientEvent::BondingFailed(p) => p,
        }
    }
}

type SlotList<L> = Vec<&'static Controller<L>, MAX_CONTROLLERS>;

/// Process-wide registry. Construct once, inject into runner tasks.
pub struct ControllerRegistry<H: BleHost> {
    host: H,
    max_links: usize,
    /// Available link tokens. Allocated slots + this == `max_links`.
    free_links: AtomicUsize,
    controllers: Mutex<CriticalSectionRawMutex, RefCell<SlotList<H::Link>>>,
    matcher: Mutex<CriticalSectionRawMutex, RefCell<ControllerMatcher>>,
    events: Channel<CriticalSectionRawMutex, ClientEvent, CLIENT_EVENT_QUEUE_DEPTH>,
    scan: AutoScanState,
    callbacks: CallbackDispatcher<H::Link>,
}

impl<H: BleHost> ControllerRegistry<H> {
    /// Registry using the full compile-time link pool.
    pub fn new(host: H) -> Self {
        Self::with_link_limit(host, MAX_LINKS)
    }

    /// Registry with a lower simultaneous-connection limit (clamped to
    /// `1..=MAX_LINKS`).
    pub fn with_link_limit(host: H, max_links: usize) -> Self {
        let max_links = max_links.clamp(1, MAX_LINKS);
        Self {
            host,
            max_links,
            free_links: AtomicUsize::new(max_links),
            controllers: Mutex::new(RefCell::new(Vec::new())),
            matcher: Mutex::new(RefCell::new(ControllerMatcher::new())),
            events: Channel::new(),
            scan: AutoScanState::new(),
            callbacks: CallbackDispatcher::new(),
        }
    }

    /// Register the built-in controller models, lowest priority.
    /// Call once before adding application descriptions.
    pub fn init(&self) -> Result<(), Error> {
        self.add_description(&crate::models::xbox::XBOX_WIRELESS)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn callbacks(&self) -> &CallbackDispatcher<H::Link> {
        &self.callbacks
    }

    /// Wait-free read of the available link-token count.
    pub fn available_link_count(&self) -> usize {
        self.free_links.load(Ordering::Acquire)
    }

    pub fn max_link_count(&self) -> usize {
        self.max_links
    }

    // Description registration

    /// Register a controller description. Later registrations are
    /// checked first when a bonded link picks its model.
    pub fn add_description(&self, d: &'static ControllerDescription) -> Result<(), Error> {
        self.matcher.lock(|m| m.borrow_mut().add_description(d))
    }

    // Controller registration

    /// Register a controller slot. Append-only and idempotent.
    pub fn register(&self, controller: &'static Controller<H::Link>) -> Result<(), Error> {
        self.controllers.lock(|list| {
            let mut list = list.borrow_mut();
            if list.iter().any(|c| core::ptr::eq(*c, controller)) {
                return Ok(());
            }
            list.push(controller).map_err(|_| Error::RegistryFull)
        })
    }

    pub fn is_registered(&self, controller: &'static Controller<H::Link>) -> bool {
        self.controllers
            .lock(|list| list.borrow().iter().any(|c| core::ptr::eq(*c, controller)))
    }

    /// Deregister a controller slot.
    ///
    /// Idle slots are removed synchronously. A connecting slot gets a
    /// best-effort cancel, a connected slot a disconnect request; either
    /// way removal completes when the resulting `Disconnected` (or
    /// `ConnectionFailed`) event is processed. Calling again before that
    /// event lands is a no-op - no duplicate disconnect commands.
    pub fn deregister(&self, controller: &'static Controller<H::Link>) {
        if !self.is_registered(controller) {
            return;
        }
        if controller.peer_address().is_none() {
            self.remove_controller(controller);
            return;
        }
        if !controller.mark_pending_deregistration() {
            return;
        }
        match controller.connection_state() {
            ConnectionState::Connecting => {
                if let Some(link) = controller.link_clone() {
                    if link.cancel_connect().is_err() {
                        debug!("deregister: cancel-connect not honored by host");
                    }
                }
            }
            ConnectionState::Connected => {
                if let Some(link) = controller.link_clone() {
                    if link.request_disconnect().is_err() {
                        warn!("deregister: disconnect request failed");
                    }
                }
            }
            ConnectionState::Disconnected => {}
        }
    }

    // Auto-scan

    pub fn enable_auto_scan(&self) {
        self.scan.set_enabled(true);
        self.scan.notify();
    }

    pub fn disable_auto_scan(&self) {
        self.scan.set_enabled(false);
        self.scan.notify();
    }

    /// One auto-scan step: wait for a wake-up, then re-evaluate.
    pub async fn process_next_scan_wake(&self) {
        self.scan.wait().await;
        self.evaluate_scan();
    }

    /// Auto-scan control loop.
    pub async fn run_autoscan(&self) -> ! {
        loop {
            self.process_next_scan_wake().await;
        }
    }

    fn evaluate_scan(&self) {
        match autoscan::decide(
            self.scan.enabled(),
            self.scan.scanning(),
            self.available_link_count(),
        ) {
            ScanAction::Start => match self.host.start_scan(SCAN_WINDOW) {
                Ok(()) => {
                    self.scan.set_scanning(true);
                    self.callbacks.enqueue(CallbackMessage::ScanStarted);
                    info!("auto-scan: window started");
                }
                Err(e) => warn!("auto-scan: start failed: {:?}", e),
            },
            // The stop is confirmed through handle_scan_stopped, which
            // is also where the user notification comes from.
            ScanAction::Stop => self.host.stop_scan(),
            ScanAction::Hold => {}
        }
    }

    // Host-facing entry points (called from host glue)

    /// Feed one connection lifecycle event into the state machine.
    pub fn notify_event(&self, event: ClientEvent) {
        if self.events.try_send(event).is_err() {
            error!("registry: client event queue full, event lost");
        }
    }

    /// The host's scan window ended (naturally or after `stop_scan`).
    pub fn handle_scan_stopped(&self) {
        self.scan.set_scanning(false);
        self.callbacks.enqueue(CallbackMessage::ScanStopped);
        self.scan.notify();
    }

    /// Route one characteristic notification to the owning slot.
    pub fn handle_notification(&self, peer: PeerAddress, chr: CharacteristicHandle, data: &[u8]) {
        let Some(slot) = self.find_slot(peer) else {
            trace!("notification from unowned peer ignored");
            return;
        };
        if !slot.session().dispatch_notification(chr, data) {
            trace!("notification on unbound characteristic {}", chr.0);
        }
    }

    /// Try to bind a matching advertisement to a free slot and begin
    /// connecting. Safe against concurrent scan results.
    pub fn handle_scan_result<A: Advertisement>(&self, adv: &A) {
        let peer = adv.peer();
        if peer.is_none() {
            return;
        }

        let mask = self.matcher.lock(|m| m.borrow_mut().match_advertisement(adv));
        if mask == 0 {
            return;
        }
        if self.find_slot(peer).is_some() {
            // Already connecting or connected.
            return;
        }

        let Some(slot) = self.allocate_slot(peer) else {
            return;
        };

        // Past this point the failure path must run through the state
        // machine so the slot is released exactly once.
        if !self.try_take_link_token() {
            // Out of link tokens: no connect attempt is issued at all.
            slot.rollback_allocation();
            return;
        }

        slot.set_state(ConnectionState::Connecting);
        self.callbacks.enqueue(CallbackMessage::Controller {
            transition: ControllerTransition::Connecting,
            controller: slot,
        });

        match self.host.open_link(peer, CONNECT_TIMEOUT) {
            Ok(link) => {
                slot.store_link(link);
                debug!("connect issued");
            }
            Err(e) => {
                warn!("open link failed: {:?}", e);
                self.notify_event(ClientEvent::ConnectionFailed(peer));
            }
        }
    }

    /// Three-pass allocation: sticky affinity, never-used slots, then
    /// any other acceptable slot. Within each pass, slots restricted to
    /// exactly this peer are tried before unrestricted ones.
    fn allocate_slot(&self, peer: PeerAddress) -> Option<&'static Controller<H::Link>> {
        self.controllers.lock(|list| {
            let list = list.borrow();
            for pass in 0..3u8 {
                for restricted_first in [true, false] {
                    for slot in list.iter() {
                        if slot.pending_deregistration() {
                            continue;
                        }
                        if !slot.allows(peer) {
                            continue;
                        }
                        if slot.restricted_to_peer(peer) != restricted_first {
                            continue;
                        }
                        let in_pass = match pass {
                            0 => slot.last_address() == peer,
                            1 => slot.last_address().is_none(),
                            _ => true,
                        };
                        if !in_pass {
                            continue;
                        }
                        if slot.try_allocate(peer) {
                            return Some(*slot);
                        }
                    }
                }
            }
            None
        })
    }

    // Event consumer

    /// One state-machine step: wait for the next client event and
    /// process it. Events are handled one at a time, in arrival order.
    pub async fn process_next_event(&self) {
        let event = self.events.receive().await;
        self.process_event(event).await;
    }

    /// Event consumer loop.
    pub async fn run_events(&self) -> ! {
        loop {
            self.process_next_event().await;
        }
    }

    /// Convenience runner driving the event consumer, auto-scan loop
    /// and callback dispatcher as one task. Spawn the individual
    /// runners instead when task priorities matter.
    pub async fn run(&self) -> ! {
        loop {
            select3(
                self.process_next_event(),
                self.process_next_scan_wake(),
                self.callbacks.process_next(),
            )
            .await;
        }
    }

    async fn process_event(&self, event: ClientEvent) {
        let peer = event.peer();
        let Some(slot) = self.find_slot(peer) else {
            // No owner to retry against; all we can do is report it.
            error!("client event for unowned peer discarded");
            return;
        };

        match event {
            ClientEvent::Connected(_) => self.on_connected(slot).await,
            ClientEvent::Bonded(_) => self.on_bonded(slot, peer).await,
            ClientEvent::Disconnected(_) => self.release_slot(slot).await,
            ClientEvent::ConnectionFailed(_) => self.release_slot(slot).await,
            ClientEvent::BondingFailed(_) => self.on_bonding_failed(slot).await,
        }
    }

    /// Link is up; bonding is mandatory for this peripheral class, so
    /// request the secure upgrade immediately.
    async fn on_connected(&self, slot: &'static Controller<H::Link>) {
        let Some(link) = slot.link_clone() else {
            error!("connected event without a stored link");
            self.release_slot(slot).await;
            return;
        };
        if link.request_secure().is_err() {
            warn!("secure upgrade request failed, dropping link");
            self.disconnect_or_release(slot, &link).await;
        }
    }

    /// Secure link established: pick the model, run HID setup, bring up
    /// the session (bounded retries), settle the slot.
    async fn on_bonded(&self, slot: &'static Controller<H::Link>, peer: PeerAddress) {
        let Some(link) = slot.link_clone() else {
            error!("bonded event without a stored link");
            self.release_slot(slot).await;
            return;
        };

        if slot.pending_deregistration() {
            self.disconnect_or_release(slot, &link).await;
            return;
        }

        let desc = self.matcher.lock(|m| {
            let m = m.borrow();
            let mask = m.cached_mask(peer).unwrap_or(0);
            m.select_description(mask)
        });
        let Some(desc) = desc else {
            warn!("bonded peer has no matching description, dropping link");
            self.disconnect_or_release(slot, &link).await;
            return;
        };

        if desc.hid_setup {
            self.apply_hid_setup(&link).await;
        }

        let mut initialized = false;
        for attempt in 1..=SESSION_INIT_ATTEMPTS {
            match slot.session().init(&link, desc).await {
                Ok(()) => {
                    initialized = true;
                    break;
                }
                Err(e) => warn!("session init attempt {} failed: {:?}", attempt, e),
            }
        }
        if !initialized {
            self.disconnect_or_release(slot, &link).await;
            return;
        }

        slot.set_state(ConnectionState::Connected);
        info!("controller session up");
        self.callbacks.enqueue(CallbackMessage::Controller {
            transition: ControllerTransition::Connected,
            controller: slot,
        });
        // A slot settled; the scanner may have capacity for others.
        self.scan.notify();
    }

    /// Bonding failed on a live link: drop it and let the resulting
    /// `Disconnected` event run the common release path.
    async fn on_bonding_failed(&self, slot: &'static Controller<H::Link>) {
        warn!("bonding failed");
        match slot.link_clone() {
            Some(link) => self.disconnect_or_release(slot, &link).await,
            None => self.release_slot(slot).await,
        }
    }

    /// Request a disconnect; when the host cannot even accept that, the
    /// `Disconnected` event will never come, so release inline.
    async fn disconnect_or_release(&self, slot: &'static Controller<H::Link>, link: &H::Link) {
        if link.request_disconnect().is_err() {
            warn!("disconnect request failed, releasing slot inline");
            self.release_slot(slot).await;
        }
    }

    /// Common teardown: session down, slot free, token back, user
    /// notified, deregistration completed, auto-scan re-evaluated.
    async fn release_slot(&self, slot: &'static Controller<H::Link>) {
        let leaving = slot.connection_state();

        if slot.session().is_active() {
            if let Some(link) = slot.link_clone() {
                // The link is already gone; skip remote unsubscribes.
                if slot.session().deinit(&link, true).await.is_err() {
                    warn!("session teardown reported errors");
                }
            }
        }

        let was_allocated = slot.release(leaving == ConnectionState::Connected);
        if was_allocated {
            self.release_link_token();
        } else {
            error!("release of an unallocated slot ignored");
            return;
        }

        if slot.pending_deregistration() {
            self.remove_controller(slot);
        }

        let transition = match leaving {
            ConnectionState::Connected => ControllerTransition::Disconnected,
            _ => ControllerTransition::ConnectionFailed,
        };
        self.callbacks.enqueue(CallbackMessage::Controller {
            transition,
            controller: slot,
        });

        self.scan.notify();
    }

    /// Switch the peripheral to Report Protocol. Some peripherals come
    /// up in boot protocol; failure is non-fatal (the device may simply
    /// not expose the characteristic).
    async fn apply_hid_setup(&self, link: &H::Link) {
        match link
            .find_characteristic(
                &hogp::HID_SERVICE,
                &hogp::PROTOCOL_MODE,
                CharacteristicProps::WRITE,
            )
            .await
        {
            Ok(chr) => {
                if let Err(e) = link
                    .write_characteristic(chr, &[hogp::PROTOCOL_MODE_REPORT])
                    .await
                {
                    warn!("protocol mode write failed: {:?}", e);
                }
            }
            Err(_) => debug!("peripheral has no protocol mode characteristic"),
        }
    }

    // Shutdown

    /// Stop scanning and gracefully tear down live sessions. Pending
    /// disconnects resolve through the event path as usual.
    pub async fn shutdown(&self) {
        self.disable_auto_scan();
        if self.scan.scanning() {
            self.host.stop_scan();
        }

        let slots: SlotList<H::Link> = self.controllers.lock(|list| list.borrow().clone());
        for slot in slots {
            if !slot.is_connected() {
                continue;
            }
            if let Some(link) = slot.link_clone() {
                if slot.session().deinit(&link, false).await.is_err() {
                    warn!("shutdown: session teardown reported errors");
                }
                if link.request_disconnect().is_err() {
                    warn!("shutdown: disconnect request failed");
                }
            }
        }
    }

    // Internals

    fn find_slot(&self, peer: PeerAddress) -> Option<&'static Controller<H::Link>> {
        if peer.is_none() {
            return None;
        }
        self.controllers.lock(|list| {
            list.borrow()
                .iter()
                .find(|c| c.peer_address() == peer)
                .copied()
        })
    }

    fn remove_controller(&self, controller: &'static Controller<H::Link>) {
        self.controllers.lock(|list| {
            let mut list = list.borrow_mut();
            if let Some(pos) = list.iter().position(|c| core::ptr::eq(*c, controller)) {
                list.remove(pos);
            }
        });
        controller.clear_pending_deregistration();
    }

    fn try_take_link_token(&self) -> bool {
        self.free_links
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn release_link_token(&self) {
        let max = self.max_links;
        let result = self
            .free_links
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max {
                    Some(n + 1)
                } else {
                    None
                }
            });
        if result.is_err() {
            error!("link token over-release suppressed");
        }
    }
}
