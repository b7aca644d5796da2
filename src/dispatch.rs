//! User callback dispatcher.
//!
//! Application callbacks are never invoked from the BLE host stack's
//! own callback context: user code re-entering the stack (calling
//! `disconnect()` from a disconnect handler, say) while it holds
//! internal locks would deadlock it. Every notification is queued here
//! and delivered by a dedicated task instead.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;

use crate::config::CALLBACK_QUEUE_DEPTH;
use crate::controller::Controller;
use crate::host::BleLink;

/// Which per-controller transition a message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerTransition {
    Connecting,
    Connected,
    ConnectionFailed,
    Disconnected,
}

pub(crate) enum CallbackMessage<L: BleLink> {
    Controller {
        transition: ControllerTransition,
        controller: &'static Controller<L>,
    },
    ScanStarted,
    ScanStopped,
}

#[derive(Clone, Copy)]
struct ScanHooks {
    started: Option<fn()>,
    stopped: Option<fn()>,
}

/// Queue/task pair delivering the six application callbacks.
pub struct CallbackDispatcher<L: BleLink> {
    queue: Channel<CriticalSectionRawMutex, CallbackMessage<L>, CALLBACK_QUEUE_DEPTH>,
    scan_hooks: Mutex<CriticalSectionRawMutex, Cell<ScanHooks>>,
}

impl<L: BleLink> CallbackDispatcher<L> {
    pub(crate) const fn new() -> Self {
        Self {
            queue: Channel::new(),
            scan_hooks: Mutex::new(Cell::new(ScanHooks {
                started: None,
                stopped: None,
            })),
        }
    }

    /// Register the global scan-started callback.
    pub fn on_scan_started(&self, hook: fn()) {
        self.scan_hooks.lock(|h| {
            let mut set = h.get();
            set.started = Some(hook);
            h.set(set);
        });
    }

    /// Register the global scan-stopped callback.
    pub fn on_scan_stopped(&self, hook: fn()) {
        self.scan_hooks.lock(|h| {
            let mut set = h.get();
            set.stopped = Some(hook);
            h.set(set);
        });
    }

    /// Queue one notification. Called from event-processing context;
    /// an overflowing queue is reported loudly, never silently.
    pub(crate) fn enqueue(&self, message: CallbackMessage<L>) {
        if self.queue.try_send(message).is_err() {
            error!("callback dispatcher: queue full, notification dropped");
        }
    }

    /// Deliver one queued notification if any is pending. Returns
    /// whether one was delivered.
    pub fn try_dispatch_one(&self) -> bool {
        match self.queue.try_receive() {
            Ok(message) => {
                self.invoke(message);
                true
            }
            Err(_) => false,
        }
    }

    /// One dispatcher step: wait for a notification and deliver it.
    pub async fn process_next(&self) {
        let message = self.queue.receive().await;
        self.invoke(message);
    }

    /// Dispatcher loop.
    pub async fn run(&self) -> ! {
        loop {
            self.process_next().await;
        }
    }

    fn invoke(&self, message: CallbackMessage<L>) {
        match message {
            CallbackMessage::Controller {
                transition,
                controller,
            } => {
                let hooks = controller.hooks();
                let hook = match transition {
                    ControllerTransition::Connecting => hooks.connecting,
                    ControllerTransition::Connected => hooks.connected,
                    ControllerTransition::ConnectionFailed => hooks.connection_failed,
                    ControllerTransition::Disconnected => hooks.disconnected,
                };
                if let Some(hook) = hook {
                    hook(controller);
                }
            }
            CallbackMessage::ScanStarted => {
                if let Some(hook) = self.scan_hooks.lock(|h| h.get().started) {
                    hook();
                }
            }
            CallbackMessage::ScanStopped => {
                if let Some(hook) = self.scan_hooks.lock(|h| h.get().stopped) {
                    hook();
                }
            }
        }
    }
}
