//! Auto-scan control.
//!
//! A single control loop, woken by notification (never a timer),
//! re-evaluates whether scanning should be running. Only two of the
//! four `enabled x scanning` combinations act: enabled+idle with link
//! tokens available starts a time-bounded scan window; disabled+scanning
//! stops it. The other two hold. Wake points are enable/disable, slot
//! release, slot settled, and the host's scan-ended report, so the scan
//! state converges within one notification latency of any change.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, Ordering};

/// What the control loop should do on this wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanAction {
    Start,
    Stop,
    Hold,
}

/// Pure four-way decision.
pub fn decide(enabled: bool, scanning: bool, free_links: usize) -> ScanAction {
    match (enabled, scanning) {
        (true, false) if free_links > 0 => ScanAction::Start,
        (false, true) => ScanAction::Stop,
        _ => ScanAction::Hold,
    }
}

/// Shared auto-scan state: desired flag, actual flag, wake signal.
pub(crate) struct AutoScanState {
    enabled: AtomicBool,
    scanning: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl AutoScanState {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    pub fn scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn set_scanning(&self, on: bool) {
        self.scanning.store(on, Ordering::Release);
    }

    /// Wake the control loop for a re-evaluation.
    pub fn notify(&self) {
        self.wake.signal(());
    }

    pub async fn wait(&self) {
        self.wake.wait().await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table() {
        // enabled + idle: start only with tokens available
        assert_eq!(decide(true, false, 2), ScanAction::Start);
        assert_eq!(decide(true, false, 1), ScanAction::Start);
        assert_eq!(decide(true, false, 0), ScanAction::Hold);

        // disabled + scanning: stop
        assert_eq!(decide(false, true, 0), ScanAction::Stop);
        assert_eq!(decide(false, true, 2), ScanAction::Stop);

        // the two deliberate no-ops
        assert_eq!(decide(true, true, 2), ScanAction::Hold);
        assert_eq!(decide(false, false, 2), ScanAction::Hold);
    }

    #[test]
    fn notify_wakes_waiter() {
        let state = AutoScanState::new();
        state.notify();
        embassy_futures::block_on(state.wait());
        state.set_enabled(true);
        state.set_scanning(true);
        assert!(state.enabled());
        assert!(state.scanning());
    }
}
