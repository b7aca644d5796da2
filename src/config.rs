//! Compile-time configuration.
//!
//! Pool sizes, queue depths and timing parameters live here so they can
//! be tuned in one place.

use embassy_time::Duration;

// Connection pool

/// Maximum simultaneous BLE links the host stack is configured for.
/// A registry may be constructed with a lower runtime limit, never a
/// higher one.
pub const MAX_LINKS: usize = 2;

/// Maximum controller slots an application can register.
pub const MAX_CONTROLLERS: usize = 8;

// Model matching

/// Hard cap on registered controller descriptions. Matches the width of
/// the `u64` match mask.
pub const MAX_DESCRIPTIONS: usize = 64;

/// Number of peer addresses the matcher keeps cached match results for.
/// The cache is last-scan-wins; the oldest entry is evicted when full.
pub const MATCH_CACHE_SIZE: usize = 8;

// Queues

/// Depth of the client event queue feeding the registry's consumer task.
pub const CLIENT_EVENT_QUEUE_DEPTH: usize = 8;

/// Depth of the user callback queue.
pub const CALLBACK_QUEUE_DEPTH: usize = 8;

// Timing

/// Duration of one auto-scan window.
pub const SCAN_WINDOW: Duration = Duration::from_secs(8);

/// Timeout installed on each outgoing connect request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// Session bring-up

/// Total attempts at initializing a controller session after bonding.
/// After this many failures the link is dropped and the slot released.
pub const SESSION_INIT_ATTEMPTS: usize = 2;

// Signal buffers

/// Initial logical capacity of an outgoing signal's encode buffer.
pub const SIGNAL_BUFFER_INITIAL: usize = 8;

/// Hard cap the encode buffer may grow to (geometric, x2 per step).
/// Also the backing capacity of both halves of the double buffer.
pub const SIGNAL_BUFFER_MAX: usize = 64;
