//! Generic signal channels.
//!
//! A signal channel is a typed, directional data path bound to one GATT
//! characteristic of a live link:
//!
//! * [`IncomingSignal`] - notifications are decoded synchronously in the
//!   host's notification path and cached; reads are O(1) copies of the
//!   last good value. An optional subscriber callback runs on a
//!   background dispatch step, never under the store lock.
//! * [`OutgoingSignal`] - values are encoded under the store lock into a
//!   growable buffer, the encode/send buffer pair is swapped by move,
//!   and the radio write happens on a background send step so callers
//!   never block on I/O.
//!
//! Codec functions are plain `fn` pointers; per-model byte layouts live
//! entirely inside them.

mod incoming;
mod outgoing;

pub use incoming::IncomingSignal;
pub use outgoing::OutgoingSignal;

use crate::error::EncodeError;

/// Decode contract: parse `data` into `out`, returning the number of
/// bytes consumed, or `0` when the report is invalid. On `0` the caller
/// keeps its previous value; decoders may scribble on `out` freely
/// because the store hands them a scratch copy.
pub type DecodeFn<T> = fn(data: &[u8], out: &mut T) -> usize;

/// Encode contract: serialize `value` into `buf`, returning the number
/// of bytes written. [`EncodeError::BufferTooShort`] asks the caller for
/// a bigger buffer; [`EncodeError::InvalidValue`] is terminal.
pub type EncodeFn<T> = fn(value: &T, buf: &mut [u8]) -> Result<usize, EncodeError>;
