//! Unified error types.
//!
//! All variants carry only fixed-size data - no `alloc`. `Debug` is
//! derived unconditionally, `defmt::Format` under the `defmt` feature.

/// Top-level error type used across the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The underlying BLE host stack reported an error.
    Host(HostError),

    /// The controller slot table is full.
    RegistryFull,

    /// The description table is at its hard cap.
    DescriptionTableFull,

    /// A controller description with no enabled channel was rejected.
    NoEnabledChannel,

    /// Operation on a signal or session that was never initialized.
    NotInitialized,

    /// Init called on a signal or session that is already live.
    AlreadyInitialized,

    /// An encoder rejected the value outright.
    InvalidValue,

    /// The encode buffer hit its growth cap and the value still did not fit.
    BufferTooShort,
}

/// Subset of host-stack errors the framework propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// Raw error code from the host stack.
    Raw(u32),
    /// Scan could not start or was cancelled.
    ScanFailed,
    /// Connection attempt failed or could not be issued.
    ConnectFailed,
    /// GATT service/characteristic discovery failed.
    DiscoveryFailed,
    /// Characteristic subscribe/unsubscribe failed.
    NotifyFailed,
    /// Characteristic write failed.
    WriteFailed,
    /// The link dropped mid-operation.
    LinkLost,
    /// The requested operation is not supported by this host stack.
    Unsupported,
}

/// Outcome an encoder reports when it cannot produce bytes.
///
/// `BufferTooShort` is recoverable - the signal grows its buffer and
/// retries. `InvalidValue` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The value is outside the codec's representable range.
    InvalidValue,
    /// The output buffer is too small for the encoded layout.
    BufferTooShort,
}

// Convenience conversions

impl From<HostError> for Error {
    fn from(e: HostError) -> Self {
        Error::Host(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::InvalidValue => Error::InvalidValue,
            EncodeError::BufferTooShort => Error::BufferTooShort,
        }
    }
}
