//! Error types
//!
//! Nothing in the engine is fatal. Foreground calls report [`Error`] so the
//! caller can retry; receive anomalies are absorbed by the interrupt
//! handler, which logs the [`RxError`] and counts it in the link
//! statistics.

/// Errors returned to foreground callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free driver packet available
    PoolExhausted,
    /// Application handle outside the slot table
    InvalidHandle,
    /// Application slot is queued, armed or in flight
    Busy,
    /// Buffer longer than the SIZE field can describe
    TooLarge,
}

/// Reasons the receiver discarded an in-progress packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// No free driver packet for an incoming frame
    PoolExhausted,
    /// Index byte names a slot outside the application table
    UnknownHandle(u8),
    /// Application slot is not armed, or still holds an unconsumed result
    SlotBusy(u8),
    /// Declared size exceeds the target buffer
    Oversize { declared: u16, capacity: u16 },
    /// Byte after the payload was not the END marker
    MissingEnd(u8),
    /// The serial port reported a receive error
    Line,
}
