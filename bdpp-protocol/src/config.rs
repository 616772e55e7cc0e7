//! Link configuration
//!
//! Persisted alongside the rest of the board configuration as
//! postcard-serialized binary data when the `serde` feature is enabled.

use bdpp_hal::UartConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Serial link and protocol settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Line settings for the UART carrying the protocol
    pub serial: UartConfig,
    /// Use packet framing for this session
    ///
    /// Normally the result of the start-of-day handshake with the peer;
    /// when false the link carries raw console bytes.
    pub enabled: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            serial: UartConfig::default(),
            enabled: false,
        }
    }
}
