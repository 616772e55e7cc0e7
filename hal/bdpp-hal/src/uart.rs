//! UART serial line abstractions
//!
//! The protocol engine runs from the serial interrupt and moves exactly one
//! byte per step, so the line is modelled as level conditions plus
//! single-byte primitives rather than buffered reads and writes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Serial line as seen from the UART interrupt handler
///
/// `read_byte` is only called after `rx_ready` returned `true`, and
/// `write_byte` only after `tx_ready` returned `true`.
pub trait SerialPort {
    /// Error reported by the receiver (overrun, framing, ...)
    type Error;

    /// At least one received byte is waiting to be read
    fn rx_ready(&mut self) -> bool;

    /// The transmitter can accept another byte
    fn tx_ready(&mut self) -> bool;

    /// Read one received byte
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Write one byte to the transmitter
    fn write_byte(&mut self, byte: u8);

    /// Enable or disable the "transmitter ready" interrupt source
    ///
    /// The engine disables it when it has nothing left to send so the
    /// interrupt does not fire continuously.
    fn set_tx_notify(&mut self, enabled: bool);
}

impl<T: SerialPort + ?Sized> SerialPort for &mut T {
    type Error = T::Error;

    fn rx_ready(&mut self) -> bool {
        T::rx_ready(self)
    }

    fn tx_ready(&mut self) -> bool {
        T::tx_ready(self)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        T::read_byte(self)
    }

    fn write_byte(&mut self, byte: u8) {
        T::write_byte(self, byte)
    }

    fn set_tx_notify(&mut self, enabled: bool) {
        T::set_tx_notify(self, enabled)
    }
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Hardware RTS/CTS flow control
    ///
    /// The packet protocol has no retransmission, so the link must not
    /// drop bytes.
    pub hardware_flow_control: bool,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 1_152_000,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            hardware_flow_control: true,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StopBits {
    One,
    Two,
}
