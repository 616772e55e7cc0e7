//! Packet model
//!
//! A packet is the sole unit of transfer. Its header lives in a pool slot
//! and its payload in either a driver-owned buffer bound to the slot or a
//! buffer lent by the application.

use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Packet flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// No flags set
    pub const EMPTY: Self = Self(0x00);
    /// Usage class field (two bits)
    pub const USAGE_MASK: Self = Self(0x03);
    /// First fragment of a message
    pub const FIRST: Self = Self(0x04);
    /// Last fragment of a message
    pub const LAST: Self = Self(0x08);
    /// Queued for transmit or armed for receive
    pub const READY: Self = Self(0x10);
    /// Transfer complete
    pub const DONE: Self = Self(0x20);
    /// Bound to a reception rather than a transmission
    pub const FOR_RX: Self = Self(0x40);
    /// Buffer belongs to the application, an index byte follows on the wire
    pub const APP_OWNED: Self = Self(0x80);

    /// Build from a raw flags byte
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flags byte
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Usage class carried in the low two bits
    ///
    /// Returns `None` for the reserved value 3.
    pub fn usage(self) -> Option<Usage> {
        Usage::from_bits(self.0 & Self::USAGE_MASK.0)
    }

    /// Replace the usage class
    pub fn with_usage(self, usage: Usage) -> Self {
        Self((self.0 & !Self::USAGE_MASK.0) | usage as u8)
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for PacketFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for PacketFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl From<Usage> for PacketFlags {
    fn from(usage: Usage) -> Self {
        Self(usage as u8)
    }
}

/// Semantic category of a packet's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Usage {
    /// Console text
    #[default]
    Print = 0,
    /// Command bytes
    Command = 1,
    /// Response to a command
    Response = 2,
}

impl Usage {
    /// Decode the two-bit usage field
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Usage::Print),
            1 => Some(Usage::Command),
            2 => Some(Usage::Response),
            _ => None,
        }
    }

    /// Usage class implied by the first byte of a new message
    ///
    /// Printable ASCII starts console text, anything else a command.
    pub fn infer(first: u8) -> Self {
        if (0x20..=0x7E).contains(&first) {
            Usage::Print
        } else {
            Usage::Command
        }
    }
}

/// Identity of a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketId {
    /// Slot in the driver packet table
    Driver(u8),
    /// Slot in the application packet table
    App(u8),
}

/// Queues a packet can be a member of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueKind {
    /// Driver packets available for allocation
    Free,
    /// Packets waiting for the transmitter
    PendingTx,
    /// Received driver packets waiting for the consumer
    CompletedRx,
}

/// Packet header shared by driver and application slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    /// Usage, fragment and ownership bits
    pub flags: PacketFlags,
    /// Maximum payload bytes the buffer can hold
    pub capacity: u16,
    /// Bytes to send, or bytes received so far
    pub length: u16,
    /// Next member of the queue this packet is on
    pub(crate) next: Option<PacketId>,
    /// Queue this packet is on, if any
    pub(crate) queue: Option<QueueKind>,
}

impl Packet {
    pub(crate) const fn new(flags: PacketFlags, capacity: u16) -> Self {
        Self {
            flags,
            capacity,
            length: 0,
            next: None,
            queue: None,
        }
    }

    /// Whether the payload buffer is full
    pub fn is_full(&self) -> bool {
        self.length >= self.capacity
    }
}
