//! Wire-level constants
//!
//! Frame format:
//! - START (1 byte): 0x8C
//! - FLAGS (1 byte): usage class and fragment markers
//! - INDEX (1 byte): application slot, present only when FLAGS has APP_OWNED
//! - SIZE (2 bytes): payload length, low byte first
//! - DATA (SIZE bytes): payload, reserved values preceded by ESCAPE
//! - END (1 byte): 0xAE

use crate::packet::PacketFlags;

/// Frame start marker
pub const START: u8 = 0x8C;

/// Escape marker, the following data byte is literal
pub const ESCAPE: u8 = 0x9D;

/// Frame end marker
pub const END: u8 = 0xAE;

/// Flag bits that travel on the wire
///
/// READY, DONE and FOR_RX describe local bookkeeping and are never sent.
pub const WIRE_FLAGS: PacketFlags = PacketFlags::from_bits(
    PacketFlags::USAGE_MASK.bits()
        | PacketFlags::FIRST.bits()
        | PacketFlags::LAST.bits()
        | PacketFlags::APP_OWNED.bits(),
);

/// Largest payload a SIZE field can describe
pub const MAX_WIRE_SIZE: usize = u16::MAX as usize;

/// Whether a payload byte must be preceded by [`ESCAPE`]
#[inline]
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, START | ESCAPE | END)
}
