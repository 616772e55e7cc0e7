//! Packet builder
//!
//! Foreground API that streams small amounts of data (console output,
//! command bytes) into driver packets. A message may span several
//! fragments: the first carries `FIRST`, the one closed by [`Bdpp::flush`]
//! carries `LAST`, and every fragment carries the message's usage class.
//!
//! A fragment that fills up is handed to the transmitter when the next byte
//! needs room, so the final fragment is always still open when the producer
//! flushes.

use crate::engine::{Bdpp, Engine};
use crate::error::Error;
use crate::packet::{PacketFlags, PacketId, Usage};

/// Builder state kept under the engine lock
#[derive(Debug)]
pub(crate) struct Builder {
    /// Driver packet under construction
    current: Option<u8>,
    /// Flags for the next fragment of the open message
    carry: PacketFlags,
    /// A message has been started and not yet flushed
    open: bool,
}

impl Builder {
    pub(crate) const fn new() -> Self {
        Self {
            current: None,
            carry: PacketFlags::EMPTY,
            open: false,
        }
    }
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Engine<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Queue the fragment under construction
    ///
    /// A non-final fragment passes its usage class, without `FIRST`, to the
    /// fragment that follows it.
    fn close_fragment(&mut self, last: bool) {
        let Some(index) = self.builder.current.take() else {
            return;
        };
        let id = PacketId::Driver(index);

        let flags = &mut self.pool.header_mut(id).flags;
        if last {
            flags.insert(PacketFlags::LAST);
        }
        flags.insert(PacketFlags::READY);
        self.builder.carry = *flags & PacketFlags::USAGE_MASK;

        trace!("fragment queued {:?} last={}", id, last);
        self.queue_tx(id);
    }

    /// Allocate a fresh fragment for the open message, starting a print
    /// message if none is open
    fn open_fragment(&mut self) -> Result<u8, Error> {
        if !self.builder.open {
            self.builder.carry = PacketFlags::from(Usage::Print) | PacketFlags::FIRST;
            self.builder.open = true;
        }

        let index = self.pool.alloc().ok_or(Error::PoolExhausted)?;
        self.pool.header_mut(PacketId::Driver(index)).flags = self.builder.carry;
        self.builder.current = Some(index);
        Ok(index)
    }

    pub(crate) fn flush(&mut self) {
        self.close_fragment(true);
        self.builder.carry = PacketFlags::EMPTY;
        self.builder.open = false;
    }

    pub(crate) fn start_outgoing(&mut self, usage: Usage) -> Result<(), Error> {
        self.flush();
        self.builder.carry = PacketFlags::from(usage) | PacketFlags::FIRST;
        self.builder.open = true;
        self.open_fragment().map(|_| ())
    }

    pub(crate) fn try_append_byte(&mut self, byte: u8) -> Result<(), Error> {
        if let Some(index) = self.builder.current {
            if self.pool.header(PacketId::Driver(index)).is_full() {
                self.close_fragment(false);
            }
        }

        let index = match self.builder.current {
            Some(index) => index,
            None => self.open_fragment()?,
        };

        let id = PacketId::Driver(index);
        let pos = self.pool.header(id).length;
        if !self.pool.store(id, pos as usize, byte) {
            return Err(Error::TooLarge);
        }
        self.pool.header_mut(id).length = pos + 1;
        Ok(())
    }

    /// Pick the usage class of a new message from its first byte
    fn infer_usage(&mut self, first: u8) {
        if self.builder.current.is_none() && !self.builder.open {
            self.builder.carry = PacketFlags::from(Usage::infer(first)) | PacketFlags::FIRST;
            self.builder.open = true;
        }
    }
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Bdpp<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Flush any open message and start a new one of the given class
    ///
    /// Fails with [`Error::PoolExhausted`] when no driver packet is free;
    /// the message is still started and its first fragment will be
    /// allocated by the next append.
    pub fn start_outgoing(&self, usage: Usage) -> Result<(), Error> {
        self.with_engine(|engine| engine.start_outgoing(usage))
    }

    /// Append one byte without waiting
    ///
    /// Fails with [`Error::PoolExhausted`] when a new fragment is needed
    /// and the pool is empty; nothing is consumed in that case.
    pub fn try_append_byte(&self, byte: u8) -> Result<(), Error> {
        self.with_engine(|engine| engine.try_append_byte(byte))
    }

    /// Append one byte, waiting for a free packet if needed
    pub async fn append_byte(&self, byte: u8) {
        while self.try_append_byte(byte).is_err() {
            self.packet_freed().await;
        }
    }

    /// Append a byte sequence, waiting for free packets as needed
    pub async fn append_bytes(&self, data: &[u8]) {
        for &byte in data {
            self.append_byte(byte).await;
        }
    }

    /// Append a byte sequence, choosing the usage class from its first
    /// byte when no message is open
    pub async fn append_inferred(&self, data: &[u8]) {
        if let Some(&first) = data.first() {
            self.with_engine(|engine| engine.infer_usage(first));
        }
        self.append_bytes(data).await;
    }

    /// Append one byte, busy-polling until a packet is free
    ///
    /// Only returns once the serial interrupt has drained a packet, so it
    /// must not be called with the serial interrupt masked.
    pub fn append_byte_blocking(&self, byte: u8) {
        while self.try_append_byte(byte).is_err() {
            core::hint::spin_loop();
        }
    }

    /// Blocking variant of [`Bdpp::append_bytes`]
    pub fn append_bytes_blocking(&self, data: &[u8]) {
        for &byte in data {
            self.append_byte_blocking(byte);
        }
    }

    /// Blocking variant of [`Bdpp::append_inferred`]
    pub fn append_inferred_blocking(&self, data: &[u8]) {
        if let Some(&first) = data.first() {
            self.with_engine(|engine| engine.infer_usage(first));
        }
        self.append_bytes_blocking(data);
    }

    /// Close the open message: mark its last fragment `LAST` and queue it
    ///
    /// A no-op when nothing is under construction, so the foreground loop
    /// can call it every iteration to bound the latency of partial
    /// fragments.
    pub fn flush(&self) {
        self.with_engine(|engine| engine.flush());
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::MockPort;
    use crate::Received;
    use embassy_futures::{block_on, join::join, yield_now};
    use proptest::prelude::*;
    use std::vec::Vec;

    type SmallBdpp = Bdpp<'static, 4, 8, 2>;

    fn drain(bdpp: &SmallBdpp) -> Vec<u8> {
        let mut port = MockPort::new();
        bdpp.service(&mut port);
        port.take_output()
    }

    fn deliver(wire: &[u8]) -> Vec<Received<8>> {
        let peer = SmallBdpp::new();
        let mut port = MockPort::new();
        port.push_input(wire);
        peer.service(&mut port);
        core::iter::from_fn(|| peer.receive()).collect()
    }

    #[test]
    fn test_abc_print_packet_wire_bytes() {
        let bdpp = SmallBdpp::new();
        bdpp.start_outgoing(Usage::Print).unwrap();
        for &b in b"ABC" {
            bdpp.try_append_byte(b).unwrap();
        }
        bdpp.flush();

        assert_eq!(drain(&bdpp), [0x8C, 0x0C, 0x03, 0x00, b'A', b'B', b'C', 0xAE]);
        assert_eq!(bdpp.free_packets(), 4);
    }

    #[test]
    fn test_partial_fragment_flushes_with_short_length() {
        let bdpp = SmallBdpp::new();
        bdpp.start_outgoing(Usage::Command).unwrap();
        bdpp.try_append_byte(0x01).unwrap();
        bdpp.flush();

        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, [0x01]);
        assert!(packets[0].is_first() && packets[0].is_last());
        assert_eq!(packets[0].usage(), Some(Usage::Command));
    }

    #[test]
    fn test_flush_without_open_fragment_is_noop() {
        let bdpp = SmallBdpp::new();
        for _ in 0..10 {
            bdpp.flush();
        }
        assert_eq!(bdpp.pending_packets(), 0);
        assert!(drain(&bdpp).is_empty());
    }

    #[test]
    fn test_exact_capacity_message_single_fragment() {
        let bdpp = SmallBdpp::new();
        bdpp.start_outgoing(Usage::Print).unwrap();
        for b in 0..8u8 {
            bdpp.try_append_byte(b'a' + b).unwrap();
        }
        assert_eq!(bdpp.pending_packets(), 0);
        bdpp.flush();

        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_last());
        assert_eq!(packets[0].payload.len(), 8);
    }

    #[test]
    fn test_fragments_propagate_usage() {
        let bdpp = SmallBdpp::new();
        bdpp.start_outgoing(Usage::Response).unwrap();
        for b in 0..20u8 {
            bdpp.try_append_byte(b).unwrap();
        }
        bdpp.flush();

        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets.len(), 3);
        assert!(packets[0].is_first() && !packets[0].is_last());
        assert!(!packets[1].is_first() && !packets[1].is_last());
        assert!(!packets[2].is_first() && packets[2].is_last());
        for packet in &packets {
            assert_eq!(packet.usage(), Some(Usage::Response));
        }
        assert_eq!(packets[2].payload.len(), 4);
    }

    #[test]
    fn test_exhausted_pool_fails_then_recovers() {
        let bdpp = SmallBdpp::new();
        for b in 0..32u8 {
            bdpp.try_append_byte(b).unwrap();
        }
        // Four full fragments: three queued, one open
        assert_eq!(bdpp.free_packets(), 0);
        assert_eq!(bdpp.try_append_byte(0xFF), Err(Error::PoolExhausted));

        let mut port = MockPort::new();
        port.set_tx_room(6 + 8);
        bdpp.service(&mut port);
        assert_eq!(bdpp.free_packets(), 1);

        bdpp.try_append_byte(0xFF).unwrap();
        assert_eq!(bdpp.free_packets(), 0);
    }

    #[test]
    fn test_start_outgoing_reports_exhaustion() {
        let bdpp = SmallBdpp::new();
        for _ in 0..4 {
            bdpp.start_outgoing(Usage::Print).unwrap();
        }
        assert_eq!(bdpp.start_outgoing(Usage::Command), Err(Error::PoolExhausted));

        // The message is still open and picks up its class once a packet frees
        drain(&bdpp);
        bdpp.try_append_byte(0x05).unwrap();
        bdpp.flush();
        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].usage(), Some(Usage::Command));
        assert!(packets[0].is_first());
    }

    #[test]
    fn test_usage_inferred_from_first_byte() {
        let bdpp = SmallBdpp::new();
        block_on(bdpp.append_inferred(b"hi"));
        bdpp.flush();
        block_on(bdpp.append_inferred(&[0x17, 0x00]));
        bdpp.flush();

        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets[0].usage(), Some(Usage::Print));
        assert_eq!(packets[1].usage(), Some(Usage::Command));
    }

    #[test]
    fn test_inference_ignored_mid_message() {
        let bdpp = SmallBdpp::new();
        bdpp.start_outgoing(Usage::Response).unwrap();
        bdpp.append_inferred_blocking(b"text");
        bdpp.flush();

        let packets = deliver(&drain(&bdpp));
        assert_eq!(packets[0].usage(), Some(Usage::Response));
    }

    #[test]
    fn test_async_append_waits_for_interrupt() {
        let bdpp = SmallBdpp::new();
        let data: Vec<u8> = (0..100u8).collect();
        let mut wire = Vec::new();

        let producer = async {
            bdpp.append_bytes(&data).await;
            bdpp.flush();
        };
        let interrupt = async {
            let mut port = MockPort::new();
            for _ in 0..200 {
                port.set_tx_room(4);
                bdpp.service(&mut port);
                wire.extend(port.take_output());
                yield_now().await;
            }
        };
        block_on(join(producer, interrupt));

        let payload: Vec<u8> = deliver_all(&wire);
        assert_eq!(payload, data);
    }

    fn deliver_all(wire: &[u8]) -> Vec<u8> {
        let peer = Bdpp::<'static, 32, 8, 2>::new();
        let mut port = MockPort::new();
        port.push_input(wire);
        peer.service(&mut port);
        let mut out = Vec::new();
        while let Some(packet) = peer.receive() {
            out.extend_from_slice(&packet.payload);
        }
        out
    }

    proptest! {
        #[test]
        fn prop_fragments_reassemble(data in proptest::collection::vec(any::<u8>(), 1..28)) {
            let bdpp = SmallBdpp::new();
            bdpp.start_outgoing(Usage::Command).unwrap();
            for &b in &data {
                bdpp.try_append_byte(b).unwrap();
            }
            bdpp.flush();

            let packets = deliver(&drain(&bdpp));
            prop_assert_eq!(packets.len(), data.len().div_ceil(8));
            prop_assert!(packets[0].is_first());
            prop_assert!(packets.last().unwrap().is_last());
            for (i, packet) in packets.iter().enumerate() {
                prop_assert_eq!(packet.is_last(), i == packets.len() - 1);
                prop_assert_eq!(packet.is_first(), i == 0);
                prop_assert_eq!(packet.usage(), Some(Usage::Command));
            }

            let joined: Vec<u8> = packets.iter().flat_map(|p| p.payload.iter().copied()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
