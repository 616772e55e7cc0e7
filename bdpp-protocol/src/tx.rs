//! Transmit wire state machine
//!
//! Serializes one packet at a time, one byte per transition, resuming
//! where it left off each time the serial transmitter becomes ready.

use bdpp_hal::SerialPort;

use crate::packet::{PacketFlags, PacketId, QueueKind};
use crate::pool::Pool;
use crate::stats::LinkStats;
use crate::wire::{is_reserved, END, ESCAPE, START, WIRE_FLAGS};

/// Transmitter states, named after the last thing written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    /// No packet in flight
    Idle,
    SentStart,
    SentFlags,
    SentIndex,
    SentSize1,
    SentSize2,
    /// Writing payload bytes
    SentData,
    /// ESCAPE written, literal byte still to go
    SentEsc,
    /// Payload complete, END still to go
    SentAllData,
}

/// What a [`Transmitter::poll`] run changed outside the transmitter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TxOutcome {
    /// A driver packet went back on the free queue
    pub freed: bool,
    /// Nothing left to send, transmit notification disabled
    pub idle: bool,
}

#[derive(Debug)]
pub(crate) struct Transmitter {
    state: TxState,
    packet: Option<PacketId>,
    pos: u16,
}

impl Transmitter {
    pub(crate) const fn new() -> Self {
        Self {
            state: TxState::Idle,
            packet: None,
            pos: 0,
        }
    }

    pub(crate) fn state(&self) -> TxState {
        self.state
    }

    /// Packet currently being written, if any
    pub(crate) fn current(&self) -> Option<PacketId> {
        self.packet
    }

    /// Run transitions for as long as the port accepts bytes
    pub(crate) fn poll<P, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
        port: &mut P,
        stats: &mut LinkStats,
    ) -> TxOutcome
    where
        P: SerialPort,
    {
        let mut outcome = TxOutcome::default();

        while port.tx_ready() {
            let id = match (self.state, self.packet) {
                (TxState::Idle, _) => match pool.dequeue(QueueKind::PendingTx) {
                    Some(id) => {
                        trace!("TX start {:?}", id);
                        self.packet = Some(id);
                        self.pos = 0;
                        emit(port, stats, START);
                        self.state = TxState::SentStart;
                        continue;
                    }
                    None => {
                        port.set_tx_notify(false);
                        outcome.idle = true;
                        break;
                    }
                },
                (_, Some(id)) => id,
                (_, None) => {
                    self.state = TxState::Idle;
                    continue;
                }
            };

            let header = *pool.header(id);
            let [size_lo, size_hi] = header.length.to_le_bytes();

            self.state = match self.state {
                TxState::Idle => TxState::Idle,
                TxState::SentStart => {
                    emit(port, stats, (header.flags & WIRE_FLAGS).bits());
                    TxState::SentFlags
                }
                TxState::SentFlags => match id {
                    PacketId::App(handle) => {
                        let index = pool.app_slot(handle).map_or(handle, |slot| slot.index);
                        emit(port, stats, index);
                        TxState::SentIndex
                    }
                    PacketId::Driver(_) => {
                        emit(port, stats, size_lo);
                        TxState::SentSize1
                    }
                },
                TxState::SentIndex => {
                    emit(port, stats, size_lo);
                    TxState::SentSize1
                }
                TxState::SentSize1 => {
                    emit(port, stats, size_hi);
                    TxState::SentSize2
                }
                TxState::SentSize2 => self.data_state(header.length),
                TxState::SentData => {
                    let byte = pool.payload_byte(id, self.pos as usize).unwrap_or(0);
                    if is_reserved(byte) {
                        emit(port, stats, ESCAPE);
                        TxState::SentEsc
                    } else {
                        emit(port, stats, byte);
                        self.pos += 1;
                        self.data_state(header.length)
                    }
                }
                TxState::SentEsc => {
                    let byte = pool.payload_byte(id, self.pos as usize).unwrap_or(0);
                    emit(port, stats, byte);
                    self.pos += 1;
                    self.data_state(header.length)
                }
                TxState::SentAllData => {
                    emit(port, stats, END);
                    outcome.freed |= self.complete(pool, id);
                    stats.sent();
                    TxState::Idle
                }
            };
        }

        outcome
    }

    fn data_state(&self, length: u16) -> TxState {
        if self.pos >= length {
            TxState::SentAllData
        } else {
            TxState::SentData
        }
    }

    /// Mark the packet done; driver packets go straight back to the pool
    fn complete<const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
        id: PacketId,
    ) -> bool {
        trace!("TX done {:?}", id);
        self.packet = None;
        self.pos = 0;

        let flags = &mut pool.header_mut(id).flags;
        flags.insert(PacketFlags::DONE);
        flags.remove(PacketFlags::READY);

        match id {
            PacketId::Driver(index) => {
                pool.free(index);
                true
            }
            PacketId::App(_) => false,
        }
    }
}

fn emit<P: SerialPort>(port: &mut P, stats: &mut LinkStats, byte: u8) {
    port.write_byte(byte);
    stats.byte_out();
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::mock::MockPort;
    use crate::packet::Usage;
    use crate::pool::AppBuffer;
    use std::vec::Vec;

    type TestPool = Pool<'static, 2, 8, 2>;

    fn queue_driver(pool: &mut TestPool, flags: PacketFlags, data: &[u8]) -> u8 {
        let index = pool.alloc().unwrap();
        let id = PacketId::Driver(index);
        for (pos, &b) in data.iter().enumerate() {
            assert!(pool.store(id, pos, b));
        }
        let header = pool.header_mut(id);
        header.length = data.len() as u16;
        header.flags = flags | PacketFlags::READY;
        pool.enqueue(QueueKind::PendingTx, id);
        index
    }

    fn run(tx: &mut Transmitter, pool: &mut TestPool) -> (Vec<u8>, TxOutcome) {
        let mut port = MockPort::new();
        let mut stats = LinkStats::default();
        let outcome = tx.poll(pool, &mut port, &mut stats);
        (port.take_output(), outcome)
    }

    #[test]
    fn test_driver_packet_wire_bytes() {
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();
        let flags = PacketFlags::from(Usage::Print) | PacketFlags::FIRST | PacketFlags::LAST;
        queue_driver(&mut pool, flags, b"ABC");

        let (out, outcome) = run(&mut tx, &mut pool);
        assert_eq!(out, [0x8C, 0x0C, 0x03, 0x00, b'A', b'B', b'C', 0xAE]);
        assert!(outcome.freed);
        assert!(outcome.idle);
        assert_eq!(tx.state(), TxState::Idle);
        assert_eq!(pool.queue_len(QueueKind::Free), 2);
        pool.check_queues();
    }

    #[test]
    fn test_reserved_bytes_are_escaped() {
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();
        let flags = PacketFlags::from(Usage::Command) | PacketFlags::FIRST | PacketFlags::LAST;
        queue_driver(&mut pool, flags, &[0x8C, 0x01, 0x9D, 0xAE]);

        let (out, _) = run(&mut tx, &mut pool);
        assert_eq!(
            out,
            [0x8C, 0x0D, 0x04, 0x00, 0x9D, 0x8C, 0x01, 0x9D, 0x9D, 0x9D, 0xAE, 0xAE]
        );
    }

    #[test]
    fn test_empty_packet_skips_data() {
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();
        queue_driver(&mut pool, PacketFlags::FIRST | PacketFlags::LAST, &[]);

        let (out, _) = run(&mut tx, &mut pool);
        assert_eq!(out, [0x8C, 0x0C, 0x00, 0x00, 0xAE]);
    }

    #[test]
    fn test_app_packet_carries_index_and_stays_done() {
        static DATA: [u8; 2] = [0x10, 0x20];
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();

        let slot = pool.app_slot_mut(1).unwrap();
        slot.buffer = AppBuffer::Tx(&DATA);
        slot.header.length = 2;
        slot.header.capacity = 2;
        slot.header.flags = PacketFlags::APP_OWNED
            | PacketFlags::from(Usage::Response)
            | PacketFlags::FIRST
            | PacketFlags::LAST
            | PacketFlags::READY;
        pool.enqueue(QueueKind::PendingTx, PacketId::App(1));

        let (out, outcome) = run(&mut tx, &mut pool);
        assert_eq!(out, [0x8C, 0x8E, 0x01, 0x02, 0x00, 0x10, 0x20, 0xAE]);
        assert!(!outcome.freed);

        let flags = pool.header(PacketId::App(1)).flags;
        assert!(flags.contains(PacketFlags::DONE));
        assert!(!flags.contains(PacketFlags::READY));
    }

    #[test]
    fn test_resumes_across_ready_windows() {
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();
        let mut stats = LinkStats::default();
        queue_driver(&mut pool, PacketFlags::FIRST | PacketFlags::LAST, &[0x9D, 0x42]);

        let mut port = MockPort::new();
        let mut out = Vec::new();
        for _ in 0..16 {
            port.set_tx_room(1);
            tx.poll(&mut pool, &mut port, &mut stats);
            out.extend(port.take_output());
            assert!(tx.current().is_some() || tx.state() == TxState::Idle);
        }

        assert_eq!(out, [0x8C, 0x0C, 0x02, 0x00, 0x9D, 0x9D, 0x42, 0xAE]);
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.bytes_out, 8);
    }

    #[test]
    fn test_packets_sent_in_queue_order() {
        let mut pool = TestPool::new();
        let mut tx = Transmitter::new();
        queue_driver(&mut pool, PacketFlags::FIRST, b"1");
        queue_driver(&mut pool, PacketFlags::LAST, b"2");

        let (out, _) = run(&mut tx, &mut pool);
        assert_eq!(
            out,
            [0x8C, 0x04, 0x01, 0x00, b'1', 0xAE, 0x8C, 0x08, 0x01, 0x00, b'2', 0xAE]
        );
    }
}
