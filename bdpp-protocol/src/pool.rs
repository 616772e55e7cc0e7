//! Packet pool and queues
//!
//! All packets live in two fixed tables: the driver table, whose slots own
//! small payload buffers for the lifetime of the pool, and the application
//! table, whose slots reference buffers lent by the caller. Queues are
//! singly linked lists threaded through the slot headers by [`PacketId`],
//! so a packet can only ever be on one queue and membership is recorded in
//! the header itself.

use core::mem;

use crate::packet::{Packet, PacketFlags, PacketId, QueueKind};
use crate::wire::MAX_WIRE_SIZE;

/// Buffer lent to an application slot
#[derive(Debug, Default, PartialEq, Eq)]
pub enum AppBuffer<'a> {
    /// Nothing lent
    #[default]
    Empty,
    /// Payload to transmit
    Tx(&'a [u8]),
    /// Space to receive into
    Rx(&'a mut [u8]),
}

impl<'a> AppBuffer<'a> {
    fn get(&self, pos: usize) -> Option<u8> {
        match self {
            AppBuffer::Empty => None,
            AppBuffer::Tx(buf) => buf.get(pos).copied(),
            AppBuffer::Rx(buf) => buf.get(pos).copied(),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            AppBuffer::Empty => &[],
            AppBuffer::Tx(buf) => buf,
            AppBuffer::Rx(buf) => buf,
        }
    }
}

/// Driver-owned slot with its permanently bound buffer
#[derive(Debug)]
pub(crate) struct DriverSlot<const SIZE: usize> {
    pub(crate) header: Packet,
    buf: [u8; SIZE],
}

/// Application-owned slot
#[derive(Debug)]
pub(crate) struct AppSlot<'a> {
    pub(crate) header: Packet,
    pub(crate) index: u8,
    pub(crate) buffer: AppBuffer<'a>,
}

impl<'a> AppSlot<'a> {
    /// Take back the lent buffer, leaving the slot idle
    pub(crate) fn reset(&mut self) -> AppBuffer<'a> {
        self.header.flags = PacketFlags::APP_OWNED;
        self.header.capacity = 0;
        self.header.length = 0;
        mem::take(&mut self.buffer)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Queue {
    head: Option<PacketId>,
    tail: Option<PacketId>,
    len: usize,
}

/// Fixed packet tables plus the free, pending-transmit and
/// completed-receive queues
#[derive(Debug)]
pub(crate) struct Pool<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
{
    driver: [DriverSlot<PACKET_SIZE>; PACKETS],
    app: [AppSlot<'a>; APP_SLOTS],
    free: Queue,
    pending_tx: Queue,
    completed_rx: Queue,
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Pool<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Create the tables with every driver packet on the free queue and
    /// every application slot idle
    pub(crate) fn new() -> Self {
        assert!(PACKETS <= 256 && APP_SLOTS <= 256, "slot index must fit in a byte");
        assert!(PACKET_SIZE > 0, "driver packets need a payload buffer");

        let capacity = PACKET_SIZE.min(MAX_WIRE_SIZE) as u16;
        let mut pool = Self {
            driver: core::array::from_fn(|_| DriverSlot {
                header: Packet::new(PacketFlags::EMPTY, capacity),
                buf: [0; PACKET_SIZE],
            }),
            app: core::array::from_fn(|i| AppSlot {
                header: Packet::new(PacketFlags::APP_OWNED, 0),
                index: i as u8,
                buffer: AppBuffer::Empty,
            }),
            free: Queue::default(),
            pending_tx: Queue::default(),
            completed_rx: Queue::default(),
        };

        for i in 0..PACKETS {
            pool.enqueue(QueueKind::Free, PacketId::Driver(i as u8));
        }
        pool
    }

    pub(crate) fn header(&self, id: PacketId) -> &Packet {
        match id {
            PacketId::Driver(i) => &self.driver[i as usize].header,
            PacketId::App(i) => &self.app[i as usize].header,
        }
    }

    pub(crate) fn header_mut(&mut self, id: PacketId) -> &mut Packet {
        match id {
            PacketId::Driver(i) => &mut self.driver[i as usize].header,
            PacketId::App(i) => &mut self.app[i as usize].header,
        }
    }

    pub(crate) fn app_slot(&self, handle: u8) -> Option<&AppSlot<'a>> {
        self.app.get(handle as usize)
    }

    pub(crate) fn app_slot_mut(&mut self, handle: u8) -> Option<&mut AppSlot<'a>> {
        self.app.get_mut(handle as usize)
    }

    fn queue(&self, kind: QueueKind) -> &Queue {
        match kind {
            QueueKind::Free => &self.free,
            QueueKind::PendingTx => &self.pending_tx,
            QueueKind::CompletedRx => &self.completed_rx,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut Queue {
        match kind {
            QueueKind::Free => &mut self.free,
            QueueKind::PendingTx => &mut self.pending_tx,
            QueueKind::CompletedRx => &mut self.completed_rx,
        }
    }

    /// Append a packet to the tail of a queue
    pub(crate) fn enqueue(&mut self, kind: QueueKind, id: PacketId) {
        let packet = self.header_mut(id);
        debug_assert!(packet.queue.is_none(), "packet is already on a queue");
        packet.next = None;
        packet.queue = Some(kind);

        match self.queue(kind).tail {
            Some(tail) => self.header_mut(tail).next = Some(id),
            None => self.queue_mut(kind).head = Some(id),
        }

        let queue = self.queue_mut(kind);
        queue.tail = Some(id);
        queue.len += 1;
    }

    /// Remove and return the head of a queue
    pub(crate) fn dequeue(&mut self, kind: QueueKind) -> Option<PacketId> {
        let id = self.queue(kind).head?;

        let packet = self.header_mut(id);
        let next = packet.next.take();
        packet.queue = None;

        let queue = self.queue_mut(kind);
        queue.head = next;
        if next.is_none() {
            queue.tail = None;
        }
        queue.len -= 1;
        Some(id)
    }

    pub(crate) fn queue_len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len
    }

    /// Take a driver packet off the free queue, cleared for reuse
    pub(crate) fn alloc(&mut self) -> Option<u8> {
        let id = self.dequeue(QueueKind::Free)?;
        let PacketId::Driver(index) = id else {
            debug_assert!(false, "application slot on the free queue");
            return None;
        };
        let header = self.header_mut(id);
        header.flags = PacketFlags::EMPTY;
        header.length = 0;
        Some(index)
    }

    /// Return a driver packet to the free queue
    pub(crate) fn free(&mut self, index: u8) {
        let id = PacketId::Driver(index);
        let header = self.header_mut(id);
        header.flags = PacketFlags::EMPTY;
        header.length = 0;
        self.enqueue(QueueKind::Free, id);
    }

    /// Valid payload of a packet (`length` bytes)
    pub(crate) fn payload(&self, id: PacketId) -> &[u8] {
        match id {
            PacketId::Driver(i) => {
                let slot = &self.driver[i as usize];
                &slot.buf[..slot.header.length as usize]
            }
            PacketId::App(i) => {
                let slot = &self.app[i as usize];
                let buf = slot.buffer.as_slice();
                &buf[..(slot.header.length as usize).min(buf.len())]
            }
        }
    }

    /// Payload byte at `pos`, if within the buffer
    pub(crate) fn payload_byte(&self, id: PacketId, pos: usize) -> Option<u8> {
        match id {
            PacketId::Driver(i) => self.driver[i as usize].buf.get(pos).copied(),
            PacketId::App(i) => self.app[i as usize].buffer.get(pos),
        }
    }

    /// Store a byte at `pos` of a packet's buffer
    ///
    /// Fails for transmit-only application buffers and out-of-range
    /// positions.
    pub(crate) fn store(&mut self, id: PacketId, pos: usize, byte: u8) -> bool {
        let slot = match id {
            PacketId::Driver(i) => self.driver[i as usize].buf.get_mut(pos),
            PacketId::App(i) => match &mut self.app[i as usize].buffer {
                AppBuffer::Rx(buf) => buf.get_mut(pos),
                _ => None,
            },
        };
        match slot {
            Some(b) => {
                *b = byte;
                true
            }
            None => false,
        }
    }

    /// Queue a packet is currently on
    #[cfg(test)]
    pub(crate) fn queue_of(&self, id: PacketId) -> Option<QueueKind> {
        self.header(id).queue
    }

    /// Walk every queue and check that links, lengths and recorded
    /// membership agree
    #[cfg(test)]
    pub(crate) fn check_queues(&self) {
        let mut seen = [0usize; 2];
        for kind in [QueueKind::Free, QueueKind::PendingTx, QueueKind::CompletedRx] {
            let queue = self.queue(kind);
            let mut count = 0;
            let mut cursor = queue.head;
            let mut last = None;
            while let Some(id) = cursor {
                assert_eq!(self.header(id).queue, Some(kind));
                count += 1;
                last = Some(id);
                cursor = self.header(id).next;
                match id {
                    PacketId::Driver(_) => seen[0] += 1,
                    PacketId::App(_) => seen[1] += 1,
                }
            }
            assert_eq!(count, queue.len);
            assert_eq!(last, queue.tail);
        }
        assert!(seen[0] <= PACKETS);
        assert!(seen[1] <= APP_SLOTS);
    }
}
