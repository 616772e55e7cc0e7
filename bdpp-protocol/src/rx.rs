//! Receive wire state machine
//!
//! Deserializes the incoming byte stream into a packet buffer, one byte per
//! call. Any anomaly discards the packet being built and returns to
//! [`RxState::AwaitStart`]; a packet is only delivered once its END marker
//! has been seen.

use crate::error::RxError;
use crate::packet::{PacketFlags, PacketId, QueueKind};
use crate::pool::Pool;
use crate::wire::{END, ESCAPE, START, WIRE_FLAGS};

/// Receiver states, named after the byte expected next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    AwaitStart,
    AwaitFlags,
    AwaitIndex,
    AwaitSize1,
    AwaitSize2,
    /// Payload byte, or ESCAPE introducing a literal
    AwaitDataEsc,
    /// Literal payload byte following ESCAPE
    AwaitData,
    AwaitEnd,
}

/// Result of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxEvent {
    /// Byte consumed, nothing completed
    Pending,
    /// Packet complete; driver packets are on the completed-receive queue
    Delivered(PacketId),
    /// In-progress packet thrown away
    Discarded(RxError),
}

#[derive(Debug)]
pub(crate) struct Receiver {
    state: RxState,
    packet: Option<PacketId>,
    flags: PacketFlags,
    size: u16,
    pos: u16,
}

impl Receiver {
    pub(crate) const fn new() -> Self {
        Self {
            state: RxState::AwaitStart,
            packet: None,
            flags: PacketFlags::EMPTY,
            size: 0,
            pos: 0,
        }
    }

    pub(crate) fn state(&self) -> RxState {
        self.state
    }

    /// Packet currently being filled, if any
    pub(crate) fn current(&self) -> Option<PacketId> {
        self.packet
    }

    /// Consume one byte from the line
    pub(crate) fn feed<const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
        byte: u8,
    ) -> RxEvent {
        match self.state {
            RxState::AwaitStart => {
                if byte == START {
                    self.state = RxState::AwaitFlags;
                }
            }
            RxState::AwaitFlags => {
                self.flags = (PacketFlags::from_bits(byte) & WIRE_FLAGS)
                    | PacketFlags::FOR_RX
                    | PacketFlags::READY;

                if self.flags.contains(PacketFlags::APP_OWNED) {
                    self.state = RxState::AwaitIndex;
                } else {
                    let Some(index) = pool.alloc() else {
                        return self.abort(pool, RxError::PoolExhausted);
                    };
                    let id = PacketId::Driver(index);
                    pool.header_mut(id).flags = self.flags;
                    self.packet = Some(id);
                    self.state = RxState::AwaitSize1;
                }
            }
            RxState::AwaitIndex => {
                let Some(slot) = pool.app_slot_mut(byte) else {
                    return self.abort(pool, RxError::UnknownHandle(byte));
                };
                let armed = PacketFlags::READY | PacketFlags::FOR_RX;
                if slot.header.flags.contains(PacketFlags::DONE) || !slot.header.flags.contains(armed)
                {
                    return self.abort(pool, RxError::SlotBusy(byte));
                }
                slot.header.flags = self.flags;
                slot.header.length = 0;
                self.packet = Some(PacketId::App(byte));
                self.state = RxState::AwaitSize1;
            }
            RxState::AwaitSize1 => {
                self.size = u16::from(byte);
                self.state = RxState::AwaitSize2;
            }
            RxState::AwaitSize2 => {
                self.size |= u16::from(byte) << 8;
                self.pos = 0;

                let Some(id) = self.packet else {
                    return self.abort(pool, RxError::PoolExhausted);
                };
                let capacity = pool.header(id).capacity;
                if self.size > capacity {
                    return self.abort(
                        pool,
                        RxError::Oversize {
                            declared: self.size,
                            capacity,
                        },
                    );
                }

                self.state = if self.size == 0 {
                    RxState::AwaitEnd
                } else {
                    RxState::AwaitDataEsc
                };
            }
            RxState::AwaitDataEsc => {
                if byte == ESCAPE {
                    self.state = RxState::AwaitData;
                } else {
                    return self.store(pool, byte);
                }
            }
            RxState::AwaitData => return self.store(pool, byte),
            RxState::AwaitEnd => {
                if byte != END {
                    return self.abort(pool, RxError::MissingEnd(byte));
                }
                return self.deliver(pool);
            }
        }
        RxEvent::Pending
    }

    fn store<const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
        byte: u8,
    ) -> RxEvent {
        let Some(id) = self.packet else {
            return self.abort(pool, RxError::PoolExhausted);
        };
        if !pool.store(id, self.pos as usize, byte) {
            let capacity = pool.header(id).capacity;
            return self.abort(
                pool,
                RxError::Oversize {
                    declared: self.size,
                    capacity,
                },
            );
        }

        self.pos += 1;
        pool.header_mut(id).length = self.pos;
        self.state = if self.pos >= self.size {
            RxState::AwaitEnd
        } else {
            RxState::AwaitDataEsc
        };
        RxEvent::Pending
    }

    fn deliver<const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
    ) -> RxEvent {
        self.state = RxState::AwaitStart;
        let Some(id) = self.packet.take() else {
            return RxEvent::Discarded(RxError::PoolExhausted);
        };

        let header = pool.header_mut(id);
        header.length = self.size;
        header.flags.insert(PacketFlags::DONE);
        header.flags.remove(PacketFlags::READY);

        if let PacketId::Driver(_) = id {
            pool.enqueue(QueueKind::CompletedRx, id);
        }
        RxEvent::Delivered(id)
    }

    /// Throw away the in-progress packet and wait for the next START
    ///
    /// Driver packets go back to the free queue; application slots are
    /// re-armed so the next frame for them can land.
    pub(crate) fn abort<const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>(
        &mut self,
        pool: &mut Pool<'_, PACKETS, PACKET_SIZE, APP_SLOTS>,
        reason: RxError,
    ) -> RxEvent {
        self.state = RxState::AwaitStart;
        match self.packet.take() {
            Some(PacketId::Driver(index)) => pool.free(index),
            Some(id @ PacketId::App(_)) => {
                let header = pool.header_mut(id);
                header.flags = PacketFlags::APP_OWNED | PacketFlags::READY | PacketFlags::FOR_RX;
                header.length = 0;
            }
            None => {}
        }
        RxEvent::Discarded(reason)
    }
}
