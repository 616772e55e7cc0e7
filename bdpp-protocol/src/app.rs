//! Application packet interface
//!
//! Bulk transfers bypass the small driver pool: the application lends its
//! own buffer to a numbered slot, queues it for transmission or arms it for
//! reception, and polls for completion. The slot index travels on the wire
//! so the peer can route a reception straight into the armed buffer.
//!
//! A lent buffer stays with the engine until [`Bdpp::release`] hands it
//! back, which is refused while a wire state machine is still using it.

use crate::engine::{Bdpp, Engine};
use crate::error::Error;
use crate::packet::{PacketFlags, PacketId, QueueKind};
use crate::pool::AppBuffer;

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Engine<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Slot is queued, armed or in flight
    fn app_busy(&self, handle: u8) -> Result<bool, Error> {
        let id = PacketId::App(handle);
        let slot = self.pool.app_slot(handle).ok_or(Error::InvalidHandle)?;
        Ok(self.in_flight(id) || slot.header.flags.contains(PacketFlags::READY))
    }

    fn queue_for_transmit(
        &mut self,
        handle: u8,
        flags: PacketFlags,
        data: &'a [u8],
    ) -> Result<(), Error> {
        if self.app_busy(handle)? {
            return Err(Error::Busy);
        }
        let length = u16::try_from(data.len()).map_err(|_| Error::TooLarge)?;

        let slot = self.pool.app_slot_mut(handle).ok_or(Error::InvalidHandle)?;
        let wire = PacketFlags::USAGE_MASK | PacketFlags::FIRST | PacketFlags::LAST;
        slot.header.flags = (flags & wire) | PacketFlags::APP_OWNED | PacketFlags::READY;
        slot.header.capacity = length;
        slot.header.length = length;
        slot.buffer = AppBuffer::Tx(data);

        debug!("app slot {} queued, {} bytes", handle, length);
        self.queue_tx(PacketId::App(handle));
        Ok(())
    }

    fn arm_for_receive(&mut self, handle: u8, buffer: &'a mut [u8]) -> Result<(), Error> {
        if self.app_busy(handle)? {
            return Err(Error::Busy);
        }
        let capacity = u16::try_from(buffer.len()).unwrap_or(u16::MAX);

        let slot = self.pool.app_slot_mut(handle).ok_or(Error::InvalidHandle)?;
        slot.header.flags = PacketFlags::APP_OWNED | PacketFlags::READY | PacketFlags::FOR_RX;
        slot.header.capacity = capacity;
        slot.header.length = 0;
        slot.buffer = AppBuffer::Rx(buffer);

        debug!("app slot {} armed, {} bytes", handle, capacity);
        Ok(())
    }

    fn app_flags(&self, handle: u8) -> Option<PacketFlags> {
        self.pool.app_slot(handle).map(|slot| slot.header.flags)
    }

    fn release(&mut self, handle: u8) -> Result<AppBuffer<'a>, Error> {
        let id = PacketId::App(handle);
        let in_flight = self.in_flight(id);
        let slot = self.pool.app_slot_mut(handle).ok_or(Error::InvalidHandle)?;
        if in_flight || slot.header.queue == Some(QueueKind::PendingTx) {
            return Err(Error::Busy);
        }
        Ok(slot.reset())
    }
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Bdpp<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Queue an application buffer for transmission
    ///
    /// Only the usage, `FIRST` and `LAST` bits of `flags` are used. Fails
    /// with [`Error::Busy`] while the slot is queued, armed or in flight.
    pub fn queue_for_transmit(
        &self,
        handle: u8,
        flags: PacketFlags,
        data: &'a [u8],
    ) -> Result<(), Error> {
        self.with_engine(|engine| engine.queue_for_transmit(handle, flags, data))
    }

    /// Arm an application buffer to receive the next packet addressed to
    /// `handle`
    ///
    /// The buffer's length is the largest payload accepted; a longer
    /// incoming packet is discarded and the slot stays armed.
    pub fn arm_for_receive(&self, handle: u8, buffer: &'a mut [u8]) -> Result<(), Error> {
        self.with_engine(|engine| engine.arm_for_receive(handle, buffer))
    }

    /// The slot's transmission has completed
    pub fn is_transmit_done(&self, handle: u8) -> bool {
        self.with_engine(|engine| engine.app_flags(handle)).is_some_and(|flags| {
            flags.contains(PacketFlags::DONE) && !flags.contains(PacketFlags::FOR_RX)
        })
    }

    /// The slot's reception has completed
    pub fn is_receive_done(&self, handle: u8) -> bool {
        self.with_engine(|engine| engine.app_flags(handle))
            .is_some_and(|flags| flags.contains(PacketFlags::DONE | PacketFlags::FOR_RX))
    }

    /// Length of a completed reception
    pub fn received_len(&self, handle: u8) -> Option<usize> {
        self.with_engine(|engine| {
            let slot = engine.pool.app_slot(handle)?;
            slot.header
                .flags
                .contains(PacketFlags::DONE | PacketFlags::FOR_RX)
                .then_some(slot.header.length as usize)
        })
    }

    /// Return the slot to idle and hand back its buffer
    ///
    /// Fails with [`Error::Busy`] while the slot is queued for transmission
    /// or in flight. An armed reception that has not started is cancelled.
    pub fn release(&self, handle: u8) -> Result<AppBuffer<'a>, Error> {
        self.with_engine(|engine| engine.release(handle))
    }

    /// Release a completed reception and return the received bytes
    pub fn take_received(&self, handle: u8) -> Result<&'a mut [u8], Error> {
        let len = self.received_len(handle).ok_or(Error::Busy)?;
        match self.release(handle)? {
            AppBuffer::Rx(buf) => Ok(&mut buf[..len]),
            _ => Err(Error::Busy),
        }
    }
}
