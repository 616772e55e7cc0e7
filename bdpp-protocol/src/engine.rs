//! Protocol engine context
//!
//! [`Bdpp`] owns the packet tables, both wire state machines and the packet
//! builder. Everything mutable sits behind one critical-section mutex: the
//! serial interrupt takes it in [`Bdpp::service`], and every foreground call
//! takes it for the few O(1) steps it needs, which is what masking the
//! serial interrupt achieves on the bare-metal target.

use core::cell::RefCell;

use bdpp_hal::SerialPort;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use portable_atomic::{AtomicBool, Ordering};

use crate::builder::Builder;
use crate::config::LinkConfig;
use crate::error::RxError;
use crate::packet::{PacketFlags, PacketId, QueueKind, Usage};
use crate::pool::Pool;
use crate::rx::{Receiver, RxEvent, RxState};
use crate::stats::LinkStats;
use crate::tx::{Transmitter, TxState};

/// Default number of driver packets
pub const DEFAULT_PACKETS: usize = 8;

/// Default driver packet payload size
pub const DEFAULT_PACKET_SIZE: usize = 32;

/// Default number of application slots
pub const DEFAULT_APP_SLOTS: usize = 16;

/// State guarded by the engine lock
pub(crate) struct Engine<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
{
    pub(crate) pool: Pool<'a, PACKETS, PACKET_SIZE, APP_SLOTS>,
    pub(crate) tx: Transmitter,
    pub(crate) rx: Receiver,
    pub(crate) builder: Builder,
    pub(crate) stats: LinkStats,
    /// Transmit-ready notification believed enabled on the port
    tx_notify: bool,
    /// Wake hook must run once the lock is released
    wake: bool,
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Engine<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    fn new() -> Self {
        Self {
            pool: Pool::new(),
            tx: Transmitter::new(),
            rx: Receiver::new(),
            builder: Builder::new(),
            stats: LinkStats::default(),
            tx_notify: false,
            wake: false,
        }
    }

    /// Hand a packet to the transmitter, requesting a wake if the
    /// transmitter has gone quiet
    pub(crate) fn queue_tx(&mut self, id: PacketId) {
        self.pool.enqueue(QueueKind::PendingTx, id);
        if !self.tx_notify {
            self.tx_notify = true;
            self.wake = true;
        }
    }

    /// Whether either wire state machine currently references a packet
    pub(crate) fn in_flight(&self, id: PacketId) -> bool {
        self.tx.current() == Some(id) || self.rx.current() == Some(id)
    }

    fn service<P: SerialPort>(&mut self, port: &mut P) {
        while port.rx_ready() {
            let event = match port.read_byte() {
                Ok(byte) => {
                    self.stats.byte_in();
                    self.rx.feed(&mut self.pool, byte)
                }
                Err(_) if self.rx.state() == RxState::AwaitStart => RxEvent::Pending,
                Err(_) => self.rx.abort(&mut self.pool, RxError::Line),
            };

            match event {
                RxEvent::Pending => {}
                RxEvent::Delivered(id) => {
                    trace!("RX delivered {:?}", id);
                    self.stats.received();
                }
                RxEvent::Discarded(reason) => {
                    warn!("RX discarded: {:?}", reason);
                    self.stats.discarded();
                }
            }
        }

        let outcome = self.tx.poll(&mut self.pool, port, &mut self.stats);
        if outcome.idle {
            self.tx_notify = false;
        }
    }
}

/// A driver packet collected from the completed-receive queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Received<const PACKET_SIZE: usize> {
    /// Wire flags plus the local DONE/FOR_RX bits
    pub flags: PacketFlags,
    /// Payload bytes
    pub payload: Vec<u8, PACKET_SIZE>,
}

impl<const PACKET_SIZE: usize> Received<PACKET_SIZE> {
    /// Usage class, `None` for the reserved value
    pub fn usage(&self) -> Option<Usage> {
        self.flags.usage()
    }

    /// First fragment of a message
    pub fn is_first(&self) -> bool {
        self.flags.contains(PacketFlags::FIRST)
    }

    /// Last fragment of a message
    pub fn is_last(&self) -> bool {
        self.flags.contains(PacketFlags::LAST)
    }
}

/// BDPP protocol instance
///
/// `'a` is the lifetime of buffers lent through the application packet
/// interface; firmware typically uses `Bdpp<'static>` in a static cell.
pub struct Bdpp<
    'a,
    const PACKETS: usize = DEFAULT_PACKETS,
    const PACKET_SIZE: usize = DEFAULT_PACKET_SIZE,
    const APP_SLOTS: usize = DEFAULT_APP_SLOTS,
> {
    engine: Mutex<CriticalSectionRawMutex, RefCell<Engine<'a, PACKETS, PACKET_SIZE, APP_SLOTS>>>,
    /// Raised whenever a driver packet returns to the free queue
    freed: Signal<CriticalSectionRawMutex, ()>,
    enabled: AtomicBool,
    tx_wake: Option<fn()>,
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize> Default
    for Bdpp<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const PACKETS: usize, const PACKET_SIZE: usize, const APP_SLOTS: usize>
    Bdpp<'a, PACKETS, PACKET_SIZE, APP_SLOTS>
{
    /// Create an instance with every driver packet free and every
    /// application slot idle
    ///
    /// The protocol starts disabled; see [`Bdpp::set_enabled`].
    pub fn new() -> Self {
        Self {
            engine: Mutex::new(RefCell::new(Engine::new())),
            freed: Signal::new(),
            enabled: AtomicBool::new(false),
            tx_wake: None,
        }
    }

    /// Create an instance from a link configuration
    pub fn with_config(config: &LinkConfig) -> Self {
        let bdpp = Self::new();
        bdpp.set_enabled(config.enabled);
        bdpp
    }

    /// Register the hook that re-enables the transmit-ready interrupt
    ///
    /// It runs outside the engine lock whenever the foreground queues a
    /// packet after the transmitter went idle.
    pub fn on_tx_pending(mut self, hook: fn()) -> Self {
        self.tx_wake = Some(hook);
        self
    }

    /// Whether the protocol was negotiated for this session
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record the outcome of the start-of-day negotiation with the peer
    pub fn set_enabled(&self, enabled: bool) {
        debug!("BDPP {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Run `f` under the engine lock, then fire the transmit wake hook and
    /// the packet-freed signal if `f` called for them
    pub(crate) fn with_engine<R>(
        &self,
        f: impl FnOnce(&mut Engine<'a, PACKETS, PACKET_SIZE, APP_SLOTS>) -> R,
    ) -> R {
        let (result, wake, freed) = self.engine.lock(|cell| {
            let mut engine = cell.borrow_mut();
            let free_before = engine.pool.queue_len(QueueKind::Free);
            let result = f(&mut engine);
            let freed = engine.pool.queue_len(QueueKind::Free) > free_before;
            (result, core::mem::take(&mut engine.wake), freed)
        });

        if freed {
            self.freed.signal(());
        }
        if wake {
            if let Some(hook) = self.tx_wake {
                hook();
            }
        }
        result
    }

    /// Wait until a driver packet is returned to the pool
    pub(crate) async fn packet_freed(&self) {
        self.freed.wait().await
    }

    /// Serial interrupt service routine
    ///
    /// Drains every received byte through the receiver, then feeds the
    /// transmitter for as long as the port accepts bytes. When nothing is
    /// left to send the port's transmit-ready notification is disabled.
    pub fn service<P: SerialPort>(&self, port: &mut P) {
        self.with_engine(|engine| engine.service(port));
    }

    /// Collect the oldest received driver packet
    ///
    /// The packet's slot goes straight back to the free pool.
    pub fn receive(&self) -> Option<Received<PACKET_SIZE>> {
        self.with_engine(|engine| {
            let id = engine.pool.dequeue(QueueKind::CompletedRx)?;
            let PacketId::Driver(index) = id else {
                return None;
            };

            let mut payload = Vec::new();
            // Received length never exceeds the slot capacity
            let _ = payload.extend_from_slice(engine.pool.payload(id));
            let received = Received {
                flags: engine.pool.header(id).flags,
                payload,
            };

            engine.pool.free(index);
            Some(received)
        })
    }

    /// Snapshot of the link counters
    pub fn stats(&self) -> LinkStats {
        self.with_engine(|engine| engine.stats)
    }

    /// Driver packets currently on the free queue
    pub fn free_packets(&self) -> usize {
        self.with_engine(|engine| engine.pool.queue_len(QueueKind::Free))
    }

    /// Packets waiting for the transmitter
    pub fn pending_packets(&self) -> usize {
        self.with_engine(|engine| engine.pool.queue_len(QueueKind::PendingTx))
    }

    /// Received driver packets waiting for [`Bdpp::receive`]
    pub fn received_packets(&self) -> usize {
        self.with_engine(|engine| engine.pool.queue_len(QueueKind::CompletedRx))
    }

    /// Current transmitter state
    pub fn tx_state(&self) -> TxState {
        self.with_engine(|engine| engine.tx.state())
    }

    /// Current receiver state
    pub fn rx_state(&self) -> RxState {
        self.with_engine(|engine| engine.rx.state())
    }

    #[cfg(test)]
    pub(crate) fn check_queues(&self) {
        self.with_engine(|engine| engine.pool.check_queues());
    }
}
