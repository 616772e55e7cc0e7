//! Link statistics

/// Counters maintained by the engine
///
/// All counters wrap on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    /// Packets fully written to the line
    pub packets_sent: u32,
    /// Packets fully received and delivered
    pub packets_received: u32,
    /// Incoming packets discarded as malformed or unroutable
    pub rx_discarded: u32,
    /// Bytes written to the line, framing included
    pub bytes_out: u32,
    /// Bytes read from the line, framing and noise included
    pub bytes_in: u32,
}

impl LinkStats {
    pub(crate) fn sent(&mut self) {
        self.packets_sent = self.packets_sent.wrapping_add(1);
    }

    pub(crate) fn received(&mut self) {
        self.packets_received = self.packets_received.wrapping_add(1);
    }

    pub(crate) fn discarded(&mut self) {
        self.rx_discarded = self.rx_discarded.wrapping_add(1);
    }

    pub(crate) fn byte_out(&mut self) {
        self.bytes_out = self.bytes_out.wrapping_add(1);
    }

    pub(crate) fn byte_in(&mut self) {
        self.bytes_in = self.bytes_in.wrapping_add(1);
    }
}
