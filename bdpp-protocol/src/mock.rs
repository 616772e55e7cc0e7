//! Host-side serial port double for tests

extern crate std;

use std::collections::VecDeque;
use std::vec::Vec;

use bdpp_hal::SerialPort;

/// Serial port that records writes and replays queued input
#[derive(Debug, Default)]
pub(crate) struct MockPort {
    input: VecDeque<Result<u8, ()>>,
    output: Vec<u8>,
    tx_room: Option<usize>,
    pub tx_notify: bool,
}

impl MockPort {
    /// Port with unlimited transmit room and no pending input
    pub(crate) fn new() -> Self {
        Self {
            tx_notify: true,
            ..Self::default()
        }
    }

    pub(crate) fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().map(|&b| Ok(b)));
    }

    pub(crate) fn push_line_error(&mut self) {
        self.input.push_back(Err(()));
    }

    /// Limit how many more bytes the transmitter will accept
    pub(crate) fn set_tx_room(&mut self, room: usize) {
        self.tx_room = Some(room);
    }

    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }
}

impl SerialPort for MockPort {
    type Error = ();

    fn rx_ready(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn tx_ready(&mut self) -> bool {
        self.tx_room != Some(0)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        self.input.pop_front().unwrap_or(Err(()))
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
        if let Some(room) = self.tx_room.as_mut() {
            *room = room.saturating_sub(1);
        }
    }

    fn set_tx_notify(&mut self, enabled: bool) {
        self.tx_notify = enabled;
    }
}
