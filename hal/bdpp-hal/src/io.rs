//! `embedded-io` adapter
//!
//! Lets the engine be driven by polling any `embedded-io` byte device that
//! can report readiness, for boards where the UART interrupt is owned by
//! another driver.

use embedded_io::{Read, ReadReady, Write, WriteReady};

use crate::uart::SerialPort;

/// Error from an adapted `embedded-io` device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoSerialError<E> {
    /// The underlying device reported an error
    Io(E),
    /// The device reported ready but returned no byte
    Eof,
}

/// [`SerialPort`] over an `embedded-io` device
pub struct IoSerial<T> {
    inner: T,
    tx_notify: bool,
    write_failures: u32,
}

impl<T> IoSerial<T> {
    /// Wrap a device
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            tx_notify: true,
            write_failures: 0,
        }
    }

    /// Whether the engine currently wants transmit-ready servicing
    ///
    /// Polled integrations can skip the transmit half while this is false.
    pub fn tx_notify_enabled(&self) -> bool {
        self.tx_notify
    }

    /// Number of bytes the device refused after reporting ready
    pub fn write_failures(&self) -> u32 {
        self.write_failures
    }

    /// Borrow the wrapped device
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwrap the device
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> SerialPort for IoSerial<T>
where
    T: Read + Write + ReadReady + WriteReady,
{
    type Error = IoSerialError<T::Error>;

    fn rx_ready(&mut self) -> bool {
        self.inner.read_ready().unwrap_or(false)
    }

    fn tx_ready(&mut self) -> bool {
        self.inner.write_ready().unwrap_or(false)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf) {
            Ok(0) => Err(IoSerialError::Eof),
            Ok(_) => Ok(buf[0]),
            Err(e) => Err(IoSerialError::Io(e)),
        }
    }

    fn write_byte(&mut self, byte: u8) {
        match self.inner.write(&[byte]) {
            Ok(1) => {}
            _ => self.write_failures = self.write_failures.saturating_add(1),
        }
    }

    fn set_tx_notify(&mut self, enabled: bool) {
        self.tx_notify = enabled;
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::convert::Infallible;
    use embedded_io::ErrorType;
    use std::collections::VecDeque;
    use std::vec::Vec;

    struct Pipe {
        input: VecDeque<u8>,
        output: Vec<u8>,
        room: usize,
    }

    impl ErrorType for Pipe {
        type Error = Infallible;
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let mut n = 0;
            while n < buf.len() {
                match self.input.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl ReadReady for Pipe {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.input.is_empty())
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.room);
            self.output.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl WriteReady for Pipe {
        fn write_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(self.room > 0)
        }
    }

    #[test]
    fn test_reads_until_drained() {
        let pipe = Pipe {
            input: VecDeque::from([0x8C, 0x0C]),
            output: Vec::new(),
            room: 0,
        };
        let mut port = IoSerial::new(pipe);

        assert!(port.rx_ready());
        assert_eq!(port.read_byte(), Ok(0x8C));
        assert_eq!(port.read_byte(), Ok(0x0C));
        assert!(!port.rx_ready());
        assert_eq!(port.read_byte(), Err(IoSerialError::Eof));
    }

    #[test]
    fn test_write_respects_room() {
        let pipe = Pipe {
            input: VecDeque::new(),
            output: Vec::new(),
            room: 1,
        };
        let mut port = IoSerial::new(pipe);

        assert!(port.tx_ready());
        port.write_byte(0xAE);
        assert!(!port.tx_ready());
        port.write_byte(0x00);

        assert_eq!(port.write_failures(), 1);
        assert_eq!(port.inner().output, [0xAE]);
    }

    #[test]
    fn test_tx_notify_tracks_engine_request() {
        let pipe = Pipe {
            input: VecDeque::new(),
            output: Vec::new(),
            room: 0,
        };
        let mut port = IoSerial::new(pipe);
        assert!(port.tx_notify_enabled());
        port.set_tx_notify(false);
        assert!(!port.tx_notify_enabled());
    }
}
