//! BDPP Hardware Abstraction Layer
//!
//! This crate defines the serial line abstraction consumed by the BDPP
//! protocol engine. Chip-specific code implements [`SerialPort`] on top of
//! its UART registers and calls the engine's service routine from the UART
//! interrupt handler.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  bdpp-protocol (packet engine)          │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  bdpp-hal (this crate - traits)         │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  UART driver  │       │ embedded-io   │
//! │ (interrupt)   │       │ device (poll) │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::SerialPort`] - Byte-at-a-time serial line with ready conditions
//! - [`io::IoSerial`] - Adapter for any `embedded-io` device

#![no_std]
#![deny(unsafe_code)]

pub mod io;
pub mod uart;

pub use io::{IoSerial, IoSerialError};
pub use uart::{DataBits, Parity, SerialPort, StopBits, UartConfig};
