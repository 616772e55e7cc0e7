//! BDPP - Bidirectional Packet Protocol
//!
//! This crate is the device side of the packet-framed serial link between
//! a host CPU and its peripheral controller. Console text, commands,
//! responses and bulk application data are multiplexed over one UART using
//! a fixed pool of small buffers, with no allocation on the hot path.
//!
//! # Protocol Overview
//!
//! Every packet uses the same escaped binary frame:
//! ```text
//! ┌───────┬───────┬─────────┬──────────┬──────────┬───────────┬─────┐
//! │ START │ FLAGS │ [INDEX] │ SIZE_LO  │ SIZE_HI  │ DATA      │ END │
//! │ 0x8C  │ 1B    │ 1B      │ 1B       │ 1B       │ escaped   │0xAE │
//! └───────┴───────┴─────────┴──────────┴──────────┴───────────┴─────┘
//! ```
//!
//! INDEX is present only for application-owned packets. Payload bytes equal
//! to 0x8C, 0x9D or 0xAE are preceded by the escape byte 0x9D.
//!
//! # Structure
//!
//! - [`Bdpp`] - engine context; [`Bdpp::service`] is the serial interrupt
//!   entry point
//! - Packet builder - [`Bdpp::start_outgoing`], [`Bdpp::append_bytes`],
//!   [`Bdpp::flush`]
//! - Application packets - [`Bdpp::queue_for_transmit`],
//!   [`Bdpp::arm_for_receive`], [`Bdpp::release`]

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod app;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod packet;
pub mod pool;
pub mod rx;
pub mod stats;
pub mod tx;
pub mod wire;

#[cfg(test)]
mod mock;

pub use config::LinkConfig;
pub use engine::{Bdpp, Received, DEFAULT_APP_SLOTS, DEFAULT_PACKETS, DEFAULT_PACKET_SIZE};
pub use error::{Error, RxError};
pub use packet::{PacketFlags, Usage};
pub use pool::AppBuffer;
pub use rx::RxState;
pub use stats::LinkStats;
pub use tx::TxState;
pub use wire::{END, ESCAPE, START};
