//! sstflash-core - Wire protocol and flash algorithms for SST39SF0x0 chips
//!
//! This crate holds everything that both ends of the serial link agree on,
//! plus the device-side algorithms. It is `no_std` so the same code runs on
//! the programmer firmware and in host-side tests.
//!
//! # Layers
//!
//! - [`geometry`] - block/sector/bank sizes and address helpers
//! - [`chip`] - chip identity table (manufacturer/device id to capacity)
//! - [`codec`] - fixed 8-byte ASCII command frames
//! - [`checksum`] - additive checksum and CRC16/XMODEM
//! - [`bus`] - address latch / strobe sequencing for the parallel bus
//! - [`algorithm`] - unlock sequences, byte program, erase, data polling
//! - [`firmware`] - command dispatcher run by the programmer's main loop
//! - [`version`] - board identity string and firmware version gating
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod algorithm;
pub mod bus;
pub mod checksum;
pub mod chip;
pub mod codec;
pub mod error;
pub mod firmware;
pub mod geometry;
pub mod version;

pub use error::{Error, Result};
