//! sstflash-flash - Flashing orchestration
//!
//! Turns flat images into ordered erase/program/verify command sequences
//! over a [`PicoFlasher`](sstflash_serial::PicoFlasher) connection.
//!
//! # Example
//!
//! ```no_run
//! use sstflash_flash::{CancellationToken, Flasher, NoProgress, SizePolicy, WriteOptions};
//! use sstflash_serial::{open_serial, Timeouts};
//!
//! let client = open_serial("/dev/ttyACM0", None, Timeouts::default())?;
//! let mut flasher = Flasher::new(client);
//!
//! let image = std::fs::read("rom.bin")?;
//! let report = flasher.write_chip(
//!     &image,
//!     SizePolicy::default(),
//!     &WriteOptions::default(),
//!     &mut NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! println!("{} sectors written", report.sectors_written);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cancel;
pub mod error;
pub mod image;
pub mod progress;
pub mod session;
pub mod worker;

pub use cancel::CancellationToken;
pub use error::{BlockMismatch, FlashError, Result};
pub use image::{FlashImage, SizePolicy};
pub use progress::{Event, NoProgress, OperationProgress, Phase, ProgressSink};
pub use session::{ChipInfo, Flasher, WriteMethod, WriteMode, WriteOptions, WriteReport};
pub use worker::{Executor, Operation, WorkerHandle};
