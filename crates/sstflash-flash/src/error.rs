//! Error types for flashing operations

use std::fmt;

use sstflash_core::chip::ChipIdentity;
use sstflash_serial::ClientError;
use thiserror::Error;

/// One block whose read-back differs from the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMismatch {
    /// Absolute block index
    pub block: u16,
    /// Absolute address of the first differing byte
    pub address: u32,
    /// Expected byte at `address`
    pub expected: u8,
    /// Byte read back at `address`
    pub actual: u8,
    /// Number of differing bytes in the block
    pub differing: usize,
}

impl fmt::Display for BlockMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block 0x{:04X}: {} bytes differ, first at 0x{:05X} (expected 0x{:02X}, read 0x{:02X})",
            self.block, self.differing, self.address, self.expected, self.actual
        )
    }
}

/// Errors from orchestrated flash operations
#[derive(Debug, Error)]
pub enum FlashError {
    /// Transport or protocol failure
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Identity bytes do not belong to a supported chip
    #[error("Unknown chip with id {identity}")]
    UnknownChip { identity: ChipIdentity },

    /// A different chip answered after writing than before
    #[error("Chip changed during the operation: {before} before, {after} after")]
    ChipChanged {
        before: ChipIdentity,
        after: ChipIdentity,
    },

    /// Read-back differs from the image
    #[error("Verification failed: {} block(s) differ{}", .mismatches.len(), first_mismatch(.mismatches))]
    VerificationFailed { mismatches: Vec<BlockMismatch> },

    /// Sector erase did not complete on the device
    #[error("Erase of sector 0x{sector:02X} did not complete ({cycles} poll cycles)")]
    EraseTimeout { sector: u8, cycles: u16 },

    /// Chip erase did not complete on the device
    #[error("Chip erase did not complete ({cycles} poll cycles)")]
    ChipEraseTimeout { cycles: u16 },

    /// Image does not fit the target
    #[error("Image of {len} bytes exceeds the {max} byte target")]
    ImageTooLarge { len: usize, max: usize },

    /// Image size differs from what the size policy requires
    #[error("Image is {len} bytes, expected exactly {expected}")]
    ImageSizeMismatch { len: usize, expected: usize },

    /// Image is empty
    #[error("Image is empty")]
    EmptyImage,

    /// Requested banks lie beyond the chip
    #[error("{count} bank(s) starting at bank {first} exceed the chip's {available} banks")]
    BankOutOfRange {
        first: u8,
        count: u32,
        available: u32,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled after {completed} of {total} units")]
    Cancelled { completed: u32, total: u32 },

    /// The worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// The worker thread could not be started
    #[error("Failed to start worker: {0}")]
    Spawn(std::io::Error),
}

fn first_mismatch(mismatches: &[BlockMismatch]) -> String {
    mismatches
        .first()
        .map(|m| format!(", {}", m))
        .unwrap_or_default()
}

/// Result type for flashing operations
pub type Result<T> = std::result::Result<T, FlashError>;
