//! Error types for sstflash-core
//!
//! This module provides a no_std compatible error type that is shared by
//! the codec, the algorithm engine and the firmware dispatcher.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Chip errors
    /// Identity bytes do not belong to a supported chip
    UnknownChip {
        /// Manufacturer id read from address 0
        manufacturer: u8,
        /// Device id read from address 1
        device: u8,
    },

    // Codec errors
    /// Frame is well-formed but its mnemonic is not known
    UnknownCommand,
    /// Frame has the wrong length or contains non-frame characters
    InvalidFrame,
    /// Hex parameter could not be parsed or does not fit the field
    InvalidParameter,

    // Address/size errors
    /// Address is beyond the chip or parameter range
    AddressOutOfBounds,
    /// Operation requires a block or sector aligned address
    InvalidAlignment,
    /// Provided buffer does not match the unit size of the operation
    BufferTooSmall,

    // Algorithm errors
    /// Erase did not complete within the data-poll bound
    EraseTimeout {
        /// Address that was polled
        addr: u32,
        /// Poll cycles spent
        cycles: u16,
    },
    /// Byte program did not complete within the data-poll bound
    ProgramTimeout {
        /// Address that was programmed
        addr: u32,
    },

    // Version errors
    /// Board identity string is not in the expected format
    InvalidBoardId,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownChip {
                manufacturer,
                device,
            } => write!(
                f,
                "unknown chip id 0x{:02X}{:02X}",
                manufacturer, device
            ),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::InvalidFrame => write!(f, "invalid command frame"),
            Self::InvalidParameter => write!(f, "invalid command parameter"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::BufferTooSmall => write!(f, "buffer size does not match operation"),
            Self::EraseTimeout { addr, cycles } => write!(
                f,
                "erase at 0x{:05X} did not complete after {} poll cycles",
                addr, cycles
            ),
            Self::ProgramTimeout { addr } => {
                write!(f, "program at 0x{:05X} did not complete", addr)
            }
            Self::InvalidBoardId => write!(f, "invalid board identity string"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
