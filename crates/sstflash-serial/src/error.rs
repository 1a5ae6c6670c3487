//! Error types for the host-side client

use sstflash_core::version::FirmwareVersion;
use thiserror::Error;

/// Errors talking to the programmer
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error on the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The echoed frame differs from the frame that was sent
    #[error("Protocol mismatch: sent {sent:?}, echoed {received:?}")]
    ProtocolMismatch { sent: String, received: String },

    /// The stream stopped before the full response arrived
    #[error("Incomplete response to {command}: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        command: String,
        expected: usize,
        received: usize,
    },

    /// Additive checksum returned by `WRBK` does not match the data sent
    #[error("Checksum mismatch on block 0x{block:04X}: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { block: u16, expected: u8, actual: u8 },

    /// CRC returned by `WRSECT` does not match the data sent
    #[error("CRC mismatch on sector 0x{sector:02X}: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { sector: u8, expected: u16, actual: u16 },

    /// The board did not identify as a supported programmer
    #[error("Unexpected board identity {0:?}")]
    UnexpectedBoard(String),

    /// Firmware too old for the requested operation
    #[error("Firmware v{found} is too old, v{required} or newer is required")]
    UnsupportedFirmware {
        found: FirmwareVersion,
        required: FirmwareVersion,
    },

    /// Error from the shared protocol layer
    #[error("{0}")]
    Core(#[from] sstflash_core::Error),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
