//! Command frame encoding and decoding
//!
//! Every request is exactly [`FRAME_LEN`] ASCII bytes: a mnemonic followed
//! by an optional right-justified, zero-padded, uppercase hex parameter.
//! The receiver echoes the frame verbatim before any payload or response.
//!
//! | Frame      | Payload in | Response |
//! |------------|-----------:|---------:|
//! | `READINFO` | -          | 16       |
//! | `DEVIDSST` | -          | 2        |
//! | `RDBANKxx` | -          | 16384    |
//! | `RDSECTxx` | -          | 4096     |
//! | `RDBKxxxx` | -          | 256      |
//! | `WRBKxxxx` | 256        | 1        |
//! | `WRSECTxx` | 4096       | 2        |
//! | `ESSTxxxx` | -          | 2        |
//! | `ERASEALL` | -          | 2        |

use core::fmt;

use heapless::Vec;

use crate::error::{Error, Result};
use crate::geometry::{BANK_SIZE, BLOCK_SIZE, SECTOR_SIZE};

/// Length of a command frame on the wire
pub const FRAME_LEN: usize = 8;

/// Length of the board identity string returned by `READINFO`
pub const INFO_LEN: usize = 16;

/// A raw command frame
pub type Frame = [u8; FRAME_LEN];

const READ_INFO: &[u8] = b"READINFO";
const DEVICE_ID: &[u8] = b"DEVIDSST";
const ERASE_ALL: &[u8] = b"ERASEALL";
const READ_BANK: &[u8] = b"RDBANK";
const READ_SECTOR: &[u8] = b"RDSECT";
const READ_BLOCK: &[u8] = b"RDBK";
const WRITE_BLOCK: &[u8] = b"WRBK";
const WRITE_SECTOR: &[u8] = b"WRSECT";
const ERASE_SECTOR: &[u8] = b"ESST";

/// Decoded command with its typed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Board identity string
    ReadInfo,
    /// Manufacturer and device id
    DeviceId,
    /// Read one 16 KiB bank
    ReadBank(u8),
    /// Read one 4 KiB sector
    ReadSector(u8),
    /// Read one 256 byte block
    ReadBlock(u16),
    /// Program one block, payload follows the frame
    WriteBlock(u16),
    /// Program one sector, payload follows the frame
    WriteSector(u8),
    /// Erase the sector starting at this block index
    EraseSector(u16),
    /// Erase the whole chip
    EraseAll,
}

impl Command {
    /// Encode into a wire frame
    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; FRAME_LEN];
        match *self {
            Self::ReadInfo => frame.copy_from_slice(READ_INFO),
            Self::DeviceId => frame.copy_from_slice(DEVICE_ID),
            Self::EraseAll => frame.copy_from_slice(ERASE_ALL),
            Self::ReadBank(bank) => put_param(&mut frame, READ_BANK, bank as u16),
            Self::ReadSector(sector) => put_param(&mut frame, READ_SECTOR, sector as u16),
            Self::ReadBlock(block) => put_param(&mut frame, READ_BLOCK, block),
            Self::WriteBlock(block) => put_param(&mut frame, WRITE_BLOCK, block),
            Self::WriteSector(sector) => put_param(&mut frame, WRITE_SECTOR, sector as u16),
            Self::EraseSector(block) => put_param(&mut frame, ERASE_SECTOR, block),
        }
        frame
    }

    /// Decode a wire frame
    ///
    /// Returns [`Error::InvalidFrame`] if the length is wrong,
    /// [`Error::UnknownCommand`] for an unrecognised mnemonic and
    /// [`Error::InvalidParameter`] for a malformed hex field.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FRAME_LEN {
            return Err(Error::InvalidFrame);
        }

        match bytes {
            READ_INFO => return Ok(Self::ReadInfo),
            DEVICE_ID => return Ok(Self::DeviceId),
            ERASE_ALL => return Ok(Self::EraseAll),
            _ => {}
        }

        if let Some(hex) = bytes.strip_prefix(READ_BANK) {
            Ok(Self::ReadBank(parse_hex(hex)? as u8))
        } else if let Some(hex) = bytes.strip_prefix(READ_SECTOR) {
            Ok(Self::ReadSector(parse_hex(hex)? as u8))
        } else if let Some(hex) = bytes.strip_prefix(WRITE_SECTOR) {
            Ok(Self::WriteSector(parse_hex(hex)? as u8))
        } else if let Some(hex) = bytes.strip_prefix(READ_BLOCK) {
            Ok(Self::ReadBlock(parse_hex(hex)?))
        } else if let Some(hex) = bytes.strip_prefix(WRITE_BLOCK) {
            Ok(Self::WriteBlock(parse_hex(hex)?))
        } else if let Some(hex) = bytes.strip_prefix(ERASE_SECTOR) {
            Ok(Self::EraseSector(parse_hex(hex)?))
        } else {
            Err(Error::UnknownCommand)
        }
    }

    /// Mnemonic without the parameter
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::ReadInfo => "READINFO",
            Self::DeviceId => "DEVIDSST",
            Self::ReadBank(_) => "RDBANK",
            Self::ReadSector(_) => "RDSECT",
            Self::ReadBlock(_) => "RDBK",
            Self::WriteBlock(_) => "WRBK",
            Self::WriteSector(_) => "WRSECT",
            Self::EraseSector(_) => "ESST",
            Self::EraseAll => "ERASEALL",
        }
    }

    /// Bytes the host sends after the frame
    pub const fn payload_len(&self) -> usize {
        match self {
            Self::WriteBlock(_) => BLOCK_SIZE,
            Self::WriteSector(_) => SECTOR_SIZE,
            _ => 0,
        }
    }

    /// Bytes the device sends after echoing the frame
    pub const fn response_len(&self) -> usize {
        match self {
            Self::ReadInfo => INFO_LEN,
            Self::DeviceId => 2,
            Self::ReadBank(_) => BANK_SIZE,
            Self::ReadSector(_) => SECTOR_SIZE,
            Self::ReadBlock(_) => BLOCK_SIZE,
            Self::WriteBlock(_) => 1,
            Self::WriteSector(_) | Self::EraseSector(_) | Self::EraseAll => 2,
        }
    }

    /// Whether the command modifies flash contents
    pub const fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::WriteBlock(_) | Self::WriteSector(_) | Self::EraseSector(_) | Self::EraseAll
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.encode();
        // Encoded frames are always ASCII
        f.write_str(core::str::from_utf8(&frame).map_err(|_| fmt::Error)?)
    }
}

fn put_param(frame: &mut Frame, mnemonic: &[u8], value: u16) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let (head, tail) = frame.split_at_mut(mnemonic.len());
    head.copy_from_slice(mnemonic);
    let mut v = value;
    for slot in tail.iter_mut().rev() {
        *slot = DIGITS[(v & 0xF) as usize];
        v >>= 4;
    }
}

fn parse_hex(digits: &[u8]) -> Result<u16> {
    digits.iter().try_fold(0u16, |acc, &c| {
        let nibble = match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'F' => c - b'A' + 10,
            _ => return Err(Error::InvalidParameter),
        };
        Ok((acc << 4) | nibble as u16)
    })
}

/// Check whether a byte may appear in a frame
pub const fn is_frame_byte(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit()
}

/// Accumulates inbound bytes into command frames
///
/// Bytes that can never be part of a frame are discarded so line endings
/// or stray noise between commands do not shift the framing.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8, FRAME_LEN>,
}

impl FrameParser {
    /// Create an empty parser
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed one byte, returning a frame once eight have accumulated
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        if !is_frame_byte(byte) {
            return None;
        }
        // Cannot overflow: the buffer is drained as soon as it is full
        let _ = self.buf.push(byte);
        if self.buf.is_full() {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&self.buf);
            self.buf.clear();
            Some(frame)
        } else {
            None
        }
    }

    /// Number of bytes waiting for the rest of a frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
