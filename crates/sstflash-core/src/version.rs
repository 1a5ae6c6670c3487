//! Board identity and firmware version
//!
//! `READINFO` answers with a fixed 16 byte string such as
//! `PICOSST39-v1.6.0`: a board name starting with `PICO`, a dash, and a
//! semantic version triple.

use core::fmt;

use heapless::String;

use crate::codec::INFO_LEN;
use crate::error::{Error, Result};

/// Identity string reported by this firmware
pub const BOARD_ID: &[u8; INFO_LEN] = b"PICOSST39-v1.6.0";

/// Prefix every supported board name starts with
pub const BOARD_PREFIX: &str = "PICO";

/// Oldest firmware that may run destructive commands
pub const MIN_FIRMWARE_VERSION: FirmwareVersion = FirmwareVersion::new(1, 6, 0);

/// Semantic version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    /// Major
    pub major: u8,
    /// Minor
    pub minor: u8,
    /// Patch
    pub patch: u8,
}

impl FirmwareVersion {
    /// Construct a version
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `MAJOR.MINOR.PATCH`
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let mut next = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or(Error::InvalidBoardId)
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(Error::InvalidBoardId);
        }
        Ok(version)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parsed `READINFO` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    /// Board name without the version suffix
    pub name: String<INFO_LEN>,
    /// Firmware version
    pub version: FirmwareVersion,
}

impl BoardInfo {
    /// Parse the raw identity bytes
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = core::str::from_utf8(raw)
            .map_err(|_| Error::InvalidBoardId)?
            .trim_end_matches(['\0', ' ']);

        if !text.starts_with(BOARD_PREFIX) {
            return Err(Error::InvalidBoardId);
        }
        let (name, version) = text.rsplit_once("-v").ok_or(Error::InvalidBoardId)?;

        Ok(Self {
            name: String::try_from(name).map_err(|_| Error::InvalidBoardId)?,
            version: FirmwareVersion::parse(version)?,
        })
    }

    /// Whether this firmware is new enough for write and erase commands
    pub fn supports_destructive(&self) -> bool {
        self.version >= MIN_FIRMWARE_VERSION
    }
}

impl fmt::Display for BoardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}
