//! Chip identity table
//!
//! The supported parts differ only in capacity. Identity is read with the
//! software ID entry sequence and mapped here to a [`ChipModel`].

use core::fmt;

use crate::error::{Error, Result};
use crate::geometry::{BANK_SIZE, BLOCK_SIZE, SECTOR_SIZE};

/// Manufacturer id of the supported vendor family
pub const MANUFACTURER_SST: u8 = 0xBF;

/// Raw identity bytes read from addresses 0 and 1 in ID mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipIdentity {
    /// Manufacturer id
    pub manufacturer: u8,
    /// Device id
    pub device: u8,
}

impl ChipIdentity {
    /// Construct from the two identity bytes
    pub const fn new(manufacturer: u8, device: u8) -> Self {
        Self {
            manufacturer,
            device,
        }
    }

    /// Combined 16-bit id, manufacturer in the high byte
    pub const fn as_u16(&self) -> u16 {
        ((self.manufacturer as u16) << 8) | self.device as u16
    }

    /// Look up the chip model for this identity
    pub fn model(&self) -> Result<ChipModel> {
        ChipModel::from_identity(*self)
    }
}

impl fmt::Display for ChipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}{:02X}", self.manufacturer, self.device)
    }
}

/// Supported parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipModel {
    /// 1 Mbit (128 KiB)
    Sst39sf010,
    /// 2 Mbit (256 KiB)
    Sst39sf020,
    /// 4 Mbit (512 KiB)
    Sst39sf040,
}

impl ChipModel {
    /// All supported parts, smallest first
    pub const ALL: [ChipModel; 3] = [Self::Sst39sf010, Self::Sst39sf020, Self::Sst39sf040];

    /// Map an identity to a supported part
    pub fn from_identity(id: ChipIdentity) -> Result<Self> {
        match (id.manufacturer, id.device) {
            (MANUFACTURER_SST, 0xB5) => Ok(Self::Sst39sf010),
            (MANUFACTURER_SST, 0xB6) => Ok(Self::Sst39sf020),
            (MANUFACTURER_SST, 0xB7) => Ok(Self::Sst39sf040),
            (manufacturer, device) => Err(Error::UnknownChip {
                manufacturer,
                device,
            }),
        }
    }

    /// Identity bytes this part answers with
    pub const fn identity(&self) -> ChipIdentity {
        let device = match self {
            Self::Sst39sf010 => 0xB5,
            Self::Sst39sf020 => 0xB6,
            Self::Sst39sf040 => 0xB7,
        };
        ChipIdentity::new(MANUFACTURER_SST, device)
    }

    /// Part name as printed on the package
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sst39sf010 => "SST39SF010",
            Self::Sst39sf020 => "SST39SF020",
            Self::Sst39sf040 => "SST39SF040",
        }
    }

    /// Capacity in bytes
    pub const fn capacity(&self) -> u32 {
        match self {
            Self::Sst39sf010 => 131072,
            Self::Sst39sf020 => 262144,
            Self::Sst39sf040 => 524288,
        }
    }

    /// Number of 16 KiB banks
    pub const fn bank_count(&self) -> u32 {
        self.capacity() / BANK_SIZE as u32
    }

    /// Number of 4 KiB sectors
    pub const fn sector_count(&self) -> u32 {
        self.capacity() / SECTOR_SIZE as u32
    }

    /// Number of 256 byte blocks
    pub const fn block_count(&self) -> u32 {
        self.capacity() / BLOCK_SIZE as u32
    }

    /// Parse a part name, case-insensitively (`sst39sf010` or `010`)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| {
            m.name().eq_ignore_ascii_case(name)
                || m.name()[7..].eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for ChipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
