//! Flash images and sizing rules
//!
//! A [`FlashImage`] destined for the chip is always a whole number of
//! sectors, so every write can be scheduled as erase-then-program per
//! sector without touching bytes outside the image.

use sstflash_core::geometry::{BANK_SIZE, ERASED_VALUE, SECTOR_SIZE};

use crate::error::{FlashError, Result};

/// Byte used to pad a short bank image
pub const BANK_PAD_VALUE: u8 = 0x00;

/// How to fit a whole-chip image to the chip's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    /// The image must be exactly the chip size
    Exact,
    /// Pad a shorter image with the given byte, reject a longer one
    Pad(u8),
    /// Pad a shorter image with the given byte, truncate a longer one
    Resize(u8),
    /// Keep the image length, only rounding up to a whole sector with the
    /// erased value; the rest of the chip is left untouched
    KeepLength,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::Pad(ERASED_VALUE)
    }
}

/// Bytes to write, or bytes read back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashImage {
    data: Vec<u8>,
}

impl FlashImage {
    /// Build a single-bank image, zero padded to the bank size
    pub fn for_bank(data: &[u8]) -> Result<Self> {
        if data.len() > BANK_SIZE {
            return Err(FlashError::ImageTooLarge {
                len: data.len(),
                max: BANK_SIZE,
            });
        }

        let mut buf = data.to_vec();
        if buf.len() < BANK_SIZE {
            log::debug!(
                "Padding {} byte image to one bank with 0x{:02X}",
                buf.len(),
                BANK_PAD_VALUE
            );
            buf.resize(BANK_SIZE, BANK_PAD_VALUE);
        }
        Ok(Self { data: buf })
    }

    /// Build a whole-chip image for a chip of `capacity` bytes
    pub fn for_chip(data: &[u8], capacity: usize, policy: SizePolicy) -> Result<Self> {
        if data.is_empty() {
            return Err(FlashError::EmptyImage);
        }

        let len = data.len();
        let mut buf = data.to_vec();
        match policy {
            SizePolicy::Exact if len != capacity => {
                return Err(FlashError::ImageSizeMismatch {
                    len,
                    expected: capacity,
                });
            }
            SizePolicy::Exact => {}
            SizePolicy::Pad(_) | SizePolicy::KeepLength if len > capacity => {
                return Err(FlashError::ImageTooLarge { len, max: capacity });
            }
            SizePolicy::Pad(pad) => {
                if len < capacity {
                    log::warn!(
                        "Image is {} bytes, padding to {} with 0x{:02X}",
                        len,
                        capacity,
                        pad
                    );
                }
                buf.resize(capacity, pad);
            }
            SizePolicy::Resize(pad) => {
                if len > capacity {
                    log::warn!("Image is {} bytes, truncating to {}", len, capacity);
                } else if len < capacity {
                    log::warn!(
                        "Image is {} bytes, padding to {} with 0x{:02X}",
                        len,
                        capacity,
                        pad
                    );
                }
                buf.resize(capacity, pad);
            }
            SizePolicy::KeepLength => {
                buf.resize(len.next_multiple_of(SECTOR_SIZE), ERASED_VALUE);
            }
        }
        Ok(Self { data: buf })
    }

    /// Wrap bytes read from the chip
    pub fn from_read(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sectors covered by the image
    pub fn sector_count(&self) -> usize {
        self.data.len().div_ceil(SECTOR_SIZE)
    }

    /// Banks touched by the image
    pub fn bank_count(&self) -> usize {
        self.data.len().div_ceil(BANK_SIZE)
    }

    /// Iterate over sector-sized chunks
    pub fn sectors(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(SECTOR_SIZE)
    }
}

impl From<Vec<u8>> for FlashImage {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for FlashImage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
