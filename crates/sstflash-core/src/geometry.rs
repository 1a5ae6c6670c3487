//! Address space partitioning
//!
//! The chip is addressed in three fixed units. A block is the smallest
//! programming unit on the wire, a sector the smallest erase unit, and a
//! bank the unit a single ROM image is placed at.

/// Bytes per block
pub const BLOCK_SIZE: usize = 0x100;
/// Bytes per sector
pub const SECTOR_SIZE: usize = 0x1000;
/// Bytes per bank
pub const BANK_SIZE: usize = 0x4000;

/// Blocks in one sector
pub const BLOCKS_PER_SECTOR: usize = SECTOR_SIZE / BLOCK_SIZE;
/// Sectors in one bank
pub const SECTORS_PER_BANK: usize = BANK_SIZE / SECTOR_SIZE;
/// Blocks in one bank
pub const BLOCKS_PER_BANK: usize = BANK_SIZE / BLOCK_SIZE;

/// Value of an erased byte (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Base address of a block
pub const fn block_address(block: u16) -> u32 {
    (block as u32) * BLOCK_SIZE as u32
}

/// Base address of a sector
pub const fn sector_address(sector: u8) -> u32 {
    (sector as u32) * SECTOR_SIZE as u32
}

/// Base address of a bank
pub const fn bank_address(bank: u8) -> u32 {
    (bank as u32) * BANK_SIZE as u32
}

/// Index of the first block of a sector
pub const fn first_block_of_sector(sector: u8) -> u16 {
    (sector as u16) * BLOCKS_PER_SECTOR as u16
}

/// Index of the first sector of a bank
pub const fn first_sector_of_bank(bank: u8) -> u16 {
    (bank as u16) * SECTORS_PER_BANK as u16
}

/// Sector containing an address
pub const fn sector_of_address(addr: u32) -> u32 {
    addr / SECTOR_SIZE as u32
}

/// Check whether every byte is in the erased state
pub fn is_erased(data: &[u8]) -> bool {
    data.iter().all(|&b| b == ERASED_VALUE)
}
