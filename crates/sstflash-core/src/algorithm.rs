//! SST39SF0x0 command sequences
//!
//! Every program or erase operation is preceded by the software data
//! protection unlock writes. Completion is detected with data polling on
//! DQ7 instead of fixed delays, and every poll loop is bounded.

use crate::bus::{BusPins, ParallelBus};
use crate::chip::ChipIdentity;
use crate::error::{Error, Result};

/// First unlock address
pub const UNLOCK_ADDR_1: u32 = 0x5555;
/// Second unlock address
pub const UNLOCK_ADDR_2: u32 = 0x2AAA;
/// First unlock byte
pub const UNLOCK_BYTE_1: u8 = 0xAA;
/// Second unlock byte
pub const UNLOCK_BYTE_2: u8 = 0x55;

/// Software ID entry
pub const CMD_ID_ENTRY: u8 = 0x90;
/// Software ID exit
pub const CMD_ID_EXIT: u8 = 0xF0;
/// Byte program
pub const CMD_PROGRAM: u8 = 0xA0;
/// Erase setup
pub const CMD_ERASE_SETUP: u8 = 0x80;
/// Sector erase, written at the sector address
pub const CMD_SECTOR_ERASE: u8 = 0x30;
/// Chip erase, written at the first unlock address
pub const CMD_CHIP_ERASE: u8 = 0x10;

/// Maximum data-poll reads for an erase
pub const POLL_LIMIT: u16 = 0xF000;

/// Maximum data-poll reads for a single byte program
///
/// Byte program takes at most 20us, so this is generous even on a fast bus.
pub const PROGRAM_POLL_LIMIT: u16 = 0x0400;

/// Outcome of a data-poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    /// Reads performed
    pub cycles: u16,
    /// Whether the polled condition became true
    pub completed: bool,
}

impl PollResult {
    /// Interpret a cycle count received over the wire
    ///
    /// Only the count is transmitted, so a count that used the whole
    /// budget is treated as incomplete.
    pub const fn from_cycles(cycles: u16) -> Self {
        Self {
            cycles,
            completed: cycles < POLL_LIMIT,
        }
    }
}

/// Flash operations on top of a [`ParallelBus`]
pub struct FlashEngine<P: BusPins> {
    bus: ParallelBus<P>,
}

impl<P: BusPins> FlashEngine<P> {
    /// Create an engine driving the given bus
    pub fn new(bus: ParallelBus<P>) -> Self {
        Self { bus }
    }

    /// Access the bus
    pub fn bus(&self) -> &ParallelBus<P> {
        &self.bus
    }

    /// Mutable access to the bus
    pub fn bus_mut(&mut self) -> &mut ParallelBus<P> {
        &mut self.bus
    }

    /// Release the bus
    pub fn into_bus(self) -> ParallelBus<P> {
        self.bus
    }

    fn unlock(&mut self) {
        self.bus.write_byte(UNLOCK_ADDR_1, UNLOCK_BYTE_1);
        self.bus.write_byte(UNLOCK_ADDR_2, UNLOCK_BYTE_2);
    }

    fn command(&mut self, cmd: u8) {
        self.unlock();
        self.bus.write_byte(UNLOCK_ADDR_1, cmd);
    }

    /// Read the manufacturer and device id
    pub fn identify(&mut self) -> ChipIdentity {
        self.command(CMD_ID_ENTRY);
        let manufacturer = self.bus.read_byte(0x0000);
        let device = self.bus.read_byte(0x0001);
        self.command(CMD_ID_EXIT);

        log::debug!("identify: {:02X} {:02X}", manufacturer, device);
        ChipIdentity::new(manufacturer, device)
    }

    /// Read consecutive bytes
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) {
        self.bus.read_into(addr, buf);
    }

    /// Program one byte and wait for it to land
    pub fn program_byte(&mut self, addr: u32, value: u8) -> Result<PollResult> {
        self.command(CMD_PROGRAM);
        self.bus.write_byte(addr, value);

        let result = self.wait_program(addr, value);
        if result.completed {
            Ok(result)
        } else {
            Err(Error::ProgramTimeout { addr })
        }
    }

    /// Program consecutive bytes
    ///
    /// Uses the burst path so only changed address groups are latched.
    /// Bytes already in the erased state are skipped. Stops at the first
    /// byte that does not complete.
    pub fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let mut burst = self.bus.burst();
        for (i, &value) in data.iter().enumerate() {
            if value == crate::geometry::ERASED_VALUE {
                continue;
            }
            let target = addr.wrapping_add(i as u32);

            burst.write(UNLOCK_ADDR_1, UNLOCK_BYTE_1);
            burst.write(UNLOCK_ADDR_2, UNLOCK_BYTE_2);
            burst.write(UNLOCK_ADDR_1, CMD_PROGRAM);
            burst.write(target, value);

            let done = (0..PROGRAM_POLL_LIMIT).any(|_| burst.read(target) == value);
            if !done {
                log::warn!("program timeout at 0x{:05X}", target);
                return Err(Error::ProgramTimeout { addr: target });
            }
        }
        Ok(())
    }

    /// Erase the sector containing `addr`
    pub fn erase_sector(&mut self, addr: u32) -> PollResult {
        self.unlock();
        self.bus.write_byte(UNLOCK_ADDR_1, CMD_ERASE_SETUP);
        self.unlock();
        self.bus.write_byte(addr, CMD_SECTOR_ERASE);

        let result = self.data_poll(addr, POLL_LIMIT);
        if !result.completed {
            log::warn!("sector erase at 0x{:05X} timed out", addr);
        }
        result
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self) -> PollResult {
        self.unlock();
        self.bus.write_byte(UNLOCK_ADDR_1, CMD_ERASE_SETUP);
        self.command(CMD_CHIP_ERASE);

        let result = self.data_poll(0, POLL_LIMIT);
        if !result.completed {
            log::warn!("chip erase timed out");
        }
        result
    }

    /// Poll `addr` until DQ7 reads high
    ///
    /// At most `limit - 1` reads are made. A completed poll always reports
    /// fewer than `limit` cycles and an exhausted one reports exactly
    /// `limit`, matching [`PollResult::from_cycles`].
    pub fn data_poll(&mut self, addr: u32, limit: u16) -> PollResult {
        let mut burst = self.bus.burst();
        for cycles in 1..limit {
            if burst.read(addr) & 0x80 != 0 {
                return PollResult {
                    cycles,
                    completed: true,
                };
            }
        }
        PollResult {
            cycles: limit,
            completed: false,
        }
    }

    fn wait_program(&mut self, addr: u32, value: u8) -> PollResult {
        let mut burst = self.bus.burst();
        let mut cycles = 0;
        while cycles < PROGRAM_POLL_LIMIT {
            cycles += 1;
            if burst.read(addr) == value {
                return PollResult {
                    cycles,
                    completed: true,
                };
            }
        }
        PollResult {
            cycles,
            completed: false,
        }
    }
}
