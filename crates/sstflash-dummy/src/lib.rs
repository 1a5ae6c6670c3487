//! sstflash-dummy - Emulated SST39SF0x0 for testing
//!
//! [`EmulatedChip`] sits behind the [`BusPins`] trait exactly where the
//! GPIOs would be on real hardware: it models the three address latches,
//! the strobes and the chip's software data protection state machine, so
//! the real bus sequencing and flash algorithms run unchanged against it.
//!
//! [`LoopbackTransport`] goes one level up and runs the real firmware
//! dispatcher in-process behind the host [`Transport`] trait.
//!
//! [`Transport`]: sstflash_serial::Transport

pub mod loopback;

pub use loopback::{DummyProbe, LoopbackTransport};

use sstflash_core::bus::{BusPins, DataDirection, Latch, Strobes};
use sstflash_core::chip::{ChipIdentity, ChipModel};
use sstflash_core::geometry::{ERASED_VALUE, SECTOR_SIZE};

/// Command addresses are decoded on A0-A14 only
const COMMAND_ADDR_MASK: u32 = 0x7FFF;

/// Configuration for the emulated chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Part to emulate
    pub model: ChipModel,
    /// Reads that see the chip busy after a sector or chip erase
    pub erase_polls: u32,
    /// Reads that see the chip busy after a byte program
    pub program_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            model: ChipModel::Sst39sf010,
            erase_polls: 3,
            program_polls: 1,
        }
    }
}

/// Software data protection sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sdp {
    Idle,
    Unlock1,
    Unlock2,
    Program,
    EraseSetup,
    EraseUnlock1,
    EraseUnlock2,
}

/// Busy count of an operation that never finishes
const STUCK: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Busy {
    remaining: u32,
}

/// In-memory SST39SF0x0 behind the address latches
pub struct EmulatedChip {
    config: DummyConfig,
    identity: ChipIdentity,
    data: Vec<u8>,

    address_bus: u8,
    latches: [u8; 3],
    address_output: bool,
    direction: DataDirection,
    data_out: u8,
    strobes: Strobes,

    sdp: Sdp,
    id_mode: bool,
    busy: Option<Busy>,
    erase_stuck: bool,
    stuck_cells: Vec<u32>,

    violations: u32,
    latch_loads: u32,
    bus_writes: u32,
}

impl EmulatedChip {
    /// Create an erased chip
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![ERASED_VALUE; config.model.capacity() as usize];
        Self {
            identity: config.model.identity(),
            config,
            data,
            address_bus: 0,
            latches: [0; 3],
            address_output: false,
            direction: DataDirection::Input,
            data_out: 0,
            strobes: Strobes::empty(),
            sdp: Sdp::Idle,
            id_mode: false,
            busy: None,
            erase_stuck: false,
            stuck_cells: Vec::new(),
            violations: 0,
            latch_loads: 0,
            bus_writes: 0,
        }
    }

    /// Create an erased chip of the given part with default timing
    pub fn with_model(model: ChipModel) -> Self {
        Self::new(DummyConfig {
            model,
            ..DummyConfig::default()
        })
    }

    /// Create a chip with pre-filled contents
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut chip = Self::new(config);
        let len = initial_data.len().min(chip.data.len());
        chip.data[..len].copy_from_slice(&initial_data[..len]);
        chip
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable flash contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Emulated part
    pub fn model(&self) -> ChipModel {
        self.config.model
    }

    /// Change the identity reported in ID mode, as if another chip had
    /// been inserted
    pub fn set_identity(&mut self, identity: ChipIdentity) {
        self.identity = identity;
    }

    /// Make erases never finish
    pub fn set_erase_stuck(&mut self, stuck: bool) {
        self.erase_stuck = stuck;
    }

    /// Make a cell ignore programming
    pub fn add_stuck_cell(&mut self, addr: u32) {
        self.stuck_cells.push(addr);
    }

    /// Bus protocol violations seen so far
    pub fn violations(&self) -> u32 {
        self.violations
    }

    /// Latch load pulses seen so far
    pub fn latch_loads(&self) -> u32 {
        self.latch_loads
    }

    /// Completed WE cycles seen so far
    pub fn bus_writes(&self) -> u32 {
        self.bus_writes
    }

    fn address(&self) -> u32 {
        let raw = self.latches[0] as u32
            | (self.latches[1] as u32) << 8
            | (self.latches[2] as u32) << 16;
        raw & (self.config.model.capacity() - 1)
    }

    fn violation(&mut self, what: &str) {
        log::warn!("dummy: bus violation: {}", what);
        self.violations += 1;
    }

    fn read_cell(&mut self) -> u8 {
        let addr = self.address();
        if self.id_mode {
            return match addr & 1 {
                0 => self.identity.manufacturer,
                _ => self.identity.device,
            };
        }

        let value = self.data[addr as usize];
        // DQ7 reads the complement of the final value while busy
        let polling = (value & 0x7F) | (!value & 0x80);
        match self.busy.as_mut() {
            Some(busy) if busy.remaining == STUCK => polling,
            Some(busy) => {
                busy.remaining -= 1;
                if busy.remaining == 0 {
                    self.busy = None;
                    value
                } else {
                    polling
                }
            }
            None => value,
        }
    }

    fn write_cycle(&mut self, addr: u32, value: u8) {
        self.bus_writes += 1;
        if self.busy.is_some() {
            log::trace!("dummy: write while busy ignored");
            return;
        }

        let cmd_addr = addr & COMMAND_ADDR_MASK;
        self.sdp = match (self.sdp, cmd_addr, value) {
            (Sdp::Idle, 0x5555, 0xAA) => Sdp::Unlock1,
            (Sdp::Idle, _, 0xF0) => {
                self.id_mode = false;
                Sdp::Idle
            }
            (Sdp::Unlock1, 0x2AAA, 0x55) => Sdp::Unlock2,
            (Sdp::Unlock2, 0x5555, 0x90) => {
                self.id_mode = true;
                Sdp::Idle
            }
            (Sdp::Unlock2, 0x5555, 0xF0) => {
                self.id_mode = false;
                Sdp::Idle
            }
            (Sdp::Unlock2, 0x5555, 0xA0) => Sdp::Program,
            (Sdp::Unlock2, 0x5555, 0x80) => Sdp::EraseSetup,
            (Sdp::Program, _, _) => {
                self.program(addr, value);
                Sdp::Idle
            }
            (Sdp::EraseSetup, 0x5555, 0xAA) => Sdp::EraseUnlock1,
            (Sdp::EraseUnlock1, 0x2AAA, 0x55) => Sdp::EraseUnlock2,
            (Sdp::EraseUnlock2, _, 0x30) => {
                self.erase_sector(addr);
                Sdp::Idle
            }
            (Sdp::EraseUnlock2, 0x5555, 0x10) => {
                self.erase_chip();
                Sdp::Idle
            }
            _ => Sdp::Idle,
        };
    }

    fn program(&mut self, addr: u32, value: u8) {
        if !self.stuck_cells.contains(&addr) {
            // Programming can only clear bits
            self.data[addr as usize] &= value;
        }
        self.start_busy(self.config.program_polls);
    }

    fn erase_sector(&mut self, addr: u32) {
        let base = addr as usize & !(SECTOR_SIZE - 1);
        log::trace!("dummy: erase sector at 0x{:05X}", base);
        self.data[base..base + SECTOR_SIZE].fill(ERASED_VALUE);
        self.start_erase_busy();
    }

    fn erase_chip(&mut self) {
        log::trace!("dummy: chip erase");
        self.data.fill(ERASED_VALUE);
        self.start_erase_busy();
    }

    fn start_erase_busy(&mut self) {
        if self.erase_stuck {
            self.busy = Some(Busy { remaining: STUCK });
        } else {
            self.start_busy(self.config.erase_polls);
        }
    }

    fn start_busy(&mut self, polls: u32) {
        if polls > 0 {
            self.busy = Some(Busy { remaining: polls });
        }
    }
}

impl BusPins for EmulatedChip {
    fn put_address(&mut self, value: u8) {
        self.address_bus = value;
    }

    fn set_latch(&mut self, latch: Latch, load: bool) {
        if !load {
            return;
        }
        if self.strobes.intersects(Strobes::OE | Strobes::WE) {
            self.violation("address latched during an access");
        }
        let index = match latch {
            Latch::Low => 0,
            Latch::High => 1,
            Latch::Upper => 2,
        };
        self.latches[index] = self.address_bus;
        self.latch_loads += 1;
    }

    fn set_address_output(&mut self, enabled: bool) {
        self.address_output = enabled;
    }

    fn set_data_direction(&mut self, direction: DataDirection) {
        if !(self.strobes & (Strobes::OE | Strobes::WE)).is_empty() {
            self.violation("data direction changed during an access");
        }
        self.direction = direction;
    }

    fn put_data(&mut self, value: u8) {
        if self.direction != DataDirection::Output {
            self.violation("data driven while bus is input");
        }
        self.data_out = value;
    }

    fn get_data(&mut self) -> u8 {
        let selected = self.strobes.contains(Strobes::CE | Strobes::OE);
        if !selected || !self.address_output || self.direction != DataDirection::Input {
            self.violation("read without a valid output cycle");
            return ERASED_VALUE;
        }
        self.read_cell()
    }

    fn set_strobes(&mut self, strobes: Strobes) {
        if strobes.contains(Strobes::OE | Strobes::WE) {
            self.violation("OE and WE asserted together");
        }

        let we_rising = self.strobes.contains(Strobes::WE) && !strobes.contains(Strobes::WE);
        if we_rising {
            if self.strobes.contains(Strobes::CE) && self.address_output {
                let addr = self.address();
                self.write_cycle(addr, self.data_out);
            } else {
                self.violation("write strobe without chip enable");
            }
        }
        self.strobes = strobes;
    }

    fn delay_us(&mut self, _us: u32) {}
}
