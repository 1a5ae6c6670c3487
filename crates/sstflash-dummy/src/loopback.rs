//! In-process programmer behind the host transport
//!
//! Bytes written by the host are fed one at a time into the real
//! [`Programmer`] dispatcher, whose replies are queued for the host to
//! read. A cloneable [`DummyProbe`] stays with the test (or CLI) to inspect
//! the emulated chip, count the commands that ran and inject link faults.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sstflash_core::algorithm::FlashEngine;
use sstflash_core::bus::{BusTiming, ParallelBus};
use sstflash_core::codec::{Command, FRAME_LEN, INFO_LEN};
use sstflash_core::firmware::{HostLink, Programmer};
use sstflash_core::version::BOARD_ID;
use sstflash_serial::{Result, Transport};

use crate::EmulatedChip;

/// Device side of the emulated serial line
#[derive(Default)]
struct Wire {
    rx: VecDeque<u8>,
    tx: VecDeque<u8>,
    serviced: u64,
}

impl embedded_io::ErrorType for Wire {
    type Error = Infallible;
}

impl embedded_io::Write for Wire {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Infallible> {
        self.tx.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), Infallible> {
        Ok(())
    }
}

impl HostLink for Wire {
    fn poll_byte(&mut self) -> core::result::Result<Option<u8>, Infallible> {
        Ok(self.rx.pop_front())
    }

    fn service(&mut self) {
        self.serviced += 1;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    corrupt_echoes: u32,
    mute: bool,
}

struct Inner {
    programmer: Programmer<EmulatedChip>,
    wire: Wire,
    journal: Vec<Command>,
    faults: Faults,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host transport connected to an emulated programmer board
pub struct LoopbackTransport {
    shared: Shared,
}

impl LoopbackTransport {
    /// Build a board around the given chip
    pub fn new(chip: EmulatedChip) -> Self {
        Self::with_board_id(chip, *BOARD_ID)
    }

    /// Build a board that reports a different identity string
    pub fn with_board_id(chip: EmulatedChip, board_id: [u8; INFO_LEN]) -> Self {
        let engine = FlashEngine::new(ParallelBus::new(chip, BusTiming::NONE));
        let inner = Inner {
            programmer: Programmer::with_board_id(engine, board_id),
            wire: Wire::default(),
            journal: Vec::new(),
            faults: Faults::default(),
        };
        Self {
            shared: Arc::new(Mutex::new(inner)),
        }
    }

    /// Handle for inspecting the board from outside the transport
    pub fn probe(&self) -> DummyProbe {
        DummyProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Transport for LoopbackTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = lock(&self.shared);
        let Inner {
            programmer,
            wire,
            journal,
            faults,
        } = &mut *inner;

        if faults.mute {
            return Ok(());
        }

        let reply_start = wire.tx.len();
        wire.rx.extend(data);
        while !wire.rx.is_empty() {
            // Infallible
            if let Ok(Some(cmd)) = programmer.poll(wire) {
                journal.push(cmd);
            }
        }

        if data.len() == FRAME_LEN && faults.corrupt_echoes > 0 {
            if let Some(b) = wire.tx.get_mut(reply_start) {
                faults.corrupt_echoes -= 1;
                *b ^= 0x20;
            }
        }
        Ok(())
    }

    fn read_nonblock(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let n = {
            let mut inner = lock(&self.shared);
            let n = buf.len().min(inner.wire.tx.len());
            for (slot, b) in buf.iter_mut().zip(inner.wire.tx.drain(..n)) {
                *slot = b;
            }
            n
        };
        if n == 0 {
            std::thread::sleep(timeout);
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<()> {
        lock(&self.shared).wire.tx.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared view of an emulated board
#[derive(Clone)]
pub struct DummyProbe {
    shared: Shared,
}

impl DummyProbe {
    /// Run a closure against the emulated chip
    pub fn with_chip<R>(&self, f: impl FnOnce(&mut EmulatedChip) -> R) -> R {
        let mut inner = lock(&self.shared);
        f(inner.programmer.engine_mut().bus_mut().pins_mut())
    }

    /// Commands executed so far, in order
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.shared).journal.clone()
    }

    /// Number of executed commands with the given mnemonic
    pub fn count(&self, mnemonic: &str) -> usize {
        lock(&self.shared)
            .journal
            .iter()
            .filter(|c| c.mnemonic() == mnemonic)
            .count()
    }

    /// Forget the executed command history
    pub fn clear_commands(&self) {
        lock(&self.shared).journal.clear();
    }

    /// Garble the echo of the next `n` frames
    pub fn corrupt_echoes(&self, n: u32) {
        lock(&self.shared).faults.corrupt_echoes = n;
    }

    /// Stop answering entirely, as if the board was unplugged
    pub fn set_mute(&self, mute: bool) {
        lock(&self.shared).faults.mute = mute;
    }

    /// Main loop iterations run by the board
    pub fn service_calls(&self) -> u64 {
        lock(&self.shared).wire.serviced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DummyConfig;
    use sstflash_core::chip::ChipModel;
    use sstflash_core::geometry::{BANK_SIZE, BLOCK_SIZE, SECTOR_SIZE};
    use sstflash_serial::{ClientError, PicoFlasher, Timeouts};

    fn board(model: ChipModel) -> (PicoFlasher<LoopbackTransport>, DummyProbe) {
        let transport = LoopbackTransport::new(EmulatedChip::with_model(model));
        let probe = transport.probe();
        let timeouts = Timeouts {
            response: Duration::from_millis(50),
            erase: Duration::from_millis(50),
        };
        (PicoFlasher::connect(transport, timeouts).unwrap(), probe)
    }

    #[test]
    fn test_handshake_and_identity() {
        let (mut f, _) = board(ChipModel::Sst39sf020);
        assert_eq!(f.board().unwrap().name.as_str(), "PICOSST39");
        let id = f.chip_identity().unwrap();
        assert_eq!(id.model().unwrap(), ChipModel::Sst39sf020);
    }

    #[test]
    fn test_write_read_block() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        let data: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i * 3) as u8).collect();

        f.erase_sector(1).unwrap();
        f.write_block(0x10, &data).unwrap();
        assert_eq!(f.read_block(0x10).unwrap(), data);
        assert_eq!(&f.read_sector(1).unwrap()[..BLOCK_SIZE], &data[..]);
        assert_eq!(probe.with_chip(|c| c.violations()), 0);
    }

    #[test]
    fn test_erase_sector_reads_all_ones() {
        let initial = vec![0u8; 0x20000];
        let chip = EmulatedChip::with_data(DummyConfig::default(), &initial);
        let mut f = PicoFlasher::new(LoopbackTransport::new(chip));

        for sector in [0u8, 5, 31] {
            let result = f.erase_sector(sector).unwrap();
            assert!(result.completed);
            assert!(f.read_sector(sector).unwrap().iter().all(|&b| b == 0xFF));
        }
        assert!(f.read_sector(6).unwrap().iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_write_sector_crc() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        let data: Vec<u8> = (0..SECTOR_SIZE).map(|i| (i >> 4) as u8).collect();
        f.erase_sector(2).unwrap();
        f.write_sector(2, &data).unwrap();
        assert_eq!(f.read_sector(2).unwrap(), data);
        assert_eq!(probe.count("WRSECT"), 1);
    }

    #[test]
    fn test_unerased_block_fails_checksum() {
        let (mut f, _) = board(ChipModel::Sst39sf010);
        f.write_block(0, &[0x0F; BLOCK_SIZE]).unwrap();
        assert!(matches!(
            f.write_block(0, &[0xF0; BLOCK_SIZE]),
            Err(ClientError::ChecksumMismatch { block: 0, .. })
        ));
    }

    #[test]
    fn test_corrupted_echo() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        probe.corrupt_echoes(1);
        assert!(matches!(
            f.chip_identity(),
            Err(ClientError::ProtocolMismatch { .. })
        ));
    }

    #[test]
    fn test_link_recovers_after_corrupted_echo() {
        let (mut f, probe) = board(ChipModel::Sst39sf040);
        probe.corrupt_echoes(1);
        assert!(f.chip_identity().is_err());
        for _ in 0..3 {
            let id = f.chip_identity().unwrap();
            assert_eq!(id.model().unwrap(), ChipModel::Sst39sf040);
        }
    }

    #[test]
    fn test_write_recovers_after_corrupted_echo() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        let data: Vec<u8> = (0..BLOCK_SIZE).map(|i| i as u8).collect();

        probe.corrupt_echoes(1);
        assert!(matches!(
            f.write_block(4, &data),
            Err(ClientError::ProtocolMismatch { .. })
        ));
        // The board took the erased filler, so block 4 is untouched
        assert!(f.read_block(4).unwrap().iter().all(|&b| b == 0xFF));

        f.write_block(4, &data).unwrap();
        assert_eq!(f.read_block(4).unwrap(), data);
    }

    /// Distinct contents for every block so address aliasing shows up
    fn block_pattern(block: u16) -> Vec<u8> {
        let mut data: Vec<u8> = (0..BLOCK_SIZE)
            .map(|i| (i as u16).wrapping_mul(7).wrapping_add(block) as u8)
            .collect();
        data[..2].copy_from_slice(&block.to_be_bytes());
        data
    }

    #[test]
    fn test_every_block_round_trips() {
        for model in ChipModel::ALL {
            let (mut f, probe) = board(model);

            for sector in 0..model.sector_count() {
                assert!(f.erase_sector(sector as u8).unwrap().completed);
            }
            for block in 0..model.block_count() as u16 {
                f.write_block(block, &block_pattern(block)).unwrap();
            }
            for block in 0..model.block_count() as u16 {
                assert_eq!(
                    f.read_block(block).unwrap(),
                    block_pattern(block),
                    "{} block 0x{:03X}",
                    model.name(),
                    block
                );
            }

            let blocks_per_bank = (BANK_SIZE / BLOCK_SIZE) as u16;
            for bank in 0..model.bank_count() as u8 {
                let first = bank as u16 * blocks_per_bank;
                let expected: Vec<u8> = (first..first + blocks_per_bank)
                    .flat_map(block_pattern)
                    .collect();
                assert_eq!(
                    f.read_bank(bank).unwrap(),
                    expected,
                    "{} bank {}",
                    model.name(),
                    bank
                );
            }
            assert_eq!(probe.with_chip(|c| c.violations()), 0);
        }
    }

    #[test]
    fn test_unknown_frame_gets_no_response() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        f.transport_mut().write(b"TESTTEST").unwrap();
        let mut buf = [0u8; 32];
        let n = f
            .transport_mut()
            .read_nonblock(&mut buf, Duration::from_millis(1))
            .unwrap();
        assert_eq!(&buf[..n], b"TESTTEST");
        assert_eq!(probe.count("READINFO"), 1);
        assert_eq!(probe.commands().len(), 1);
    }

    #[test]
    fn test_board_services_link() {
        let (mut f, probe) = board(ChipModel::Sst39sf010);
        let before = probe.service_calls();
        f.write_block(3, &[0u8; BLOCK_SIZE]).unwrap();
        assert!(probe.service_calls() >= before + (8 + BLOCK_SIZE) as u64);
    }
}
