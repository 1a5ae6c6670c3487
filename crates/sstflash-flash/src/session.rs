//! Flashing session
//!
//! [`Flasher`] turns whole images into ordered protocol commands:
//!
//! 1. identify the chip and refuse unknown parts before touching data
//! 2. per sector in address order: erase, then program its blocks
//!    (or skip it entirely in quick mode when the source is all 0xFF)
//! 3. re-identify to catch a chip swapped mid-operation
//! 4. read back the written banks and compare block by block
//!
//! Cancellation is checked between sectors only; a started sector always
//! runs to completion. Nothing is retried automatically.

use sstflash_core::algorithm::PollResult;
use sstflash_core::chip::{ChipIdentity, ChipModel};
use sstflash_core::geometry::{
    first_sector_of_bank, is_erased, BANK_SIZE, BLOCKS_PER_SECTOR, BLOCK_SIZE,
};
use sstflash_serial::{PicoFlasher, Transport};

use crate::cancel::CancellationToken;
use crate::error::{BlockMismatch, FlashError, Result};
use crate::image::{FlashImage, SizePolicy};
use crate::progress::{Event, Phase, ProgressSink, Tracker};

/// Which sectors get erased and programmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Erase and program every sector of the image
    #[default]
    Standard,
    /// Skip sectors whose source bytes are all 0xFF, assuming the chip
    /// was erased beforehand
    Quick,
}

/// How sector data is sent to the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMethod {
    /// Sixteen `WRBK` commands per sector, additive checksum each
    #[default]
    Block,
    /// One `WRSECT` command per sector, CRC16/XMODEM
    Sector,
}

/// Options for write operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Sector selection
    pub mode: WriteMode,
    /// Wire method
    pub method: WriteMethod,
    /// Read back and compare after writing
    pub verify: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Standard,
            method: WriteMethod::Block,
            verify: true,
        }
    }
}

/// Identified chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    /// Raw identity bytes
    pub identity: ChipIdentity,
    /// Matching part
    pub model: ChipModel,
}

/// Summary of a completed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    /// Sectors erased and programmed
    pub sectors_written: u32,
    /// Sectors skipped in quick mode
    pub sectors_skipped: u32,
    /// Highest erase poll count seen
    pub max_erase_cycles: u16,
    /// Whether the read-back comparison ran
    pub verified: bool,
}

/// Orchestrates operations over one programmer connection
pub struct Flasher<T: Transport> {
    client: PicoFlasher<T>,
}

impl<T: Transport> Flasher<T> {
    /// Wrap a connected client
    pub fn new(client: PicoFlasher<T>) -> Self {
        Self { client }
    }

    /// Access the protocol client
    pub fn client_mut(&mut self) -> &mut PicoFlasher<T> {
        &mut self.client
    }

    /// Release the protocol client
    pub fn into_client(self) -> PicoFlasher<T> {
        self.client
    }

    /// Read the identity and map it to a supported part
    pub fn identify(&mut self) -> Result<ChipInfo> {
        let identity = self.client.chip_identity()?;
        let model = identity
            .model()
            .map_err(|_| FlashError::UnknownChip { identity })?;
        log::info!("Found {} ({})", model, identity);
        Ok(ChipInfo { identity, model })
    }

    /// Read `count` banks starting at `first`
    pub fn read_banks(
        &mut self,
        first: u8,
        count: u32,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<FlashImage> {
        let chip = self.identify()?;
        sink.event(Event::ChipIdentified(chip.model));
        check_banks(&chip, first, count)?;

        let mut tracker = Tracker::new(sink, count);
        tracker.phase(Phase::Read);
        let data = self.read_range(first, count, &mut tracker, cancel)?;
        Ok(FlashImage::from_read(data))
    }

    /// Read the whole chip
    pub fn read_chip(
        &mut self,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(ChipInfo, FlashImage)> {
        let chip = self.identify()?;
        sink.event(Event::ChipIdentified(chip.model));

        let banks = chip.model.bank_count();
        let mut tracker = Tracker::new(sink, banks);
        tracker.phase(Phase::Read);
        let data = self.read_range(0, banks, &mut tracker, cancel)?;
        Ok((chip, FlashImage::from_read(data)))
    }

    /// Write up to one bank of data at `bank`, zero padded
    pub fn write_bank(
        &mut self,
        data: &[u8],
        bank: u8,
        options: &WriteOptions,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<WriteReport> {
        let image = FlashImage::for_bank(data)?;
        let chip = self.begin_write(sink)?;
        self.write_image(&chip, &image, bank, options, sink, cancel)
    }

    /// Write a whole-chip image sized according to `policy`
    pub fn write_chip(
        &mut self,
        data: &[u8],
        policy: SizePolicy,
        options: &WriteOptions,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<WriteReport> {
        let chip = self.begin_write(sink)?;
        let image = FlashImage::for_chip(data, chip.model.capacity() as usize, policy)?;
        self.write_image(&chip, &image, 0, options, sink, cancel)
    }

    /// Compare the chip contents at `first_bank` against an image
    pub fn verify(
        &mut self,
        image: &FlashImage,
        first_bank: u8,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let chip = self.identify()?;
        sink.event(Event::ChipIdentified(chip.model));
        let banks = image.bank_count() as u32;
        check_banks(&chip, first_bank, banks)?;

        let mut tracker = Tracker::new(sink, banks);
        self.verify_range(image, first_bank, &mut tracker, cancel)
    }

    /// Erase the whole chip
    pub fn erase_chip(&mut self, sink: &mut dyn ProgressSink) -> Result<PollResult> {
        self.begin_write(sink)?;

        let mut tracker = Tracker::new(sink, 1);
        tracker.phase(Phase::Erase);
        let result = self.client.erase_chip()?;
        if !result.completed {
            return Err(FlashError::ChipEraseTimeout {
                cycles: result.cycles,
            });
        }
        tracker.advance(1);
        log::info!("Chip erased ({} poll cycles)", result.cycles);
        Ok(result)
    }

    fn begin_write(&mut self, sink: &mut dyn ProgressSink) -> Result<ChipInfo> {
        sink.event(Event::Phase(Phase::Identify));
        self.client.require_destructive()?;
        let chip = self.identify()?;
        sink.event(Event::ChipIdentified(chip.model));
        Ok(chip)
    }

    fn write_image(
        &mut self,
        chip: &ChipInfo,
        image: &FlashImage,
        first_bank: u8,
        options: &WriteOptions,
        sink: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<WriteReport> {
        let banks = image.bank_count() as u32;
        check_banks(chip, first_bank, banks)?;

        let sectors = image.sector_count() as u32;
        let total = sectors + if options.verify { banks } else { 0 };
        let mut tracker = Tracker::new(sink, total);
        tracker.phase(Phase::Write);

        let first_sector = first_sector_of_bank(first_bank);
        let mut report = WriteReport::default();

        for (i, source) in image.sectors().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Write cancelled before sector {}", i);
                return Err(FlashError::Cancelled {
                    completed: tracker.done(),
                    total: tracker.total(),
                });
            }
            // Bank range was checked, so the index fits the chip
            let sector = (first_sector + i as u16) as u8;

            if options.mode == WriteMode::Quick && is_erased(source) {
                log::debug!("Skipping erased sector 0x{:02X}", sector);
                tracker.emit(Event::SectorSkipped(sector));
                report.sectors_skipped += 1;
                tracker.advance(1);
                continue;
            }

            let cycles = self.erase_sector(sector)?;
            report.max_erase_cycles = report.max_erase_cycles.max(cycles);

            match options.method {
                WriteMethod::Block => {
                    let first_block = sector as u16 * BLOCKS_PER_SECTOR as u16;
                    for (j, block) in source.chunks(BLOCK_SIZE).enumerate() {
                        self.client.write_block(first_block + j as u16, block)?;
                    }
                }
                WriteMethod::Sector => self.client.write_sector(sector, source)?,
            }

            report.sectors_written += 1;
            tracker.advance(1);
        }

        let after = self.client.chip_identity()?;
        if after != chip.identity {
            return Err(FlashError::ChipChanged {
                before: chip.identity,
                after,
            });
        }

        if options.verify {
            self.verify_range(image, first_bank, &mut tracker, cancel)?;
            report.verified = true;
        }

        log::info!(
            "Wrote {} sector(s), skipped {}",
            report.sectors_written,
            report.sectors_skipped
        );
        Ok(report)
    }

    fn erase_sector(&mut self, sector: u8) -> Result<u16> {
        let result = self.client.erase_sector(sector)?;
        if !result.completed {
            return Err(FlashError::EraseTimeout {
                sector,
                cycles: result.cycles,
            });
        }
        Ok(result.cycles)
    }

    fn read_range(
        &mut self,
        first: u8,
        count: u32,
        tracker: &mut Tracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(count as usize * BANK_SIZE);
        for bank in first as u32..first as u32 + count {
            if cancel.is_cancelled() {
                return Err(FlashError::Cancelled {
                    completed: tracker.done(),
                    total: tracker.total(),
                });
            }
            data.extend_from_slice(&self.client.read_bank(bank as u8)?);
            tracker.advance(1);
        }
        Ok(data)
    }

    fn verify_range(
        &mut self,
        image: &FlashImage,
        first_bank: u8,
        tracker: &mut Tracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracker.phase(Phase::Verify);
        let banks = image.bank_count() as u32;
        let actual = self.read_range(first_bank, banks, tracker, cancel)?;

        let base = first_bank as u32 * BANK_SIZE as u32;
        let mismatches = compare_blocks(image.as_bytes(), &actual, base);
        if mismatches.is_empty() {
            log::info!("Verified {} bytes", image.len());
            Ok(())
        } else {
            for m in &mismatches {
                log::debug!("{}", m);
            }
            Err(FlashError::VerificationFailed { mismatches })
        }
    }
}

fn check_banks(chip: &ChipInfo, first: u8, count: u32) -> Result<()> {
    let available = chip.model.bank_count();
    if count == 0 || first as u32 + count > available {
        return Err(FlashError::BankOutOfRange {
            first,
            count,
            available,
        });
    }
    Ok(())
}

/// Compare block by block, `base` being the chip address of `expected[0]`
pub fn compare_blocks(expected: &[u8], actual: &[u8], base: u32) -> Vec<BlockMismatch> {
    expected
        .chunks(BLOCK_SIZE)
        .zip(actual.chunks(BLOCK_SIZE))
        .enumerate()
        .filter_map(|(i, (want, got))| {
            let first = want.iter().zip(got).position(|(a, b)| a != b)?;
            let start = base + (i * BLOCK_SIZE) as u32;
            Some(BlockMismatch {
                block: (start / BLOCK_SIZE as u32) as u16,
                address: start + first as u32,
                expected: want[first],
                actual: got[first],
                differing: want.iter().zip(got).filter(|(a, b)| a != b).count(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_blocks() {
        let expected = vec![0x55u8; 4 * BLOCK_SIZE];
        let mut actual = expected.clone();
        actual[BLOCK_SIZE + 7] = 0x54;
        actual[BLOCK_SIZE + 9] = 0x00;
        actual[3 * BLOCK_SIZE] = 0xFF;

        let m = compare_blocks(&expected, &actual, 0x8000);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].block, 0x81);
        assert_eq!(m[0].address, 0x8107);
        assert_eq!(m[0].expected, 0x55);
        assert_eq!(m[0].actual, 0x54);
        assert_eq!(m[0].differing, 2);
        assert_eq!(m[1].block, 0x83);
        assert_eq!(m[1].address, 0x8300);
    }

    #[test]
    fn test_compare_identical() {
        let data = vec![1u8; BANK_SIZE];
        assert!(compare_blocks(&data, &data, 0).is_empty());
    }

    #[test]
    fn test_default_options() {
        let opts = WriteOptions::default();
        assert_eq!(opts.mode, WriteMode::Standard);
        assert_eq!(opts.method, WriteMethod::Block);
        assert!(opts.verify);
    }
}
