use std::time::Duration;

use sstflash_core::chip::{ChipIdentity, ChipModel};
use sstflash_core::codec::Command;
use sstflash_core::geometry::{BANK_SIZE, BLOCK_SIZE, SECTOR_SIZE};
use sstflash_dummy::{DummyConfig, DummyProbe, EmulatedChip, LoopbackTransport};
use sstflash_flash::{
    CancellationToken, Event, FlashError, Flasher, NoProgress, Phase, ProgressSink, SizePolicy,
    WriteMethod, WriteMode, WriteOptions,
};
use sstflash_serial::{ClientError, PicoFlasher, Timeouts};

fn timeouts() -> Timeouts {
    Timeouts {
        response: Duration::from_millis(100),
        erase: Duration::from_millis(200),
    }
}

fn connect(chip: EmulatedChip) -> (Flasher<LoopbackTransport>, DummyProbe) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = LoopbackTransport::new(chip);
    let probe = transport.probe();
    let client = PicoFlasher::connect(transport, timeouts()).unwrap();
    probe.clear_commands();
    (Flasher::new(client), probe)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    // Never 0xFF, so every sector needs programming
    (0..len).map(|i| ((i as u8).wrapping_mul(7) ^ seed) & 0x7F).collect()
}

fn units(events: &[Event]) -> Vec<(u32, u32)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(p) => Some((p.units_done, p.units_total)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_write_bank_two_of_128k_chip() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let image = pattern(BANK_SIZE, 0x21);

    let report = flasher
        .write_bank(
            &image,
            2,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(report.sectors_written, 4);
    assert!(report.verified);
    assert_eq!(probe.count("ESST"), 4);
    assert_eq!(probe.count("WRBK"), 64);
    assert_eq!(probe.count("RDBANK"), 1);

    // Erases target the first block of sectors 8..12, each before its blocks
    let commands = probe.commands();
    let erases: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::EraseSector(_)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(commands[erases[0]], Command::EraseSector(0x80));
    assert_eq!(commands[erases[3]], Command::EraseSector(0xB0));
    assert!(matches!(commands[erases[0] + 1], Command::WriteBlock(0x80)));
    let read = commands
        .iter()
        .position(|c| *c == Command::ReadBank(2))
        .unwrap();
    assert!(read > erases[3] + 16);

    probe.with_chip(|chip| {
        assert_eq!(&chip.data()[2 * BANK_SIZE..3 * BANK_SIZE], &image[..]);
        assert!(chip.data()[..2 * BANK_SIZE].iter().all(|&b| b == 0xFF));
        assert!(chip.data()[3 * BANK_SIZE..].iter().all(|&b| b == 0xFF));
        assert_eq!(chip.violations(), 0);
    });
}

#[test]
fn test_short_bank_image_is_zero_padded() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let image = pattern(1000, 3);

    flasher
        .write_bank(
            &image,
            0,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    probe.with_chip(|chip| {
        assert_eq!(&chip.data()[..1000], &image[..]);
        assert!(chip.data()[1000..BANK_SIZE].iter().all(|&b| b == 0x00));
    });
}

#[test]
fn test_quick_mode_skips_erased_sectors() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let mut image = vec![0xFFu8; BANK_SIZE];
    image[SECTOR_SIZE..2 * SECTOR_SIZE].copy_from_slice(&pattern(SECTOR_SIZE, 9));

    let options = WriteOptions {
        mode: WriteMode::Quick,
        ..WriteOptions::default()
    };
    let mut events = Vec::new();
    let report = flasher
        .write_bank(&image, 1, &options, &mut events, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.sectors_written, 1);
    assert_eq!(report.sectors_skipped, 3);
    assert_eq!(probe.count("ESST"), 1);
    assert_eq!(probe.count("WRBK"), 16);
    assert_eq!(
        probe.commands().iter().find(|c| matches!(c, Command::EraseSector(_))),
        Some(&Command::EraseSector(0x50))
    );

    let skipped: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::SectorSkipped(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![4, 6, 7]);
}

#[test]
fn test_progress_is_monotonic() {
    let (mut flasher, _) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let mut events = Vec::new();
    flasher
        .write_bank(
            &pattern(BANK_SIZE, 1),
            0,
            &WriteOptions::default(),
            &mut events,
            &CancellationToken::new(),
        )
        .unwrap();

    let progress = units(&events);
    // 4 sectors plus one verified bank
    assert!(progress.iter().all(|&(_, total)| total == 5));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.first(), Some(&(0, 5)));
    assert_eq!(progress.last(), Some(&(5, 5)));

    assert!(events.contains(&Event::ChipIdentified(ChipModel::Sst39sf010)));
    let write = events.iter().position(|e| *e == Event::Phase(Phase::Write));
    let verify = events.iter().position(|e| *e == Event::Phase(Phase::Verify));
    assert!(write < verify);
}

#[test]
fn test_sector_method_uses_crc_command() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf020));
    let image = pattern(BANK_SIZE, 0x44);
    let options = WriteOptions {
        method: WriteMethod::Sector,
        ..WriteOptions::default()
    };

    flasher
        .write_bank(&image, 15, &options, &mut NoProgress, &CancellationToken::new())
        .unwrap();

    assert_eq!(probe.count("WRSECT"), 4);
    assert_eq!(probe.count("WRBK"), 0);
    probe.with_chip(|chip| assert_eq!(&chip.data()[15 * BANK_SIZE..], &image[..]));
}

#[test]
fn test_write_chip_pads_and_reads_back() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let image = pattern(0x3000, 0x10);

    let report = flasher
        .write_chip(
            &image,
            SizePolicy::Pad(0xFF),
            &WriteOptions {
                mode: WriteMode::Quick,
                ..WriteOptions::default()
            },
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(report.sectors_written, 3);
    assert_eq!(report.sectors_skipped, 29);
    assert_eq!(probe.count("RDBANK"), 8);

    let (chip, read) = flasher
        .read_chip(&mut NoProgress, &CancellationToken::new())
        .unwrap();
    assert_eq!(chip.model, ChipModel::Sst39sf010);
    assert_eq!(read.len(), 0x20000);
    assert_eq!(&read.as_bytes()[..0x3000], &image[..]);
    assert!(read.as_bytes()[0x3000..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_write_chip_exact_size_rejects_short_image() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let err = flasher
        .write_chip(
            &[0u8; 100],
            SizePolicy::Exact,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, FlashError::ImageSizeMismatch { len: 100, .. }));
    assert_eq!(probe.count("ESST"), 0);
}

#[test]
fn test_unknown_chip_is_refused() {
    let mut chip = EmulatedChip::with_model(ChipModel::Sst39sf010);
    chip.set_identity(ChipIdentity::new(0xBF, 0xD7));
    let (mut flasher, probe) = connect(chip);

    let err = flasher
        .write_bank(
            &pattern(BANK_SIZE, 0),
            0,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert!(matches!(err, FlashError::UnknownChip { identity } if identity.device == 0xD7));
    assert_eq!(probe.count("ESST"), 0);
    assert_eq!(probe.count("WRBK"), 0);
}

#[test]
fn test_bank_beyond_chip_is_refused() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let err = flasher
        .write_bank(
            &pattern(16, 0),
            8,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        FlashError::BankOutOfRange {
            first: 8,
            available: 8,
            ..
        }
    ));
    assert_eq!(probe.count("ESST"), 0);
}

/// Swaps the chip identity after the first sector has been written
struct SwapAfterFirstSector {
    probe: DummyProbe,
    swapped: bool,
}

impl ProgressSink for SwapAfterFirstSector {
    fn event(&mut self, event: Event) {
        if let Event::Progress(p) = event {
            if p.units_done == 1 && !self.swapped {
                self.swapped = true;
                self.probe
                    .with_chip(|chip| chip.set_identity(ChipModel::Sst39sf040.identity()));
            }
        }
    }
}

#[test]
fn test_chip_change_is_detected() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let mut sink = SwapAfterFirstSector {
        probe: probe.clone(),
        swapped: false,
    };

    let err = flasher
        .write_bank(
            &pattern(BANK_SIZE, 5),
            0,
            &WriteOptions::default(),
            &mut sink,
            &CancellationToken::new(),
        )
        .unwrap_err();

    match err {
        FlashError::ChipChanged { before, after } => {
            assert_eq!(before, ChipModel::Sst39sf010.identity());
            assert_eq!(after, ChipModel::Sst39sf040.identity());
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing is verified against a different chip
    assert_eq!(probe.count("RDBANK"), 0);
}

#[test]
fn test_failed_cell_surfaces_as_checksum_mismatch() {
    let mut chip = EmulatedChip::with_model(ChipModel::Sst39sf010);
    chip.add_stuck_cell(0x0123);
    let (mut flasher, probe) = connect(chip);

    let err = flasher
        .write_bank(
            &pattern(BANK_SIZE, 0x30),
            0,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        FlashError::Client(ClientError::ChecksumMismatch { block: 1, .. })
    ));
    // No retry, no further sectors
    assert_eq!(probe.count("WRBK"), 2);
    assert_eq!(probe.count("ESST"), 1);
}

#[test]
fn test_failed_cell_without_checksum_is_caught_by_verify() {
    let image = pattern(BANK_SIZE, 0x30);
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    flasher
        .write_bank(
            &image,
            0,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap();

    // Damage two bytes of one block behind the programmer's back
    probe.with_chip(|chip| {
        chip.data_mut()[0x2205] ^= 0x01;
        chip.data_mut()[0x22F0] ^= 0x80;
    });

    let expected = sstflash_flash::FlashImage::for_bank(&image).unwrap();
    let err = flasher
        .verify(&expected, 0, &mut NoProgress, &CancellationToken::new())
        .unwrap_err();
    match err {
        FlashError::VerificationFailed { mismatches } => {
            assert_eq!(mismatches.len(), 1);
            assert_eq!(mismatches[0].block, 0x22);
            assert_eq!(mismatches[0].address, 0x2205);
            assert_eq!(mismatches[0].expected, image[0x2205]);
            assert_eq!(mismatches[0].actual, image[0x2205] ^ 0x01);
            assert_eq!(mismatches[0].differing, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_erase_timeout_stops_write() {
    let mut chip = EmulatedChip::with_model(ChipModel::Sst39sf010);
    chip.set_erase_stuck(true);
    let (mut flasher, probe) = connect(chip);

    let err = flasher
        .write_bank(
            &pattern(BANK_SIZE, 0),
            3,
            &WriteOptions::default(),
            &mut NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();

    assert!(matches!(err, FlashError::EraseTimeout { sector: 12, .. }));
    assert_eq!(probe.count("ESST"), 1);
    assert_eq!(probe.count("WRBK"), 0);
}

/// Cancels once the given number of units is done
struct CancelAt {
    token: CancellationToken,
    at: u32,
}

impl ProgressSink for CancelAt {
    fn event(&mut self, event: Event) {
        if let Event::Progress(p) = event {
            if p.units_done == self.at {
                self.token.cancel();
            }
        }
    }
}

#[test]
fn test_cancel_between_sectors() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    let token = CancellationToken::new();
    let mut sink = CancelAt {
        token: token.clone(),
        at: 2,
    };

    let err = flasher
        .write_bank(
            &pattern(BANK_SIZE, 0),
            0,
            &WriteOptions::default(),
            &mut sink,
            &token,
        )
        .unwrap_err();

    assert!(matches!(
        err,
        FlashError::Cancelled {
            completed: 2,
            total: 5
        }
    ));
    // Both started sectors ran to completion
    assert_eq!(probe.count("ESST"), 2);
    assert_eq!(probe.count("WRBK"), 32);
}

#[test]
fn test_old_firmware_refuses_destructive_commands() {
    let chip = EmulatedChip::with_model(ChipModel::Sst39sf010);
    let transport = LoopbackTransport::with_board_id(chip, *b"PICOSST39-v1.5.2");
    let probe = transport.probe();
    let client = PicoFlasher::connect(transport, timeouts()).unwrap();
    let mut flasher = Flasher::new(client);

    // Reads still work
    assert_eq!(flasher.identify().unwrap().model, ChipModel::Sst39sf010);

    let err = flasher.erase_chip(&mut NoProgress).unwrap_err();
    assert!(matches!(
        err,
        FlashError::Client(ClientError::UnsupportedFirmware { .. })
    ));
    assert_eq!(probe.count("ERASEALL"), 0);
}

#[test]
fn test_erase_chip() {
    let config = DummyConfig {
        model: ChipModel::Sst39sf020,
        ..DummyConfig::default()
    };
    let chip = EmulatedChip::with_data(config, &vec![0x00; 0x40000]);
    let (mut flasher, probe) = connect(chip);

    let result = flasher.erase_chip(&mut NoProgress).unwrap();
    assert!(result.completed);
    assert_eq!(result.cycles, 3);
    probe.with_chip(|chip| assert!(chip.data().iter().all(|&b| b == 0xFF)));
}

#[test]
fn test_stuck_chip_erase_reports_timeout() {
    let mut chip = EmulatedChip::with_model(ChipModel::Sst39sf010);
    chip.set_erase_stuck(true);
    let (mut flasher, _) = connect(chip);

    assert!(matches!(
        flasher.erase_chip(&mut NoProgress),
        Err(FlashError::ChipEraseTimeout { .. })
    ));
}

#[test]
fn test_read_banks_range() {
    let data: Vec<u8> = (0..0x20000).map(|i| (i / BLOCK_SIZE) as u8).collect();
    let chip = EmulatedChip::with_data(DummyConfig::default(), &data);
    let (mut flasher, probe) = connect(chip);

    let image = flasher
        .read_banks(5, 2, &mut NoProgress, &CancellationToken::new())
        .unwrap();
    assert_eq!(image.as_bytes(), &data[5 * BANK_SIZE..7 * BANK_SIZE]);
    assert_eq!(probe.count("RDBANK"), 2);

    assert!(matches!(
        flasher.read_banks(7, 2, &mut NoProgress, &CancellationToken::new()),
        Err(FlashError::BankOutOfRange { .. })
    ));
}

#[test]
fn test_silent_board_times_out() {
    let (mut flasher, probe) = connect(EmulatedChip::with_model(ChipModel::Sst39sf010));
    probe.set_mute(true);

    assert!(matches!(
        flasher.identify(),
        Err(FlashError::Client(ClientError::IncompleteResponse { received: 0, .. }))
    ));
}
