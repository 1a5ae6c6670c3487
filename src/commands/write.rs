//! Write commands

use sstflash_flash::worker::{WriteBank, WriteChip};
use sstflash_flash::{Executor, SizePolicy, WriteOptions, WriteReport};
use sstflash_serial::Transport;
use std::path::Path;

use super::{read_file, run_operation, CmdResult};

fn print_report(report: &WriteReport) {
    println!(
        "Wrote {} sector(s), skipped {} blank sector(s)",
        report.sectors_written, report.sectors_skipped
    );
    if report.verified {
        println!("Verification passed");
    } else {
        println!("Verification skipped");
    }
    log::debug!("Slowest sector erase: {} poll cycles", report.max_erase_cycles);
}

/// Write a whole-chip image
pub fn run_write<T: Transport + 'static>(
    executor: Executor<T>,
    input: &Path,
    policy: SizePolicy,
    options: WriteOptions,
) -> CmdResult {
    let data = read_file(input)?;
    if data.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }

    let report = run_operation(
        executor,
        WriteChip {
            data,
            policy,
            options,
        },
    )?;
    print_report(&report);
    Ok(())
}

/// Write up to one bank of data
pub fn run_write_bank<T: Transport + 'static>(
    executor: Executor<T>,
    input: &Path,
    bank: u8,
    options: WriteOptions,
) -> CmdResult {
    let data = read_file(input)?;
    println!("Writing to bank {}", bank);

    let report = run_operation(
        executor,
        WriteBank {
            data,
            bank,
            options,
        },
    )?;
    print_report(&report);
    Ok(())
}
