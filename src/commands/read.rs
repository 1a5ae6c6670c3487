//! Read command

use sstflash_flash::worker::{ReadBanks, ReadChip};
use sstflash_flash::Executor;
use sstflash_serial::Transport;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::{run_operation, CmdResult};

/// Read the whole chip, or `count` banks from `bank`, into `output`
pub fn run_read<T: Transport + 'static>(
    executor: Executor<T>,
    output: &Path,
    bank: Option<u8>,
    count: u32,
) -> CmdResult {
    let image = match bank {
        Some(first) => {
            println!("Reading {} bank(s) from bank {}", count, first);
            run_operation(executor, ReadBanks { first, count })?
        }
        None => run_operation(executor, ReadChip)?.1,
    };

    let mut file = File::create(output)?;
    file.write_all(image.as_bytes())?;
    println!("Wrote {} bytes to {:?}", image.len(), output);
    Ok(())
}
