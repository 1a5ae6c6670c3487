//! Erase command

use sstflash_flash::worker::EraseChip;
use sstflash_flash::Executor;
use sstflash_serial::Transport;

use super::{run_operation, CmdResult};

/// Erase the whole chip
pub fn run_erase<T: Transport + 'static>(executor: Executor<T>) -> CmdResult {
    let result = run_operation(executor, EraseChip)?;
    println!("Chip erased ({} poll cycles)", result.cycles);
    Ok(())
}
