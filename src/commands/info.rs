//! Info command

use sstflash_core::geometry::SECTOR_SIZE;
use sstflash_flash::worker::Identify;
use sstflash_flash::Executor;
use sstflash_serial::Transport;

use super::{format_size, run_operation, CmdResult};

/// Print the board identity and the identified chip
pub fn run_info<T: Transport + 'static>(mut executor: Executor<T>) -> CmdResult {
    if let Some(board) = executor.flasher_mut().client_mut().board() {
        println!("Programmer: {}", board);
        if !board.supports_destructive() {
            println!("  (firmware too old for write and erase)");
        }
    }

    let chip = run_operation(executor, Identify)?;
    println!("Chip:       {}", chip.model);
    println!("ID:         {}", chip.identity);
    println!(
        "Size:       {} bytes ({})",
        chip.model.capacity(),
        format_size(chip.model.capacity())
    );
    println!(
        "Layout:     {} banks, {} sectors of {}",
        chip.model.bank_count(),
        chip.model.sector_count(),
        format_size(SECTOR_SIZE as u32)
    );
    Ok(())
}
