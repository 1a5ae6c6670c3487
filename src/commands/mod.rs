//! CLI command implementations
//!
//! Every flash operation runs on a background worker through the
//! [`Executor`]; the command thread only renders the event stream.

mod erase;
mod info;
mod list;
mod read;
mod verify;
mod write;

pub use erase::run_erase;
pub use info::run_info;
pub use list::{list_chips, list_ports};
pub use read::run_read;
pub use verify::run_verify;
pub use write::{run_write, run_write_bank};

use indicatif::{ProgressBar, ProgressStyle};
use sstflash_flash::{Event, Executor, Operation};
use sstflash_serial::Transport;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Read file contents into a Vec
fn read_file(path: &Path) -> CmdResult<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

/// Create a standard progress bar style
fn create_progress_bar_style() -> CmdResult<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"))
}

/// Renders worker events with a single indicatif bar
struct ProgressView {
    bar: ProgressBar,
    skipped: u32,
}

impl ProgressView {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            create_progress_bar_style().unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar, skipped: 0 }
    }

    fn event(&mut self, event: Event) {
        match event {
            Event::ChipIdentified(model) => {
                self.bar.println(format!(
                    "Found {} ({})",
                    model,
                    format_size(model.capacity())
                ));
            }
            Event::Phase(phase) => self.bar.set_message(phase.to_string()),
            Event::Progress(p) => {
                self.bar.set_length(p.units_total as u64);
                self.bar.set_position(p.units_done as u64);
            }
            Event::SectorSkipped(sector) => {
                log::debug!("Sector 0x{:02X} is blank, skipped", sector);
                self.skipped += 1;
            }
        }
    }

    fn finish(self) {
        if self.skipped > 0 {
            self.bar
                .finish_with_message(format!("Done ({} blank sectors skipped)", self.skipped));
        } else {
            self.bar.finish_with_message("Done");
        }
    }
}

/// Run `op` on a worker, rendering its progress until it finishes
pub fn run_operation<T, O>(executor: Executor<T>, op: O) -> CmdResult<O::Output>
where
    T: Transport + 'static,
    O: Operation,
{
    let handle = executor.spawn(op)?;

    let mut view = ProgressView::new();
    for event in handle.events().iter() {
        view.event(event);
    }

    let (result, _) = handle.join();
    match result {
        Ok(output) => {
            view.finish();
            Ok(output)
        }
        Err(e) => {
            view.bar.abandon_with_message("Failed");
            Err(e.into())
        }
    }
}
