//! sstflash - Programmer for SST39SF0x0 parallel NOR flash
//!
//! Talks to a microcontroller board wired to the chip's address and data
//! buses over a serial link. The board runs the chip's command sequences;
//! this tool schedules erase, program and verify steps for whole images
//! and shows progress.
//!
//! # Architecture
//!
//! - `sstflash-core` holds the wire codec, geometry and the algorithm the
//!   board firmware runs
//! - `sstflash-serial` is the host side of the protocol
//! - `sstflash-flash` orchestrates images and runs operations on a worker
//! - `sstflash-dummy` emulates a board, reachable with `--port dummy`

mod cli;
mod commands;
mod config;
mod connection;

use clap::Parser;
use cli::{Cli, Commands, WriteArgs};
use config::Config;
use connection::Port;
use sstflash_core::geometry::ERASED_VALUE;
use sstflash_flash::{Executor, Flasher, WriteMethod, WriteMode, WriteOptions};
use sstflash_serial::Transport;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ListPorts => return commands::list_ports(),
        Commands::ListChips => {
            commands::list_chips();
            return Ok(());
        }
        _ => {}
    }

    let port = cli
        .port
        .as_deref()
        .or(config.port.as_deref())
        .ok_or("No programmer port given (use --port or set `port` in the config file)")?;
    let port = Port::parse(port)?;
    let client = port.connect(cli.baud.or(config.baud), config.timeouts())?;
    let executor = Executor::new(Flasher::new(client));

    run_command(cli.command, &config, executor)
}

fn run_command<T: Transport + 'static>(
    command: Commands,
    config: &Config,
    executor: Executor<T>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Info => commands::run_info(executor),
        Commands::Read {
            output,
            bank,
            count,
        } => commands::run_read(executor, &output, bank, count),
        Commands::Write {
            input,
            size,
            pad_byte,
            write,
        } => {
            let pad = pad_byte.or(config.pad_byte).unwrap_or(ERASED_VALUE);
            commands::run_write(
                executor,
                &input,
                size.policy(pad),
                write_options(&write, config),
            )
        }
        Commands::WriteBank { input, bank, write } => {
            commands::run_write_bank(executor, &input, bank, write_options(&write, config))
        }
        Commands::Verify { input, bank } => commands::run_verify(executor, &input, bank),
        Commands::Erase => commands::run_erase(executor),
        Commands::ListPorts | Commands::ListChips => Ok(()),
    }
}

/// Merge write flags over configuration file values
fn write_options(args: &WriteArgs, config: &Config) -> WriteOptions {
    let mode = if args.quick || config.quick_flash.unwrap_or(false) {
        WriteMode::Quick
    } else {
        WriteMode::Standard
    };
    let method = args
        .method
        .or(config.write_method)
        .map(WriteMethod::from)
        .unwrap_or_default();
    let verify = !args.no_verify && config.verify.unwrap_or(true);

    WriteOptions {
        mode,
        method,
        verify,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli::MethodArg;

    #[test]
    fn test_flags_override_config() {
        let config = Config {
            quick_flash: Some(true),
            write_method: Some(MethodArg::Sector),
            verify: Some(false),
            ..Config::default()
        };

        let opts = write_options(&WriteArgs::default(), &config);
        assert_eq!(opts.mode, WriteMode::Quick);
        assert_eq!(opts.method, WriteMethod::Sector);
        assert!(!opts.verify);

        let args = WriteArgs {
            method: Some(MethodArg::Block),
            ..WriteArgs::default()
        };
        assert_eq!(write_options(&args, &config).method, WriteMethod::Block);
    }

    #[test]
    fn test_defaults_without_config() {
        let opts = write_options(&WriteArgs::default(), &Config::default());
        assert_eq!(opts, WriteOptions::default());
    }
}
