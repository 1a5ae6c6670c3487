//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use sstflash_flash::{SizePolicy, WriteMethod};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "sstflash")]
#[command(author, version, about = "SST39SF0x0 parallel flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Programmer port: dev=<path>[:baud], a bare device path, or dummy[=<chip>]
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Baud rate for serial ports
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    /// Configuration file (defaults to ./sstflash.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// How data is sent to the programmer
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MethodArg {
    /// 256-byte blocks with an additive checksum
    Block,
    /// 4 KiB sectors with CRC16/XMODEM
    Sector,
}

impl From<MethodArg> for WriteMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Block => WriteMethod::Block,
            MethodArg::Sector => WriteMethod::Sector,
        }
    }
}

/// How a whole-chip image is fitted to the chip
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeArg {
    /// Require the image to match the chip size
    Exact,
    /// Pad a shorter image with the pad byte
    #[default]
    Pad,
    /// Pad a shorter image, truncate a longer one
    Resize,
    /// Only write the sectors the image covers
    Keep,
}

impl SizeArg {
    pub fn policy(self, pad: u8) -> SizePolicy {
        match self {
            SizeArg::Exact => SizePolicy::Exact,
            SizeArg::Pad => SizePolicy::Pad(pad),
            SizeArg::Resize => SizePolicy::Resize(pad),
            SizeArg::Keep => SizePolicy::KeepLength,
        }
    }
}

/// Write options shared by `write` and `write-bank`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WriteArgs {
    /// Skip sectors that are entirely 0xFF (chip must be erased beforehand)
    #[arg(short, long)]
    pub quick: bool,

    /// Transfer method
    #[arg(short, long, value_enum)]
    pub method: Option<MethodArg>,

    /// Don't read back and compare after writing
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show programmer and chip information
    Info,

    /// Read flash contents to file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// First bank to read (whole chip if omitted)
        #[arg(long, value_parser = parse_hex_u8)]
        bank: Option<u8>,

        /// Number of banks to read, with --bank
        #[arg(long, default_value_t = 1, requires = "bank")]
        count: u32,
    },

    /// Write a whole-chip image
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// How to fit the image to the chip
        #[arg(long, value_enum, default_value_t = SizeArg::Pad)]
        size: SizeArg,

        /// Pad byte for short images (hex or decimal)
        #[arg(long, value_parser = parse_hex_u8)]
        pad_byte: Option<u8>,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Write up to 16 KiB into one bank, zero padded
    WriteBank {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Target bank (hex or decimal)
        #[arg(long, value_parser = parse_hex_u8)]
        bank: u8,

        #[command(flatten)]
        write: WriteArgs,
    },

    /// Compare flash contents against a file
    Verify {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Bank the file was written to (whole chip from 0 if omitted)
        #[arg(long, value_parser = parse_hex_u8)]
        bank: Option<u8>,
    },

    /// Erase the whole chip
    Erase,

    /// List serial ports
    ListPorts,

    /// List supported chips
    ListChips,
}
