//! sstflash-serial - Host side of the SST39SF0x0 programmer protocol
//!
//! The programmer board is a microcontroller wired to the chip's address
//! and data buses. It accepts fixed 8-byte ASCII command frames over a
//! serial link, echoes each frame and then answers with a fixed-size
//! binary response.
//!
//! # Supported Transports
//!
//! - Serial port: `/dev/ttyACM0`, `COM3`, etc.
//! - Anything implementing [`Transport`], such as the in-process emulator
//!   in `sstflash-dummy`
//!
//! # Example
//!
//! ```no_run
//! use sstflash_serial::{PicoFlasher, SerialTransport, Timeouts};
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", None)?;
//! let mut flasher = PicoFlasher::connect(transport, Timeouts::default())?;
//!
//! let id = flasher.chip_identity()?;
//! println!("Chip id: {}", id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod device;
pub mod error;
pub mod transport;

pub use device::{PicoFlasher, Timeouts};
pub use error::{ClientError, Result};
pub use transport::serial::{available_ports, SerialTransport};
pub use transport::{Transport, DEFAULT_BAUD};

/// Serial connection options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConnection {
    /// Device path (e.g., "/dev/ttyACM0" or "COM3")
    pub device: String,
    /// Baud rate (None for the programmer default)
    pub baud: Option<u32>,
}

impl SerialConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyACM0` - default baud
    /// - `dev=/dev/ttyACM0:115200` - specified baud
    /// - `/dev/ttyACM0` - bare device path, default baud
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let Some(dev) = s.strip_prefix("dev=") else {
            if s.is_empty() || s.contains('=') {
                return Err(format!(
                    "Invalid serial connection string: {}. Use dev=<path>[:baud]",
                    s
                ));
            }
            return Ok(Self {
                device: s.to_string(),
                baud: None,
            });
        };

        match dev.rsplit_once(':') {
            // Windows device names never contain ':', Unix paths rarely do
            Some((device, baud_str)) if !device.is_empty() => {
                let baud = baud_str
                    .parse()
                    .map_err(|_| format!("Invalid baud rate: {}", baud_str))?;
                Ok(Self {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            }
            _ if dev.is_empty() => Err("Missing device path in dev= parameter".to_string()),
            _ => Ok(Self {
                device: dev.to_string(),
                baud: None,
            }),
        }
    }

    /// Open the port described by this connection
    pub fn open(&self) -> Result<SerialTransport> {
        SerialTransport::open(&self.device, self.baud)
    }
}

/// Open a serial port and perform the identity handshake
pub fn open_serial(
    device: &str,
    baud: Option<u32>,
    timeouts: Timeouts,
) -> Result<PicoFlasher<SerialTransport>> {
    let transport = SerialTransport::open(device, baud)?;
    PicoFlasher::connect(transport, timeouts)
}
