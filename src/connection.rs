//! Port string parsing and programmer connection

#[cfg(feature = "dummy")]
use sstflash_core::chip::ChipModel;
use sstflash_serial::{PicoFlasher, SerialConnection, Timeouts, Transport};

/// Where the programmer lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Port {
    /// Programmer board on a serial port
    Serial(SerialConnection),
    /// In-memory emulated board with an erased chip
    #[cfg(feature = "dummy")]
    Dummy(ChipModel),
}

impl Port {
    /// Parse `dummy[=<chip>]`, `dev=<path>[:baud]` or a bare device path
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some(rest) = s.strip_prefix("dummy") {
            return Self::parse_dummy(rest);
        }
        SerialConnection::parse(s).map(Port::Serial)
    }

    #[cfg(feature = "dummy")]
    fn parse_dummy(rest: &str) -> Result<Self, String> {
        match rest.strip_prefix('=') {
            None if rest.is_empty() => Ok(Port::Dummy(ChipModel::Sst39sf010)),
            Some(name) => ChipModel::from_name(name)
                .map(Port::Dummy)
                .ok_or_else(|| format!("Unknown chip '{}'", name)),
            None => Err(format!("Invalid dummy port 'dummy{}'", rest)),
        }
    }

    #[cfg(not(feature = "dummy"))]
    fn parse_dummy(_rest: &str) -> Result<Self, String> {
        Err("Dummy port support not compiled in (enable the `dummy` feature)".to_string())
    }

    /// Open the transport and perform the board handshake
    pub fn connect(
        &self,
        baud: Option<u32>,
        timeouts: Timeouts,
    ) -> Result<PicoFlasher<Box<dyn Transport>>, Box<dyn std::error::Error>> {
        let transport: Box<dyn Transport> = match self {
            Port::Serial(conn) => Box::new(sstflash_serial::SerialTransport::open(
                &conn.device,
                baud.or(conn.baud),
            )?),
            #[cfg(feature = "dummy")]
            Port::Dummy(model) => {
                log::warn!("Using emulated {}, contents are discarded on exit", model);
                let chip = sstflash_dummy::EmulatedChip::with_model(*model);
                Box::new(sstflash_dummy::LoopbackTransport::new(chip))
            }
        };
        Ok(PicoFlasher::connect(transport, timeouts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        assert_eq!(
            Port::parse("/dev/ttyUSB0").unwrap(),
            Port::Serial(SerialConnection {
                device: "/dev/ttyUSB0".into(),
                baud: None
            })
        );
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_parse_dummy() {
        assert_eq!(
            Port::parse("dummy").unwrap(),
            Port::Dummy(ChipModel::Sst39sf010)
        );
        assert_eq!(
            Port::parse("dummy=SST39SF040").unwrap(),
            Port::Dummy(ChipModel::Sst39sf040)
        );
        assert!(Port::parse("dummy=w25q64").is_err());
        assert!(Port::parse("dummyx").is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_connect_dummy() {
        let mut flasher = Port::Dummy(ChipModel::Sst39sf020)
            .connect(None, Timeouts::default())
            .unwrap();
        assert_eq!(
            flasher.chip_identity().unwrap(),
            ChipModel::Sst39sf020.identity()
        );
    }
}
