//! Configuration file support
//!
//! Settings come from `--config <file>` or, when present, `./sstflash.toml`.
//! Command line flags always win over file values.
//!
//! ```toml
//! port = "dev=/dev/ttyACM0:19200"
//! response_timeout_ms = 1000
//! erase_timeout_ms = 5000
//! quick_flash = true
//! write_method = "sector"
//! verify = true
//! pad_byte = 0xFF
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use sstflash_serial::Timeouts;
use thiserror::Error;

use crate::cli::MethodArg;

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "sstflash.toml";

/// Errors loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Values read from the configuration file
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Programmer port string
    pub port: Option<String>,
    /// Baud rate for serial ports
    pub baud: Option<u32>,
    /// Stall timeout for ordinary responses
    pub response_timeout_ms: Option<u64>,
    /// Stall timeout for erase responses
    pub erase_timeout_ms: Option<u64>,
    /// Skip all-0xFF sectors when writing
    pub quick_flash: Option<bool>,
    /// Block or sector writes
    pub write_method: Option<MethodArg>,
    /// Read back after writing
    pub verify: Option<bool>,
    /// Pad byte for short whole-chip images
    pub pad_byte: Option<u8>,
}

impl Config {
    /// Parse configuration text
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from an explicit path, or from the default file if it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path)?;
        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Response timeouts, falling back to the protocol defaults
    pub fn timeouts(&self) -> Timeouts {
        let defaults = Timeouts::default();
        Timeouts {
            response: self
                .response_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.response),
            erase: self
                .erase_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.erase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let text = r#"
            port = "dev=/dev/ttyACM0:115200"
            response_timeout_ms = 250
            quick_flash = true
            write_method = "sector"
            pad_byte = 0x00
        "#;
        let config = Config::from_toml_str(text, Path::new("test.toml")).unwrap();
        assert_eq!(config.port.as_deref(), Some("dev=/dev/ttyACM0:115200"));
        assert_eq!(config.quick_flash, Some(true));
        assert_eq!(config.write_method, Some(MethodArg::Sector));
        assert_eq!(config.pad_byte, Some(0));
        assert_eq!(config.verify, None);

        let timeouts = config.timeouts();
        assert_eq!(timeouts.response, Duration::from_millis(250));
        assert_eq!(timeouts.erase, Timeouts::default().erase);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("prot = \"x\"", Path::new("bad.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_is_default() {
        let config = Config::from_toml_str("", Path::new("empty.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
