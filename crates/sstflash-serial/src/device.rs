//! Programmer client
//!
//! [`PicoFlasher`] speaks the frame protocol over any [`Transport`]. Every
//! command goes through [`PicoFlasher::do_command`], which checks the echo
//! before sending a payload and then waits for the fixed-size response.
//!
//! After an echo mismatch or a short response the link is out of step with
//! the board. Input is drained before the next command so a late reply
//! cannot be mistaken for its echo.

use std::time::{Duration, Instant};

use sstflash_core::algorithm::PollResult;
use sstflash_core::checksum;
use sstflash_core::chip::ChipIdentity;
use sstflash_core::codec::{Command, FRAME_LEN, INFO_LEN};
use sstflash_core::geometry::{
    first_block_of_sector, BANK_SIZE, BLOCK_SIZE, ERASED_VALUE, SECTOR_SIZE,
};
use sstflash_core::version::{BoardInfo, MIN_FIRMWARE_VERSION};
use sstflash_core::Error as CoreError;

use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// How long a response may stall before it is declared incomplete
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Stall allowance for erase commands, which poll on the device first
pub const DEFAULT_ERASE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Granularity of a single transport read
const READ_SLICE: Duration = Duration::from_millis(10);

/// Response waiting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Maximum time without progress for ordinary commands
    pub response: Duration,
    /// Maximum time without progress for `ESST` and `ERASEALL`
    pub erase: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: DEFAULT_RESPONSE_TIMEOUT,
            erase: DEFAULT_ERASE_TIMEOUT,
        }
    }
}

/// Connection to an SST39SF0x0 programmer board
pub struct PicoFlasher<T: Transport> {
    transport: T,
    timeouts: Timeouts,
    board: Option<BoardInfo>,
    resync: bool,
}

impl<T: Transport> PicoFlasher<T> {
    /// Wrap a transport without talking to the board yet
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeouts: Timeouts::default(),
            board: None,
            resync: false,
        }
    }

    /// Wrap a transport and perform the identity handshake
    pub fn connect(transport: T, timeouts: Timeouts) -> Result<Self> {
        let mut flasher = Self::new(transport).with_timeouts(timeouts);
        let board = flasher.board_info()?;
        log::info!("Connected to {}", board);
        Ok(flasher)
    }

    /// Replace the response timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Current response timeouts
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Board identity from the last handshake
    pub fn board(&self) -> Option<&BoardInfo> {
        self.board.as_ref()
    }

    /// Access the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drain stale input and query the board identity string
    pub fn board_info(&mut self) -> Result<BoardInfo> {
        self.transport.clear_input()?;

        let mut raw = [0u8; INFO_LEN];
        self.do_command(Command::ReadInfo, &[], &mut raw)?;

        let info = BoardInfo::parse(&raw).map_err(|_| {
            ClientError::UnexpectedBoard(String::from_utf8_lossy(&raw).into_owned())
        })?;
        log::debug!("Board identity: {}", info);

        self.board = Some(info.clone());
        Ok(info)
    }

    /// Fail unless the firmware may run write and erase commands
    pub fn require_destructive(&mut self) -> Result<()> {
        let info = match self.board.clone() {
            Some(info) => info,
            None => self.board_info()?,
        };
        if info.supports_destructive() {
            Ok(())
        } else {
            Err(ClientError::UnsupportedFirmware {
                found: info.version,
                required: MIN_FIRMWARE_VERSION,
            })
        }
    }

    /// Read the raw chip identity
    pub fn chip_identity(&mut self) -> Result<ChipIdentity> {
        let mut id = [0u8; 2];
        self.do_command(Command::DeviceId, &[], &mut id)?;
        let identity = ChipIdentity::new(id[0], id[1]);
        log::debug!("Chip identity: {}", identity);
        Ok(identity)
    }

    /// Read one bank
    pub fn read_bank(&mut self, bank: u8) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BANK_SIZE];
        self.do_command(Command::ReadBank(bank), &[], &mut buf)?;
        Ok(buf)
    }

    /// Read one sector
    pub fn read_sector(&mut self, sector: u8) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; SECTOR_SIZE];
        self.do_command(Command::ReadSector(sector), &[], &mut buf)?;
        Ok(buf)
    }

    /// Read one block
    pub fn read_block(&mut self, block: u16) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.do_command(Command::ReadBlock(block), &[], &mut buf)?;
        Ok(buf)
    }

    /// Program one block and check the returned additive checksum
    ///
    /// The block must already be erased.
    pub fn write_block(&mut self, block: u16, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(CoreError::BufferTooSmall.into());
        }

        let mut reply = [0u8; 1];
        self.do_command(Command::WriteBlock(block), data, &mut reply)?;

        let expected = checksum::additive(data);
        if reply[0] != expected {
            return Err(ClientError::ChecksumMismatch {
                block,
                expected,
                actual: reply[0],
            });
        }
        Ok(())
    }

    /// Program one sector and check the returned CRC16/XMODEM
    ///
    /// The sector must already be erased.
    pub fn write_sector(&mut self, sector: u8, data: &[u8]) -> Result<()> {
        if data.len() != SECTOR_SIZE {
            return Err(CoreError::BufferTooSmall.into());
        }

        let mut reply = [0u8; 2];
        self.do_command(Command::WriteSector(sector), data, &mut reply)?;

        let expected = checksum::crc16_xmodem(data);
        let actual = u16::from_be_bytes(reply);
        if actual != expected {
            return Err(ClientError::CrcMismatch {
                sector,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Erase one sector, returning the device's poll outcome
    pub fn erase_sector(&mut self, sector: u8) -> Result<PollResult> {
        let mut reply = [0u8; 2];
        self.do_command(
            Command::EraseSector(first_block_of_sector(sector)),
            &[],
            &mut reply,
        )?;
        let result = PollResult::from_cycles(u16::from_be_bytes(reply));
        log::trace!("Sector 0x{:02X} erased in {} polls", sector, result.cycles);
        Ok(result)
    }

    /// Erase the whole chip, returning the device's poll outcome
    pub fn erase_chip(&mut self) -> Result<PollResult> {
        let mut reply = [0u8; 2];
        self.do_command(Command::EraseAll, &[], &mut reply)?;
        let result = PollResult::from_cycles(u16::from_be_bytes(reply));
        log::debug!("Chip erased in {} polls", result.cycles);
        Ok(result)
    }

    /// Send one command, verify the echo, send the payload and read the
    /// response into `response`
    pub fn do_command(&mut self, cmd: Command, payload: &[u8], response: &mut [u8]) -> Result<()> {
        if self.resync {
            log::debug!("Draining input before {}", cmd);
            self.transport.clear_input()?;
            self.resync = false;
        }

        let result = self.exchange(cmd, payload, response);
        if matches!(
            result,
            Err(ClientError::ProtocolMismatch { .. } | ClientError::IncompleteResponse { .. })
        ) {
            self.resync = true;
        }
        result
    }

    fn exchange(&mut self, cmd: Command, payload: &[u8], response: &mut [u8]) -> Result<()> {
        let frame = cmd.encode();
        log::trace!("-> {}", cmd);
        self.transport.write(&frame)?;
        self.transport.flush()?;

        let mut echo = [0u8; FRAME_LEN];
        self.read_response(cmd, &mut echo, self.timeouts.response)?;
        if echo != frame {
            // The board may be waiting for a payload. Erased filler programs
            // nothing and the frame parser ignores it otherwise.
            if !payload.is_empty() {
                self.transport.write(&vec![ERASED_VALUE; payload.len()])?;
                self.transport.flush()?;
            }
            return Err(ClientError::ProtocolMismatch {
                sent: String::from_utf8_lossy(&frame).into_owned(),
                received: String::from_utf8_lossy(&echo).into_owned(),
            });
        }

        if !payload.is_empty() {
            self.transport.write(payload)?;
            self.transport.flush()?;
        }

        let timeout = match cmd {
            Command::EraseSector(_) | Command::EraseAll => self.timeouts.erase,
            _ => self.timeouts.response,
        };
        self.read_response(cmd, response, timeout)?;
        log::trace!("<- {} ({} bytes)", cmd, response.len());
        Ok(())
    }

    /// Fill `buf`, giving up once no byte has arrived for `stall`
    fn read_response(&mut self, cmd: Command, buf: &mut [u8], stall: Duration) -> Result<()> {
        let mut received = 0;
        let mut last_progress = Instant::now();

        while received < buf.len() {
            let n = self
                .transport
                .read_nonblock(&mut buf[received..], READ_SLICE)?;
            if n > 0 {
                received += n;
                last_progress = Instant::now();
            } else if last_progress.elapsed() > stall {
                return Err(ClientError::IncompleteResponse {
                    command: cmd.to_string(),
                    expected: buf.len(),
                    received,
                });
            }
        }
        Ok(())
    }
}
