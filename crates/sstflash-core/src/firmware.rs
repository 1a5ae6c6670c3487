//! Device-side command dispatcher
//!
//! [`Programmer`] is what the firmware main loop runs. Each call to
//! [`Programmer::poll`] services the link, takes at most one byte from the
//! host and advances a small state machine: collect a frame, echo it,
//! collect the write payload if the command has one, then execute.
//!
//! Unrecognised frames are echoed and then dropped without a response.

use embedded_io::Write;
use heapless::Vec;

use crate::algorithm::FlashEngine;
use crate::bus::BusPins;
use crate::checksum;
use crate::codec::{Command, Frame, FrameParser, INFO_LEN};
use crate::geometry::{
    bank_address, block_address, sector_address, BANK_SIZE, BLOCK_SIZE, SECTOR_SIZE,
};
use crate::version::BOARD_ID;

/// Byte stream towards the host
pub trait HostLink: Write {
    /// Take one received byte if one is available
    fn poll_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Keep the underlying transport alive
    ///
    /// Called on every main loop iteration, including while a write
    /// payload is still arriving.
    fn service(&mut self) {}
}

/// Command dispatcher state
pub struct Programmer<P: BusPins> {
    engine: FlashEngine<P>,
    parser: FrameParser,
    pending: Option<Command>,
    payload: Vec<u8, SECTOR_SIZE>,
    board_id: [u8; INFO_LEN],
}

impl<P: BusPins> Programmer<P> {
    /// Create a dispatcher reporting the built-in board id
    pub fn new(engine: FlashEngine<P>) -> Self {
        Self::with_board_id(engine, *BOARD_ID)
    }

    /// Create a dispatcher reporting a custom board id
    pub fn with_board_id(engine: FlashEngine<P>, board_id: [u8; INFO_LEN]) -> Self {
        Self {
            engine,
            parser: FrameParser::new(),
            pending: None,
            payload: Vec::new(),
            board_id,
        }
    }

    /// Access the flash engine
    pub fn engine(&self) -> &FlashEngine<P> {
        &self.engine
    }

    /// Mutable access to the flash engine
    pub fn engine_mut(&mut self) -> &mut FlashEngine<P> {
        &mut self.engine
    }

    /// Whether a frame or payload is partially received
    pub fn is_busy(&self) -> bool {
        self.pending.is_some() || self.parser.pending() > 0
    }

    /// Run one main loop iteration
    ///
    /// Returns the command that was executed during this iteration, if any.
    pub fn poll<L: HostLink>(&mut self, link: &mut L) -> Result<Option<Command>, L::Error> {
        link.service();

        let Some(byte) = link.poll_byte()? else {
            return Ok(None);
        };

        if let Some(cmd) = self.pending {
            // Cannot overflow: the payload never exceeds one sector
            let _ = self.payload.push(byte);
            if self.payload.len() < cmd.payload_len() {
                return Ok(None);
            }
            self.pending = None;
            let result = self.execute(cmd, link);
            self.payload.clear();
            result?;
            return Ok(Some(cmd));
        }

        let Some(frame) = self.parser.push_byte(byte) else {
            return Ok(None);
        };
        link.write_all(&frame)?;

        match Command::decode(&frame) {
            Ok(cmd) if cmd.payload_len() > 0 => {
                log::trace!("{}: waiting for {} byte payload", cmd, cmd.payload_len());
                self.pending = Some(cmd);
                Ok(None)
            }
            Ok(cmd) => {
                self.execute(cmd, link)?;
                Ok(Some(cmd))
            }
            Err(e) => {
                log::debug!("dropping frame {}: {}", frame_text(&frame), e);
                link.flush()?;
                Ok(None)
            }
        }
    }

    fn execute<L: HostLink>(&mut self, cmd: Command, link: &mut L) -> Result<(), L::Error> {
        log::debug!("executing {}", cmd);
        match cmd {
            Command::ReadInfo => link.write_all(&self.board_id)?,
            Command::DeviceId => {
                let id = self.engine.identify();
                link.write_all(&[id.manufacturer, id.device])?;
            }
            Command::ReadBank(bank) => self.stream(link, bank_address(bank), BANK_SIZE)?,
            Command::ReadSector(sector) => {
                self.stream(link, sector_address(sector), SECTOR_SIZE)?
            }
            Command::ReadBlock(block) => self.stream(link, block_address(block), BLOCK_SIZE)?,
            Command::WriteBlock(block) => {
                self.program_payload(block_address(block));
                link.write_all(&[checksum::additive(&self.payload)])?;
            }
            Command::WriteSector(sector) => {
                self.program_payload(sector_address(sector));
                link.write_all(&checksum::crc16_xmodem(&self.payload).to_be_bytes())?;
            }
            Command::EraseSector(block) => {
                let result = self.engine.erase_sector(block_address(block));
                link.write_all(&result.cycles.to_be_bytes())?;
            }
            Command::EraseAll => {
                let result = self.engine.erase_chip();
                link.write_all(&result.cycles.to_be_bytes())?;
            }
        }
        link.flush()
    }

    /// Program the received payload and replace it with what reads back
    fn program_payload(&mut self, addr: u32) {
        if let Err(e) = self.engine.program(addr, &self.payload) {
            log::warn!("programming at 0x{:05X} failed: {}", addr, e);
        }
        self.engine.read(addr, &mut self.payload);
    }

    fn stream<L: HostLink>(&mut self, link: &mut L, addr: u32, len: usize) -> Result<(), L::Error> {
        let mut block = [0u8; BLOCK_SIZE];
        for offset in (0..len).step_by(BLOCK_SIZE) {
            self.engine.read(addr + offset as u32, &mut block);
            link.write_all(&block)?;
            link.service();
        }
        Ok(())
    }
}

fn frame_text(frame: &Frame) -> &str {
    core::str::from_utf8(frame).unwrap_or("<binary>")
}
