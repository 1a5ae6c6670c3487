//! Background workers
//!
//! Long operations run on a dedicated thread so a caller's event loop keeps
//! turning. The [`Executor`] owns the [`Flasher`] (and through it the
//! transport) and moves it into the worker; [`WorkerHandle::join`] hands it
//! back so the next operation can reuse the connection. Only one operation
//! can own the transport at a time because `spawn` consumes the executor.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sstflash_core::algorithm::PollResult;
use sstflash_serial::Transport;

use crate::cancel::CancellationToken;
use crate::error::{FlashError, Result};
use crate::image::{FlashImage, SizePolicy};
use crate::progress::{Event, ProgressSink};
use crate::session::{ChipInfo, Flasher, WriteOptions, WriteReport};

/// Per-run context handed to an operation
pub struct Context {
    events: Sender<Event>,
    cancel: CancellationToken,
}

impl Context {
    /// Create a context reporting to `events`
    pub fn new(events: Sender<Event>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Sink for progress events
    pub fn sink(&mut self) -> &mut dyn ProgressSink {
        &mut self.events
    }

    /// Cancellation token for this run
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A unit of work that can run on a worker thread
pub trait Operation: Send + 'static {
    /// Value produced on success
    type Output: Send + 'static;

    /// Short name used for the thread and logs
    fn name(&self) -> &'static str;

    /// Run to completion against `flasher`
    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<Self::Output>;
}

/// Read and report the chip identity
#[derive(Debug, Clone, Copy, Default)]
pub struct Identify;

impl Operation for Identify {
    type Output = ChipInfo;

    fn name(&self) -> &'static str {
        "identify"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<ChipInfo> {
        let chip = flasher.identify()?;
        ctx.sink().event(Event::ChipIdentified(chip.model));
        Ok(chip)
    }
}

/// Read the whole chip
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadChip;

impl Operation for ReadChip {
    type Output = (ChipInfo, FlashImage);

    fn name(&self) -> &'static str {
        "read-chip"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<Self::Output> {
        let cancel = ctx.cancel().clone();
        flasher.read_chip(ctx.sink(), &cancel)
    }
}

/// Read a range of banks
#[derive(Debug, Clone, Copy)]
pub struct ReadBanks {
    /// First bank to read
    pub first: u8,
    /// Number of banks
    pub count: u32,
}

impl Operation for ReadBanks {
    type Output = FlashImage;

    fn name(&self) -> &'static str {
        "read-banks"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<FlashImage> {
        let cancel = ctx.cancel().clone();
        flasher.read_banks(self.first, self.count, ctx.sink(), &cancel)
    }
}

/// Write a whole-chip image
#[derive(Debug, Clone)]
pub struct WriteChip {
    /// Image contents as loaded from disk
    pub data: Vec<u8>,
    /// How to fit `data` to the chip capacity
    pub policy: SizePolicy,
    /// Mode, method and read-back settings
    pub options: WriteOptions,
}

impl Operation for WriteChip {
    type Output = WriteReport;

    fn name(&self) -> &'static str {
        "write-chip"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<WriteReport> {
        let cancel = ctx.cancel().clone();
        flasher.write_chip(&self.data, self.policy, &self.options, ctx.sink(), &cancel)
    }
}

/// Write one bank
#[derive(Debug, Clone)]
pub struct WriteBank {
    /// Bank contents, zero-padded when short
    pub data: Vec<u8>,
    /// Target bank index
    pub bank: u8,
    /// Mode, method and read-back settings
    pub options: WriteOptions,
}

impl Operation for WriteBank {
    type Output = WriteReport;

    fn name(&self) -> &'static str {
        "write-bank"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<WriteReport> {
        let cancel = ctx.cancel().clone();
        flasher.write_bank(&self.data, self.bank, &self.options, ctx.sink(), &cancel)
    }
}

/// Compare chip contents against an image
#[derive(Debug, Clone)]
pub struct VerifyImage {
    /// Expected contents
    pub image: FlashImage,
    /// Bank where `image` starts
    pub first_bank: u8,
}

impl Operation for VerifyImage {
    type Output = ();

    fn name(&self) -> &'static str {
        "verify"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<()> {
        let cancel = ctx.cancel().clone();
        flasher.verify(&self.image, self.first_bank, ctx.sink(), &cancel)
    }
}

/// Erase the whole chip
#[derive(Debug, Clone, Copy, Default)]
pub struct EraseChip;

impl Operation for EraseChip {
    type Output = PollResult;

    fn name(&self) -> &'static str {
        "erase-chip"
    }

    fn run<T: Transport>(self, flasher: &mut Flasher<T>, ctx: &mut Context) -> Result<PollResult> {
        flasher.erase_chip(ctx.sink())
    }
}

/// Owner of the flasher between operations
pub struct Executor<T: Transport> {
    flasher: Flasher<T>,
}

impl<T: Transport + 'static> Executor<T> {
    /// Take ownership of a flasher
    pub fn new(flasher: Flasher<T>) -> Self {
        Self { flasher }
    }

    /// Access the flasher between runs
    pub fn flasher_mut(&mut self) -> &mut Flasher<T> {
        &mut self.flasher
    }

    /// Release the flasher
    pub fn into_flasher(self) -> Flasher<T> {
        self.flasher
    }

    /// Move the flasher into a new worker thread running `op`
    ///
    /// If the thread cannot be started the flasher is dropped along with
    /// the closure.
    pub fn spawn<O: Operation>(self, op: O) -> Result<WorkerHandle<T, O::Output>> {
        let (events_tx, events) = mpsc::channel();
        let (alive, done) = mpsc::channel::<()>();
        let cancel = CancellationToken::new();
        let name = op.name();

        let mut ctx = Context::new(events_tx, cancel.clone());
        let mut executor = self;
        let thread = thread::Builder::new()
            .name(format!("sstflash-{}", name))
            .spawn(move || {
                // Dropped on return or unwind, which wakes `wait_timeout`
                let _alive = alive;
                log::debug!("Worker {} started", name);
                let result = op.run(&mut executor.flasher, &mut ctx);
                log::debug!("Worker {} finished: ok={}", name, result.is_ok());
                (result, executor)
            })
            .map_err(FlashError::Spawn)?;

        Ok(WorkerHandle {
            thread,
            events,
            done,
            cancel,
        })
    }
}

/// Handle to a running operation
pub struct WorkerHandle<T: Transport, O> {
    thread: JoinHandle<(Result<O>, Executor<T>)>,
    events: Receiver<Event>,
    done: Receiver<()>,
    cancel: CancellationToken,
}

impl<T: Transport, O> WorkerHandle<T, O> {
    /// Progress events from the worker
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Token shared with the worker
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the worker to stop at the next sector boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait up to `timeout` for the worker to finish; true if it has
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Whether the worker has finished
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the result and recover the executor for reuse
    ///
    /// The executor is lost if the worker panicked.
    pub fn join(self) -> (Result<O>, Option<Executor<T>>) {
        match self.thread.join() {
            Ok((result, executor)) => (result, Some(executor)),
            Err(_) => {
                log::error!("Worker thread panicked");
                (Err(FlashError::WorkerPanicked), None)
            }
        }
    }
}
