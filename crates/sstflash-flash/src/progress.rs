//! Progress events
//!
//! Orchestrated operations report through a [`ProgressSink`]. The sink sees
//! phase changes and a single [`OperationProgress`] counter that only ever
//! grows within one operation, whatever mix of erase, program and read
//! steps makes it up.

use std::sync::mpsc::Sender;

use sstflash_core::chip::ChipModel;

/// Stage of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading the chip identity
    Identify,
    /// Reading chip contents
    Read,
    /// Erasing and programming sectors
    Write,
    /// Reading back and comparing
    Verify,
    /// Erasing the whole chip
    Erase,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Identify => "Identifying",
            Phase::Read => "Reading",
            Phase::Write => "Writing",
            Phase::Verify => "Verifying",
            Phase::Erase => "Erasing",
        };
        f.write_str(name)
    }
}

/// Units of work done out of the total for the running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationProgress {
    /// Units completed
    pub units_done: u32,
    /// Units in the whole operation
    pub units_total: u32,
}

/// Something that happened during an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The chip was identified
    ChipIdentified(ChipModel),
    /// A new phase started
    Phase(Phase),
    /// Work advanced
    Progress(OperationProgress),
    /// Quick mode skipped an all-0xFF sector
    SectorSkipped(u8),
}

/// Receiver of progress events
pub trait ProgressSink {
    /// Handle one event
    fn event(&mut self, event: Event);
}

/// A no-op progress sink
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&mut self, _event: Event) {}
}

impl ProgressSink for Vec<Event> {
    fn event(&mut self, event: Event) {
        self.push(event);
    }
}

impl ProgressSink for Sender<Event> {
    fn event(&mut self, event: Event) {
        // Receiver may be gone if the caller stopped listening
        let _ = self.send(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn event(&mut self, event: Event) {
        (**self).event(event);
    }
}

/// Monotonic counter feeding a sink
pub(crate) struct Tracker<'a> {
    sink: &'a mut dyn ProgressSink,
    progress: OperationProgress,
}

impl<'a> Tracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink, units_total: u32) -> Self {
        let progress = OperationProgress {
            units_done: 0,
            units_total,
        };
        sink.event(Event::Progress(progress));
        Self { sink, progress }
    }

    pub(crate) fn phase(&mut self, phase: Phase) {
        log::debug!("{}", phase);
        self.sink.event(Event::Phase(phase));
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.sink.event(event);
    }

    pub(crate) fn advance(&mut self, units: u32) {
        self.progress.units_done = (self.progress.units_done + units).min(self.progress.units_total);
        self.sink.event(Event::Progress(self.progress));
    }

    pub(crate) fn done(&self) -> u32 {
        self.progress.units_done
    }

    pub(crate) fn total(&self) -> u32 {
        self.progress.units_total
    }
}
