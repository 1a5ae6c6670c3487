//! Parallel bus sequencing
//!
//! The programmer drives the chip through three 74HC573 latches that share
//! one 8-bit address bus (A0-7, A8-15 and A16-18), a separate 8-bit data
//! bus and the active-low CE, OE and WE strobes.
//!
//! Implementations of [`BusPins`] only toggle lines. [`ParallelBus`] owns the
//! ordering rules on top of them:
//!
//! - the full address is latched before any strobe is asserted
//! - every strobe is released again before the next operation starts
//! - the data bus is only driven while writing
//!
//! A [`Burst`] keeps CE asserted across many accesses and only re-latches
//! the address groups that changed since the previous access, which is what
//! keeps bulk programming fast.

use bitflags::bitflags;

/// Address lines that reach the chip (A0-A18)
pub const ADDRESS_MASK: u32 = 0x7FFFF;

/// Bits of the upper latch that are wired to the chip
pub const UPPER_LATCH_MASK: u8 = 0x07;

bitflags! {
    /// Chip strobes, set bits are asserted (electrically low)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Strobes: u8 {
        /// Chip enable
        const CE = 1 << 0;
        /// Output enable
        const OE = 1 << 1;
        /// Write enable
        const WE = 1 << 2;
    }
}

/// One of the three address latches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    /// A0-A7
    Low,
    /// A8-A15
    High,
    /// A16-A18
    Upper,
}

impl Latch {
    /// Latches in the order they are loaded
    pub const ALL: [Latch; 3] = [Latch::Low, Latch::High, Latch::Upper];

    /// Portion of `addr` held by this latch
    pub const fn group(self, addr: u32) -> u8 {
        match self {
            Latch::Low => addr as u8,
            Latch::High => (addr >> 8) as u8,
            Latch::Upper => (addr >> 16) as u8 & UPPER_LATCH_MASK,
        }
    }
}

/// Direction of the data bus as seen from the programmer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// Chip drives the bus
    Input,
    /// Programmer drives the bus
    Output,
}

/// Raw pin access for the bus
///
/// Implemented by the firmware on top of GPIOs and by the emulator.
/// All levels are logical: `true`/set means asserted, whatever the
/// electrical polarity.
pub trait BusPins {
    /// Drive the shared address bus
    fn put_address(&mut self, value: u8);

    /// Set the load input of a latch. The latch is transparent while high
    /// and holds its value from the falling edge.
    fn set_latch(&mut self, latch: Latch, load: bool);

    /// Enable or disable the latch outputs towards the chip
    fn set_address_output(&mut self, enabled: bool);

    /// Switch the data bus direction
    fn set_data_direction(&mut self, direction: DataDirection);

    /// Drive the data bus (only meaningful as output)
    fn put_data(&mut self, value: u8);

    /// Sample the data bus
    fn get_data(&mut self) -> u8;

    /// Set the asserted strobes
    fn set_strobes(&mut self, strobes: Strobes);

    /// Busy-wait for the given number of microseconds
    fn delay_us(&mut self, us: u32);
}

/// Settle times in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTiming {
    /// OE asserted to data valid
    pub read_us: u32,
    /// WE pulse width
    pub write_us: u32,
    /// Latch load pulse width
    pub latch_us: u32,
}

impl BusTiming {
    /// Timing used with the SST39SF0x0 on the reference board
    pub const SST39: Self = Self {
        read_us: 3,
        write_us: 1,
        latch_us: 1,
    };

    /// No delays, for emulated buses
    pub const NONE: Self = Self {
        read_us: 0,
        write_us: 0,
        latch_us: 0,
    };
}

impl Default for BusTiming {
    fn default() -> Self {
        Self::SST39
    }
}

/// Address/data bus with ordered strobe handling
pub struct ParallelBus<P: BusPins> {
    pins: P,
    timing: BusTiming,
    strobes: Strobes,
    direction: DataDirection,
    latched: Option<u32>,
}

impl<P: BusPins> ParallelBus<P> {
    /// Take ownership of the pins and put every line in its idle state
    pub fn new(mut pins: P, timing: BusTiming) -> Self {
        pins.set_strobes(Strobes::empty());
        pins.set_data_direction(DataDirection::Input);
        for latch in Latch::ALL {
            pins.set_latch(latch, false);
        }
        pins.set_address_output(true);

        Self {
            pins,
            timing,
            strobes: Strobes::empty(),
            direction: DataDirection::Input,
            latched: None,
        }
    }

    /// Access the underlying pins
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Mutable access to the underlying pins
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Release the pins
    pub fn into_pins(self) -> P {
        self.pins
    }

    /// Address currently held in the latches
    pub fn latched_address(&self) -> Option<u32> {
        self.latched
    }

    /// Latch a full address with the latch outputs disabled
    pub fn set_address(&mut self, addr: u32) {
        self.release();
        let addr = addr & ADDRESS_MASK;

        self.pins.set_address_output(false);
        for latch in Latch::ALL {
            self.load_latch(latch, latch.group(addr));
        }
        self.pins.set_address_output(true);

        self.latched = Some(addr);
    }

    /// Read one byte
    pub fn read_byte(&mut self, addr: u32) -> u8 {
        self.set_direction(DataDirection::Input);
        self.set_address(addr);

        self.assert(Strobes::CE);
        self.assert(Strobes::OE);
        self.pins.delay_us(self.timing.read_us);
        let value = self.pins.get_data();
        self.release();

        value
    }

    /// Write one byte
    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.set_direction(DataDirection::Output);
        self.set_address(addr);

        self.assert(Strobes::CE);
        self.assert(Strobes::WE);
        self.pins.put_data(value);
        self.pins.delay_us(self.timing.write_us);
        self.release();

        self.set_direction(DataDirection::Input);
    }

    /// Read consecutive bytes starting at `addr`
    pub fn read_into(&mut self, addr: u32, buf: &mut [u8]) {
        let mut burst = self.burst();
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = burst.read(addr.wrapping_add(i as u32));
        }
    }

    /// Start a burst that holds CE asserted until dropped
    pub fn burst(&mut self) -> Burst<'_, P> {
        self.release();
        self.assert(Strobes::CE);
        Burst { bus: self }
    }

    fn load_latch(&mut self, latch: Latch, value: u8) {
        self.pins.put_address(value);
        self.pins.set_latch(latch, true);
        self.pins.delay_us(self.timing.latch_us);
        self.pins.set_latch(latch, false);
    }

    /// Re-latch only the groups that differ from the held address
    fn relatch(&mut self, addr: u32) {
        let addr = addr & ADDRESS_MASK;
        match self.latched {
            Some(held) if held == addr => {}
            Some(held) => {
                for latch in Latch::ALL {
                    if latch.group(held) != latch.group(addr) {
                        self.load_latch(latch, latch.group(addr));
                    }
                }
                self.latched = Some(addr);
            }
            None => {
                for latch in Latch::ALL {
                    self.load_latch(latch, latch.group(addr));
                }
                self.latched = Some(addr);
            }
        }
    }

    fn set_direction(&mut self, direction: DataDirection) {
        if self.direction != direction {
            self.pins.set_data_direction(direction);
            self.direction = direction;
        }
    }

    fn assert(&mut self, strobe: Strobes) {
        self.strobes |= strobe;
        self.pins.set_strobes(self.strobes);
    }

    fn deassert(&mut self, strobe: Strobes) {
        self.strobes -= strobe;
        self.pins.set_strobes(self.strobes);
    }

    /// Return every strobe to inactive, OE/WE before CE
    fn release(&mut self) {
        if self.strobes.intersects(Strobes::OE | Strobes::WE) {
            self.deassert(Strobes::OE | Strobes::WE);
        }
        if self.strobes.contains(Strobes::CE) {
            self.deassert(Strobes::CE);
        }
    }
}

/// Consecutive accesses with CE held asserted
pub struct Burst<'a, P: BusPins> {
    bus: &'a mut ParallelBus<P>,
}

impl<P: BusPins> Burst<'_, P> {
    /// Write one byte, re-latching only changed address groups
    pub fn write(&mut self, addr: u32, value: u8) {
        self.bus.set_direction(DataDirection::Output);
        self.bus.relatch(addr);

        self.bus.assert(Strobes::WE);
        self.bus.pins.put_data(value);
        self.bus.pins.delay_us(self.bus.timing.write_us);
        self.bus.deassert(Strobes::WE);
    }

    /// Read one byte, re-latching only changed address groups
    pub fn read(&mut self, addr: u32) -> u8 {
        self.bus.set_direction(DataDirection::Input);
        self.bus.relatch(addr);

        self.bus.assert(Strobes::OE);
        self.bus.pins.delay_us(self.bus.timing.read_us);
        let value = self.bus.pins.get_data();
        self.bus.deassert(Strobes::OE);

        value
    }
}

impl<P: BusPins> Drop for Burst<'_, P> {
    fn drop(&mut self) {
        self.bus.release();
        self.bus.set_direction(DataDirection::Input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Address(u8),
        Latch(Latch, bool),
        AddressOutput(bool),
        Direction(DataDirection),
        Data(u8),
        Get,
        Strobes(Strobes),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event, 512>,
        read_value: u8,
    }

    impl Recorder {
        fn latch_loads(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, Event::Latch(_, true)))
                .count()
        }
    }

    impl BusPins for Recorder {
        fn put_address(&mut self, value: u8) {
            let _ = self.events.push(Event::Address(value));
        }
        fn set_latch(&mut self, latch: Latch, load: bool) {
            let _ = self.events.push(Event::Latch(latch, load));
        }
        fn set_address_output(&mut self, enabled: bool) {
            let _ = self.events.push(Event::AddressOutput(enabled));
        }
        fn set_data_direction(&mut self, direction: DataDirection) {
            let _ = self.events.push(Event::Direction(direction));
        }
        fn put_data(&mut self, value: u8) {
            let _ = self.events.push(Event::Data(value));
        }
        fn get_data(&mut self) -> u8 {
            let _ = self.events.push(Event::Get);
            self.read_value
        }
        fn set_strobes(&mut self, strobes: Strobes) {
            let _ = self.events.push(Event::Strobes(strobes));
        }
        fn delay_us(&mut self, _us: u32) {}
    }

    fn bus() -> ParallelBus<Recorder> {
        let mut bus = ParallelBus::new(Recorder::default(), BusTiming::NONE);
        bus.pins_mut().events.clear();
        bus
    }

    #[test]
    fn test_latch_groups() {
        assert_eq!(Latch::Low.group(0x7_5A_C3), 0xC3);
        assert_eq!(Latch::High.group(0x7_5A_C3), 0x5A);
        assert_eq!(Latch::Upper.group(0x7_5A_C3), 0x07);
        assert_eq!(Latch::Upper.group(0xF_00_00), 0x07);
    }

    #[test]
    fn test_read_byte_sequence() {
        let mut bus = bus();
        bus.pins_mut().read_value = 0x42;
        assert_eq!(bus.read_byte(0x1_2345), 0x42);

        let expected = [
            Event::AddressOutput(false),
            Event::Address(0x45),
            Event::Latch(Latch::Low, true),
            Event::Latch(Latch::Low, false),
            Event::Address(0x23),
            Event::Latch(Latch::High, true),
            Event::Latch(Latch::High, false),
            Event::Address(0x01),
            Event::Latch(Latch::Upper, true),
            Event::Latch(Latch::Upper, false),
            Event::AddressOutput(true),
            Event::Strobes(Strobes::CE),
            Event::Strobes(Strobes::CE | Strobes::OE),
            Event::Get,
            Event::Strobes(Strobes::CE),
            Event::Strobes(Strobes::empty()),
        ];
        assert_eq!(&bus.pins().events[..], &expected[..]);
    }

    #[test]
    fn test_write_byte_drives_data_only_while_writing() {
        let mut bus = bus();
        bus.write_byte(0x5555, 0xAA);

        let events = &bus.pins().events;
        assert_eq!(events.first(), Some(&Event::Direction(DataDirection::Output)));
        assert_eq!(events.last(), Some(&Event::Direction(DataDirection::Input)));

        let we = events
            .iter()
            .position(|e| *e == Event::Strobes(Strobes::CE | Strobes::WE))
            .unwrap();
        let data = events.iter().position(|e| *e == Event::Data(0xAA)).unwrap();
        let last_latch = events
            .iter()
            .rposition(|e| matches!(e, Event::Latch(_, _)))
            .unwrap();
        assert!(last_latch < we);
        assert!(we < data);
        assert_eq!(bus.pins().events.len(), data + 4);
    }

    #[test]
    fn test_burst_relatches_changed_groups_only() {
        let mut bus = bus();
        {
            let mut burst = bus.burst();
            for addr in 0x00F0..0x0110u32 {
                burst.write(addr, 0);
            }
        }
        // 3 initial loads (none latched yet), 31 low-byte changes and one
        // extra high-byte change at the 0x0100 boundary
        assert_eq!(bus.pins().latch_loads(), 3 + 31 + 1);
        assert_eq!(bus.latched_address(), Some(0x010F));

        // CE stays asserted for the whole burst
        let ce_drops = bus
            .pins()
            .events
            .iter()
            .filter(|e| **e == Event::Strobes(Strobes::empty()))
            .count();
        assert_eq!(ce_drops, 1);
    }

    #[test]
    fn test_burst_same_address_does_not_relatch() {
        let mut bus = bus();
        bus.set_address(0x2000);
        bus.pins_mut().events.clear();
        {
            let mut burst = bus.burst();
            for _ in 0..10 {
                burst.read(0x2000);
            }
        }
        assert_eq!(bus.pins().latch_loads(), 0);
    }

    #[test]
    fn test_address_masked_to_chip() {
        let mut bus = bus();
        bus.set_address(0xFF_FFFF);
        assert_eq!(bus.latched_address(), Some(ADDRESS_MASK));
    }
}
