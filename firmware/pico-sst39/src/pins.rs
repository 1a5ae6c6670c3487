//! GPIO implementation of the parallel bus
//!
//! ## Pin Assignments
//!
//! | Pin       | Function                          |
//! |-----------|-----------------------------------|
//! | GP0-GP7   | D0-D7                             |
//! | GP8-GP15  | shared latch input bus            |
//! | GP16      | latch output enable (active low)  |
//! | GP17      | load A0-A7                        |
//! | GP18      | load A8-A15                       |
//! | GP19      | load A16-A18                      |
//! | GP20      | WE (active low)                   |
//! | GP21      | CE (active low)                   |
//! | GP22      | OE (active low)                   |

use embassy_rp::gpio::{Flex, Level, Output, Pull};
use embassy_time::{block_for, Duration};
use sstflash_core::bus::{BusPins, DataDirection, Latch, Strobes};

/// Bus lines of the programmer board
pub struct GpioBus {
    pub(crate) data: [Flex<'static>; 8],
    pub(crate) address: [Output<'static>; 8],
    pub(crate) latch_oe: Output<'static>,
    pub(crate) load: [Output<'static>; 3],
    pub(crate) we: Output<'static>,
    pub(crate) ce: Output<'static>,
    pub(crate) oe: Output<'static>,
}

impl GpioBus {
    /// Put every line in its idle state: strobes released, latches
    /// holding, latch outputs enabled, data bus floating
    pub fn init(&mut self) {
        self.set_strobes(Strobes::empty());
        for latch in Latch::ALL {
            self.set_latch(latch, false);
        }
        self.set_address_output(true);
        for pin in &mut self.data {
            pin.set_pull(Pull::None);
        }
        self.set_data_direction(DataDirection::Input);
    }
}

fn put_byte(pins: &mut [Output<'static>; 8], value: u8) {
    for (bit, pin) in pins.iter_mut().enumerate() {
        pin.set_level(Level::from(value & (1 << bit) != 0));
    }
}

impl BusPins for GpioBus {
    fn put_address(&mut self, value: u8) {
        put_byte(&mut self.address, value);
    }

    fn set_latch(&mut self, latch: Latch, load: bool) {
        let pin = match latch {
            Latch::Low => &mut self.load[0],
            Latch::High => &mut self.load[1],
            Latch::Upper => &mut self.load[2],
        };
        pin.set_level(Level::from(load));
    }

    fn set_address_output(&mut self, enabled: bool) {
        self.latch_oe.set_level(Level::from(!enabled));
    }

    fn set_data_direction(&mut self, direction: DataDirection) {
        for pin in &mut self.data {
            match direction {
                DataDirection::Input => pin.set_as_input(),
                DataDirection::Output => pin.set_as_output(),
            }
        }
    }

    fn put_data(&mut self, value: u8) {
        for (bit, pin) in self.data.iter_mut().enumerate() {
            pin.set_level(Level::from(value & (1 << bit) != 0));
        }
    }

    fn get_data(&mut self) -> u8 {
        self.data
            .iter()
            .enumerate()
            .fold(0, |acc, (bit, pin)| acc | ((pin.is_high() as u8) << bit))
    }

    fn set_strobes(&mut self, strobes: Strobes) {
        self.ce.set_level(Level::from(!strobes.contains(Strobes::CE)));
        self.oe.set_level(Level::from(!strobes.contains(Strobes::OE)));
        self.we.set_level(Level::from(!strobes.contains(Strobes::WE)));
    }

    fn delay_us(&mut self, us: u32) {
        block_for(Duration::from_micros(us as u64));
    }
}
