//! SST39SF0x0 programmer firmware for Raspberry Pi Pico
//!
//! The host talks to the board over USB CDC-ACM. USB runs on a
//! high-priority interrupt executor and moves bytes through two pipes;
//! the command dispatcher from `sstflash-core` runs in thread mode and
//! busy-waits on the bus, so it never has to yield.

#![no_std]
#![no_main]

mod pins;

use core::convert::Infallible;

use defmt::{info, warn};
use embassy_executor::InterruptExecutor;
use embassy_futures::select::select;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Flex, Level, Output};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler as UsbInterruptHandler};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::{Builder, UsbDevice};
use sstflash_core::algorithm::FlashEngine;
use sstflash_core::bus::{BusTiming, ParallelBus};
use sstflash_core::firmware::{HostLink, Programmer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::pins::GpioBus;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => UsbInterruptHandler<USB>;
});

type AppDriver = Driver<'static, USB>;

/// Full speed bulk packet size
const PACKET_SIZE: usize = 64;

/// Bytes from the host
static RX: Pipe<CriticalSectionRawMutex, 512> = Pipe::new();
/// Bytes to the host
static TX: Pipe<CriticalSectionRawMutex, 1024> = Pipe::new();

static EXECUTOR_USB: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_USB.on_interrupt()
}

/// Host side of the dispatcher, backed by the USB pipes
struct UsbLink;

impl embedded_io::ErrorType for UsbLink {
    type Error = Infallible;
}

impl embedded_io::Write for UsbLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        // The USB executor preempts us and drains the pipe
        loop {
            if let Ok(n) = TX.try_write(buf) {
                return Ok(n);
            }
        }
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        while !TX.is_empty() {}
        Ok(())
    }
}

impl HostLink for UsbLink {
    fn poll_byte(&mut self) -> Result<Option<u8>, Infallible> {
        let mut byte = [0u8; 1];
        Ok(RX.try_read(&mut byte).ok().map(|_| byte[0]))
    }
}

fn usb_config() -> embassy_usb::Config<'static> {
    let mut config = embassy_usb::Config::new(0x2E8A, 0x000A);
    config.manufacturer = Some("sstflash");
    config.product = Some("PICOSST39");
    config.serial_number = Some("00000001");
    config.max_packet_size_0 = PACKET_SIZE as u8;
    config
}

#[cortex_m_rt::entry]
fn main() -> ! {
    info!("pico-sst39 starting...");

    let p = embassy_rp::init(Default::default());

    let mut bus = GpioBus {
        data: [
            Flex::new(p.PIN_0),
            Flex::new(p.PIN_1),
            Flex::new(p.PIN_2),
            Flex::new(p.PIN_3),
            Flex::new(p.PIN_4),
            Flex::new(p.PIN_5),
            Flex::new(p.PIN_6),
            Flex::new(p.PIN_7),
        ],
        address: [
            Output::new(p.PIN_8, Level::Low),
            Output::new(p.PIN_9, Level::Low),
            Output::new(p.PIN_10, Level::Low),
            Output::new(p.PIN_11, Level::Low),
            Output::new(p.PIN_12, Level::Low),
            Output::new(p.PIN_13, Level::Low),
            Output::new(p.PIN_14, Level::Low),
            Output::new(p.PIN_15, Level::Low),
        ],
        latch_oe: Output::new(p.PIN_16, Level::High),
        load: [
            Output::new(p.PIN_17, Level::Low),
            Output::new(p.PIN_18, Level::Low),
            Output::new(p.PIN_19, Level::Low),
        ],
        we: Output::new(p.PIN_20, Level::High),
        ce: Output::new(p.PIN_21, Level::High),
        oe: Output::new(p.PIN_22, Level::High),
    };
    bus.init();
    info!("Bus initialized");

    // USB
    static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static CDC_STATE: StaticCell<State> = StaticCell::new();

    let driver = Driver::new(p.USB, Irqs);
    let mut builder = Builder::new(
        driver,
        usb_config(),
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        &mut [],
        CONTROL_BUF.init([0; 64]),
    );
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), PACKET_SIZE as u16);
    let usb = builder.build();

    interrupt::SWI_IRQ_1.set_priority(Priority::P3);
    let spawner = EXECUTOR_USB.start(interrupt::SWI_IRQ_1);
    spawner.must_spawn(usb_task(usb));
    spawner.must_spawn(cdc_task(class));

    let engine = FlashEngine::new(ParallelBus::new(bus, BusTiming::SST39));
    let mut programmer = Programmer::new(engine);
    let mut link = UsbLink;

    info!("pico-sst39 ready");
    loop {
        // Infallible
        let _ = programmer.poll(&mut link);
    }
}

/// USB device task
#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, AppDriver>) {
    usb.run().await;
}

/// Moves bytes between the CDC endpoints and the pipes
#[embassy_executor::task]
async fn cdc_task(class: CdcAcmClass<'static, AppDriver>) {
    let (mut sender, mut receiver) = class.split();
    loop {
        receiver.wait_connection().await;
        info!("Host connected");

        let rx = async {
            let mut buf = [0u8; PACKET_SIZE];
            loop {
                match receiver.read_packet(&mut buf).await {
                    Ok(n) => RX.write_all(&buf[..n]).await,
                    Err(_) => break,
                }
            }
        };
        let tx = async {
            let mut buf = [0u8; PACKET_SIZE];
            loop {
                let n = TX.read(&mut buf).await;
                if sender.write_packet(&buf[..n]).await.is_err() {
                    break;
                }
                // A full packet needs a terminator unless more data follows
                if n == PACKET_SIZE && TX.is_empty() && sender.write_packet(&[]).await.is_err() {
                    break;
                }
            }
        };
        select(rx, tx).await;
        warn!("Host disconnected");
    }
}
