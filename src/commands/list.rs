//! List commands implementation

use serialport::SerialPortType;
use sstflash_core::chip::ChipModel;

use super::{format_size, CmdResult};

/// List serial ports that could host a programmer
pub fn list_ports() -> CmdResult {
    let ports = sstflash_serial::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    println!("Available serial ports:");
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "  {:<20} USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("  {}", port.port_name),
        }
    }
    Ok(())
}

/// List all supported chips
pub fn list_chips() {
    println!("Supported flash chips:");
    println!();
    println!("{:<12} {:>10} {:>8} {:>8}", "Name", "Size", "Banks", "ID");
    println!("{}", "-".repeat(42));

    for model in ChipModel::ALL {
        println!(
            "{:<12} {:>10} {:>8} {:>8}",
            model.name(),
            format_size(model.capacity()),
            model.bank_count(),
            model.identity().to_string()
        );
    }
}
