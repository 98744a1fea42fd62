//! 列出可用串口

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    let ports = myo_sdk::list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        println!("{:<20} {}", port.name, port.description);
    }
    Ok(())
}
