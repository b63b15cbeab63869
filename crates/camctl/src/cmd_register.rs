use anyhow::{Context, Result};
use camdev::Device;
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct RegisterValue {
    address: String,
    value: u32,
}

fn report(address: u32, value: u32, json: bool) -> Result<()> {
    if json {
        common::print_json(&RegisterValue {
            address: format!("0x{address:08X}"),
            value,
        })
    } else {
        println!("0x{address:08X} = 0x{value:08X} ({value})");
        Ok(())
    }
}

pub fn read(device: &dyn Device, address: u32, json: bool) -> Result<()> {
    let value = device
        .read_register(address)
        .with_context(|| format!("read register 0x{address:08X}"))?;
    report(address, value, json)
}

pub fn write(device: &dyn Device, address: u32, value: u32, json: bool) -> Result<()> {
    device
        .write_register(address, value)
        .with_context(|| format!("write register 0x{address:08X}"))?;
    let read_back = device
        .read_register(address)
        .with_context(|| format!("read register 0x{address:08X}"))?;
    report(address, read_back, json)
}
