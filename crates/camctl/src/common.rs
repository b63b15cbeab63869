use std::convert::TryInto;
use std::fs::{self, File};
use std::io::Write;
use std::num::ParseIntError;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context, Result};
use camdev::fake::{FakeCameraConfig, FakeDevice};
use camdev::genapi::Node;
use camdev::{Device, DeviceIo, Frame};
use pfnc::PixelFormat;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

pub fn load_config(path: Option<&Path>) -> Result<FakeCameraConfig> {
    let Some(path) = path else {
        return Ok(FakeCameraConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parse camera config {}", path.display()))
}

pub fn open_device(config: Option<&Path>) -> Result<FakeDevice> {
    let config = load_config(config)?;
    info!(model = %config.model, serial = %config.serial, "opening simulated camera");
    FakeDevice::new(config).context("open simulated camera")
}

/// Look a feature up, failing when the tree is unavailable or the name is unknown.
pub fn find_feature<'a, D: Device + ?Sized>(device: &'a D, name: &str) -> Result<&'a Node> {
    let nodes = device.genicam().context("load feature tree")?;
    nodes
        .node(name)
        .ok_or_else(|| anyhow!("unknown feature {name}"))
}

/// Read a feature as text, surfacing register errors.
pub fn read_feature<D: Device + ?Sized>(device: &D, name: &str) -> Result<String> {
    let node = find_feature(device, name)?;
    let io = DeviceIo::new(device);
    node.display_value(&io)
        .with_context(|| format!("read feature {name}"))?
        .ok_or_else(|| anyhow!("{name} is a command and has no value"))
}

/// Integer in decimal or `0x` hexadecimal notation.
pub fn parse_u32(text: &str) -> Result<u32, ParseIntError> {
    match strip_hex(text) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

pub fn parse_i64(text: &str) -> Result<i64, ParseIntError> {
    match strip_hex(text) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn strip_hex(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

pub fn parse_bool(text: &str) -> Result<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => bail!("invalid boolean '{text}'"),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

pub fn format_system_time(ts: SystemTime) -> Result<String> {
    let dt: OffsetDateTime = ts
        .try_into()
        .map_err(|err| anyhow!("convert time: {err}"))?;
    dt.format(&Rfc3339).context("format timestamp")
}

/// Encode an 8-bit frame as binary PGM (mono) or PPM (colour).
pub fn encode_pnm(frame: &Frame) -> Result<Vec<u8>> {
    let (magic, channels) = match frame.pixel_format {
        PixelFormat::Mono8 => ("P5", 1usize),
        PixelFormat::RGB8Packed | PixelFormat::BGR8Packed => ("P6", 3usize),
        other => bail!("cannot save {other} frames"),
    };
    let w: usize = frame.width.try_into().context("width doesn't fit in usize")?;
    let h: usize = frame.height.try_into().context("height doesn't fit in usize")?;
    let expected = w
        .checked_mul(h)
        .and_then(|area| area.checked_mul(channels))
        .context("image area overflow")?;
    if expected != frame.len() {
        bail!(
            "payload length mismatch: expected {expected}, got {}",
            frame.len()
        );
    }

    let header = format!("{magic}\n{} {}\n255\n", frame.width, frame.height);
    let mut buf = Vec::with_capacity(header.len() + expected);
    buf.extend_from_slice(header.as_bytes());
    if frame.pixel_format == PixelFormat::BGR8Packed {
        for px in frame.payload.chunks_exact(3) {
            buf.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    } else {
        buf.extend_from_slice(&frame.payload);
    }
    Ok(buf)
}

pub fn write_file(buffer: &[u8], path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(buffer)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
