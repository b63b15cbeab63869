use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camdev::fake::FakeDevice;
use camdev::{ControlMonitor, Device, DeviceExt, Frame, MonitorConfig};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::common;

#[derive(Debug, Clone)]
pub struct StreamArgs {
    pub count: u64,
    pub timeout_s: u64,
    pub trigger: bool,
    pub save: Option<PathBuf>,
}

#[derive(Serialize)]
struct FrameRecord {
    frame_id: u64,
    width: u32,
    height: u32,
    pixel_format: String,
    bytes: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct StreamReport {
    frames: Vec<FrameRecord>,
    failures: u64,
    avg_fps: f64,
    elapsed_ms: u128,
    control_lost: bool,
}

impl FrameRecord {
    fn new(frame: &Frame) -> Result<Self> {
        Ok(Self {
            frame_id: frame.frame_id,
            width: frame.width,
            height: frame.height,
            pixel_format: frame.pixel_format.to_string(),
            bytes: frame.len(),
            timestamp: common::format_system_time(frame.timestamp)?,
        })
    }
}

pub async fn run(device: FakeDevice, args: StreamArgs, json: bool) -> Result<()> {
    let device = Arc::new(device);
    let mut lost = device.control_lost().subscribe();
    let monitor = ControlMonitor::spawn(Arc::clone(&device), MonitorConfig::default());

    if args.trigger {
        device.set_string_feature_value(sfnc::TRIGGER_MODE, "On");
    }
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let mut stream = device
        .create_stream_with(move |frame: &Frame| {
            // The receiver is gone once collection has finished.
            let _ = tx.send(frame.clone());
        })
        .context("create stream")?;
    device.execute_command(sfnc::ACQUISITION_START);
    info!(
        count = args.count,
        width = device.get_integer_feature_value(sfnc::WIDTH),
        height = device.get_integer_feature_value(sfnc::HEIGHT),
        pixel_format = %device.get_string_feature_value(sfnc::PIXEL_FORMAT),
        "acquisition started"
    );

    let deadline = Instant::now() + Duration::from_secs(args.timeout_s);
    let mut records = Vec::new();
    let mut control_lost = false;
    while (records.len() as u64) < args.count {
        if args.trigger {
            device.execute_command(sfnc::TRIGGER_SOFTWARE);
        }
        let frame = tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = lost.recv() => {
                warn!("control lost, stopping acquisition");
                control_lost = true;
                break;
            }
            _ = time::sleep_until(deadline) => {
                warn!(received = records.len(), "timed out waiting for frames");
                break;
            }
        };

        if records.is_empty() {
            if let Some(path) = &args.save {
                let image = common::encode_pnm(&frame)?;
                common::write_file(&image, path)?;
                info!(path = %path.display(), frame_id = frame.frame_id, "saved frame");
            }
        }
        let record = FrameRecord::new(&frame)?;
        if !json {
            println!(
                "frame {:>6}: {}x{} {} {} bytes",
                record.frame_id, record.width, record.height, record.pixel_format, record.bytes
            );
        }
        records.push(record);
    }

    device.execute_command(sfnc::ACQUISITION_STOP);
    stream.close();
    monitor.stop().await;

    let stats = stream.stats();
    if json {
        common::print_json(&StreamReport {
            frames: records,
            failures: stats.failures,
            avg_fps: stats.avg_fps,
            elapsed_ms: stats.elapsed.as_millis(),
            control_lost,
        })?;
    } else {
        println!(
            "frames={} bytes={} failures={} avg_fps={:.1}",
            stats.frames, stats.bytes, stats.failures, stats.avg_fps
        );
    }
    Ok(())
}
