use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use camdev::fake::{FakeCameraConfig, FakeDevice};
use camdev::{ControlMonitor, Device, DeviceExt, MonitorConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let frames = env::args()
        .skip(1)
        .find_map(|arg| arg.strip_prefix("--frames=").map(|v| v.to_string()))
        .unwrap_or_else(|| "10".into())
        .parse::<u64>()?;

    let device = Arc::new(FakeDevice::new(FakeCameraConfig {
        frame_rate: 20.0,
        ..FakeCameraConfig::default()
    })?);
    device.control_lost().connect(|| println!("control lost"));
    let monitor = ControlMonitor::spawn(Arc::clone(&device), MonitorConfig::default());

    device.set_integer_feature_value("Width", 320);
    device.set_integer_feature_value("Height", 240);
    println!(
        "{} {} {}x{} {}",
        device.get_string_feature_value("DeviceVendorName"),
        device.get_string_feature_value("DeviceModelName"),
        device.get_integer_feature_value("Width"),
        device.get_integer_feature_value("Height"),
        device.get_string_feature_value("PixelFormat"),
    );

    let mut stream = device.create_stream_with(|frame| {
        println!("frame {:>4}: {} bytes", frame.frame_id, frame.len());
    })?;
    device.execute_command("AcquisitionStart");
    while stream.stats().frames < frames {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    device.execute_command("AcquisitionStop");
    stream.close();

    let stats = stream.stats();
    println!("frames={} bytes={} avg_fps={:.1}", stats.frames, stats.bytes, stats.avg_fps);

    device.camera().revoke_control();
    tokio::time::sleep(Duration::from_secs(1)).await;
    monitor.stop().await;
    Ok(())
}
