#![cfg_attr(docsrs, feature(doc_cfg))]
//! Camera device layer: a polymorphic [`Device`] contract with name-based
//! feature access, register IO, frame streaming and control-loss events.
//!
//! ```rust,no_run
//! use camdev::fake::{FakeCameraConfig, FakeDevice};
//! use camdev::{Device, DeviceExt, DeviceError};
//!
//! # fn run() -> Result<(), DeviceError> {
//! let device = FakeDevice::new(FakeCameraConfig::default())?;
//! device.set_integer_feature_value("Width", 320);
//! device.set_string_feature_value("PixelFormat", "Mono8");
//! println!("width = {}", device.get_integer_feature_value("Width"));
//!
//! let mut stream = device.create_stream(Box::new(|frame| {
//!     println!("frame {} ({} bytes)", frame.frame_id, frame.len());
//! }))?;
//! device.execute_command("AcquisitionStart");
//! std::thread::sleep(std::time::Duration::from_millis(200));
//! stream.close();
//! # Ok(())
//! # }
//! ```

pub use genapi_core as genapi;
pub use pfnc;
pub use sfnc;

pub mod device;
pub mod dispatch;
pub mod fake;
pub mod frame;
pub mod monitor;
pub mod notifier;
pub mod stats;
pub mod stream;

use thiserror::Error;

pub use device::{ensure_nonempty, fetch_description, Device, DeviceIo, GenicamCell};
pub use dispatch::DeviceExt;
pub use frame::Frame;
pub use monitor::{ControlMonitor, MonitorConfig};
pub use notifier::{ControlLost, ControlLostNotifier, ListenerId};
pub use stats::{StreamStats, StreamStatsAccumulator};
pub use stream::{
    FrameCallback, FrameSource, StopSignal, Stream, StreamConfig, StreamError, StreamState,
};

/// Error type produced by device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A caller-side precondition was violated; no IO was attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Register or memory access failed.
    #[error("transport: {0}")]
    Transport(String),
    /// The feature description could not be retrieved or parsed.
    #[error("genicam: {0}")]
    Genicam(String),
    /// Stream creation failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl DeviceError {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        DeviceError::InvalidArgument(msg.into())
    }

    pub(crate) fn transport<S: Into<String>>(msg: S) -> Self {
        DeviceError::Transport(msg.into())
    }
}
