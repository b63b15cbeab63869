//! Register-level simulated camera.
//!
//! [`FakeCamera`] holds a flat, big-endian register memory with the
//! description document mapped behind the bootstrap URL. [`FakeDevice`]
//! wraps it into a [`Device`] producing diagonal-ramp frames while
//! acquisition runs.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use bytes::{BufMut, BytesMut};
use genapi_core::NodeMap;
use pfnc::PixelFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::device::{ensure_nonempty, fetch_description, Device, GenicamCell};
use crate::frame::Frame;
use crate::notifier::ControlLostNotifier;
use crate::stream::{FrameCallback, FrameSource, StopSignal, Stream, StreamConfig, StreamError};
use crate::DeviceError;

/// Built-in description document.
pub const BUILTIN_XML: &str = include_str!("fake_camera.xml");

/// Register map of the simulated camera.
pub mod regs {
    pub const FIRST_URL: u32 = 0x0000;
    pub const VENDOR_NAME: u32 = 0x0048;
    pub const MODEL_NAME: u32 = 0x0068;
    pub const SERIAL_NUMBER: u32 = 0x00D8;
    pub const USER_ID: u32 = 0x00E8;
    pub const WIDTH: u32 = 0x0100;
    pub const HEIGHT: u32 = 0x0104;
    pub const PIXEL_FORMAT: u32 = 0x0108;
    pub const PAYLOAD_SIZE: u32 = 0x010C;
    pub const GAIN: u32 = 0x0110;
    pub const EXPOSURE_TIME: u32 = 0x0118;
    /// Frame rate in millihertz.
    pub const FRAME_RATE: u32 = 0x011C;
    pub const ACQUISITION_MODE: u32 = 0x0120;
    pub const ACQUISITION_START: u32 = 0x0124;
    pub const ACQUISITION_STOP: u32 = 0x0128;
    pub const TRIGGER_MODE: u32 = 0x0300;
    pub const TRIGGER_SOFTWARE: u32 = 0x0304;
    pub const REVERSE_X: u32 = 0x0308;
    pub const CONTROL_PRIVILEGE: u32 = crate::monitor::CCP_REGISTER;
    /// Start of the description document.
    pub const XML_BASE: u32 = 0x1000;

    pub const VENDOR_NAME_LEN: usize = 32;
    pub const MODEL_NAME_LEN: usize = 32;
    pub const SERIAL_NUMBER_LEN: usize = 16;
    pub const USER_ID_LEN: usize = 16;
    pub const MAX_DIMENSION: u32 = 4096;
}

const CONTROL_GRANTED: u32 = 0x0000_0002;
const ACQUISITION_MODE_SINGLE_FRAME: u32 = 1;

/// Initial state of a simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeCameraConfig {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub user_id: String,
    pub width: u32,
    pub height: u32,
    /// PFNC name, e.g. `"Mono8"`.
    pub pixel_format: String,
    /// Frames per second.
    pub frame_rate: f64,
    /// Microseconds.
    pub exposure_time: f64,
    pub gain: f64,
}

impl Default for FakeCameraConfig {
    fn default() -> Self {
        Self {
            vendor: "camdev".to_string(),
            model: "FakeCamera".to_string(),
            serial: "FK0001".to_string(),
            user_id: String::new(),
            width: 640,
            height: 480,
            pixel_format: "Mono8".to_string(),
            frame_rate: 30.0,
            exposure_time: 10_000.0,
            gain: 0.0,
        }
    }
}

impl FakeCameraConfig {
    fn validate(&self) -> Result<PixelFormat, DeviceError> {
        let strings = [
            ("vendor", &self.vendor, regs::VENDOR_NAME_LEN),
            ("model", &self.model, regs::MODEL_NAME_LEN),
            ("serial", &self.serial, regs::SERIAL_NUMBER_LEN),
            ("user_id", &self.user_id, regs::USER_ID_LEN),
        ];
        for (field, value, max) in strings {
            if value.len() > max {
                return Err(DeviceError::invalid(format!(
                    "{field} '{value}' exceeds {max} bytes"
                )));
            }
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value > regs::MAX_DIMENSION {
                return Err(DeviceError::invalid(format!(
                    "{field} {value} outside [1, {}]",
                    regs::MAX_DIMENSION
                )));
            }
        }
        if !(0.1..=1000.0).contains(&self.frame_rate) {
            return Err(DeviceError::invalid(format!(
                "frame rate {} outside [0.1, 1000]",
                self.frame_rate
            )));
        }
        if !(10.0..=1_000_000.0).contains(&self.exposure_time) {
            return Err(DeviceError::invalid(format!(
                "exposure time {} outside [10, 1000000]",
                self.exposure_time
            )));
        }
        if !(0.0..=48.0).contains(&self.gain) {
            return Err(DeviceError::invalid(format!(
                "gain {} outside [0, 48]",
                self.gain
            )));
        }
        PixelFormat::from_name(&self.pixel_format)
            .filter(|format| format.bytes_per_pixel().is_some())
            .ok_or_else(|| {
                DeviceError::invalid(format!("unsupported pixel format '{}'", self.pixel_format))
            })
    }
}

#[derive(Debug)]
struct Memory {
    bytes: Vec<u8>,
    acquiring: bool,
    pending_triggers: u32,
    io_failure: bool,
    writes: HashMap<u32, u64>,
}

impl Memory {
    fn region(&self, address: u32, len: usize) -> Result<Range<usize>, DeviceError> {
        let start = address as usize;
        start
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .map(|end| start..end)
            .ok_or_else(|| {
                DeviceError::transport(format!(
                    "access 0x{address:08X}+{len} outside device memory"
                ))
            })
    }

    // Fixed registers all live below XML_BASE, which the memory always covers.
    fn word(&self, address: u32) -> u32 {
        let at = address as usize;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_be_bytes(raw)
    }

    fn set_word(&mut self, address: u32, value: u32) {
        self.put(address, &value.to_be_bytes());
    }

    fn put(&mut self, address: u32, data: &[u8]) {
        let at = address as usize;
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    fn put_str(&mut self, address: u32, len: usize, value: &str) {
        let mut padded = vec![0u8; len];
        padded[..value.len()].copy_from_slice(value.as_bytes());
        self.put(address, &padded);
    }

    fn refresh_payload_size(&mut self) {
        let format = PixelFormat::from_code(self.word(regs::PIXEL_FORMAT));
        let size = format
            .image_size(self.word(regs::WIDTH), self.word(regs::HEIGHT))
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        self.set_word(regs::PAYLOAD_SIZE, size);
    }

    fn apply_side_effects(&mut self, written: Range<usize>) {
        let hits = |register: u32| {
            let at = register as usize;
            written.start <= at && at + 4 <= written.end
        };
        if hits(regs::ACQUISITION_START) {
            self.acquiring = true;
            info!("acquisition started");
        }
        if hits(regs::ACQUISITION_STOP) {
            self.acquiring = false;
            self.pending_triggers = 0;
            info!("acquisition stopped");
        }
        if hits(regs::TRIGGER_SOFTWARE) {
            self.pending_triggers = self.pending_triggers.saturating_add(1);
            debug!(pending = self.pending_triggers, "software trigger");
        }
        if hits(regs::WIDTH) || hits(regs::HEIGHT) || hits(regs::PIXEL_FORMAT) {
            self.refresh_payload_size();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Capture {
    width: u32,
    height: u32,
    format: PixelFormat,
    reverse_x: bool,
}

/// Register memory of a simulated camera. Every access takes one lock, so
/// transactions never interleave.
#[derive(Debug)]
pub struct FakeCamera {
    memory: Mutex<Memory>,
    xml: String,
    detached: AtomicBool,
    streaming: AtomicBool,
}

impl FakeCamera {
    pub fn new(config: &FakeCameraConfig) -> Result<Self, DeviceError> {
        Self::with_xml(config, BUILTIN_XML)
    }

    /// Camera exposing `xml` as its description document. Features declared
    /// there map onto the fixed register layout in [`regs`].
    pub fn with_xml(config: &FakeCameraConfig, xml: &str) -> Result<Self, DeviceError> {
        let format = config.validate()?;
        let mut memory = Memory {
            bytes: vec![0u8; regs::XML_BASE as usize + xml.len()],
            acquiring: false,
            pending_triggers: 0,
            io_failure: false,
            writes: HashMap::new(),
        };
        let url = format!(
            "local:address=0x{:X};length=0x{:X}",
            regs::XML_BASE,
            xml.len()
        );
        memory.put(regs::FIRST_URL, url.as_bytes());
        memory.put(regs::XML_BASE, xml.as_bytes());
        memory.put_str(regs::VENDOR_NAME, regs::VENDOR_NAME_LEN, &config.vendor);
        memory.put_str(regs::MODEL_NAME, regs::MODEL_NAME_LEN, &config.model);
        memory.put_str(regs::SERIAL_NUMBER, regs::SERIAL_NUMBER_LEN, &config.serial);
        memory.put_str(regs::USER_ID, regs::USER_ID_LEN, &config.user_id);
        memory.set_word(regs::WIDTH, config.width);
        memory.set_word(regs::HEIGHT, config.height);
        memory.set_word(regs::PIXEL_FORMAT, format.code());
        memory.put(regs::GAIN, &config.gain.to_be_bytes());
        memory.put(regs::EXPOSURE_TIME, &(config.exposure_time as f32).to_be_bytes());
        memory.set_word(regs::FRAME_RATE, (config.frame_rate * 1000.0).round() as u32);
        memory.set_word(regs::CONTROL_PRIVILEGE, CONTROL_GRANTED);
        memory.refresh_payload_size();
        debug!(
            model = %config.model,
            width = config.width,
            height = config.height,
            %format,
            "fake camera ready"
        );

        Ok(Self {
            memory: Mutex::new(memory),
            xml: xml.to_string(),
            detached: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Memory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, address: u32, buffer: &mut [u8]) -> Result<(), DeviceError> {
        let memory = self.lock();
        if memory.io_failure {
            return Err(DeviceError::transport("injected read failure"));
        }
        let range = memory.region(address, buffer.len())?;
        buffer.copy_from_slice(&memory.bytes[range]);
        trace!(address, len = buffer.len(), "fake read");
        Ok(())
    }

    /// Write `data`; the region is checked before any byte changes.
    pub fn write(&self, address: u32, data: &[u8]) -> Result<(), DeviceError> {
        let mut memory = self.lock();
        if memory.io_failure {
            return Err(DeviceError::transport("injected write failure"));
        }
        let range = memory.region(address, data.len())?;
        memory.bytes[range.clone()].copy_from_slice(data);
        *memory.writes.entry(address).or_default() += 1;
        memory.apply_side_effects(range);
        trace!(address, len = data.len(), "fake write");
        Ok(())
    }

    /// Make every following access fail until cleared.
    pub fn set_io_failure(&self, fail: bool) {
        self.lock().io_failure = fail;
    }

    /// Clear the control privilege, as if another host took over.
    pub fn revoke_control(&self) {
        self.lock().set_word(regs::CONTROL_PRIVILEGE, 0);
        info!("control privilege revoked");
    }

    /// Number of writes that started at `address`.
    pub fn write_count(&self, address: u32) -> u64 {
        self.lock().writes.get(&address).copied().unwrap_or(0)
    }

    pub fn is_acquiring(&self) -> bool {
        self.lock().acquiring
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    fn frame_period(&self) -> Duration {
        let millihertz = self.lock().word(regs::FRAME_RATE).max(1);
        Duration::from_secs_f64(1000.0 / f64::from(millihertz))
    }

    fn capture(&self) -> Result<Option<Capture>, DeviceError> {
        let mut memory = self.lock();
        if memory.io_failure {
            return Err(DeviceError::transport("injected sensor failure"));
        }
        if !memory.acquiring {
            return Ok(None);
        }
        let (width, height) = (memory.word(regs::WIDTH), memory.word(regs::HEIGHT));
        for (field, value) in [("width", width), ("height", height)] {
            if value == 0 || value > regs::MAX_DIMENSION {
                return Err(DeviceError::invalid(format!(
                    "sensor {field} {value} outside [1, {}]",
                    regs::MAX_DIMENSION
                )));
            }
        }
        if memory.word(regs::TRIGGER_MODE) != 0 {
            if memory.pending_triggers == 0 {
                return Ok(None);
            }
            memory.pending_triggers -= 1;
        }
        if memory.word(regs::ACQUISITION_MODE) == ACQUISITION_MODE_SINGLE_FRAME {
            memory.acquiring = false;
        }
        Ok(Some(Capture {
            width,
            height,
            format: PixelFormat::from_code(memory.word(regs::PIXEL_FORMAT)),
            reverse_x: memory.word(regs::REVERSE_X) != 0,
        }))
    }

    fn acquire_stream(&self) -> Result<(), StreamError> {
        self.streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| StreamError::Busy)
    }

    fn release_stream(&self) {
        self.streaming.store(false, Ordering::Release);
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

fn render(capture: &Capture, frame_id: u64) -> Result<Frame, StreamError> {
    let Capture {
        width,
        height,
        format,
        reverse_x,
    } = *capture;
    let (bpp, size) = format
        .bytes_per_pixel()
        .zip(format.image_size(width, height))
        .ok_or_else(|| StreamError::Source(format!("cannot render pixel format {format}")))?;

    let mut payload = BytesMut::with_capacity(size);
    for y in 0..height {
        for x in 0..width {
            let column = if reverse_x { width - 1 - x } else { x };
            let level = (u64::from(column) + u64::from(y) + frame_id) as u8;
            payload.put_bytes(level, bpp);
        }
    }

    Ok(Frame {
        payload: payload.freeze(),
        width,
        height,
        pixel_format: format,
        frame_id,
        timestamp: SystemTime::now(),
    })
}

struct FakeSource {
    camera: Arc<FakeCamera>,
    frame_id: u64,
}

impl FrameSource for FakeSource {
    fn start(&mut self) -> Result<(), StreamError> {
        if self.camera.is_detached() {
            return Err(StreamError::Disconnected);
        }
        Ok(())
    }

    fn next_frame(&mut self, stop: &StopSignal) -> Result<Option<Frame>, StreamError> {
        if stop.wait(self.camera.frame_period()) {
            return Ok(None);
        }
        if self.camera.is_detached() {
            return Err(StreamError::Disconnected);
        }
        let capture = self
            .camera
            .capture()
            .map_err(|err| StreamError::Source(err.to_string()))?;
        let Some(capture) = capture else {
            return Ok(None);
        };
        self.frame_id += 1;
        render(&capture, self.frame_id).map(Some)
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.camera.release_stream();
    }
}

/// Simulated camera behind the [`Device`] contract.
///
/// One stream may run at a time; a second [`Device::create_stream`] fails
/// with [`StreamError::Busy`] until the first one is closed. Dropping the
/// device ends any running stream.
#[derive(Debug)]
pub struct FakeDevice {
    camera: Arc<FakeCamera>,
    genicam: GenicamCell,
    control_lost: ControlLostNotifier,
    stream_config: StreamConfig,
}

impl FakeDevice {
    pub fn new(config: FakeCameraConfig) -> Result<Self, DeviceError> {
        Ok(Self::from_camera(FakeCamera::new(&config)?))
    }

    /// Device serving a custom description document.
    pub fn with_xml(config: FakeCameraConfig, xml: &str) -> Result<Self, DeviceError> {
        Ok(Self::from_camera(FakeCamera::with_xml(&config, xml)?))
    }

    pub fn from_camera(camera: FakeCamera) -> Self {
        Self {
            camera: Arc::new(camera),
            genicam: GenicamCell::new(),
            control_lost: ControlLostNotifier::new(),
            stream_config: StreamConfig {
                thread_name: "fake-camera-stream".to_string(),
                ..StreamConfig::default()
            },
        }
    }

    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    /// Register-level access for fault injection and inspection.
    pub fn camera(&self) -> &FakeCamera {
        &self.camera
    }
}

impl Device for FakeDevice {
    fn create_stream(&self, callback: FrameCallback) -> Result<Stream, DeviceError> {
        self.camera.acquire_stream()?;
        let source = FakeSource {
            camera: Arc::clone(&self.camera),
            frame_id: 0,
        };
        Ok(Stream::start(source, callback, &self.stream_config)?)
    }

    fn read_memory(&self, address: u32, buffer: &mut [u8]) -> Result<(), DeviceError> {
        ensure_nonempty(buffer.len())?;
        self.camera.read(address, buffer)
    }

    fn write_memory(&self, address: u32, data: &[u8]) -> Result<(), DeviceError> {
        ensure_nonempty(data.len())?;
        self.camera.write(address, data)
    }

    fn genicam(&self) -> Result<&NodeMap, DeviceError> {
        self.genicam.get_or_load(|| fetch_description(self))
    }

    fn genicam_xml(&self) -> &[u8] {
        self.genicam.xml_or_load(|| fetch_description(self))
    }

    fn control_lost(&self) -> &ControlLostNotifier {
        &self.control_lost
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.camera.detach();
        debug!("fake device dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> FakeCamera {
        FakeCamera::new(&FakeCameraConfig::default()).expect("default camera")
    }

    fn word(camera: &FakeCamera, address: u32) -> u32 {
        let mut raw = [0u8; 4];
        camera.read(address, &mut raw).expect("read word");
        u32::from_be_bytes(raw)
    }

    #[test]
    fn builtin_document_parses() {
        let model = genapi_xml::parse(BUILTIN_XML).expect("parse builtin xml");
        let nodes = NodeMap::from(model);
        assert_eq!(nodes.version(), "1.1.0");
        for name in [
            sfnc::DEVICE_VENDOR_NAME,
            sfnc::WIDTH,
            sfnc::PIXEL_FORMAT,
            sfnc::PAYLOAD_SIZE,
            sfnc::EXPOSURE_TIME,
            sfnc::ACQUISITION_FRAME_RATE,
            sfnc::ACQUISITION_START,
            sfnc::TRIGGER_SOFTWARE,
            sfnc::REVERSE_X,
        ] {
            assert!(nodes.node(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn config_fields_default_when_absent() {
        let config: FakeCameraConfig =
            serde_json::from_str(r#"{ "model": "Bench", "pixel_format": "RGB8Packed" }"#)
                .expect("parse config");
        assert_eq!(config.model, "Bench");
        assert_eq!(config.width, 640);
        let camera = FakeCamera::new(&config).expect("camera from parsed config");
        assert_eq!(word(&camera, regs::PAYLOAD_SIZE), 640 * 480 * 3);
    }

    #[test]
    fn registers_reflect_config() {
        let camera = camera();
        assert_eq!(word(&camera, regs::WIDTH), 640);
        assert_eq!(word(&camera, regs::HEIGHT), 480);
        assert_eq!(word(&camera, regs::PIXEL_FORMAT), 0x0108_0001);
        assert_eq!(word(&camera, regs::PAYLOAD_SIZE), 640 * 480);
        assert_eq!(word(&camera, regs::FRAME_RATE), 30_000);
        assert_eq!(word(&camera, regs::CONTROL_PRIVILEGE), CONTROL_GRANTED);

        let mut vendor = [0u8; 8];
        camera.read(regs::VENDOR_NAME, &mut vendor).unwrap();
        assert_eq!(&vendor, b"camdev\0\0");
    }

    #[test]
    fn out_of_range_write_changes_nothing() {
        let camera = camera();
        let end = (regs::XML_BASE as usize + BUILTIN_XML.len()) as u32;
        let err = camera.write(end - 2, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
        let mut tail = [0u8; 2];
        camera.read(end - 2, &mut tail).unwrap();
        assert_eq!(&tail, &BUILTIN_XML.as_bytes()[BUILTIN_XML.len() - 2..]);
        assert_eq!(camera.write_count(end - 2), 0);
    }

    #[test]
    fn injected_failure_blocks_both_directions() {
        let camera = camera();
        camera.set_io_failure(true);
        assert!(camera.write(regs::WIDTH, &[0, 0, 1, 0]).is_err());
        assert!(camera.read(regs::WIDTH, &mut [0u8; 4]).is_err());
        camera.set_io_failure(false);
        assert_eq!(word(&camera, regs::WIDTH), 640);
    }

    #[test]
    fn geometry_writes_refresh_payload_size() {
        let camera = camera();
        camera.write(regs::WIDTH, &100u32.to_be_bytes()).unwrap();
        camera
            .write(regs::PIXEL_FORMAT, &0x0110_0007u32.to_be_bytes())
            .unwrap();
        assert_eq!(word(&camera, regs::PAYLOAD_SIZE), 100 * 480 * 2);
    }

    #[test]
    fn triggers_gate_captures() {
        let camera = camera();
        camera.write(regs::TRIGGER_MODE, &1u32.to_be_bytes()).unwrap();
        camera.write(regs::ACQUISITION_START, &1u32.to_be_bytes()).unwrap();
        assert!(camera.is_acquiring());
        assert!(camera.capture().unwrap().is_none());
        camera.write(regs::TRIGGER_SOFTWARE, &1u32.to_be_bytes()).unwrap();
        assert!(camera.capture().unwrap().is_some());
        assert!(camera.capture().unwrap().is_none());
        camera.write(regs::ACQUISITION_STOP, &1u32.to_be_bytes()).unwrap();
        assert!(!camera.is_acquiring());
    }

    #[test]
    fn ramp_follows_reverse_x() {
        let capture = Capture {
            width: 4,
            height: 2,
            format: PixelFormat::Mono8,
            reverse_x: false,
        };
        let frame = render(&capture, 1).unwrap();
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4, 2, 3, 4, 5]);

        let mirrored = render(
            &Capture {
                reverse_x: true,
                ..capture
            },
            1,
        )
        .unwrap();
        assert_eq!(mirrored.row(0), Some(&[4u8, 3, 2, 1][..]));
    }

    #[test]
    fn config_validation() {
        let bad_format = FakeCameraConfig {
            pixel_format: "Mono9".into(),
            ..FakeCameraConfig::default()
        };
        assert!(matches!(
            FakeCamera::new(&bad_format),
            Err(DeviceError::InvalidArgument(_))
        ));
        let too_wide = FakeCameraConfig {
            width: 5000,
            ..FakeCameraConfig::default()
        };
        assert!(FakeCamera::new(&too_wide).is_err());
        let long_serial = FakeCameraConfig {
            serial: "X".repeat(17),
            ..FakeCameraConfig::default()
        };
        assert!(FakeCamera::new(&long_serial).is_err());
    }

    #[test]
    fn single_stream_slot() {
        let camera = camera();
        camera.acquire_stream().unwrap();
        assert!(matches!(camera.acquire_stream(), Err(StreamError::Busy)));
        camera.release_stream();
        assert!(camera.acquire_stream().is_ok());
    }
}
