//! Stream lifecycle over the simulated device and custom frame sources.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camdev::fake::{regs, FakeCameraConfig, FakeDevice};
use camdev::{
    Device, DeviceError, DeviceExt, Frame, FrameSource, StopSignal, Stream, StreamConfig,
    StreamError, StreamState,
};

fn fast_device() -> FakeDevice {
    let config = FakeCameraConfig {
        width: 32,
        height: 8,
        frame_rate: 200.0,
        ..FakeCameraConfig::default()
    };
    FakeDevice::new(config).expect("create fake device")
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

#[test]
fn frames_follow_acquisition_commands() {
    let device = fast_device();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let mut stream = device
        .create_stream_with(move |frame: &Frame| {
            sink.lock().unwrap().push((frame.frame_id, frame.len()));
        })
        .expect("create stream");
    assert_eq!(stream.state(), StreamState::Running);

    thread::sleep(Duration::from_millis(30));
    assert!(frames.lock().unwrap().is_empty(), "no frames before start");

    device.execute_command("AcquisitionStart");
    assert!(wait_until(Duration::from_secs(2), || frames.lock().unwrap().len() >= 3));
    device.execute_command("AcquisitionStop");
    stream.close();

    let frames = frames.lock().unwrap();
    assert!(frames.windows(2).all(|pair| pair[0].0 < pair[1].0));
    assert!(frames.iter().all(|(_, len)| *len == 32 * 8));
    assert_eq!(stream.stats().frames, frames.len() as u64);
}

#[test]
fn no_callback_after_close_returns() {
    let device = fast_device();
    let closed = Arc::new(AtomicBool::new(false));
    let late = Arc::new(AtomicUsize::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    let (closed_flag, late_calls, entries) =
        (Arc::clone(&closed), Arc::clone(&late), Arc::clone(&entered));

    let mut stream = device
        .create_stream(Box::new(move |_frame| {
            if closed_flag.load(Ordering::SeqCst) {
                late_calls.fetch_add(1, Ordering::SeqCst);
            }
            entries.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
        }))
        .expect("create stream");
    device.execute_command("AcquisitionStart");
    assert!(wait_until(Duration::from_secs(2), || entered
        .load(Ordering::SeqCst)
        > 0));

    // Close while the slow callback is most likely still running.
    stream.close();
    closed.store(true, Ordering::SeqCst);
    let calls = entered.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(entered.load(Ordering::SeqCst), calls);
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert_eq!(stream.state(), StreamState::Closed);
}

#[test]
fn one_stream_per_device() {
    let device = fast_device();
    let mut first = device.create_stream(Box::new(|_| {})).expect("first stream");
    let err = device
        .create_stream(Box::new(|_| {}))
        .expect_err("second stream must be refused");
    assert!(matches!(err, DeviceError::Stream(StreamError::Busy)));

    first.close();
    let second = device.create_stream(Box::new(|_| {}));
    assert!(second.is_ok());
}

#[test]
fn dropping_the_device_ends_the_stream() {
    let device = fast_device();
    let stream = device.create_stream(Box::new(|_| {})).expect("stream");
    device.execute_command("AcquisitionStart");
    drop(device);
    assert!(wait_until(Duration::from_secs(2), || stream.is_finished()));
    assert_eq!(stream.state(), StreamState::Closed);
}

#[test]
fn software_trigger_yields_one_frame_each() {
    let device = fast_device();
    device.set_string_feature_value("TriggerMode", "On");
    let count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&count);
    let mut stream = device
        .create_stream(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .expect("stream");
    device.execute_command("AcquisitionStart");
    thread::sleep(Duration::from_millis(40));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    device.execute_command("TriggerSoftware");
    device.execute_command("TriggerSoftware");
    assert!(wait_until(Duration::from_secs(2), || count
        .load(Ordering::SeqCst)
        == 2));
    thread::sleep(Duration::from_millis(40));
    stream.close();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn single_frame_mode_stops_after_one() {
    let device = fast_device();
    device.set_string_feature_value("AcquisitionMode", "SingleFrame");
    let count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&count);
    let mut stream = device
        .create_stream_with(move |_: &Frame| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("stream");
    device.execute_command("AcquisitionStart");
    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
    thread::sleep(Duration::from_millis(40));
    stream.close();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!device.camera().is_acquiring());
}

#[test]
fn sensor_failures_are_counted() {
    let device = fast_device();
    let stream = device.create_stream(Box::new(|_| {})).expect("stream");
    device.execute_command("AcquisitionStart");
    device.camera().set_io_failure(true);
    assert!(wait_until(Duration::from_secs(2), || stream.stats().failures >= 2));
    device.camera().set_io_failure(false);
    assert!(wait_until(Duration::from_secs(2), || stream.stats().frames >= 1));
}

#[test]
fn oversized_geometry_counts_as_failure() {
    let device = fast_device();
    let stream = device.create_stream(Box::new(|_| {})).expect("stream");
    device
        .write_register(regs::WIDTH, u32::MAX)
        .expect("raw width write");
    device.execute_command("AcquisitionStart");
    assert!(wait_until(Duration::from_secs(2), || stream.stats().failures >= 2));
    assert_eq!(stream.stats().frames, 0);

    device.write_register(regs::WIDTH, 32).expect("restore width");
    assert!(wait_until(Duration::from_secs(2), || stream.stats().frames >= 1));
    assert!(!stream.is_finished());
}

#[test]
fn close_from_inside_the_callback() {
    let device = fast_device();
    let slot: Arc<Mutex<Option<Stream>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));
    let (own, counter) = (Arc::clone(&slot), Arc::clone(&calls));

    // Hold the slot until the stream is stored, so the first frame sees it.
    let mut guard = slot.lock().unwrap();
    let stream = device
        .create_stream(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(mut stream) = own.lock().unwrap().take() {
                stream.close();
            }
        }))
        .expect("stream");
    *guard = Some(stream);
    drop(guard);

    device.execute_command("AcquisitionStart");
    assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) >= 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(slot.lock().unwrap().is_none());
}

struct NeverReady {
    released: Arc<AtomicBool>,
}

impl FrameSource for NeverReady {
    fn start(&mut self) -> Result<(), StreamError> {
        thread::sleep(Duration::from_millis(300));
        Ok(())
    }

    fn next_frame(&mut self, _stop: &StopSignal) -> Result<Option<Frame>, StreamError> {
        panic!("a stream that failed to start must not poll frames");
    }

    fn stop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn start_handshake_is_bounded() {
    let released = Arc::new(AtomicBool::new(false));
    let config = StreamConfig {
        start_timeout: Duration::from_millis(50),
        ..StreamConfig::default()
    };
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let started = Instant::now();
    let err = Stream::start(
        NeverReady {
            released: Arc::clone(&released),
        },
        Box::new(move |_| flag.store(true, Ordering::SeqCst)),
        &config,
    )
    .expect_err("start must time out");
    assert!(matches!(err, StreamError::StartTimeout(_)));
    assert!(started.elapsed() < Duration::from_millis(250));

    assert!(wait_until(Duration::from_secs(2), || released.load(Ordering::SeqCst)));
    assert!(!called.load(Ordering::SeqCst));
}
