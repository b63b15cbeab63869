//! Register, memory and feature tree behaviour of the simulated device.

use camdev::fake::{regs, FakeCameraConfig, FakeDevice, BUILTIN_XML};
use camdev::genapi::NodeMap;
use camdev::{Device, DeviceError};

fn device() -> FakeDevice {
    FakeDevice::new(FakeCameraConfig::default()).expect("create fake device")
}

#[test]
fn memory_write_then_read_roundtrip() {
    let device = device();
    let data = b"camera-01\0\0\0\0\0\0\0";
    device
        .write_memory(regs::USER_ID, data)
        .expect("write user id");
    let mut back = [0u8; 16];
    device
        .read_memory(regs::USER_ID, &mut back)
        .expect("read user id");
    assert_eq!(&back, data);
}

#[test]
fn zero_length_access_is_invalid() {
    let device = device();
    let mut empty: [u8; 0] = [];
    assert!(matches!(
        device.read_memory(regs::WIDTH, &mut empty),
        Err(DeviceError::InvalidArgument(_))
    ));
    assert!(matches!(
        device.write_memory(regs::WIDTH, &[]),
        Err(DeviceError::InvalidArgument(_))
    ));
    assert_eq!(device.camera().write_count(regs::WIDTH), 0);
}

#[test]
fn register_access_is_big_endian_words() {
    let device = device();
    assert_eq!(device.read_register(regs::WIDTH).unwrap(), 640);
    device.write_register(regs::HEIGHT, 0x0000_0120).unwrap();
    let mut raw = [0u8; 4];
    device.read_memory(regs::HEIGHT, &mut raw).unwrap();
    assert_eq!(raw, [0x00, 0x00, 0x01, 0x20]);
}

#[test]
fn failed_write_leaves_memory_untouched() {
    let device = device();
    device.camera().set_io_failure(true);
    let err = device
        .write_register(regs::WIDTH, 1234)
        .expect_err("injected failure");
    assert!(matches!(err, DeviceError::Transport(_)));
    device.camera().set_io_failure(false);
    assert_eq!(device.read_register(regs::WIDTH).unwrap(), 640);

    let past_end = regs::XML_BASE + BUILTIN_XML.len() as u32 - 1;
    assert!(device.write_memory(past_end, &[0xAA, 0xBB]).is_err());
    let mut last = [0u8; 1];
    device.read_memory(past_end, &mut last).unwrap();
    assert_eq!(last[0], *BUILTIN_XML.as_bytes().last().unwrap());
}

#[test]
fn genicam_is_cached_and_identity_stable() {
    let device = device();
    let first: *const NodeMap = device.genicam().expect("feature tree");
    let second: *const NodeMap = device.genicam().expect("feature tree");
    assert!(std::ptr::eq(first, second));
    assert!(device.genicam().unwrap().node("Width").is_some());
}

#[test]
fn genicam_xml_exposes_document() {
    let device = device();
    assert_eq!(device.genicam_xml(), BUILTIN_XML.as_bytes());
}

#[test]
fn broken_document_fails_every_time() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), "<RegisterDescription><Integer>")
        .expect("device with broken xml");
    let first = device.genicam().expect_err("broken xml").to_string();
    let second = device.genicam().expect_err("broken xml").to_string();
    assert_eq!(first, second);
    assert!(matches!(device.genicam(), Err(DeviceError::Genicam(_))));
    assert!(device.genicam_xml().is_empty());
}

#[test]
fn device_is_usable_as_trait_object() {
    let device: Box<dyn Device> = Box::new(device());
    assert_eq!(device.read_register(regs::HEIGHT).unwrap(), 480);
    assert!(device.genicam().is_ok());
}
