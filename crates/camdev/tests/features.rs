//! Name-based feature dispatch over the simulated device.

use camdev::fake::{regs, FakeCameraConfig, FakeDevice};
use camdev::genapi::NodeKind;
use camdev::{Device, DeviceExt};

const BOUNDED_XML: &str = r#"<?xml version="1.0"?>
<RegisterDescription SchemaMajorVersion="1" SchemaMinorVersion="0" SchemaSubMinorVersion="0">
  <Integer Name="Width">
    <Address>0x100</Address>
    <Length>4</Length>
    <Min>0</Min>
    <Max>1023</Max>
  </Integer>
  <Enumeration Name="PixelFormat">
    <Address>0x108</Address>
    <Length>4</Length>
    <EnumEntry Name="Mono8" Value="0x01080001" />
    <EnumEntry Name="Mono16" Value="0x01100007" />
  </Enumeration>
</RegisterDescription>
"#;

const VENDOR_XML: &str = r#"<?xml version="1.0"?>
<RegisterDescription SchemaMajorVersion="1" SchemaMinorVersion="0" SchemaSubMinorVersion="0">
  <Integer Name="OffsetX">
    <Address>0x400</Address>
    <Length>4</Length>
    <Inc>4</Inc>
  </Integer>
  <Enumeration Name="Mode">
    <Address>0x404</Address>
    <Length>4</Length>
    <EnumEntry Name="Standard" Value="0" />
    <EnumEntry Name="Vendor" Value="0x80000001" />
  </Enumeration>
</RegisterDescription>
"#;

fn device() -> FakeDevice {
    FakeDevice::new(FakeCameraConfig::default()).expect("create fake device")
}

#[test]
fn absent_features_read_as_zero_and_ignore_writes() {
    let device = device();
    assert_eq!(device.get_integer_feature_value("NoSuchFeature"), 0);
    assert_eq!(device.get_float_feature_value("NoSuchFeature"), 0.0);
    assert_eq!(device.get_string_feature_value("NoSuchFeature"), "");
    assert_eq!(device.get_integer_feature_bounds("NoSuchFeature"), None);
    assert_eq!(device.get_float_feature_bounds("NoSuchFeature"), None);

    let before = device.read_register(regs::WIDTH).unwrap();
    device.set_integer_feature_value("NoSuchFeature", 7);
    device.set_float_feature_value("NoSuchFeature", 7.0);
    device.set_string_feature_value("NoSuchFeature", "seven");
    device.execute_command("NoSuchFeature");
    assert_eq!(device.read_register(regs::WIDTH).unwrap(), before);
}

#[test]
fn enumeration_string_and_integer_views_agree() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), BOUNDED_XML)
        .expect("device with custom xml");
    device.set_string_feature_value("PixelFormat", "Mono8");
    assert_eq!(device.get_integer_feature_value("PixelFormat"), 0x0108_0001);

    device.set_integer_feature_value("PixelFormat", 0x0110_0007);
    assert_eq!(device.get_string_feature_value("PixelFormat"), "Mono16");

    device.set_integer_feature_value("PixelFormat", 0x0108_0001);
    assert_eq!(device.get_string_feature_value("PixelFormat"), "Mono8");
}

#[test]
fn integer_bounds_come_from_the_description() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), BOUNDED_XML)
        .expect("device with custom xml");
    assert_eq!(device.get_integer_feature_bounds("Width"), Some((0, 1023)));
    assert_eq!(device.get_float_feature_bounds("Width"), None);
    assert_eq!(device.get_integer_feature_bounds("PixelFormat"), None);

    device.set_integer_feature_value("Width", 2048);
    assert_eq!(device.get_integer_feature_value("Width"), 640);
    device.set_integer_feature_value("Width", 1000);
    assert_eq!(device.get_integer_feature_value("Width"), 1000);
}

#[test]
fn float_features() {
    let device = device();
    assert_eq!(device.get_float_feature_value("ExposureTime"), 10_000.0);
    device.set_float_feature_value("ExposureTime", 2_500.0);
    assert_eq!(device.get_float_feature_value("ExposureTime"), 2_500.0);

    device.set_float_feature_value("AcquisitionFrameRate", 12.5);
    assert_eq!(device.read_register(regs::FRAME_RATE).unwrap(), 12_500);
    assert!((device.get_float_feature_value("AcquisitionFrameRate") - 12.5).abs() < 1e-9);

    assert_eq!(device.get_float_feature_bounds("Gain"), Some((0.0, 48.0)));
    device.set_float_feature_value("Gain", 99.0);
    assert_eq!(device.get_float_feature_value("Gain"), 0.0);

    // Float access never coerces other kinds.
    assert_eq!(device.get_float_feature_value("Width"), 0.0);
    device.set_float_feature_value("Width", 32.0);
    assert_eq!(device.get_integer_feature_value("Width"), 640);
}

#[test]
fn string_features() {
    let device = device();
    assert_eq!(device.get_string_feature_value("DeviceVendorName"), "camdev");
    assert_eq!(device.get_string_feature_value("DeviceModelName"), "FakeCamera");

    device.set_string_feature_value("DeviceUserID", "left");
    assert_eq!(device.get_string_feature_value("DeviceUserID"), "left");

    // Read-only and oversized writes are dropped.
    device.set_string_feature_value("DeviceVendorName", "other");
    assert_eq!(device.get_string_feature_value("DeviceVendorName"), "camdev");
    device.set_string_feature_value("DeviceUserID", "a-much-too-long-identifier");
    assert_eq!(device.get_string_feature_value("DeviceUserID"), "left");

    // Integers have no string view.
    assert_eq!(device.get_string_feature_value("Width"), "");
    device.set_string_feature_value("Width", "12");
    assert_eq!(device.get_integer_feature_value("Width"), 640);
}

#[test]
fn booleans_use_zero_and_one() {
    let device = device();
    assert_eq!(device.get_integer_feature_value("ReverseX"), 0);
    device.set_integer_feature_value("ReverseX", 5);
    assert_eq!(device.get_integer_feature_value("ReverseX"), 1);
    assert_eq!(device.read_register(regs::REVERSE_X).unwrap(), 1);
    device.set_integer_feature_value("ReverseX", 0);
    assert_eq!(device.get_integer_feature_value("ReverseX"), 0);
}

#[test]
fn commands_write_once_per_execution() {
    let device = device();
    let camera = device.camera();
    device.execute_command("TriggerSoftware");
    assert_eq!(camera.write_count(regs::TRIGGER_SOFTWARE), 1);
    device.execute_command("TriggerSoftware");
    assert_eq!(camera.write_count(regs::TRIGGER_SOFTWARE), 2);

    device.execute_command("AcquisitionStart");
    assert!(camera.is_acquiring());
    device.execute_command("AcquisitionStop");
    assert!(!camera.is_acquiring());

    device.execute_command("Width");
    device.execute_command("PixelFormat");
    assert_eq!(camera.write_count(regs::WIDTH), 0);
    assert_eq!(camera.write_count(regs::PIXEL_FORMAT), 0);
}

#[test]
fn commands_have_no_value() {
    let device = device();
    assert_eq!(device.get_integer_feature_value("AcquisitionStart"), 0);
    device.set_integer_feature_value("AcquisitionStart", 1);
    device.set_string_feature_value("AcquisitionStart", "go");
    assert_eq!(device.camera().write_count(regs::ACQUISITION_START), 0);
    assert!(!device.camera().is_acquiring());
}

#[test]
fn transport_failures_degrade_to_defaults() {
    let device = device();
    // Build the tree before the link goes down.
    assert_eq!(
        device.feature("Width").map(|node| node.kind()),
        Some(NodeKind::Integer)
    );
    device.camera().set_io_failure(true);
    assert_eq!(device.get_integer_feature_value("Width"), 0);
    assert_eq!(device.get_float_feature_value("Gain"), 0.0);
    assert_eq!(device.get_string_feature_value("PixelFormat"), "");
    device.set_integer_feature_value("Width", 320);
    device.camera().set_io_failure(false);
    assert_eq!(device.get_integer_feature_value("Width"), 640);
}

#[test]
fn geometry_updates_payload_size() {
    let device = device();
    device.set_integer_feature_value("Width", 320);
    device.set_integer_feature_value("Height", 200);
    device.set_string_feature_value("PixelFormat", "RGB8Packed");
    assert_eq!(device.get_integer_feature_value("PayloadSize"), 320 * 200 * 3);
}

#[test]
fn missing_tree_disables_every_feature() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), "<RegisterDescription><Integer>")
        .expect("device with broken xml");
    assert!(device.feature("Width").is_none());
    assert_eq!(device.get_integer_feature_value("Width"), 0);
    device.set_integer_feature_value("Width", 10);
    assert_eq!(device.read_register(regs::WIDTH).unwrap(), 640);
}

#[test]
fn increment_without_declared_minimum() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), VENDOR_XML)
        .expect("device with custom xml");
    device.set_integer_feature_value("OffsetX", 8);
    assert_eq!(device.get_integer_feature_value("OffsetX"), 8);
    device.set_integer_feature_value("OffsetX", 10);
    assert_eq!(device.get_integer_feature_value("OffsetX"), 8);
}

#[test]
fn high_bit_enumeration_entries_agree() {
    let device = FakeDevice::with_xml(FakeCameraConfig::default(), VENDOR_XML)
        .expect("device with custom xml");
    device.set_string_feature_value("Mode", "Vendor");
    assert_eq!(device.read_register(0x404).unwrap(), 0x8000_0001);
    assert_eq!(device.get_string_feature_value("Mode"), "Vendor");
    assert_eq!(device.get_integer_feature_value("Mode"), 0x8000_0001);

    device.set_integer_feature_value("Mode", 0);
    assert_eq!(device.get_string_feature_value("Mode"), "Standard");
    device.set_integer_feature_value("Mode", 0x8000_0001);
    assert_eq!(device.get_string_feature_value("Mode"), "Vendor");
}

#[test]
fn bounds_only_for_numeric_kinds() {
    let device = device();
    assert_eq!(device.get_integer_feature_bounds("Width"), Some((1, 4096)));
    for name in ["ReverseX", "DeviceUserID", "AcquisitionStart", "PixelFormat"] {
        assert_eq!(device.get_integer_feature_bounds(name), None, "{name}");
        assert_eq!(device.get_float_feature_bounds(name), None, "{name}");
    }
}
