//! Standard Feature Naming Convention (SFNC) feature names.

/// Vendor name string feature (`DeviceVendorName`).
pub const DEVICE_VENDOR_NAME: &str = "DeviceVendorName";
/// Model name string feature (`DeviceModelName`).
pub const DEVICE_MODEL_NAME: &str = "DeviceModelName";
/// Serial number string feature (`DeviceSerialNumber`).
pub const DEVICE_SERIAL_NUMBER: &str = "DeviceSerialNumber";
/// User-assigned identifier string feature (`DeviceUserID`).
pub const DEVICE_USER_ID: &str = "DeviceUserID";

/// Image width integer feature (`Width`).
pub const WIDTH: &str = "Width";
/// Image height integer feature (`Height`).
pub const HEIGHT: &str = "Height";
/// Pixel format enumeration feature (`PixelFormat`).
pub const PIXEL_FORMAT: &str = "PixelFormat";
/// Payload size integer feature (`PayloadSize`).
pub const PAYLOAD_SIZE: &str = "PayloadSize";

/// Exposure time float feature (`ExposureTime`), microseconds.
pub const EXPOSURE_TIME: &str = "ExposureTime";
/// Gain float feature (`Gain`).
pub const GAIN: &str = "Gain";
/// Frame rate float feature (`AcquisitionFrameRate`).
pub const ACQUISITION_FRAME_RATE: &str = "AcquisitionFrameRate";

/// Acquisition mode enumeration feature (`AcquisitionMode`).
pub const ACQUISITION_MODE: &str = "AcquisitionMode";
/// Acquisition start command (`AcquisitionStart`).
pub const ACQUISITION_START: &str = "AcquisitionStart";
/// Acquisition stop command (`AcquisitionStop`).
pub const ACQUISITION_STOP: &str = "AcquisitionStop";

/// Trigger mode enumeration feature (`TriggerMode`).
pub const TRIGGER_MODE: &str = "TriggerMode";
/// Software trigger command (`TriggerSoftware`).
pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";

/// Horizontal mirroring boolean feature (`ReverseX`).
pub const REVERSE_X: &str = "ReverseX";
