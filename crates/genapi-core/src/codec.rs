//! Big-endian register value conversions.

use crate::GenApiError;

pub(crate) fn bytes_to_i64(name: &str, bytes: &[u8]) -> Result<i64, GenApiError> {
    if bytes.is_empty() {
        return Err(GenApiError::Parse(format!(
            "node {name} returned empty payload"
        )));
    }
    if bytes.len() > 8 {
        return Err(GenApiError::Parse(format!(
            "node {name} uses unsupported width {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    let offset = 8 - bytes.len();
    buf[offset..].copy_from_slice(bytes);
    if (bytes[0] & 0x80) != 0 {
        for byte in &mut buf[..offset] {
            *byte = 0xFF;
        }
    }
    Ok(i64::from_be_bytes(buf))
}

pub(crate) fn i64_to_bytes(name: &str, value: i64, width: u32) -> Result<Vec<u8>, GenApiError> {
    if width == 0 || width > 8 {
        return Err(GenApiError::Parse(format!(
            "node {name} has unsupported width {width}"
        )));
    }
    let width = width as usize;
    let bytes = value.to_be_bytes();
    let data = bytes[8 - width..].to_vec();
    if bytes_to_i64(name, &data)? != value {
        return Err(GenApiError::Range(format!(
            "value {value} does not fit {width} bytes for {name}"
        )));
    }
    Ok(data)
}

/// Low `width` bytes of `value`, read as an unsigned register.
pub(crate) fn to_unsigned(value: i64, width: u32) -> i64 {
    if width == 0 || width >= 8 {
        value
    } else {
        value & ((1i64 << (width * 8)) - 1)
    }
}

/// Zero-extending counterpart of [`bytes_to_i64`].
pub(crate) fn bytes_to_unsigned(name: &str, bytes: &[u8]) -> Result<i64, GenApiError> {
    let value = bytes_to_i64(name, bytes)?;
    Ok(to_unsigned(value, bytes.len() as u32))
}

/// Encode a value already in its unsigned register form.
pub(crate) fn unsigned_to_bytes(name: &str, value: i64, width: u32) -> Result<Vec<u8>, GenApiError> {
    if width == 0 || width > 8 {
        return Err(GenApiError::Parse(format!(
            "node {name} has unsupported width {width}"
        )));
    }
    let data = value.to_be_bytes()[8 - width as usize..].to_vec();
    if bytes_to_unsigned(name, &data)? != value {
        return Err(GenApiError::Range(format!(
            "value {value} does not fit {width} bytes for {name}"
        )));
    }
    Ok(data)
}

pub(crate) fn bytes_to_f64(name: &str, bytes: &[u8]) -> Result<f64, GenApiError> {
    match bytes.len() {
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Ok(f32::from_be_bytes(buf) as f64)
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(f64::from_be_bytes(buf))
        }
        other => Err(GenApiError::Parse(format!(
            "float node {name} uses unsupported width {other}"
        ))),
    }
}

pub(crate) fn f64_to_bytes(name: &str, value: f64, width: u32) -> Result<Vec<u8>, GenApiError> {
    match width {
        4 => Ok((value as f32).to_be_bytes().to_vec()),
        8 => Ok(value.to_be_bytes().to_vec()),
        other => Err(GenApiError::Parse(format!(
            "float node {name} uses unsupported width {other}"
        ))),
    }
}
