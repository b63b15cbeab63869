#![cfg_attr(docsrs, feature(doc_cfg))]
//! Pixel Format Naming Convention helpers.

use core::fmt;
use core::str::FromStr;

/// Pixel formats understood by the frame helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono12,
    Mono16,
    BayerRG8,
    BayerGB8,
    BayerBG8,
    BayerGR8,
    RGB8Packed,
    BGR8Packed,
    /// Code reported by a device that has no entry in the table.
    Unknown(u32),
}

/// `(format, name, code, bytes per pixel)` for every known format.
const TABLE: &[(PixelFormat, &str, u32, usize)] = &[
    (PixelFormat::Mono8, "Mono8", 0x0108_0001, 1),
    (PixelFormat::Mono10, "Mono10", 0x0110_0003, 2),
    (PixelFormat::Mono12, "Mono12", 0x0110_0005, 2),
    (PixelFormat::Mono16, "Mono16", 0x0110_0007, 2),
    (PixelFormat::BayerGR8, "BayerGR8", 0x0108_0008, 1),
    (PixelFormat::BayerRG8, "BayerRG8", 0x0108_0009, 1),
    (PixelFormat::BayerGB8, "BayerGB8", 0x0108_000A, 1),
    (PixelFormat::BayerBG8, "BayerBG8", 0x0108_000B, 1),
    (PixelFormat::RGB8Packed, "RGB8Packed", 0x0218_0014, 3),
    (PixelFormat::BGR8Packed, "BGR8Packed", 0x0218_0015, 3),
];

impl PixelFormat {
    fn entry(self) -> Option<&'static (PixelFormat, &'static str, u32, usize)> {
        TABLE.iter().find(|(format, ..)| *format == self)
    }

    /// Map a raw PFNC code to a format, keeping unknown codes intact.
    pub fn from_code(code: u32) -> PixelFormat {
        TABLE
            .iter()
            .find(|(_, _, value, _)| *value == code)
            .map(|(format, ..)| *format)
            .unwrap_or(PixelFormat::Unknown(code))
    }

    /// Look a format up by its PFNC name, e.g. `"Mono8"`.
    pub fn from_name(name: &str) -> Option<PixelFormat> {
        TABLE
            .iter()
            .find(|(_, entry, ..)| *entry == name)
            .map(|(format, ..)| *format)
    }

    /// Raw PFNC code.
    pub fn code(self) -> u32 {
        match self {
            PixelFormat::Unknown(code) => code,
            known => known.entry().map(|(_, _, code, _)| *code).unwrap_or(0),
        }
    }

    /// PFNC name, `None` for unknown codes.
    pub fn name(self) -> Option<&'static str> {
        self.entry().map(|(_, name, ..)| *name)
    }

    /// Bytes used to store one pixel in an unpacked buffer.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        self.entry().map(|(.., bytes)| *bytes)
    }

    /// Size in bytes of a `width` x `height` image in this format.
    pub fn image_size(self, width: u32, height: u32) -> Option<usize> {
        let bpp = self.bytes_per_pixel()?;
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(bpp)
    }

    /// Whether the format is a Bayer mosaic.
    pub fn is_bayer(self) -> bool {
        matches!(
            self,
            PixelFormat::BayerRG8
                | PixelFormat::BayerGB8
                | PixelFormat::BayerBG8
                | PixelFormat::BayerGR8
        )
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown(0x{:08X})", self.code()),
        }
    }
}

/// Error returned when parsing an unknown pixel format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPixelFormat(pub String);

impl fmt::Display for UnknownPixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown pixel format '{}'", self.0)
    }
}

impl std::error::Error for UnknownPixelFormat {}

impl FromStr for PixelFormat {
    type Err = UnknownPixelFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::from_name(s).ok_or_else(|| UnknownPixelFormat(s.to_string()))
    }
}
