//! Conversions between native fixed-layout records and host value types.

use crate::dimension::Coordinate;
use crate::error::{Error, Result};
use crate::loader::Api;
use crate::sys;
use std::ffi::{CStr, c_char};
use std::fmt;

/// Integer rectangle, pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl IntRect {
    pub(crate) fn from_raw(raw: &sys::IntRectRaw) -> Self {
        Self {
            x: raw.x,
            y: raw.y,
            w: raw.w,
            h: raw.h,
        }
    }
}

/// Integer extent, pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntSize {
    pub w: i32,
    pub h: i32,
}

impl IntSize {
    pub(crate) fn from_raw(raw: &sys::IntSizeRaw) -> Self {
        Self { w: raw.w, h: raw.h }
    }
}

/// Version of the loaded native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl Version {
    pub(crate) fn from_raw(raw: &sys::VersionInfoRaw) -> Self {
        Self {
            major: raw.major,
            minor: raw.minor,
            patch: raw.patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 16-byte GUID converted with the standard data1/data2/data3/data4 byte
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub(crate) fn from_raw(raw: &sys::GuidRaw) -> Self {
        Self {
            data1: raw.data1,
            data2: raw.data2,
            data3: raw.data3,
            data4: raw.data4,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.data1 == 0 && self.data2 == 0 && self.data3 == 0 && self.data4 == [0; 8]
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

/// Pixel representation of a sub-block.
///
/// Codes outside the table decode to [`PixelType::Unknown`] carrying the raw
/// code, never to a valid-looking type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32Float,
    Bgr24,
    Bgr48,
    Bgr96Float,
    Bgra32,
    Gray64ComplexFloat,
    Bgr192ComplexFloat,
    Gray32,
    Gray64Float,
    Unknown(i32),
}

impl PixelType {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Gray8,
            1 => Self::Gray16,
            2 => Self::Gray32Float,
            3 => Self::Bgr24,
            4 => Self::Bgr48,
            8 => Self::Bgr96Float,
            9 => Self::Bgra32,
            10 => Self::Gray64ComplexFloat,
            11 => Self::Bgr192ComplexFloat,
            12 => Self::Gray32,
            13 => Self::Gray64Float,
            other => Self::Unknown(other),
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Self::Gray8 => 0,
            Self::Gray16 => 1,
            Self::Gray32Float => 2,
            Self::Bgr24 => 3,
            Self::Bgr48 => 4,
            Self::Bgr96Float => 8,
            Self::Bgra32 => 9,
            Self::Gray64ComplexFloat => 10,
            Self::Bgr192ComplexFloat => 11,
            Self::Gray32 => 12,
            Self::Gray64Float => 13,
            Self::Unknown(other) => other,
        }
    }
}

/// How a sub-block's payload is compressed. Decoding it is out of this
/// crate's hands; the code is surfaced as-is with an `Unknown` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    Uncompressed,
    Jpeg,
    JpegXr,
    Zstd,
    Unknown(i32),
}

impl CompressionMode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Uncompressed,
            1 => Self::Jpeg,
            4 => Self::JpegXr,
            6 => Self::Zstd,
            other => Self::Unknown(other),
        }
    }
}

/// Decoded fixed-layout file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub file_guid: Guid,
    pub version_major: i32,
    pub version_minor: i32,
}

impl FileHeader {
    pub(crate) fn from_raw(raw: &sys::FileHeaderInfoRaw) -> Self {
        Self {
            file_guid: Guid::from_raw(&raw.file_guid),
            version_major: raw.version_major,
            version_minor: raw.version_minor,
        }
    }
}

/// Decoded descriptor of one sub-block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBlockInfo {
    pub compression: CompressionMode,
    pub pixel_type: PixelType,
    pub coordinate: Coordinate,
    pub logical_rect: IntRect,
    pub physical_size: IntSize,
    pub m_index: Option<i32>,
}

impl SubBlockInfo {
    pub(crate) fn from_raw(raw: &sys::SubBlockInfoRaw) -> Result<Self> {
        Ok(Self {
            compression: CompressionMode::from_raw(raw.compression_mode),
            pixel_type: PixelType::from_raw(raw.pixel_type),
            coordinate: Coordinate::from_raw(&raw.coordinate)?,
            logical_rect: IntRect::from_raw(&raw.logical_rect),
            physical_size: IntSize::from_raw(&raw.physical_size),
            m_index: (raw.m_index != i32::MIN).then_some(raw.m_index),
        })
    }
}

/// Copy a native-owned C string into a host `String`, then hand the buffer
/// back to the library. The copy happens strictly before the free; callers
/// never see the native pointer, which is what keeps the use-after-free
/// ordering mistake unrepresentable.
pub(crate) fn copy_and_free_native_string(api: &Api, ptr: *mut c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(Error::invalid_param("library returned a null string"));
    }
    // SAFETY: the library hands over a valid null-terminated buffer which
    // stays alive until we free it below.
    let copied = unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: ptr came from the library and is freed exactly once, after
    // the copy above.
    unsafe { (api.free_string)(ptr) };
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::Dimension;

    #[test]
    fn unknown_pixel_code_stays_distinguishable() {
        assert_eq!(PixelType::from_raw(99), PixelType::Unknown(99));
        assert_eq!(PixelType::Unknown(99).to_raw(), 99);
        assert_eq!(PixelType::from_raw(0), PixelType::Gray8);
    }

    #[test]
    fn pixel_table_round_trips() {
        for code in [0, 1, 2, 3, 4, 8, 9, 10, 11, 12, 13] {
            assert_eq!(PixelType::from_raw(code).to_raw(), code);
        }
    }

    #[test]
    fn guid_formats_in_standard_order() {
        let guid = Guid::from_raw(&sys::GuidRaw {
            data1: 0x0011_2233,
            data2: 0x4455,
            data3: 0x6677,
            data4: [0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
        });
        assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
        assert!(!guid.is_nil());
    }

    #[test]
    fn decodes_known_good_header_record() {
        // Hand-built record standing in for a freshly opened 1x1 Gray8
        // container.
        let raw = sys::SubBlockInfoRaw {
            compression_mode: 0,
            pixel_type: 0,
            coordinate: Coordinate::new([(Dimension::C, 0)]).unwrap().to_raw(),
            logical_rect: sys::IntRectRaw { x: 0, y: 0, w: 1, h: 1 },
            physical_size: sys::IntSizeRaw { w: 1, h: 1 },
            m_index: i32::MIN,
        };
        let info = SubBlockInfo::from_raw(&raw).unwrap();
        assert_eq!(info.logical_rect.w, 1);
        assert_eq!(info.logical_rect.h, 1);
        assert_eq!(info.pixel_type, PixelType::Gray8);
        assert_eq!(info.compression, CompressionMode::Uncompressed);
        assert_eq!(info.coordinate.get(Dimension::C), Some(0));
        assert_eq!(info.m_index, None);
    }

    #[test]
    fn m_index_sentinel_maps_to_none() {
        let mut raw = sys::SubBlockInfoRaw::default();
        raw.m_index = 7;
        assert_eq!(SubBlockInfo::from_raw(&raw).unwrap().m_index, Some(7));
        raw.m_index = i32::MIN;
        assert_eq!(SubBlockInfo::from_raw(&raw).unwrap().m_index, None);
    }
}
