//! Raw ABI definitions for the native `libslidepack` container library.
//!
//! The native library is loaded at runtime, so this crate carries no link
//! directives and no build script: it only defines the `#[repr(C)]` record
//! layouts, the status codes, and the typed function pointers that the safe
//! `slidepack` crate resolves from the shared library. Most users should
//! favor the safe wrappers instead of depending on this crate directly.

use std::ffi::{c_char, c_void};

/// Opaque token referencing a native-owned object. Meaningless outside the
/// native library; `INVALID_HANDLE` is never a live object.
pub type RawObjectHandle = u64;

/// The all-zero token, never returned for a live object.
pub const INVALID_HANDLE: RawObjectHandle = 0;

/// Number of addressable dimensions (raw code 0 is the invalid sentinel,
/// codes 1..=MAX_DIMENSIONS are valid).
pub const MAX_DIMENSIONS: usize = 9;

/// Capacity of the inline detail buffer in [`ErrorInfoRaw`].
pub const ERROR_DETAIL_CAPACITY: usize = 256;

// Status codes returned by every native call.
pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_ARGUMENT: i32 = 1;
pub const STATUS_INVALID_HANDLE: i32 = 2;
pub const STATUS_OUT_OF_MEMORY: i32 = 3;
pub const STATUS_INDEX_OUT_OF_RANGE: i32 = 4;
pub const STATUS_UNSPECIFIED_ERROR: i32 = 50;

/// Integer rectangle, pixel units.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntRectRaw {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Integer extent, pixel units.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntSizeRaw {
    pub w: i32,
    pub h: i32,
}

/// 16-byte GUID in the usual data1/data2/data3/data4 layout.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GuidRaw {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Version of the loaded native library.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfoRaw {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

/// Fixed-layout file header record.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct FileHeaderInfoRaw {
    pub file_guid: GuidRaw,
    pub version_major: i32,
    pub version_minor: i32,
}

/// Sparse coordinate over the bounded dimension set.
///
/// Bit `d - 1` of `dim_mask` marks dimension code `d` as present. Present
/// dimensions' values occupy `values[0..popcount(dim_mask)]` in ascending
/// dimension-code order; the trailing slots carry no information.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CoordinateRaw {
    pub dim_mask: u32,
    pub values: [i32; MAX_DIMENSIONS],
}

/// Sparse per-dimension interval set, packed like [`CoordinateRaw`]:
/// `start[i]`/`size[i]` belong to the dimension of the i-th set bit.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DimBoundsRaw {
    pub dim_mask: u32,
    pub start: [i32; MAX_DIMENSIONS],
    pub size: [i32; MAX_DIMENSIONS],
}

/// Fixed-layout descriptor for one sub-block.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SubBlockInfoRaw {
    pub compression_mode: i32,
    pub pixel_type: i32,
    pub coordinate: CoordinateRaw,
    pub logical_rect: IntRectRaw,
    pub physical_size: IntSizeRaw,
    /// Mosaic index; `i32::MIN` when the sub-block carries none.
    pub m_index: i32,
}

/// Header of the variable-length statistics record. `scene_count`
/// [`SceneStatisticsRaw`] entries follow immediately after this header in
/// the same allocation; the count travels through the in/out capacity
/// parameter of the statistics call, not through the header itself.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct StatisticsRaw {
    pub sub_block_count: i32,
    /// `i32::MAX` when no sub-block carries an M index.
    pub min_m_index: i32,
    /// `i32::MIN` when no sub-block carries an M index.
    pub max_m_index: i32,
    pub bounding_box: IntRectRaw,
    pub bounding_box_layer0: IntRectRaw,
    pub dim_bounds: DimBoundsRaw,
}

/// One trailing per-scene entry of the statistics record.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SceneStatisticsRaw {
    pub scene_index: i32,
    pub bounding_box: IntRectRaw,
    pub bounding_box_layer0: IntRectRaw,
}

/// Error envelope crossing the ABI in both directions: a status code plus
/// an optional inline message.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ErrorInfoRaw {
    pub code: i32,
    pub has_detail: i32,
    pub detail: [c_char; ERROR_DETAIL_CAPACITY],
}

impl Default for ErrorInfoRaw {
    fn default() -> Self {
        Self {
            code: STATUS_OK,
            has_detail: 0,
            detail: [0; ERROR_DETAIL_CAPACITY],
        }
    }
}

impl std::fmt::Debug for ErrorInfoRaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorInfoRaw")
            .field("code", &self.code)
            .field("has_detail", &self.has_detail)
            .finish_non_exhaustive()
    }
}

/// Read-or-write entry point of an externally supplied stream.
///
/// The native library calls this synchronously, possibly reentrantly on the
/// thread that initiated the surrounding operation. `(opaque1, opaque2)` is
/// the correlation token pair given at stream creation. On return,
/// `*bytes_transferred` holds the actual byte count; a non-zero return
/// status means the operation failed and `*error_info` describes why.
pub type ExternalReadWriteFn = unsafe extern "C" fn(
    opaque1: u64,
    opaque2: u64,
    offset: u64,
    data: *mut c_void,
    size: u64,
    bytes_transferred: *mut u64,
    error_info: *mut ErrorInfoRaw,
) -> i32;

/// Close notification for an externally supplied stream. Called exactly once
/// by the native library when it will issue no further read/write calls.
pub type ExternalCloseFn = unsafe extern "C" fn(opaque1: u64, opaque2: u64);

/// Descriptor handed to the native library to create a stream backed by
/// host-side callbacks.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExternalStreamRaw {
    pub opaque1: u64,
    pub opaque2: u64,
    pub read_write: Option<ExternalReadWriteFn>,
    pub close: Option<ExternalCloseFn>,
}

// Exported native functions, resolved by name at runtime. Every call
// returns a status code; out-parameters are only valid on STATUS_OK unless
// noted otherwise.

pub type GetVersionInfoFn = unsafe extern "C" fn(version: *mut VersionInfoRaw) -> i32;

pub type CreateInputStreamFromFileFn = unsafe extern "C" fn(
    path: *const c_char,
    options: *const c_char,
    stream: *mut RawObjectHandle,
) -> i32;

pub type CreateInputStreamExternalFn = unsafe extern "C" fn(
    descriptor: *const ExternalStreamRaw,
    options: *const c_char,
    stream: *mut RawObjectHandle,
) -> i32;

pub type CreateOutputStreamExternalFn = unsafe extern "C" fn(
    descriptor: *const ExternalStreamRaw,
    options: *const c_char,
    stream: *mut RawObjectHandle,
) -> i32;

pub type CreateReaderFn = unsafe extern "C" fn(
    stream: RawObjectHandle,
    options: *const c_char,
    reader: *mut RawObjectHandle,
    error_info: *mut ErrorInfoRaw,
) -> i32;

pub type ReaderGetFileHeaderFn =
    unsafe extern "C" fn(reader: RawObjectHandle, header: *mut FileHeaderInfoRaw) -> i32;

/// `*metadata` receives a native-owned UTF-8 string to be returned through
/// `slidepack_free_string`.
pub type ReaderGetMetadataFn =
    unsafe extern "C" fn(reader: RawObjectHandle, metadata: *mut *mut c_char) -> i32;

pub type ReaderGetSubBlockCountFn =
    unsafe extern "C" fn(reader: RawObjectHandle, count: *mut i32) -> i32;

pub type ReaderGetSubBlockInfoFn = unsafe extern "C" fn(
    reader: RawObjectHandle,
    index: i32,
    info: *mut SubBlockInfoRaw,
) -> i32;

pub type ReaderOpenSubBlockFn = unsafe extern "C" fn(
    reader: RawObjectHandle,
    index: i32,
    sub_block: *mut RawObjectHandle,
) -> i32;

pub type SubBlockGetInfoFn =
    unsafe extern "C" fn(sub_block: RawObjectHandle, info: *mut SubBlockInfoRaw) -> i32;

/// Two-phase statistics fetch. On entry `*scene_capacity` is the number of
/// trailing [`SceneStatisticsRaw`] slots available after the header; on
/// return it is the actual scene count. When the actual count exceeds the
/// capacity, only the header and `capacity` entries were written.
pub type ReaderGetStatisticsFn = unsafe extern "C" fn(
    reader: RawObjectHandle,
    statistics: *mut StatisticsRaw,
    scene_capacity: *mut i32,
) -> i32;

pub type CreateWriterFn = unsafe extern "C" fn(
    stream: RawObjectHandle,
    options: *const c_char,
    writer: *mut RawObjectHandle,
    error_info: *mut ErrorInfoRaw,
) -> i32;

/// Finalizes the container and triggers the close notification on the
/// writer's output stream.
pub type WriterCloseFn = unsafe extern "C" fn(writer: RawObjectHandle) -> i32;

/// Releases any object handle. Each handle must be released exactly once;
/// parent and child handles may be released in any order.
pub type ReleaseFn = unsafe extern "C" fn(handle: RawObjectHandle) -> i32;

/// Frees a string previously returned by the library.
pub type FreeStringFn = unsafe extern "C" fn(string: *mut c_char);
