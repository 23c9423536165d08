//! Container reading: native stream handles, the reader, and sub-blocks.

use crate::error::{Error, Result, check, check_try, check_with_info};
use crate::handle::HandleGuard;
use crate::loader::Bridge;
use crate::options::{ReaderOptions, StreamOptions};
use crate::statistics::{self, Statistics};
use crate::stream::{self, InputStream, MemoryInputStream};
use crate::sys;
use crate::types::{FileHeader, SubBlockInfo, copy_and_free_native_string};
use std::ffi::{CString, c_char};
use std::path::Path;
use std::ptr;

pub(crate) fn document_cstring(doc: String) -> Result<CString> {
    CString::new(doc).map_err(|_| Error::invalid_param("options contain a null byte"))
}

/// Native handle to an open input stream, either file-backed or driven by a
/// host [`InputStream`] through the callback bridge.
pub struct NativeInputStream {
    bridge: &'static Bridge,
    guard: HandleGuard,
}

impl NativeInputStream {
    /// Open a file-backed stream managed entirely by the native library.
    pub fn from_file(path: &Path, options: &StreamOptions) -> Result<Self> {
        let bridge = Bridge::global()?;
        let path_c = CString::new(
            path.to_str()
                .ok_or_else(|| Error::invalid_param("path is not valid UTF-8"))?,
        )
        .map_err(|_| Error::invalid_param("path contains a null byte"))?;
        let options_c = document_cstring(options.to_document())?;
        let mut handle = sys::INVALID_HANDLE;
        // SAFETY: strings are valid C strings; out-pointer lives for the call.
        check(unsafe {
            (bridge.api.create_input_stream_from_file)(
                path_c.as_ptr(),
                options_c.as_ptr(),
                &mut handle,
            )
        })?;
        Ok(Self {
            bridge,
            guard: HandleGuard::new(handle),
        })
    }

    /// Wrap a host stream so the native library can read through it.
    ///
    /// The stream object is owned by the callback bridge from here on and is
    /// disposed when the native library sends its close notification, not
    /// when this handle is released.
    pub fn from_external(stream: Box<dyn InputStream>, options: &StreamOptions) -> Result<Self> {
        let bridge = Bridge::global()?;
        let registration = stream::register_input(stream);
        let descriptor = registration.descriptor();
        let options_c = document_cstring(options.to_document())?;
        let mut handle = sys::INVALID_HANDLE;
        // SAFETY: descriptor and strings outlive the call; out-pointer valid.
        let status = unsafe {
            (bridge.api.create_input_stream_external)(
                &descriptor,
                options_c.as_ptr(),
                &mut handle,
            )
        };
        if status != sys::STATUS_OK {
            // No native stream exists, so its close notification will never
            // arrive; reclaim the token here instead.
            registration.unregister();
            return Err(Error::native(status));
        }
        Ok(Self {
            bridge,
            guard: HandleGuard::new(handle),
        })
    }

    /// Convenience: a stream over an owned byte buffer.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_external(Box::new(MemoryInputStream::new(data)), &StreamOptions::new())
    }

    /// Release the native handle, surfacing any native error. Dropping the
    /// value releases best-effort instead.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let release = self.bridge.api.release;
        // SAFETY: the guard hands out the token at most once.
        self.guard.release_with(|h| unsafe { release(h) })
    }

    pub(crate) fn raw(&self) -> sys::RawObjectHandle {
        self.guard.raw()
    }
}

impl Drop for NativeInputStream {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error releasing input stream handle");
        }
    }
}

/// An open container.
pub struct Reader {
    bridge: &'static Bridge,
    guard: HandleGuard,
}

impl Reader {
    pub fn open(stream: NativeInputStream) -> Result<Self> {
        Self::open_with(stream, &ReaderOptions::new())
    }

    /// Open a container from a stream. The native reader keeps its own
    /// reference to the stream; the host-side stream handle is released
    /// independently once creation returns.
    pub fn open_with(stream: NativeInputStream, options: &ReaderOptions) -> Result<Self> {
        let bridge = Bridge::global()?;
        let options_c = document_cstring(options.to_document())?;
        let mut handle = sys::INVALID_HANDLE;
        let mut info = sys::ErrorInfoRaw::default();
        // SAFETY: stream handle is live (guard not yet released); pointers
        // are valid for the call.
        let status = unsafe {
            (bridge.api.create_reader)(stream.raw(), options_c.as_ptr(), &mut handle, &mut info)
        };
        // Releases the stream handle regardless of the outcome; the reader
        // holds its own reference on success.
        drop(stream);
        check_with_info(status, &info)?;
        Ok(Self {
            bridge,
            guard: HandleGuard::new(handle),
        })
    }

    pub fn file_header(&self) -> Result<FileHeader> {
        let mut raw = sys::FileHeaderInfoRaw::default();
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe { (self.bridge.api.reader_get_file_header)(self.guard.raw(), &mut raw) })?;
        Ok(FileHeader::from_raw(&raw))
    }

    /// The container's raw XML metadata document.
    pub fn metadata_xml(&self) -> Result<String> {
        let mut ptr: *mut c_char = ptr::null_mut();
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe { (self.bridge.api.reader_get_metadata)(self.guard.raw(), &mut ptr) })?;
        copy_and_free_native_string(&self.bridge.api, ptr)
    }

    pub fn sub_block_count(&self) -> Result<i32> {
        let mut count = 0;
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe {
            (self.bridge.api.reader_get_sub_block_count)(self.guard.raw(), &mut count)
        })?;
        Ok(count)
    }

    /// Descriptor of the sub-block at `index`; an out-of-range index is an
    /// error here. Use [`Reader::try_sub_block_info`] where absence is
    /// expected.
    pub fn sub_block_info(&self, index: i32) -> Result<SubBlockInfo> {
        let mut raw = sys::SubBlockInfoRaw::default();
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe {
            (self.bridge.api.reader_get_sub_block_info)(self.guard.raw(), index, &mut raw)
        })?;
        SubBlockInfo::from_raw(&raw)
    }

    /// Like [`Reader::sub_block_info`], but out-of-range is the expected
    /// negative result (`Ok(None)`), not an error.
    pub fn try_sub_block_info(&self, index: i32) -> Result<Option<SubBlockInfo>> {
        let mut raw = sys::SubBlockInfoRaw::default();
        // SAFETY: handle is live; out-pointer valid for the call.
        let found = check_try(unsafe {
            (self.bridge.api.reader_get_sub_block_info)(self.guard.raw(), index, &mut raw)
        })?;
        if !found {
            return Ok(None);
        }
        SubBlockInfo::from_raw(&raw).map(Some)
    }

    /// Open the sub-block at `index` as its own handle. The sub-block's
    /// lifetime is independent of the reader's; either may be released
    /// first.
    pub fn open_sub_block(&self, index: i32) -> Result<SubBlock> {
        let mut handle = sys::INVALID_HANDLE;
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe {
            (self.bridge.api.reader_open_sub_block)(self.guard.raw(), index, &mut handle)
        })?;
        Ok(SubBlock {
            bridge: self.bridge,
            guard: HandleGuard::new(handle),
        })
    }

    /// Like [`Reader::open_sub_block`] with out-of-range as `Ok(None)`.
    pub fn try_open_sub_block(&self, index: i32) -> Result<Option<SubBlock>> {
        let mut handle = sys::INVALID_HANDLE;
        // SAFETY: handle is live; out-pointer valid for the call.
        let found = check_try(unsafe {
            (self.bridge.api.reader_open_sub_block)(self.guard.raw(), index, &mut handle)
        })?;
        Ok(found.then(|| SubBlock {
            bridge: self.bridge,
            guard: HandleGuard::new(handle),
        }))
    }

    /// Fetch the per-scene statistics record via the two-phase protocol.
    pub fn statistics(&self) -> Result<Statistics> {
        statistics::fetch(&self.bridge.api, self.guard.raw())
    }

    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let release = self.bridge.api.release;
        // SAFETY: the guard hands out the token at most once.
        self.guard.release_with(|h| unsafe { release(h) })
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error releasing reader handle");
        }
    }
}

/// One sub-block, opened from a [`Reader`] but owning its own handle.
pub struct SubBlock {
    bridge: &'static Bridge,
    guard: HandleGuard,
}

impl SubBlock {
    pub fn info(&self) -> Result<SubBlockInfo> {
        let mut raw = sys::SubBlockInfoRaw::default();
        // SAFETY: handle is live; out-pointer valid for the call.
        check(unsafe { (self.bridge.api.sub_block_get_info)(self.guard.raw(), &mut raw) })?;
        SubBlockInfo::from_raw(&raw)
    }

    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let release = self.bridge.api.release;
        // SAFETY: the guard hands out the token at most once.
        self.guard.release_with(|h| unsafe { release(h) })
    }
}

impl Drop for SubBlock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error releasing sub-block handle");
        }
    }
}
