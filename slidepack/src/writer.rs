//! Container writing over a host-supplied output stream.

use crate::error::{Error, Result, check, check_with_info};
use crate::handle::HandleGuard;
use crate::loader::Bridge;
use crate::options::{StreamOptions, WriterOptions};
use crate::reader::document_cstring;
use crate::stream::{self, OutputStream};
use crate::sys;

/// Native handle to an output stream driven by a host [`OutputStream`]
/// through the callback bridge.
pub struct NativeOutputStream {
    bridge: &'static Bridge,
    guard: HandleGuard,
}

impl NativeOutputStream {
    /// Wrap a host sink so the native library can write through it. Like
    /// the input direction, the sink is owned by the callback bridge until
    /// the native close notification arrives.
    pub fn from_external(stream: Box<dyn OutputStream>, options: &StreamOptions) -> Result<Self> {
        let bridge = Bridge::global()?;
        let registration = stream::register_output(stream);
        let descriptor = registration.descriptor();
        let options_c = document_cstring(options.to_document())?;
        let mut handle = sys::INVALID_HANDLE;
        // SAFETY: descriptor and strings outlive the call; out-pointer valid.
        let status = unsafe {
            (bridge.api.create_output_stream_external)(
                &descriptor,
                options_c.as_ptr(),
                &mut handle,
            )
        };
        if status != sys::STATUS_OK {
            registration.unregister();
            return Err(Error::native(status));
        }
        Ok(Self {
            bridge,
            guard: HandleGuard::new(handle),
        })
    }

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

impl Drop for NativeOutputStream {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error releasing output stream handle");
        }
    }
}

/// A container under construction.
///
/// [`Writer::close`] finalizes the container and is what ultimately drives
/// the close notification to the underlying output stream; merely dropping
/// the writer releases the handle without finalizing.
pub struct Writer {
    bridge: &'static Bridge,
    guard: HandleGuard,
    finalized: bool,
}

impl Writer {
    pub fn create(stream: NativeOutputStream, options: &WriterOptions) -> Result<Self> {
        let bridge = Bridge::global()?;
        let options_c = document_cstring(options.to_document())?;
        let mut handle = sys::INVALID_HANDLE;
        let mut info = sys::ErrorInfoRaw::default();
        // SAFETY: stream handle is live; pointers are valid for the call.
        let status = unsafe {
            (bridge.api.create_writer)(stream.raw(), options_c.as_ptr(), &mut handle, &mut info)
        };
        // The writer holds its own stream reference on success.
        drop(stream);
        check_with_info(status, &info)?;
        Ok(Self {
            bridge,
            guard: HandleGuard::new(handle),
            finalized: false,
        })
    }

    /// Finalize the container, then release the handle.
    pub fn close(mut self) -> Result<()> {
        // SAFETY: handle is live until the release below.
        check(unsafe { (self.bridge.api.writer_close)(self.guard.raw()) })?;
        self.finalized = true;
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let release = self.bridge.api.release;
        // SAFETY: the guard hands out the token at most once.
        self.guard.release_with(|h| unsafe { release(h) })
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.finalized && !self.guard.is_released() {
            tracing::warn!("writer dropped without close(); container is not finalized");
        }
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error releasing writer handle");
        }
    }
}
