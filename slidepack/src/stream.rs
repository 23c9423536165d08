//! Bridge between host stream implementations and the native callback ABI.
//!
//! A registered stream lives behind a minted correlation token; the native
//! library gets two `extern "C"` entry points plus the token pair and calls
//! back through them, synchronously and possibly reentrantly on the thread
//! that initiated the outer operation. The registry lock is therefore never
//! held while host code runs. Host errors and panics are converted into the
//! error envelope at the boundary; nothing unwinds into native frames.
//!
//! Token lifecycle: minted at registration, removed only by the native close
//! notification (the library may keep calling back until it signals close).
//! The one exception is a failed native stream creation, where close will
//! never arrive and the host unregisters explicitly.

use crate::error::fill_error_info;
use crate::sys;
use std::collections::HashMap;
use std::ffi::c_void;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, TryLockError};

/// Host-side source the native library reads from through the bridge.
///
/// Called synchronously from inside native calls. A reentrant callback for
/// the same stream is answered with a protocol error, never a deadlock.
pub trait InputStream: Send {
    /// Read up to `buf.len()` bytes at the absolute `offset`, returning the
    /// number of bytes actually read. Reading past the end is not an error;
    /// it returns a short (possibly zero) count.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

/// Host-side sink the native library writes to through the bridge.
pub trait OutputStream: Send {
    /// Write `buf` at the absolute `offset`, returning the number of bytes
    /// actually written.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize>;
}

/// In-memory [`InputStream`] over an owned byte buffer.
#[derive(Debug, Clone)]
pub struct MemoryInputStream {
    data: Vec<u8>,
}

impl MemoryInputStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl InputStream for MemoryInputStream {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = offset.min(self.data.len() as u64) as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

enum StreamKind {
    Input(Box<dyn InputStream>),
    Output(Box<dyn OutputStream>),
}

struct StreamSlot {
    kind: Mutex<StreamKind>,
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<u64, Arc<StreamSlot>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Arc<StreamSlot>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lookup(token: u64) -> Option<Arc<StreamSlot>> {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&token)
        .cloned()
}

/// A minted token with its stream registered. Dropping the value does NOT
/// unregister: ownership of the slot stays with the bridge until the native
/// close notification arrives.
pub(crate) struct Registration {
    token: u64,
}

impl Registration {
    /// Descriptor handed to the native stream-creation call.
    pub(crate) fn descriptor(&self) -> sys::ExternalStreamRaw {
        sys::ExternalStreamRaw {
            opaque1: self.token,
            opaque2: 0,
            read_write: Some(read_write_trampoline),
            close: Some(close_trampoline),
        }
    }

    /// Remove the slot without a native close. Only for the path where
    /// native stream creation failed and no close will ever arrive.
    pub(crate) fn unregister(self) {
        if remove_slot(self.token).is_none() {
            tracing::warn!(token = self.token, "unregister found no slot");
        }
    }
}

pub(crate) fn register_input(stream: Box<dyn InputStream>) -> Registration {
    register(StreamKind::Input(stream))
}

pub(crate) fn register_output(stream: Box<dyn OutputStream>) -> Registration {
    register(StreamKind::Output(stream))
}

fn register(kind: StreamKind) -> Registration {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(
            token,
            Arc::new(StreamSlot {
                kind: Mutex::new(kind),
            }),
        );
    tracing::debug!(token, "registered external stream");
    Registration { token }
}

fn remove_slot(token: u64) -> Option<Arc<StreamSlot>> {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&token)
}

#[cfg(test)]
pub(crate) fn is_registered(token: u64) -> bool {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&token)
}

fn status_for_io_error(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::InvalidInput => sys::STATUS_INVALID_ARGUMENT,
        io::ErrorKind::OutOfMemory => sys::STATUS_OUT_OF_MEMORY,
        // A stream that is already mid-operation cannot honor the call.
        io::ErrorKind::WouldBlock => sys::STATUS_INVALID_HANDLE,
        _ => sys::STATUS_UNSPECIFIED_ERROR,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stream implementation panicked".to_string()
    }
}

/// Native-facing read/write entry point.
///
/// Writes the actual transfer count to `bytes_transferred` on success; on
/// failure returns a non-zero status and describes the failure in
/// `error_info`. Host panics are caught here and reported the same way.
pub(crate) extern "C" fn read_write_trampoline(
    opaque1: u64,
    _opaque2: u64,
    offset: u64,
    data: *mut c_void,
    size: u64,
    bytes_transferred: *mut u64,
    error_info: *mut sys::ErrorInfoRaw,
) -> i32 {
    if bytes_transferred.is_null() || error_info.is_null() || (data.is_null() && size > 0) {
        tracing::error!(token = opaque1, "stream callback invoked with null out-parameters");
        return sys::STATUS_INVALID_ARGUMENT;
    }
    // SAFETY: checked non-null above; native owns these for the call.
    unsafe {
        *bytes_transferred = 0;
    }
    // A zero-length transfer is complete before it starts. `data` may be
    // null for such probe calls and must never be turned into a slice.
    if size == 0 {
        return sys::STATUS_OK;
    }

    let Some(slot) = lookup(opaque1) else {
        tracing::error!(
            token = opaque1,
            "stream callback for unknown or already-closed token"
        );
        // SAFETY: checked non-null above.
        unsafe {
            fill_error_info(
                &mut *error_info,
                sys::STATUS_INVALID_HANDLE,
                "no stream is registered under this token",
            );
        }
        return sys::STATUS_INVALID_HANDLE;
    };

    // Registry lock is released; only this slot's own mutex is taken while
    // host code runs, so reentrant callbacks for other streams cannot
    // deadlock here. A reentrant callback for THIS token would block on its
    // own mutex forever, so contention is refused instead of waited out.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut kind = match slot.kind.try_lock() {
            Ok(kind) => kind,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "stream is already mid-operation (reentrant callback for the same token)",
                ));
            }
        };
        match &mut *kind {
            StreamKind::Input(stream) => {
                // SAFETY: native guarantees `data` is valid for `size`
                // bytes for the duration of this call.
                let buf = unsafe { std::slice::from_raw_parts_mut(data as *mut u8, size as usize) };
                stream.read_at(offset, buf)
            }
            StreamKind::Output(stream) => {
                // SAFETY: as above, read-only use.
                let buf = unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) };
                stream.write_at(offset, buf)
            }
        }
    }));

    match outcome {
        Ok(Ok(count)) => {
            // SAFETY: checked non-null above.
            unsafe {
                *bytes_transferred = count as u64;
            }
            sys::STATUS_OK
        }
        Ok(Err(err)) => {
            let status = status_for_io_error(&err);
            tracing::debug!(token = opaque1, error = %err, "stream operation failed");
            // SAFETY: checked non-null above.
            unsafe {
                fill_error_info(&mut *error_info, status, &err.to_string());
            }
            status
        }
        Err(payload) => {
            let message = panic_message(payload);
            tracing::error!(token = opaque1, detail = %message, "stream implementation panicked");
            // SAFETY: checked non-null above.
            unsafe {
                fill_error_info(&mut *error_info, sys::STATUS_UNSPECIFIED_ERROR, &message);
            }
            sys::STATUS_UNSPECIFIED_ERROR
        }
    }
}

/// Native-facing close notification. Removes the registration and disposes
/// the host stream exactly once; a second close for the same token is a
/// native-side protocol violation and only gets logged.
pub(crate) extern "C" fn close_trampoline(opaque1: u64, _opaque2: u64) {
    match remove_slot(opaque1) {
        Some(slot) => {
            tracing::debug!(token = opaque1, "closing external stream");
            // Dropping the slot (and with it the boxed host stream) is the
            // disposal; a lingering Arc clone in a concurrent callback keeps
            // the memory alive until that call returns.
            drop(slot);
        }
        None => {
            tracing::error!(
                token = opaque1,
                "close for unknown or already-closed stream token"
            );
        }
    }
}
