use crate::dimension::Dimension;
use crate::sys;
use std::ffi::CStr;
use thiserror::Error;

/// Closed set of failure categories behind the native status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidArgument,
    InvalidHandle,
    OutOfMemory,
    IndexOutOfRange,
    Unspecified,
}

impl ErrorCategory {
    /// Categorize a non-zero native status. Codes this crate does not know
    /// about fold into [`ErrorCategory::Unspecified`] rather than being
    /// mistaken for a specific failure.
    pub fn from_status(status: i32) -> Self {
        match status {
            sys::STATUS_INVALID_ARGUMENT => Self::InvalidArgument,
            sys::STATUS_INVALID_HANDLE => Self::InvalidHandle,
            sys::STATUS_OUT_OF_MEMORY => Self::OutOfMemory,
            sys::STATUS_INDEX_OUT_OF_RANGE => Self::IndexOutOfRange,
            _ => Self::Unspecified,
        }
    }
}

/// Error produced by the safe wrappers around `libslidepack`.
#[derive(Debug, Error)]
pub enum Error {
    /// A native call returned a non-zero status.
    #[error("{category:?} (status {status}): {}", .detail.as_deref().unwrap_or("no detail from library"))]
    Native {
        status: i32,
        category: ErrorCategory,
        detail: Option<String>,
    },

    /// The native library could not be loaded or was missing required
    /// symbols; the message carries the full load-attempt trail.
    #[error("native library is not operational: {trail}")]
    NotOperational { trail: String },

    /// The two-phase statistics fetch observed a different scene count on
    /// the resized call than the first call reported. The underlying data
    /// changed between calls; the result would be torn.
    #[error("statistics scene count changed between calls (first {first}, then {second})")]
    StatisticsChanged { first: i32, second: i32 },

    /// A host-supplied parameter cannot be represented across the ABI.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The same dimension appeared twice while building a coordinate or
    /// bounds set.
    #[error("duplicate dimension {0:?}")]
    DuplicateDimension(Dimension),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn native(status: i32) -> Self {
        Self::Native {
            status,
            category: ErrorCategory::from_status(status),
            detail: None,
        }
    }

    pub(crate) fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// Translate a native status into success or a categorized error.
pub(crate) fn check(status: i32) -> Result<()> {
    if status == sys::STATUS_OK {
        Ok(())
    } else {
        Err(Error::native(status))
    }
}

/// Like [`check`], but for "try get" call sites: index-out-of-range is the
/// expected negative result (`Ok(false)`), everything else non-zero is still
/// a failure.
pub(crate) fn check_try(status: i32) -> Result<bool> {
    match status {
        sys::STATUS_OK => Ok(true),
        sys::STATUS_INDEX_OUT_OF_RANGE => Ok(false),
        _ => Err(Error::native(status)),
    }
}

/// Translate a native status, attaching the message buffer from an error
/// envelope out-parameter when the library filled one in.
pub(crate) fn check_with_info(status: i32, info: &sys::ErrorInfoRaw) -> Result<()> {
    if status == sys::STATUS_OK {
        return Ok(());
    }
    Err(Error::Native {
        status,
        category: ErrorCategory::from_status(status),
        detail: detail_from_info(info),
    })
}

pub(crate) fn detail_from_info(info: &sys::ErrorInfoRaw) -> Option<String> {
    if info.has_detail == 0 || info.detail[0] == 0 {
        return None;
    }
    // SAFETY: detail is an inline char buffer owned by the struct; the
    // producer null-terminates it within capacity.
    let s = unsafe { CStr::from_ptr(info.detail.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    if s.is_empty() { None } else { Some(s) }
}

/// Fill an error envelope heading back into native code. The message is
/// truncated to the inline buffer and always null-terminated.
pub(crate) fn fill_error_info(info: &mut sys::ErrorInfoRaw, status: i32, message: &str) {
    info.code = status;
    let bytes = message.as_bytes();
    let max = sys::ERROR_DETAIL_CAPACITY - 1;
    let len = if bytes.len() > max {
        // Back off to a char boundary so the buffer stays valid UTF-8.
        let mut end = max;
        while end > 0 && !message.is_char_boundary(end) {
            end -= 1;
        }
        end
    } else {
        bytes.len()
    };
    for (dst, src) in info.detail.iter_mut().zip(&bytes[..len]) {
        *dst = *src as std::ffi::c_char;
    }
    info.detail[len] = 0;
    info.has_detail = i32::from(len > 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_status_is_ok() {
        assert!(check(sys::STATUS_OK).is_ok());
    }

    #[test]
    fn nonzero_status_is_categorized() {
        let err = check(sys::STATUS_INVALID_HANDLE).unwrap_err();
        match err {
            Error::Native { category, status, .. } => {
                assert_eq!(category, ErrorCategory::InvalidHandle);
                assert_eq!(status, sys::STATUS_INVALID_HANDLE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_folds_into_unspecified() {
        match check(1234).unwrap_err() {
            Error::Native { category, .. } => {
                assert_eq!(category, ErrorCategory::Unspecified);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn try_check_keeps_out_of_range_non_exceptional() {
        assert!(check_try(sys::STATUS_OK).unwrap());
        assert!(!check_try(sys::STATUS_INDEX_OUT_OF_RANGE).unwrap());
        assert!(check_try(sys::STATUS_INVALID_ARGUMENT).is_err());
    }

    #[test]
    fn envelope_detail_round_trips() {
        let mut info = sys::ErrorInfoRaw::default();
        fill_error_info(&mut info, sys::STATUS_UNSPECIFIED_ERROR, "boom");
        assert_eq!(info.code, sys::STATUS_UNSPECIFIED_ERROR);
        assert_eq!(detail_from_info(&info).as_deref(), Some("boom"));
    }

    #[test]
    fn envelope_truncates_long_messages_on_char_boundary() {
        let mut info = sys::ErrorInfoRaw::default();
        let msg = "é".repeat(400);
        fill_error_info(&mut info, sys::STATUS_UNSPECIFIED_ERROR, &msg);
        let detail = detail_from_info(&info).unwrap();
        assert!(detail.len() < sys::ERROR_DETAIL_CAPACITY);
        assert!(detail.chars().all(|c| c == 'é'));
    }

    #[test]
    fn empty_message_sets_no_detail() {
        let mut info = sys::ErrorInfoRaw::default();
        fill_error_info(&mut info, sys::STATUS_INVALID_ARGUMENT, "");
        assert!(detail_from_info(&info).is_none());
    }
}
