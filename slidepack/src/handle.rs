//! Exactly-once ownership of opaque native handles.
//!
//! Every wrapper type in this crate embeds a [`HandleGuard`]. The guard
//! makes double-release structurally impossible: the consumed flag flips
//! before the native release runs, so a second attempt (explicit `close`
//! followed by `Drop`, or `Drop` on an exceptional path) never reaches the
//! native function again. An all-zero token is already invalid and skips
//! the native call entirely.

use crate::error::{Result, check};
use crate::sys;

#[derive(Debug)]
pub(crate) struct HandleGuard {
    raw: sys::RawObjectHandle,
    released: bool,
}

impl HandleGuard {
    pub(crate) fn new(raw: sys::RawObjectHandle) -> Self {
        Self {
            raw,
            released: raw == sys::INVALID_HANDLE,
        }
    }

    /// The raw token, for passing to native calls. Callers must not stash
    /// it beyond the guard's lifetime.
    pub(crate) fn raw(&self) -> sys::RawObjectHandle {
        self.raw
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    /// Run the native release at most once over this guard's lifetime.
    ///
    /// The guard is marked consumed before `release` runs: a failed release
    /// is not retried, matching the native contract that a handle may be
    /// released at most once.
    pub(crate) fn release_with<F>(&mut self, release: F) -> Result<()>
    where
        F: FnOnce(sys::RawObjectHandle) -> i32,
    {
        if self.released {
            return Ok(());
        }
        self.released = true;
        check(release(self.raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn release_runs_exactly_once() {
        let calls = Cell::new(0);
        let mut guard = HandleGuard::new(0x1000);
        guard
            .release_with(|h| {
                assert_eq!(h, 0x1000);
                calls.set(calls.get() + 1);
                sys::STATUS_OK
            })
            .unwrap();
        guard
            .release_with(|_| {
                calls.set(calls.get() + 1);
                sys::STATUS_OK
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert!(guard.is_released());
    }

    #[test]
    fn invalid_token_skips_native_release() {
        let mut guard = HandleGuard::new(sys::INVALID_HANDLE);
        guard
            .release_with(|_| panic!("release must not run for the invalid token"))
            .unwrap();
    }

    #[test]
    fn failed_release_is_not_retried() {
        let calls = Cell::new(0);
        let mut guard = HandleGuard::new(42);
        let err = guard.release_with(|_| {
            calls.set(calls.get() + 1);
            sys::STATUS_INVALID_HANDLE
        });
        assert!(err.is_err());
        guard
            .release_with(|_| {
                calls.set(calls.get() + 1);
                sys::STATUS_OK
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
    }
}
