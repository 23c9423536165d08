//! Runtime discovery of the native library and one-time symbol resolution.
//!
//! Loading happens exactly once per process. The outcome, good or bad, is
//! cached in a [`OnceLock`]: on success every entry point shares the same
//! [`Bridge`]; on failure every entry point gets [`Error::NotOperational`]
//! carrying the full trail of paths and symbols that were tried, so the
//! original diagnostic context is never reduced to a generic message.

use crate::error::{Error, Result, check};
use crate::sys;
use crate::types::Version;
use libloading::Library;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Logical base name of the native library; expanded per platform to
/// `libslidepack.so`, `slidepack.dll`, or `libslidepack.dylib`.
const LIBRARY_BASE_NAME: &str = "slidepack";

/// Environment variable naming an explicit library file to try before any
/// of the default search locations.
const LIBRARY_PATH_VAR: &str = "SLIDEPACK_LIBRARY_PATH";

static BRIDGE: OnceLock<std::result::Result<Bridge, LoadFailure>> = OnceLock::new();

/// Resolved table of native entry points. Populated once, read-only after.
pub(crate) struct Api {
    pub(crate) get_version_info: sys::GetVersionInfoFn,
    pub(crate) create_input_stream_from_file: sys::CreateInputStreamFromFileFn,
    pub(crate) create_input_stream_external: sys::CreateInputStreamExternalFn,
    pub(crate) create_output_stream_external: sys::CreateOutputStreamExternalFn,
    pub(crate) create_reader: sys::CreateReaderFn,
    pub(crate) reader_get_file_header: sys::ReaderGetFileHeaderFn,
    pub(crate) reader_get_metadata: sys::ReaderGetMetadataFn,
    pub(crate) reader_get_sub_block_count: sys::ReaderGetSubBlockCountFn,
    pub(crate) reader_get_sub_block_info: sys::ReaderGetSubBlockInfoFn,
    pub(crate) reader_open_sub_block: sys::ReaderOpenSubBlockFn,
    pub(crate) sub_block_get_info: sys::SubBlockGetInfoFn,
    pub(crate) reader_get_statistics: sys::ReaderGetStatisticsFn,
    pub(crate) create_writer: sys::CreateWriterFn,
    pub(crate) writer_close: sys::WriterCloseFn,
    pub(crate) release: sys::ReleaseFn,
    pub(crate) free_string: sys::FreeStringFn,
}

/// The loaded native library plus its resolved entry points.
pub struct Bridge {
    pub(crate) api: Api,
    path: PathBuf,
    // Keeps the shared library mapped for as long as the bridge lives; the
    // function pointers in `api` borrow from it.
    _library: Library,
}

impl Bridge {
    /// The process-wide bridge, loading the native library on first use.
    ///
    /// A failed load is permanent for the process: subsequent calls return
    /// the same [`Error::NotOperational`] without retrying.
    pub fn global() -> Result<&'static Bridge> {
        match BRIDGE.get_or_init(Self::load_default) {
            Ok(bridge) => Ok(bridge),
            Err(failure) => Err(Error::NotOperational {
                trail: failure.to_string(),
            }),
        }
    }

    /// Search the candidate paths and load the first library that both
    /// loads and resolves every required symbol. An explicit path in
    /// `SLIDEPACK_LIBRARY_PATH` is tried before the default locations.
    fn load_default() -> std::result::Result<Bridge, LoadFailure> {
        let mut attempts = Vec::new();
        for path in default_candidates() {
            match Self::try_load(&path) {
                Ok(bridge) => {
                    tracing::debug!(path = %path.display(), "loaded native library");
                    return Ok(bridge);
                }
                Err(reason) => attempts.push(Attempt { path, reason }),
            }
        }
        Err(LoadFailure { attempts })
    }

    fn try_load(path: &Path) -> std::result::Result<Bridge, String> {
        if !path.is_file() {
            return Err("no such file".to_string());
        }
        // SAFETY: loading a shared library runs its initializers; the
        // library is trusted to be a real slidepack build.
        let library =
            unsafe { Library::new(path) }.map_err(|e| format!("load failed: {e}"))?;
        let api = resolve_api(&library)?;
        Ok(Bridge {
            api,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version reported by the native library.
    pub fn version(&self) -> Result<Version> {
        let mut raw = sys::VersionInfoRaw::default();
        // SAFETY: out-pointer is valid for the duration of the call.
        check(unsafe { (self.api.get_version_info)(&mut raw) })?;
        Ok(Version::from_raw(&raw))
    }
}

/// Version of the process-wide native library.
pub fn library_version() -> Result<Version> {
    Bridge::global()?.version()
}

/// Resolve every required export. Any missing symbol fails the whole table:
/// a partially functional bridge is worse than an inoperative one.
fn resolve_api(library: &Library) -> std::result::Result<Api, String> {
    // SAFETY: each symbol is resolved against the signature the native
    // library exports under that name.
    unsafe {
        Ok(Api {
            get_version_info: symbol(library, b"slidepack_get_version_info\0")?,
            create_input_stream_from_file: symbol(
                library,
                b"slidepack_create_input_stream_from_file\0",
            )?,
            create_input_stream_external: symbol(
                library,
                b"slidepack_create_input_stream_external\0",
            )?,
            create_output_stream_external: symbol(
                library,
                b"slidepack_create_output_stream_external\0",
            )?,
            create_reader: symbol(library, b"slidepack_create_reader\0")?,
            reader_get_file_header: symbol(library, b"slidepack_reader_get_file_header\0")?,
            reader_get_metadata: symbol(library, b"slidepack_reader_get_metadata\0")?,
            reader_get_sub_block_count: symbol(
                library,
                b"slidepack_reader_get_sub_block_count\0",
            )?,
            reader_get_sub_block_info: symbol(library, b"slidepack_reader_get_sub_block_info\0")?,
            reader_open_sub_block: symbol(library, b"slidepack_reader_open_sub_block\0")?,
            sub_block_get_info: symbol(library, b"slidepack_sub_block_get_info\0")?,
            reader_get_statistics: symbol(library, b"slidepack_reader_get_statistics\0")?,
            create_writer: symbol(library, b"slidepack_create_writer\0")?,
            writer_close: symbol(library, b"slidepack_writer_close\0")?,
            release: symbol(library, b"slidepack_release\0")?,
            free_string: symbol(library, b"slidepack_free_string\0")?,
        })
    }
}

/// Resolve one export into a copied function pointer.
///
/// # Safety
/// `T` must be the exact function-pointer type the library exports under
/// `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> std::result::Result<T, String> {
    let display = String::from_utf8_lossy(&name[..name.len() - 1]).into_owned();
    // SAFETY: caller guarantees the signature matches the export.
    unsafe { library.get::<T>(name) }
        .map(|s| *s)
        .map_err(|e| format!("missing symbol `{display}`: {e}"))
}

/// One failed load attempt: where we looked and why it didn't work out.
struct Attempt {
    path: PathBuf,
    reason: String,
}

/// Every path and symbol tried during the failed one-time load.
pub(crate) struct LoadFailure {
    attempts: Vec<Attempt>,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no candidate paths for `{}`", platform_file_name());
        }
        write!(f, "tried {} candidate(s):", self.attempts.len())?;
        for attempt in &self.attempts {
            write!(f, " [{}: {}]", attempt.path.display(), attempt.reason)?;
        }
        Ok(())
    }
}

fn default_candidates() -> Vec<PathBuf> {
    let override_path = std::env::var_os(LIBRARY_PATH_VAR).map(PathBuf::from);
    let mut base_dirs = Vec::new();
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        base_dirs.push(dir.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        base_dirs.push(cwd);
    }
    candidates_for(
        override_path.as_deref(),
        &base_dirs,
        &platform_file_name(),
        &runtime_identifier(),
    )
}

/// Ordered candidate list: the explicit override file first when set, then
/// for each base directory the file itself, then the per-architecture
/// runtime subdirectory.
fn candidates_for(
    override_path: Option<&Path>,
    base_dirs: &[PathBuf],
    file_name: &str,
    rid: &str,
) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(base_dirs.len() * 2 + 1);
    if let Some(path) = override_path {
        out.push(path.to_path_buf());
    }
    for dir in base_dirs {
        out.push(dir.join(file_name));
        out.push(dir.join("runtimes").join(rid).join("native").join(file_name));
    }
    out
}

#[cfg(target_os = "windows")]
fn platform_file_name() -> String {
    format!("{LIBRARY_BASE_NAME}.dll")
}

#[cfg(target_os = "macos")]
fn platform_file_name() -> String {
    format!("lib{LIBRARY_BASE_NAME}.dylib")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_file_name() -> String {
    format!("lib{LIBRARY_BASE_NAME}.so")
}

/// Runtime identifier naming the platform/architecture subdirectory. musl
/// builds get their own variant because glibc binaries do not run there.
fn runtime_identifier() -> String {
    let os = if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else if cfg!(all(target_os = "linux", target_env = "musl")) {
        "linux-musl"
    } else {
        "linux"
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else {
        "x64"
    };
    format!("{os}-{arch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_directory_precedes_runtime_subdirectory() {
        let bases = vec![PathBuf::from("/app"), PathBuf::from("/work")];
        let candidates = candidates_for(None, &bases, "libslidepack.so", "linux-x64");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/app/libslidepack.so"),
                PathBuf::from("/app/runtimes/linux-x64/native/libslidepack.so"),
                PathBuf::from("/work/libslidepack.so"),
                PathBuf::from("/work/runtimes/linux-x64/native/libslidepack.so"),
            ]
        );
    }

    #[test]
    fn musl_runtime_gets_its_own_subdirectory() {
        let bases = vec![PathBuf::from("/app")];
        let candidates = candidates_for(None, &bases, "libslidepack.so", "linux-musl-x64");
        assert_eq!(
            candidates[1],
            PathBuf::from("/app/runtimes/linux-musl-x64/native/libslidepack.so")
        );
    }

    #[test]
    fn override_path_precedes_every_default_location() {
        let bases = vec![PathBuf::from("/app")];
        let override_path = PathBuf::from("/opt/custom/libslidepack.so");
        let candidates = candidates_for(
            Some(&override_path),
            &bases,
            "libslidepack.so",
            "linux-x64",
        );
        assert_eq!(candidates[0], override_path);
        assert_eq!(candidates.len(), 3);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_file_name_has_lib_prefix_and_so_suffix() {
        assert_eq!(platform_file_name(), "libslidepack.so");
    }

    #[test]
    fn failure_trail_lists_every_attempt() {
        let failure = LoadFailure {
            attempts: vec![
                Attempt {
                    path: PathBuf::from("/a/libslidepack.so"),
                    reason: "no such file".to_string(),
                },
                Attempt {
                    path: PathBuf::from("/b/libslidepack.so"),
                    reason: "missing symbol `slidepack_release`".to_string(),
                },
            ],
        };
        let trail = failure.to_string();
        assert!(trail.contains("/a/libslidepack.so"));
        assert!(trail.contains("no such file"));
        assert!(trail.contains("slidepack_release"));
    }
}
