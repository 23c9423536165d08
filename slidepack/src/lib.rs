//! Safe Rust bindings over the native `libslidepack` library, a reader and
//! writer for multi-dimensional tiled image containers.
//!
//! The native library is discovered and loaded at runtime; the crate exposes
//! a small, handle-based API that mirrors the native surface while handling
//! resource lifetimes, marshaling, and error translation for you:
//! - [`Reader`] opens a container from a [`NativeInputStream`] and exposes
//!   the file header, raw metadata, per-sub-block descriptors, and the
//!   per-scene statistics record.
//! - [`Writer`] drives a [`NativeOutputStream`] for container creation.
//! - [`InputStream`]/[`OutputStream`] let the native library pull data
//!   through your own stream implementation via the callback bridge.
//! - [`Coordinate`] and [`DimensionBounds`] describe sparse positions over
//!   the bounded [`Dimension`] set.
//!
//! Nothing in this crate decodes pixel data itself; the container format is
//! entirely the native library's business.

/// Raw ABI definitions. Most users should favor the safe wrappers
/// re-exported from this crate.
pub use slidepack_sys as sys;

mod dimension;
mod error;
mod handle;
mod loader;
mod options;
mod reader;
mod statistics;
mod stream;
mod types;
mod writer;

pub use dimension::{Coordinate, Dimension, DimensionBounds, Interval};
pub use error::{Error, ErrorCategory, Result};
pub use loader::{Bridge, library_version};
pub use options::{ReaderOptions, StreamOptions, WriterOptions};
pub use reader::{NativeInputStream, Reader, SubBlock};
pub use statistics::{SceneStatistics, Statistics};
pub use stream::{InputStream, MemoryInputStream, OutputStream};
pub use types::{
    CompressionMode, FileHeader, Guid, IntRect, IntSize, PixelType, SubBlockInfo, Version,
};
pub use writer::{NativeOutputStream, Writer};
