//! Property bags for stream, reader, and writer configuration.
//!
//! The native ABI takes configuration as a single compact `key=value;`
//! document. An empty bag serializes to an empty string, never to a null
//! pointer. Keys and values that would break the document (`=`, `;`, or an
//! empty key) are rejected when they are set, before any native call.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct PropertyBag {
    entries: BTreeMap<String, String>,
}

impl PropertyBag {
    fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if key.is_empty() {
            return Err(Error::invalid_param("property key must not be empty"));
        }
        if key.contains(['=', ';']) || value.contains(['=', ';']) {
            return Err(Error::invalid_param(format!(
                "property `{key}` contains a reserved character"
            )));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn to_document(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push(';');
        }
        out
    }
}

/// Configuration for native input/output stream creation.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    bag: PropertyBag,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary stream property understood by the native library.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.bag.set(key, value)?;
        Ok(self)
    }

    pub(crate) fn to_document(&self) -> String {
        self.bag.to_document()
    }
}

/// Configuration for [`crate::Reader`] creation.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    bag: PropertyBag,
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lax mode tolerates recoverable inconsistencies in the container.
    pub fn lax_parsing(&mut self, enabled: bool) -> &mut Self {
        // Infallible: fixed key, fixed values.
        let _ = self.bag.set("lax_parsing", if enabled { "1" } else { "0" });
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.bag.set(key, value)?;
        Ok(self)
    }

    pub(crate) fn to_document(&self) -> String {
        self.bag.to_document()
    }
}

/// Configuration for [`crate::Writer`] creation.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    bag: PropertyBag,
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.bag.set(key, value)?;
        Ok(self)
    }

    pub(crate) fn to_document(&self) -> String {
        self.bag.to_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bag_is_empty_string() {
        assert_eq!(StreamOptions::new().to_document(), "");
    }

    #[test]
    fn entries_serialize_in_stable_key_order() {
        let mut opts = StreamOptions::new();
        opts.set("timeout_ms", "500").unwrap();
        opts.set("cache", "none").unwrap();
        assert_eq!(opts.to_document(), "cache=none;timeout_ms=500;");
    }

    #[test]
    fn reserved_characters_are_rejected_up_front() {
        let mut opts = WriterOptions::new();
        assert!(opts.set("key;", "v").is_err());
        assert!(opts.set("key", "a=b").is_err());
        assert!(opts.set("", "v").is_err());
    }

    #[test]
    fn reader_lax_parsing_sets_flag() {
        let mut opts = ReaderOptions::new();
        opts.lax_parsing(true);
        assert_eq!(opts.to_document(), "lax_parsing=1;");
    }
}
