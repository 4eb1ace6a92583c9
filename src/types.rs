//! Core shared types for tapstream
//!
//! This module contains the small enums that both the streaming core and
//! the configuration layer agree on.
//!
//! # Main Types
//!
//! - [`StreamMode`] - How chunk volume is measured (bytes vs objects)
//! - [`ReadMode`] - How a consumer takes chunks from a source (push vs pull)
//!
//! # High-Water Marks
//!
//! Buffers on both ends of a pipe are bounded by a high-water mark. The
//! mark is counted in bytes for [`StreamMode::Bytes`] and in chunks for
//! [`StreamMode::Object`]. When no explicit mark is configured the
//! defaults below apply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default read chunk size for resource-backed sources (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default read-ahead limit of a byte-mode source (64 KiB)
pub const DEFAULT_SOURCE_BYTES_HWM: usize = 64 * 1024;

/// Default write buffer limit of a byte-mode sink (16 KiB)
pub const DEFAULT_SINK_BYTES_HWM: usize = 16 * 1024;

/// Default buffer limit for object-mode streams, in chunks
pub const DEFAULT_OBJECT_HWM: usize = 16;

/// How the volume of buffered chunks is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Chunks are byte buffers or strings, weighed by their length
    Bytes,
    /// Chunks are application values, each weighing 1
    #[default]
    Object,
}

impl StreamMode {
    /// Default high-water mark for a source's read-ahead buffer
    pub fn source_high_water_mark(&self) -> usize {
        match self {
            StreamMode::Bytes => DEFAULT_SOURCE_BYTES_HWM,
            StreamMode::Object => DEFAULT_OBJECT_HWM,
        }
    }

    /// Default high-water mark for a sink's write buffer
    pub fn sink_high_water_mark(&self) -> usize {
        match self {
            StreamMode::Bytes => DEFAULT_SINK_BYTES_HWM,
            StreamMode::Object => DEFAULT_OBJECT_HWM,
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Bytes => write!(f, "bytes"),
            StreamMode::Object => write!(f, "object"),
        }
    }
}

/// Delivery discipline chosen by the consumer of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// The source calls the consumer with every chunk
    #[default]
    Push,
    /// The consumer asks for every chunk
    Pull,
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadMode::Push => write!(f, "push"),
            ReadMode::Pull => write!(f, "pull"),
        }
    }
}
