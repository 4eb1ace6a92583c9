//! # tapstream: backpressure-aware chunk streaming
//!
//! Moves an ordered sequence of chunks from a producer (a file, a generator,
//! an in-memory list, another thread) to one or more consumers (a file, a
//! writer, a callback, a list) without materializing the whole sequence.
//! Consumers control the rate of production through a high-water mark.
//!
//! ## Architecture
//!
//! - **Source**: wraps a producer; delivers by push (`flow`) or by pull
//!   (`wait_readable` + `read_next`)
//! - **Sink**: bounded write queue in front of a destination; reports
//!   backpressure and drains
//! - **Pipe**: forwards chunks, pauses for drains, propagates end and failure
//! - **Bridge**: runs a pipe on its own thread with events and cancellation
//!
//! ## Example
//!
//! ```
//! use tapstream::pipeline::{Pipe, Sink, Source};
//! use tapstream::types::StreamMode;
//!
//! let mut source = Source::from_items(vec!["a", "b", "c"]);
//! let (sink, collected) = Sink::memory(StreamMode::Object);
//! let mut sink = sink.with_high_water_mark(1);
//!
//! let report = Pipe::new(&mut source).to(&mut sink).run()?;
//! assert_eq!(collected.chunks(), vec!["a", "b", "c"]);
//! assert_eq!(report.chunks, 3);
//! # Ok::<(), tapstream::pipeline::StreamError>(())
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{PipeConfig, PipeSettings, SinkConfig, SourceConfig};
pub use error::{Result, ResultExt, TapError};
pub use pipeline::{Pipe, PipeReport, Sink, Source, StreamError};
pub use types::{ReadMode, StreamMode};
