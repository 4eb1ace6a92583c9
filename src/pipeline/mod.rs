//! Streaming core: sources, sinks and the pipe that connects them.
//!
//! Chunks flow from a [`Source`] through a [`Pipe`] into one or more
//! [`Sink`]s. Capacity flows the other way: a sink that reaches its
//! high-water mark makes the pipe stop reading until it drains.
//!
//! # Architecture
//!
//! ```text
//!   Producer ──► [Source] ──push/pull──► [Pipe] ──write──► [Sink] ──► Destination
//!                  ▲                        │  ◄──drain────┘
//!                  └──────pause/resume──────┘
//! ```
//!
//! # Design
//!
//! - **One timeline per pipe**: a pipe runs on the calling thread, or on its
//!   own thread via [`bridge::spawn`]. No chunk is delivered concurrently.
//! - **Typed chunks**: `Source<T>`/`Sink<T>` fix the chunk type, so byte and
//!   object chunks never mix within one stream.
//! - **Single consumer**: a source accepts one consumer at a time in either
//!   push or pull mode.
//! - **Cooperative cancellation**: a [`CancelHandle`] is checked between
//!   chunks, between reads and while waiting for a drain.

pub mod bridge;
pub mod cancel;
pub mod chunk;
pub mod destinations;
pub mod error;
pub mod id;
pub mod pipe;
pub mod producers;
pub mod sink;
pub mod source;

pub use bridge::{spawn, PipeEvent, PipeHandle, PipeOutcome};
pub use cancel::CancelHandle;
pub use chunk::{weight_of, Chunk};
pub use destinations::{
    CallbackDestination, FileDestination, MemoryDestination, MemoryHandle, WriterDestination,
};
pub use error::{BoxError, StreamError, StreamResult};
pub use id::PipeId;
pub use pipe::{Pipe, PipeReport, PipeState};
pub use producers::{Produced, Producer, Pusher};
pub use sink::{Destination, DrainStatus, Sink, SinkState, SinkStats};
pub use source::{
    fn_consumer, Consumer, Demand, FlowStatus, FnConsumer, ReadResult, Source, SourceState,
    SourceStats,
};
