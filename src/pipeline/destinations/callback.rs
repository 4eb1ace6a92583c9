//! Application callback as a destination.

use crate::pipeline::chunk::Chunk;
use crate::pipeline::sink::{Destination, Sink};
use crate::types::StreamMode;
use std::io;

/// Calls `F` once per chunk. An error from the callback fails the sink;
/// `WouldBlock` asks to be called again with the same chunk later.
pub struct CallbackDestination<F> {
    callback: F,
}

impl<F> CallbackDestination<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<T, F> Destination<T> for CallbackDestination<F>
where
    F: FnMut(&T) -> io::Result<()> + Send,
{
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        (self.callback)(chunk)
    }
}

impl<T: Chunk> Sink<T> {
    /// Object-mode sink handing each chunk to `callback`.
    ///
    /// The high-water mark is 1, so every write asks the producer to wait
    /// until the callback has seen the chunk.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnMut(&T) -> io::Result<()> + Send + 'static,
    {
        Sink::new(CallbackDestination::new(callback), StreamMode::Object)
            .with_high_water_mark(1)
            .with_label("callback")
    }
}
