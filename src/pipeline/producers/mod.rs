//! Built-in producers that feed a [`Source`](super::Source).

pub mod channel;
pub mod generator;
pub mod iter;
pub mod lines;
pub mod reader;

pub use channel::{ChannelProducer, PushMessage, Pusher};
pub use generator::{FallibleGeneratorProducer, GeneratorProducer};
pub use iter::IterProducer;
pub use lines::LinesProducer;
pub use reader::{ReaderProducer, Utf8ReaderProducer};

use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::error::{StreamError, StreamResult};
use std::marker::PhantomData;

/// Outcome of a non-blocking production attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Produced<T> {
    Chunk(T),
    /// The producer is exhausted.
    Done,
    /// Nothing available right now; the producer is not exhausted.
    NotReady,
}

/// The generator behind a source.
///
/// `produce` may block until a chunk is available. Once it returns
/// `Ok(None)` or an error the source never calls it again.
pub trait Producer<T>: Send {
    fn produce(&mut self) -> StreamResult<Option<T>>;

    /// Blocking production that gives up with `Cancelled` once `cancel`
    /// fires.
    ///
    /// Producers that can wait indefinitely (a channel, a socket) override
    /// this to re-check `cancel` while they wait. The default checks it once
    /// and then calls `produce`.
    fn produce_until(&mut self, cancel: &CancelHandle) -> StreamResult<Option<T>> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        self.produce()
    }

    /// Non-blocking variant used to top up pull-mode read-ahead.
    ///
    /// Producers that can tell whether data is pending should override this;
    /// the default treats every producer as always ready.
    fn try_produce(&mut self) -> StreamResult<Produced<T>> {
        Ok(match self.produce()? {
            Some(chunk) => Produced::Chunk(chunk),
            None => Produced::Done,
        })
    }

    /// Transform every chunk with `f`.
    fn map<U, F>(self, f: F) -> MapProducer<Self, F, T>
    where
        Self: Sized,
        F: FnMut(T) -> U + Send,
    {
        MapProducer {
            inner: self,
            f,
            _input: PhantomData,
        }
    }
}

/// Producer adapter returned by [`Producer::map`].
pub struct MapProducer<P, F, T> {
    inner: P,
    f: F,
    _input: PhantomData<fn(T)>,
}

impl<T, U, P, F> Producer<U> for MapProducer<P, F, T>
where
    P: Producer<T>,
    F: FnMut(T) -> U + Send,
{
    fn produce(&mut self) -> StreamResult<Option<U>> {
        Ok(self.inner.produce()?.map(&mut self.f))
    }

    fn produce_until(&mut self, cancel: &CancelHandle) -> StreamResult<Option<U>> {
        Ok(self.inner.produce_until(cancel)?.map(&mut self.f))
    }

    fn try_produce(&mut self) -> StreamResult<Produced<U>> {
        Ok(match self.inner.try_produce()? {
            Produced::Chunk(chunk) => Produced::Chunk((self.f)(chunk)),
            Produced::Done => Produced::Done,
            Produced::NotReady => Produced::NotReady,
        })
    }
}
