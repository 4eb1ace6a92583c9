//! Push-fed producer: another thread (or the caller) pushes chunks through a
//! [`Pusher`] and the source delivers them in push order.

use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{BoxError, StreamError, StreamResult};
use crate::pipeline::producers::{Produced, Producer};
use crate::pipeline::source::Source;
use crate::types::{StreamMode, DEFAULT_OBJECT_HWM};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Messages a [`Pusher`] may have in flight before `push` blocks.
pub const DEFAULT_PUSH_CAPACITY: usize = DEFAULT_OBJECT_HWM;

/// How often a waiting receiver re-checks its cancellation handle.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Messages travelling from a [`Pusher`] to its source.
#[derive(Debug)]
pub enum PushMessage<T> {
    Chunk(T),
    End,
    Fail(BoxError),
}

/// Receiving half, owned by the source.
pub struct ChannelProducer<T> {
    rx: Receiver<PushMessage<T>>,
    finished: bool,
}

impl<T: Send> ChannelProducer<T> {
    fn message(&mut self, msg: PushMessage<T>) -> StreamResult<Option<T>> {
        match msg {
            PushMessage::Chunk(chunk) => Ok(Some(chunk)),
            PushMessage::End => {
                self.finished = true;
                Ok(None)
            }
            PushMessage::Fail(err) => {
                self.finished = true;
                Err(StreamError::Producer(err))
            }
        }
    }

    /// Every sender is gone. Without a prior `End` the stream was truncated.
    fn disconnected(&mut self) -> StreamResult<Option<T>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;
        Err(StreamError::producer(
            "push handle dropped before the stream was ended",
        ))
    }
}

impl<T: Send> Producer<T> for ChannelProducer<T> {
    fn produce(&mut self) -> StreamResult<Option<T>> {
        match self.rx.recv() {
            Ok(msg) => self.message(msg),
            Err(_) => self.disconnected(),
        }
    }

    fn produce_until(&mut self, cancel: &CancelHandle) -> StreamResult<Option<T>> {
        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }
            match self.rx.recv_timeout(CANCEL_POLL) {
                Ok(msg) => return self.message(msg),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return self.disconnected(),
            }
        }
    }

    fn try_produce(&mut self) -> StreamResult<Produced<T>> {
        let next = match self.rx.try_recv() {
            Ok(msg) => self.message(msg)?,
            Err(TryRecvError::Empty) => return Ok(Produced::NotReady),
            Err(TryRecvError::Disconnected) => self.disconnected()?,
        };
        Ok(match next {
            Some(chunk) => Produced::Chunk(chunk),
            None => Produced::Done,
        })
    }
}

/// Sending half of a channel-fed source.
///
/// The channel is bounded: `push` blocks while the source holds its
/// capacity of undelivered chunks, so a backpressured pipe slows the
/// pushing thread down. Pushing after [`end`](Pusher::end) or
/// [`fail`](Pusher::fail) returns `InvalidState`. Dropping a pusher that was
/// neither ended nor failed fails the source, so a truncated stream is never
/// mistaken for a complete one.
pub struct Pusher<T> {
    tx: Sender<PushMessage<T>>,
    finished: Option<&'static str>,
}

impl<T> Pusher<T> {
    /// Send a chunk, blocking while the channel is full.
    pub fn push(&mut self, chunk: T) -> StreamResult<()> {
        self.ensure_open("push")?;
        self.send(PushMessage::Chunk(chunk))
    }

    /// Send a chunk only if there is room. A full channel hands the chunk
    /// back as `Ok(Some(chunk))`.
    pub fn try_push(&mut self, chunk: T) -> StreamResult<Option<T>> {
        self.ensure_open("push")?;
        match self.tx.try_send(PushMessage::Chunk(chunk)) {
            Ok(()) => Ok(None),
            Err(crossbeam_channel::TrySendError::Full(PushMessage::Chunk(chunk))) => {
                Ok(Some(chunk))
            }
            Err(_) => Err(StreamError::invalid_state(
                "source behind this pusher was dropped",
            )),
        }
    }

    /// Signal the end of the stream.
    pub fn end(&mut self) -> StreamResult<()> {
        self.ensure_open("end")?;
        self.finished = Some("ended");
        self.send(PushMessage::End)
    }

    /// Fail the stream with `err`.
    pub fn fail(&mut self, err: impl Into<BoxError>) -> StreamResult<()> {
        self.ensure_open("fail")?;
        self.finished = Some("failed");
        self.send(PushMessage::Fail(err.into()))
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    fn ensure_open(&self, operation: &str) -> StreamResult<()> {
        match self.finished {
            Some(how) => Err(StreamError::invalid_state(format!(
                "{} on a stream that already {}",
                operation, how
            ))),
            None => Ok(()),
        }
    }

    fn send(&self, msg: PushMessage<T>) -> StreamResult<()> {
        self.tx
            .send(msg)
            .map_err(|_| StreamError::invalid_state("source behind this pusher was dropped"))
    }
}

impl<T> Drop for Pusher<T> {
    fn drop(&mut self) {
        // The receiver turns the disconnect into a failure.
        if self.finished.is_none() {
            tracing::warn!("Pusher dropped before the stream was ended");
        }
    }
}

impl<T: Chunk> Source<T> {
    /// Source fed through the returned [`Pusher`], holding at most
    /// [`DEFAULT_PUSH_CAPACITY`] undelivered chunks.
    pub fn channel(mode: StreamMode) -> (Self, Pusher<T>) {
        Self::channel_with_capacity(mode, DEFAULT_PUSH_CAPACITY)
    }

    /// Like [`Source::channel`] with an explicit capacity (at least 1).
    pub fn channel_with_capacity(mode: StreamMode, capacity: usize) -> (Self, Pusher<T>) {
        let (tx, rx) = bounded(capacity.max(1));
        let source = Source::from_producer(ChannelProducer { rx, finished: false }, mode);
        (source, Pusher { tx, finished: None })
    }
}
