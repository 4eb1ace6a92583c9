//! Source: the producing end of a pipe.
//!
//! A `Source` wraps a [`Producer`] and hands its chunks to exactly one
//! consumer at a time, in one of two disciplines:
//!
//! - **Push** ([`ReadMode::Push`]): [`Source::flow`] calls the consumer with
//!   every chunk until the consumer asks to pause, the producer is exhausted,
//!   or it fails.
//! - **Pull** ([`ReadMode::Pull`]): [`Source::wait_readable`] fills an
//!   internal read-ahead buffer up to the high-water mark, and the consumer
//!   drains it with [`Source::read_next`] until `WouldBlock`.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──attach(push)──► Flowing ◄──resume/pause──► Paused
//!   └──attach(pull)────────────────────────────────► Paused
//! Flowing/Paused ──exhausted──► Ended      (terminal, notified once)
//! Flowing/Paused ──failure────► Errored    (terminal, preempts Ended)
//! ```

use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::chunk::{weight_of, Chunk};
use crate::pipeline::error::{BoxError, StreamError, StreamResult};
use crate::pipeline::producers::{
    FallibleGeneratorProducer, GeneratorProducer, IterProducer, Produced, Producer,
};
use crate::types::{ReadMode, StreamMode};
use std::collections::VecDeque;
use std::fmt;

/// Lifecycle state of a [`Source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// No consumer attached yet.
    Idle,
    /// Pushing chunks to the consumer.
    Flowing,
    /// Consumer pulls on demand, or a push consumer asked to pause.
    Paused,
    /// All chunks delivered. Terminal.
    Ended,
    /// Producer failed or the source was destroyed. Terminal.
    Errored,
}

impl SourceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SourceState::Ended | SourceState::Errored)
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Idle => "idle",
            SourceState::Flowing => "flowing",
            SourceState::Paused => "paused",
            SourceState::Ended => "ended",
            SourceState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// What a push-mode consumer wants after receiving a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    More,
    Pause,
}

/// Receiver of push-mode deliveries.
///
/// `on_end` and `on_error` are each called at most once, and never both.
pub trait Consumer<T> {
    fn on_data(&mut self, chunk: T) -> Demand;

    fn on_end(&mut self) {}

    fn on_error(&mut self, _err: StreamError) {}
}

/// Closure adapter for consumers that only care about data.
pub struct FnConsumer<F>(F);

/// Build a consumer that calls `f` for every chunk and never pauses.
pub fn fn_consumer<T, F: FnMut(T)>(f: F) -> FnConsumer<F> {
    FnConsumer(f)
}

impl<T, F: FnMut(T)> Consumer<T> for FnConsumer<F> {
    fn on_data(&mut self, chunk: T) -> Demand {
        (self.0)(chunk);
        Demand::More
    }
}

/// Why [`Source::flow`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// The consumer asked to pause; call [`Source::resume`] then `flow` again.
    Paused,
    /// The producer is exhausted and the consumer saw `on_end`.
    Ended,
    /// The producer failed and the consumer saw `on_error`.
    Errored,
}

/// Result of a pull-mode [`Source::read_next`].
#[derive(Debug, PartialEq, Eq)]
pub enum ReadResult<T> {
    Chunk(T),
    /// The source has ended. Returned for every read after the end.
    End,
    /// Nothing buffered; wait for the next readable notification.
    WouldBlock,
}

/// Delivery counters for a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub chunks: u64,
    /// Sum of chunk weights (bytes in byte mode, chunks in object mode).
    pub volume: u64,
}

/// Producing end of a pipe. See the module docs for the delivery disciplines.
pub struct Source<T> {
    label: String,
    producer: Box<dyn Producer<T>>,
    mode: StreamMode,
    high_water_mark: usize,
    state: SourceState,
    attached: Option<ReadMode>,
    buffer: VecDeque<T>,
    buffered: usize,
    exhausted: bool,
    pending_error: Option<StreamError>,
    cancel: Option<CancelHandle>,
    stats: SourceStats,
}

impl<T: Chunk> Source<T> {
    /// Wrap any producer.
    pub fn from_producer(producer: impl Producer<T> + 'static, mode: StreamMode) -> Self {
        Self {
            label: "source".to_string(),
            producer: Box::new(producer),
            mode,
            high_water_mark: mode.source_high_water_mark(),
            state: SourceState::Idle,
            attached: None,
            buffer: VecDeque::new(),
            buffered: 0,
            exhausted: false,
            pending_error: None,
            cancel: None,
            stats: SourceStats::default(),
        }
    }

    /// Source over a finite in-memory collection (object mode).
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_producer(IterProducer::new(items.into_iter()), StreamMode::Object)
    }

    /// Lazy, possibly infinite source; `None` ends it.
    pub fn from_generator<F>(generate: F) -> Self
    where
        F: FnMut() -> Option<T> + Send + 'static,
    {
        Self::from_producer(GeneratorProducer::new(generate), StreamMode::Object)
    }

    /// Lazy source whose generator can fail; an `Err` fails the source.
    pub fn try_from_generator<F, E>(generate: F) -> Self
    where
        F: FnMut() -> Option<Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_producer(FallibleGeneratorProducer::new(generate), StreamMode::Object)
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark.max(1);
        self
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    /// The discipline of the active consumer, if any.
    pub fn attached_mode(&self) -> Option<ReadMode> {
        self.attached
    }

    // ── Subscription ──

    /// Attach the single consumer.
    pub fn attach(&mut self, mode: ReadMode) -> StreamResult<()> {
        match self.state {
            SourceState::Idle => {}
            SourceState::Flowing | SourceState::Paused => return Err(StreamError::AlreadyConsumed),
            state => {
                return Err(StreamError::invalid_state(format!(
                    "cannot attach to {} source '{}'",
                    state, self.label
                )))
            }
        }

        self.attached = Some(mode);
        self.state = match mode {
            ReadMode::Push => SourceState::Flowing,
            ReadMode::Pull => SourceState::Paused,
        };
        tracing::debug!("Source '{}' attached in {} mode", self.label, mode);
        Ok(())
    }

    /// Drop the current consumer. A non-terminal source returns to `Idle`
    /// with its read-ahead intact.
    pub fn detach(&mut self) {
        self.attached = None;
        self.cancel = None;
        if !self.state.is_terminal() {
            self.state = SourceState::Idle;
        }
    }

    /// Let `cancel` interrupt blocking production for the current consumer.
    ///
    /// Once it fires, a `flow` or `wait_readable` that is waiting on the
    /// producer gives up with `Cancelled`. Cleared by [`detach`](Source::detach).
    pub fn set_cancel_handle(&mut self, cancel: CancelHandle) {
        self.cancel = Some(cancel);
    }

    /// Stop push delivery after the current chunk.
    pub fn pause(&mut self) -> StreamResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        match self.attached {
            Some(ReadMode::Push) => {
                self.state = SourceState::Paused;
                Ok(())
            }
            // A pull-mode source is paused by definition.
            Some(ReadMode::Pull) => Ok(()),
            None => Err(StreamError::invalid_state("pause on a source without a consumer")),
        }
    }

    /// Resume push delivery.
    pub fn resume(&mut self) -> StreamResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        match self.attached {
            Some(ReadMode::Push) => {
                self.state = SourceState::Flowing;
                Ok(())
            }
            Some(ReadMode::Pull) => Err(StreamError::invalid_state(
                "a pull-mode source cannot switch to flowing",
            )),
            None => Err(StreamError::invalid_state("resume on a source without a consumer")),
        }
    }

    /// Tear the source down. It becomes `Errored` unless already terminal and
    /// any read-ahead is dropped.
    pub fn destroy(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(
                "Source '{}' destroyed after {} chunks",
                self.label,
                self.stats.chunks
            );
            self.state = SourceState::Errored;
        }
        self.buffer.clear();
        self.buffered = 0;
        self.pending_error = None;
    }

    // ── Push mode ──

    /// Deliver chunks to `consumer` until it pauses, the source ends or fails.
    pub fn flow<C>(&mut self, consumer: &mut C) -> StreamResult<FlowStatus>
    where
        C: Consumer<T> + ?Sized,
    {
        if self.attached != Some(ReadMode::Push) {
            return Err(StreamError::invalid_state(
                "flow requires a push-mode consumer",
            ));
        }
        match self.state {
            SourceState::Paused => return Ok(FlowStatus::Paused),
            SourceState::Ended => return Ok(FlowStatus::Ended),
            SourceState::Errored => {
                return Err(StreamError::invalid_state(format!(
                    "source '{}' already failed",
                    self.label
                )))
            }
            SourceState::Idle | SourceState::Flowing => {}
        }

        loop {
            let next = if let Some(chunk) = self.pop_buffered() {
                Ok(Some(chunk))
            } else if let Some(err) = self.pending_error.take() {
                Err(err)
            } else if self.exhausted {
                Ok(None)
            } else {
                self.produce_blocking()
            };

            match next {
                Ok(Some(chunk)) => {
                    self.record(&chunk);
                    if consumer.on_data(chunk) == Demand::Pause {
                        self.state = SourceState::Paused;
                        return Ok(FlowStatus::Paused);
                    }
                }
                Ok(None) => {
                    self.exhausted = true;
                    self.mark_ended();
                    consumer.on_end();
                    return Ok(FlowStatus::Ended);
                }
                Err(err) => {
                    self.mark_errored(&err);
                    consumer.on_error(err);
                    return Ok(FlowStatus::Errored);
                }
            }
        }
    }

    // ── Pull mode ──

    /// Whether a `read_next` would return something other than `WouldBlock`.
    pub fn is_readable(&self) -> bool {
        !self.state.is_terminal()
            && (!self.buffer.is_empty() || self.pending_error.is_some() || self.exhausted)
    }

    /// Block until the source is readable, then top up the read-ahead to
    /// the high-water mark without blocking further.
    ///
    /// Level-triggered: returns immediately while the source is already
    /// readable or has ended.
    pub fn wait_readable(&mut self) -> StreamResult<()> {
        self.ensure_pull("wait_readable")?;
        match self.state {
            SourceState::Ended => return Ok(()),
            SourceState::Errored => {
                return Err(StreamError::invalid_state(format!(
                    "source '{}' already failed",
                    self.label
                )))
            }
            _ => {}
        }

        self.fill_read_ahead(!self.is_readable());
        Ok(())
    }

    /// Take the next buffered chunk.
    pub fn read_next(&mut self) -> StreamResult<ReadResult<T>> {
        self.ensure_pull("read_next")?;
        match self.state {
            SourceState::Ended => return Ok(ReadResult::End),
            SourceState::Errored => {
                return Err(StreamError::invalid_state(format!(
                    "read from failed source '{}'",
                    self.label
                )))
            }
            _ => {}
        }

        if let Some(chunk) = self.pop_buffered() {
            self.record(&chunk);
            return Ok(ReadResult::Chunk(chunk));
        }
        if let Some(err) = self.pending_error.take() {
            self.mark_errored(&err);
            return Err(err);
        }
        if self.exhausted {
            self.mark_ended();
            return Ok(ReadResult::End);
        }
        Ok(ReadResult::WouldBlock)
    }

    fn fill_read_ahead(&mut self, block_first: bool) {
        let mut blocking = block_first;
        while self.buffered < self.high_water_mark
            && !self.exhausted
            && self.pending_error.is_none()
        {
            let produced = if blocking {
                self.produce_blocking().map(|next| match next {
                    Some(chunk) => Produced::Chunk(chunk),
                    None => Produced::Done,
                })
            } else {
                self.producer.try_produce()
            };
            blocking = false;

            match produced {
                Ok(Produced::Chunk(chunk)) => {
                    self.buffered += weight_of(self.mode, &chunk);
                    self.buffer.push_back(chunk);
                }
                Ok(Produced::Done) => self.exhausted = true,
                Ok(Produced::NotReady) => break,
                // Queued behind the chunks produced before the failure.
                Err(err) => self.pending_error = Some(err),
            }
        }
    }

    fn ensure_pull(&self, operation: &str) -> StreamResult<()> {
        if self.attached == Some(ReadMode::Pull) {
            Ok(())
        } else {
            Err(StreamError::invalid_state(format!(
                "{} requires a pull-mode consumer",
                operation
            )))
        }
    }

    // ── Bookkeeping ──

    fn produce_blocking(&mut self) -> StreamResult<Option<T>> {
        match &self.cancel {
            Some(cancel) => self.producer.produce_until(cancel),
            None => self.producer.produce(),
        }
    }

    fn pop_buffered(&mut self) -> Option<T> {
        let chunk = self.buffer.pop_front()?;
        self.buffered = self.buffered.saturating_sub(weight_of(self.mode, &chunk));
        Some(chunk)
    }

    fn record(&mut self, chunk: &T) {
        self.stats.chunks += 1;
        self.stats.volume += weight_of(self.mode, chunk) as u64;
    }

    fn mark_ended(&mut self) {
        self.state = SourceState::Ended;
        tracing::debug!(
            "Source '{}' ended after {} chunks",
            self.label,
            self.stats.chunks
        );
    }

    fn mark_errored(&mut self, err: &StreamError) {
        self.state = SourceState::Errored;
        self.buffer.clear();
        self.buffered = 0;
        if err.is_cancelled() {
            tracing::debug!("Source '{}' cancelled", self.label);
        } else {
            tracing::warn!("Source '{}' failed: {}", self.label, err);
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("attached", &self.attached)
            .field("buffered", &self.buffered)
            .field("high_water_mark", &self.high_water_mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Consumer that records every notification it gets.
    #[derive(Default)]
    struct Recorder {
        chunks: Vec<&'static str>,
        ends: usize,
        errors: Vec<String>,
        pause_after: Option<usize>,
    }

    impl Consumer<&'static str> for Recorder {
        fn on_data(&mut self, chunk: &'static str) -> Demand {
            self.chunks.push(chunk);
            match self.pause_after {
                Some(n) if self.chunks.len() % n == 0 => Demand::Pause,
                _ => Demand::More,
            }
        }

        fn on_end(&mut self) {
            self.ends += 1;
        }

        fn on_error(&mut self, err: StreamError) {
            self.errors.push(err.to_string());
        }
    }

    #[test]
    fn test_push_delivers_in_order_then_ends_once() {
        let mut source = Source::from_items(vec!["The", "quick", "brown", "fox"]);
        source.attach(ReadMode::Push).unwrap();
        assert_eq!(source.state(), SourceState::Flowing);

        let mut rec = Recorder::default();
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Ended);
        assert_eq!(rec.chunks, vec!["The", "quick", "brown", "fox"]);
        assert_eq!(rec.ends, 1);
        assert_eq!(source.state(), SourceState::Ended);

        // Flowing an ended source does not notify again.
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Ended);
        assert_eq!(rec.ends, 1);
    }

    #[test]
    fn test_push_pause_and_resume() {
        let mut source = Source::from_items(vec!["a", "b", "c", "d"]);
        source.attach(ReadMode::Push).unwrap();

        let mut rec = Recorder {
            pause_after: Some(2),
            ..Default::default()
        };
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Paused);
        assert_eq!(rec.chunks, vec!["a", "b"]);
        assert_eq!(source.state(), SourceState::Paused);

        // Still paused: nothing is delivered.
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Paused);
        assert_eq!(rec.chunks.len(), 2);

        source.resume().unwrap();
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Paused);
        source.resume().unwrap();
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Ended);
        assert_eq!(rec.chunks, vec!["a", "b", "c", "d"]);
        assert_eq!(rec.ends, 1);
    }

    #[test]
    fn test_second_attach_is_rejected_for_every_mode_pair() {
        for first in [ReadMode::Push, ReadMode::Pull] {
            for second in [ReadMode::Push, ReadMode::Pull] {
                let mut source = Source::from_items(vec!["x"]);
                source.attach(first).unwrap();
                let err = source.attach(second).unwrap_err();
                assert!(matches!(err, StreamError::AlreadyConsumed));
            }
        }
    }

    #[test]
    fn test_attach_after_end_is_invalid_state() {
        let mut source = Source::from_items(Vec::<&'static str>::new());
        source.attach(ReadMode::Push).unwrap();
        let mut rec = Recorder::default();
        source.flow(&mut rec).unwrap();
        source.detach();

        let err = source.attach(ReadMode::Pull).unwrap_err();
        assert!(matches!(err, StreamError::InvalidState(_)));
    }

    #[test]
    fn test_generator_failure_is_delivered_once() {
        let mut calls = 0;
        let mut source = Source::try_from_generator(move || {
            calls += 1;
            match calls {
                1 => Some(Ok("a")),
                _ => Some(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reset"))),
            }
        });
        source.attach(ReadMode::Push).unwrap();

        let mut rec = Recorder::default();
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Errored);
        assert_eq!(rec.chunks, vec!["a"]);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.ends, 0);
        assert_eq!(source.state(), SourceState::Errored);

        assert!(source.flow(&mut rec).is_err());
        assert_eq!(rec.errors.len(), 1);
    }

    #[test]
    fn test_pull_reads_until_would_block_then_end_is_idempotent() {
        let mut n = 0;
        let mut source = Source::from_generator(move || {
            n += 1;
            (n <= 5).then_some(n)
        });
        source.attach(ReadMode::Pull).unwrap();
        assert_eq!(source.state(), SourceState::Paused);

        let mut seen = Vec::new();
        source.wait_readable().unwrap();
        loop {
            match source.read_next().unwrap() {
                ReadResult::Chunk(n) => seen.push(n),
                ReadResult::End => break,
                ReadResult::WouldBlock => source.wait_readable().unwrap(),
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        for _ in 0..3 {
            assert_eq!(source.read_next().unwrap(), ReadResult::End);
        }
        assert_eq!(source.state(), SourceState::Ended);
    }

    #[test]
    fn test_pull_read_ahead_respects_high_water_mark() {
        let mut source = Source::from_items(1..=10).with_high_water_mark(3);
        source.attach(ReadMode::Pull).unwrap();

        assert_eq!(source.read_next().unwrap(), ReadResult::WouldBlock);
        source.wait_readable().unwrap();

        let mut batch = Vec::new();
        while let ReadResult::Chunk(n) = source.read_next().unwrap() {
            batch.push(n);
        }
        assert_eq!(batch, vec![1, 2, 3]);
    }

    #[test]
    fn test_pull_failure_is_queued_behind_buffered_chunks() {
        let mut calls = 0;
        let mut source = Source::try_from_generator(move || {
            calls += 1;
            match calls {
                1 | 2 => Some(Ok(calls)),
                _ => Some(Err("device unplugged")),
            }
        });
        source.attach(ReadMode::Pull).unwrap();
        source.wait_readable().unwrap();

        assert_eq!(source.read_next().unwrap(), ReadResult::Chunk(1));
        assert_eq!(source.read_next().unwrap(), ReadResult::Chunk(2));
        assert!(matches!(source.read_next(), Err(StreamError::Producer(_))));
        assert!(matches!(source.read_next(), Err(StreamError::InvalidState(_))));
        assert_eq!(source.state(), SourceState::Errored);
    }

    #[test]
    fn test_modes_cannot_be_mixed() {
        let mut source = Source::from_items(vec![1, 2]);
        source.attach(ReadMode::Pull).unwrap();
        let mut sink = Vec::new();
        let mut consumer = fn_consumer(|n: i32| sink.push(n));
        assert!(source.flow(&mut consumer).is_err());
        assert!(source.resume().is_err());

        let mut push = Source::from_items(vec![1, 2]);
        push.attach(ReadMode::Push).unwrap();
        assert!(push.read_next().is_err());
    }

    #[test]
    fn test_detach_keeps_read_ahead_for_next_consumer() {
        let mut source = Source::from_items(vec![1, 2, 3]);
        source.attach(ReadMode::Pull).unwrap();
        source.wait_readable().unwrap();
        assert_eq!(source.read_next().unwrap(), ReadResult::Chunk(1));
        source.detach();
        assert_eq!(source.state(), SourceState::Idle);

        source.attach(ReadMode::Push).unwrap();
        let mut seen = Vec::new();
        let status = source.flow(&mut fn_consumer(|n| seen.push(n))).unwrap();
        assert_eq!(status, FlowStatus::Ended);
        assert_eq!(seen, vec![2, 3]);
    }

    #[test]
    fn test_destroy_is_terminal() {
        let mut source = Source::from_items(vec![1]);
        source.attach(ReadMode::Push).unwrap();
        source.destroy();
        assert_eq!(source.state(), SourceState::Errored);
        assert!(source.flow(&mut fn_consumer(|_: i32| {})).is_err());
    }

    #[test]
    fn test_cancel_interrupts_a_waiting_flow() {
        let (mut source, mut pusher) = Source::channel(StreamMode::Object);
        pusher.push("only").unwrap();
        let cancel = CancelHandle::new();
        source.attach(ReadMode::Push).unwrap();
        source.set_cancel_handle(cancel.clone());

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            cancel.cancel();
        });
        // The pusher stays open and idle; only the cancellation ends the flow.
        let mut rec = Recorder::default();
        assert_eq!(source.flow(&mut rec).unwrap(), FlowStatus::Errored);
        canceller.join().unwrap();

        assert_eq!(rec.chunks, vec!["only"]);
        assert_eq!(rec.errors, vec![StreamError::Cancelled.to_string()]);
        assert_eq!(source.state(), SourceState::Errored);
        drop(pusher);
    }
}
