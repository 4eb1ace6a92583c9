//! Sink: the consuming end of a pipe.
//!
//! A `Sink` owns a bounded write queue in front of a [`Destination`]. Writes
//! always land in the queue; the return value of [`Sink::write`] tells the
//! producer whether it should keep going (`true`) or wait for a drain
//! (`false`). The queue is emptied into the destination on service turns
//! ([`Sink::poll_drain`]) and when the sink is closed.
//!
//! ```text
//! write ──► queue ──poll_drain──► Destination
//!             │
//!             └─ weight ≥ high-water mark: write returns false,
//!                poll_drain reports Drained once the weight is back below it
//! ```

use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::chunk::{weight_of, Chunk};
use crate::pipeline::error::{StreamError, StreamResult};
use crate::types::StreamMode;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::Duration;

/// Default number of chunks handed to the destination per service turn.
pub const DEFAULT_FLUSH_BATCH: usize = 64;

/// Back-off while a destination keeps answering `WouldBlock` during close.
const CLOSE_RETRY: Duration = Duration::from_millis(1);

/// The resource behind a sink.
///
/// `write_chunk` may return [`io::ErrorKind::WouldBlock`] to refuse a chunk
/// for now; the sink keeps it queued and retries on a later turn. Any other
/// error is fatal for the sink.
pub trait Destination<T>: Send {
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release the resource. Called at most once.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Remove partial output after a failed pipe.
    fn discard(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Lifecycle state of a [`Sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    /// Flushed and released. Terminal.
    Closed,
    /// The destination failed. Terminal.
    Errored,
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkState::Open => "open",
            SinkState::Closed => "closed",
            SinkState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Outcome of a service turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// The sink is not backpressured.
    Idle,
    /// Still at or above the high-water mark.
    Waiting { flushed: usize },
    /// Back below the high-water mark. Reported once per backpressure episode.
    Drained,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Chunks accepted by `write`.
    pub writes: u64,
    /// Chunks handed to the destination.
    pub chunks_written: u64,
    /// Weighed volume handed to the destination.
    pub volume_written: u64,
    /// Number of `write` calls that returned `false`.
    pub backpressured: u64,
    pub drains: u64,
    /// Largest queue weight observed.
    pub peak_buffered: usize,
}

/// Consuming end of a pipe.
pub struct Sink<T> {
    label: String,
    destination: Box<dyn Destination<T>>,
    mode: StreamMode,
    high_water_mark: usize,
    flush_batch: usize,
    discard_on_failure: bool,
    state: SinkState,
    queue: VecDeque<T>,
    buffered: usize,
    needs_drain: bool,
    released: bool,
    stats: SinkStats,
}

impl<T: Chunk> Sink<T> {
    pub fn new(destination: impl Destination<T> + 'static, mode: StreamMode) -> Self {
        Self {
            label: "sink".to_string(),
            destination: Box::new(destination),
            mode,
            high_water_mark: mode.sink_high_water_mark(),
            flush_batch: DEFAULT_FLUSH_BATCH,
            discard_on_failure: false,
            state: SinkState::Open,
            queue: VecDeque::new(),
            buffered: 0,
            needs_drain: false,
            released: false,
            stats: SinkStats::default(),
        }
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark.max(1);
        self
    }

    pub fn with_flush_batch(mut self, flush_batch: usize) -> Self {
        self.flush_batch = flush_batch.max(1);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Ask the destination to remove its output when the sink is aborted.
    pub fn discard_on_failure(mut self, discard: bool) -> Self {
        self.discard_on_failure = discard;
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

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Weight currently queued.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// True between a `false` write and the matching drain.
    pub fn is_backpressured(&self) -> bool {
        self.needs_drain
    }

    /// Queue `chunk`. Returns `false` once the queue reaches the high-water
    /// mark; the chunk is queued either way.
    ///
    /// The check is `buffered >= high_water_mark` after queueing, so with a
    /// mark of 1 every write returns `false` and every write is followed by
    /// its own drain. Writing `a`, `b`, `c` to such a sink with a service
    /// turn after each write reports three drains, not two.
    pub fn write(&mut self, chunk: T) -> StreamResult<bool> {
        self.ensure_open("write")?;

        self.buffered += weight_of(self.mode, &chunk);
        self.queue.push_back(chunk);
        self.stats.writes += 1;
        self.stats.peak_buffered = self.stats.peak_buffered.max(self.buffered);

        if self.buffered >= self.high_water_mark {
            if !self.needs_drain {
                tracing::debug!(
                    "Sink '{}' reached high-water mark ({} >= {})",
                    self.label,
                    self.buffered,
                    self.high_water_mark
                );
            }
            self.needs_drain = true;
            self.stats.backpressured += 1;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Service turn: hand up to the flush batch to the destination and
    /// report whether a pending drain happened.
    pub fn poll_drain(&mut self) -> StreamResult<DrainStatus> {
        match self.state {
            SinkState::Open => {}
            SinkState::Closed => return Ok(DrainStatus::Idle),
            SinkState::Errored => return Err(StreamError::ResourceClosed(self.label.clone())),
        }

        let flushed = self.service(self.flush_batch)?;
        if !self.needs_drain {
            return Ok(DrainStatus::Idle);
        }
        if self.buffered < self.high_water_mark {
            self.needs_drain = false;
            self.stats.drains += 1;
            tracing::debug!("Sink '{}' drained", self.label);
            return Ok(DrainStatus::Drained);
        }
        Ok(DrainStatus::Waiting { flushed })
    }

    /// Hand every queued chunk to the destination and flush it.
    pub fn flush(&mut self) -> StreamResult<()> {
        self.ensure_open("flush")?;
        self.flush_queue(None)?;
        if let Err(err) = self.destination.flush() {
            return Err(self.fail(err));
        }
        Ok(())
    }

    /// Flush and release the destination. Idempotent once closed.
    ///
    /// Waits for as long as the destination keeps refusing chunks with
    /// `WouldBlock`; use [`close_until`](Sink::close_until) to bound that.
    pub fn close(&mut self) -> StreamResult<()> {
        self.close_inner(None)
    }

    /// [`close`](Sink::close) that gives up with `Cancelled` once `cancel`
    /// fires while chunks are still queued. The sink then stays open with
    /// its queue intact, ready for [`abort`](Sink::abort).
    pub fn close_until(&mut self, cancel: &CancelHandle) -> StreamResult<()> {
        self.close_inner(Some(cancel))
    }

    fn close_inner(&mut self, cancel: Option<&CancelHandle>) -> StreamResult<()> {
        match self.state {
            SinkState::Closed => return Ok(()),
            SinkState::Errored => return Err(StreamError::ResourceClosed(self.label.clone())),
            SinkState::Open => {}
        }

        self.flush_queue(cancel)?;
        self.released = true;
        if let Err(err) = self.destination.close() {
            return Err(self.fail(err));
        }

        self.state = SinkState::Closed;
        if self.needs_drain {
            self.needs_drain = false;
            self.stats.drains += 1;
        }
        tracing::debug!(
            "Sink '{}' closed after {} chunks",
            self.label,
            self.stats.chunks_written
        );
        Ok(())
    }

    /// Best-effort teardown after a failed pipe. Never fails; problems are
    /// logged. Queued chunks get a single pass at the destination, then the
    /// destination is released. Output is discarded when the sink was built
    /// with [`discard_on_failure`](Sink::discard_on_failure).
    pub fn abort(&mut self) {
        if self.released && !self.discard_on_failure {
            return;
        }

        if self.state == SinkState::Open {
            // One pass only: a stalled destination must not hold up teardown.
            match self.service(usize::MAX) {
                Ok(_) => self.state = SinkState::Closed,
                Err(err) => tracing::warn!("Sink '{}' failed during abort: {}", self.label, err),
            }
            if !self.queue.is_empty() {
                tracing::warn!(
                    "Sink '{}' aborted with {} unwritten chunks",
                    self.label,
                    self.queue.len()
                );
            }
        }
        self.release();

        if self.discard_on_failure {
            // Only once: the flag guards against a second abort.
            self.discard_on_failure = false;
            match self.destination.discard() {
                Ok(()) => tracing::debug!("Sink '{}' discarded partial output", self.label),
                Err(err) => tracing::warn!(
                    "Sink '{}' failed to discard partial output: {}",
                    self.label,
                    err
                ),
            }
        }
        self.queue.clear();
        self.buffered = 0;
        self.needs_drain = false;
    }

    // ── Internals ──

    fn ensure_open(&self, operation: &str) -> StreamResult<()> {
        match self.state {
            SinkState::Open => Ok(()),
            SinkState::Closed => Err(StreamError::invalid_state(format!(
                "{} on closed sink '{}'",
                operation, self.label
            ))),
            SinkState::Errored => Err(StreamError::ResourceClosed(self.label.clone())),
        }
    }

    /// Hand at most `limit` chunks to the destination. Returns how many
    /// were accepted; stops early on `WouldBlock`.
    fn service(&mut self, limit: usize) -> StreamResult<usize> {
        let mut flushed = 0;
        while flushed < limit {
            let Some(chunk) = self.queue.front() else {
                break;
            };
            match self.destination.write_chunk(chunk) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(self.fail(err)),
            }

            if let Some(chunk) = self.queue.pop_front() {
                let weight = weight_of(self.mode, &chunk);
                self.buffered = self.buffered.saturating_sub(weight);
                self.stats.chunks_written += 1;
                self.stats.volume_written += weight as u64;
            }
            flushed += 1;
        }
        Ok(flushed)
    }

    fn flush_queue(&mut self, cancel: Option<&CancelHandle>) -> StreamResult<()> {
        while !self.queue.is_empty() {
            if cancel.is_some_and(CancelHandle::is_cancelled) {
                return Err(StreamError::Cancelled);
            }
            if self.service(usize::MAX)? == 0 {
                std::thread::sleep(CLOSE_RETRY);
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: io::Error) -> StreamError {
        tracing::error!("Sink '{}' failed: {}", self.label, err);
        self.state = SinkState::Errored;
        self.needs_drain = false;
        StreamError::consumer(err)
    }

    /// Release the destination of a failed sink.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.destination.close() {
            tracing::warn!("Sink '{}' failed to release its destination: {}", self.label, err);
        }
    }
}

impl<T> Drop for Sink<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Best effort: chunks still queued are written out before release.
        if self.state == SinkState::Open {
            while let Some(chunk) = self.queue.pop_front() {
                if let Err(err) = self.destination.write_chunk(&chunk) {
                    tracing::warn!(
                        "Sink '{}' dropped with unwritten chunks: {}",
                        self.label,
                        err
                    );
                    break;
                }
            }
        }
        if let Err(err) = self.destination.close() {
            tracing::warn!("Sink '{}' failed to close on drop: {}", self.label, err);
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("buffered", &self.buffered)
            .field("high_water_mark", &self.high_water_mark)
            .field("needs_drain", &self.needs_drain)
            .finish()
    }
}
