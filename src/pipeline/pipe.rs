//! Pipe coordinator: moves chunks from one source to one or more sinks.
//!
//! Each run goes through:
//! 1. Attach to the source in the configured read mode.
//! 2. Forward every chunk to every sink in registration order.
//! 3. Give each sink a service turn; while any sink is backpressured, stop
//!    reading and poll until it drains.
//! 4. On end, close the sinks in order. On failure or cancellation, destroy
//!    the source and abort every sink.
//!
//! ```text
//! Idle ──run──► Piping ──source end, sinks closed──► Completed
//!                  └────failure / cancel────────────► Failed
//! ```

use crate::config::PipeSettings;
use crate::pipeline::bridge::PipeEvent;
use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{StreamError, StreamResult};
use crate::pipeline::id::PipeId;
use crate::pipeline::sink::{DrainStatus, Sink};
use crate::pipeline::source::{Consumer, Demand, FlowStatus, ReadResult, Source};
use crate::types::{ReadMode, StreamMode};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default pause between drain polls when no sink made progress.
pub const DEFAULT_DRAIN_RETRY: Duration = Duration::from_millis(2);

/// Externally visible state of a pipe. Waiting for a drain is part of
/// `Piping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Idle,
    Piping,
    Completed,
    Failed,
}

impl fmt::Display for PipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipeState::Idle => "idle",
            PipeState::Piping => "piping",
            PipeState::Completed => "completed",
            PipeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a completed pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeReport {
    pub pipe_id: PipeId,
    pub read_mode: ReadMode,
    pub stream_mode: StreamMode,
    /// Chunks taken from the source.
    pub chunks: u64,
    /// Weighed volume taken from the source.
    pub volume: u64,
    /// Times the source was paused for a drain.
    pub pauses: u64,
    pub sinks: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipeReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Connects a source to its sinks. See the module docs for the run loop.
///
/// The pipe borrows both ends; they outlive it and can be inspected after
/// `run` returns.
pub struct Pipe<'a, T> {
    id: PipeId,
    source: &'a mut Source<T>,
    sinks: Vec<&'a mut Sink<T>>,
    read_mode: ReadMode,
    drain_retry: Duration,
    cancel: CancelHandle,
    events: Option<Sender<PipeEvent>>,
    state: PipeState,
    attached: bool,
    pauses: u64,
}

impl<'a, T: Chunk + Clone> Pipe<'a, T> {
    pub fn new(source: &'a mut Source<T>) -> Self {
        Self {
            id: PipeId::next(),
            source,
            sinks: Vec::new(),
            read_mode: ReadMode::Push,
            drain_retry: DEFAULT_DRAIN_RETRY,
            cancel: CancelHandle::new(),
            events: None,
            state: PipeState::Idle,
            attached: false,
            pauses: 0,
        }
    }

    /// Register a sink. Chunks reach sinks in registration order.
    pub fn to(mut self, sink: &'a mut Sink<T>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    /// Share an existing cancellation handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report lifecycle events on `events`.
    pub fn with_events(mut self, events: Sender<PipeEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_settings(mut self, settings: &PipeSettings) -> Self {
        self.read_mode = settings.read_mode;
        self.drain_retry = Duration::from_millis(settings.drain_retry_ms);
        self
    }

    pub fn id(&self) -> PipeId {
        self.id
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the pipe to completion on the calling thread.
    ///
    /// Returns the single terminal outcome. A pipe runs once; a second call
    /// is `InvalidState`.
    pub fn run(&mut self) -> StreamResult<PipeReport> {
        if self.state != PipeState::Idle {
            return Err(StreamError::invalid_state(format!(
                "{} already ran ({})",
                self.id, self.state
            )));
        }
        if self.sinks.is_empty() {
            return Err(StreamError::invalid_state(format!("{} has no sinks", self.id)));
        }

        self.state = PipeState::Piping;
        let started_at = Utc::now();
        tracing::info!(
            "{} started: '{}' -> {} sink(s), {} mode",
            self.id,
            self.source.label(),
            self.sinks.len(),
            self.read_mode
        );
        self.emit(PipeEvent::Started(self.id));

        let result = self.pipe_all().and_then(|()| self.close_sinks());
        match result {
            Ok(()) => {
                self.source.detach();
                self.state = PipeState::Completed;
                let stats = self.source.stats();
                let report = PipeReport {
                    pipe_id: self.id,
                    read_mode: self.read_mode,
                    stream_mode: self.source.mode(),
                    chunks: stats.chunks,
                    volume: stats.volume,
                    pauses: self.pauses,
                    sinks: self.sinks.len(),
                    started_at,
                    finished_at: Utc::now(),
                };
                tracing::info!(
                    "{} completed: {} chunks, {} {}, {} pauses",
                    self.id,
                    report.chunks,
                    report.volume,
                    report.stream_mode,
                    report.pauses
                );
                self.emit(PipeEvent::Completed(report.clone()));
                Ok(report)
            }
            Err(err) => {
                self.teardown();
                self.state = PipeState::Failed;
                if err.is_cancelled() {
                    tracing::info!("{} cancelled", self.id);
                    self.emit(PipeEvent::Cancelled);
                } else {
                    tracing::error!("{} failed: {}", self.id, err);
                    self.emit(PipeEvent::Failed(err.to_string()));
                }
                Err(err)
            }
        }
    }

    fn pipe_all(&mut self) -> StreamResult<()> {
        self.check_cancel()?;
        self.source.attach(self.read_mode)?;
        self.attached = true;
        self.source.set_cancel_handle(self.cancel.clone());
        match self.read_mode {
            ReadMode::Push => self.run_push(),
            ReadMode::Pull => self.run_pull(),
        }
    }

    fn run_push(&mut self) -> StreamResult<()> {
        loop {
            self.check_cancel()?;

            let mut forwarder = Forwarder {
                sinks: &mut self.sinks,
                cancel: &self.cancel,
                failure: None,
                backpressured: false,
            };
            let status = self.source.flow(&mut forwarder)?;
            let Forwarder {
                failure,
                backpressured,
                ..
            } = forwarder;
            if let Some(err) = failure {
                return Err(err);
            }

            match status {
                FlowStatus::Ended => return Ok(()),
                FlowStatus::Errored => {
                    return Err(StreamError::invalid_state(
                        "source failed without reporting an error",
                    ))
                }
                FlowStatus::Paused => {
                    if backpressured {
                        self.wait_for_drain()?;
                    }
                    self.check_cancel()?;
                    self.source.resume()?;
                }
            }
        }
    }

    fn run_pull(&mut self) -> StreamResult<()> {
        loop {
            self.check_cancel()?;
            self.source.wait_readable()?;

            loop {
                self.check_cancel()?;
                match self.source.read_next()? {
                    ReadResult::Chunk(chunk) => {
                        forward(&mut self.sinks, chunk)?;
                        if service(&mut self.sinks)? {
                            self.wait_for_drain()?;
                        }
                    }
                    ReadResult::End => return Ok(()),
                    ReadResult::WouldBlock => break,
                }
            }
        }
    }

    /// Poll backpressured sinks until all of them drained.
    fn wait_for_drain(&mut self) -> StreamResult<()> {
        self.pauses += 1;
        tracing::debug!("{} paused for drain", self.id);
        self.emit(PipeEvent::Paused);

        loop {
            self.check_cancel()?;

            let mut waiting = false;
            let mut progressed = false;
            for sink in self.sinks.iter_mut() {
                match sink.poll_drain()? {
                    DrainStatus::Idle => {}
                    DrainStatus::Drained => progressed = true,
                    DrainStatus::Waiting { flushed } => {
                        waiting = true;
                        progressed |= flushed > 0;
                    }
                }
            }
            if !waiting {
                break;
            }
            if !progressed {
                std::thread::sleep(self.drain_retry);
            }
        }

        tracing::debug!("{} resumed", self.id);
        self.emit(PipeEvent::Resumed);
        Ok(())
    }

    /// Close the sinks in order. A destination that stalls while its queue
    /// is flushed is abandoned once the pipe is cancelled.
    fn close_sinks(&mut self) -> StreamResult<()> {
        for sink in self.sinks.iter_mut() {
            sink.close_until(&self.cancel)?;
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if self.attached {
            self.source.destroy();
            self.source.detach();
        }
        for sink in self.sinks.iter_mut() {
            sink.abort();
        }
    }

    fn check_cancel(&self) -> StreamResult<()> {
        if self.cancel.is_cancelled() {
            Err(StreamError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: PipeEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Write `chunk` to every sink. Returns whether all of them accepted it
/// without crossing their high-water mark.
fn forward<T: Chunk + Clone>(sinks: &mut [&mut Sink<T>], chunk: T) -> StreamResult<bool> {
    let mut accepting = true;
    if let Some((last, rest)) = sinks.split_last_mut() {
        for sink in rest {
            accepting &= sink.write(chunk.clone())?;
        }
        accepting &= last.write(chunk)?;
    }
    Ok(accepting)
}

/// One service turn per sink. Returns whether any sink is still
/// backpressured afterwards.
fn service<T: Chunk>(sinks: &mut [&mut Sink<T>]) -> StreamResult<bool> {
    let mut backpressured = false;
    for sink in sinks.iter_mut() {
        sink.poll_drain()?;
        backpressured |= sink.is_backpressured();
    }
    Ok(backpressured)
}

/// Push-mode consumer that fans chunks out to the sinks.
struct Forwarder<'p, 'a, T> {
    sinks: &'p mut Vec<&'a mut Sink<T>>,
    cancel: &'p CancelHandle,
    failure: Option<StreamError>,
    backpressured: bool,
}

impl<T: Chunk + Clone> Consumer<T> for Forwarder<'_, '_, T> {
    fn on_data(&mut self, chunk: T) -> Demand {
        let outcome = forward(self.sinks, chunk).and_then(|_| service(self.sinks));
        match outcome {
            Ok(backpressured) => {
                self.backpressured = backpressured;
                if backpressured || self.cancel.is_cancelled() {
                    Demand::Pause
                } else {
                    Demand::More
                }
            }
            Err(err) => {
                self.failure = Some(err);
                Demand::Pause
            }
        }
    }

    fn on_error(&mut self, err: StreamError) {
        self.failure = Some(err);
    }
}
