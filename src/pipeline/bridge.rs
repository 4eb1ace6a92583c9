//! Thread boundary between a running pipe and the code that started it.
//!
//! [`spawn`] moves a source and its sinks onto a dedicated thread and hands
//! back a [`PipeHandle`]. The handle cancels the pipe, streams its lifecycle
//! events, and returns both ends when joined.

use crate::config::PipeSettings;
use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{StreamError, StreamResult};
use crate::pipeline::id::PipeId;
use crate::pipeline::pipe::{Pipe, PipeReport};
use crate::pipeline::sink::Sink;
use crate::pipeline::source::Source;
use crate::types::ReadMode;
use crossbeam_channel::{unbounded, Receiver};
use std::thread::JoinHandle;

/// Lifecycle events of a pipe. Exactly one of `Completed`, `Failed` or
/// `Cancelled` is sent per run, and it is the last event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipeEvent {
    Started(PipeId),
    /// Waiting for a backpressured sink.
    Paused,
    Resumed,
    Completed(PipeReport),
    Failed(String),
    Cancelled,
}

impl PipeEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipeEvent::Completed(_) | PipeEvent::Failed(_) | PipeEvent::Cancelled
        )
    }
}

/// Both ends of a finished pipe together with its result.
#[derive(Debug)]
pub struct PipeOutcome<T> {
    pub result: StreamResult<PipeReport>,
    pub source: Source<T>,
    pub sinks: Vec<Sink<T>>,
}

/// Caller-side handle of a spawned pipe.
///
/// Dropping the handle without joining cancels the pipe.
pub struct PipeHandle<T> {
    cancel: CancelHandle,
    events: Receiver<PipeEvent>,
    thread: Option<JoinHandle<PipeOutcome<T>>>,
}

impl<T> PipeHandle<T> {
    /// Request teardown; the pipe fails with `Cancelled` at its next
    /// suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn events(&self) -> &Receiver<PipeEvent> {
        &self.events
    }

    /// Drain the events received so far without blocking.
    pub fn drain_events(&self) -> Vec<PipeEvent> {
        self.events.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the pipe thread and take back both ends.
    pub fn join(mut self) -> StreamResult<PipeOutcome<T>> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| StreamError::invalid_state("pipe already joined"))?;
        thread
            .join()
            .map_err(|_| StreamError::invalid_state("pipe thread panicked"))
    }
}

impl<T> Drop for PipeHandle<T> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Run a pipe from `source` to `sinks` on its own thread.
///
/// `mode` overrides the read mode of `settings`.
pub fn spawn<T: Chunk + Clone>(
    mut source: Source<T>,
    mut sinks: Vec<Sink<T>>,
    mode: ReadMode,
    settings: &PipeSettings,
) -> StreamResult<PipeHandle<T>> {
    if sinks.is_empty() {
        return Err(StreamError::invalid_state("cannot spawn a pipe without sinks"));
    }

    let cancel = CancelHandle::new();
    let (event_tx, event_rx) = unbounded();
    let settings = settings.clone();
    let pipe_cancel = cancel.clone();

    let thread = std::thread::Builder::new()
        .name(format!("pipe-{}", source.label()))
        .spawn(move || {
            let result = {
                let mut pipe = Pipe::new(&mut source)
                    .with_settings(&settings)
                    .mode(mode)
                    .with_cancel(pipe_cancel)
                    .with_events(event_tx);
                for sink in sinks.iter_mut() {
                    pipe = pipe.to(sink);
                }
                pipe.run()
            };
            PipeOutcome {
                result,
                source,
                sinks,
            }
        })
        .map_err(|e| StreamError::invalid_state(format!("failed to spawn pipe thread: {}", e)))?;

    Ok(PipeHandle {
        cancel,
        events: event_rx,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sink::SinkState;
    use crate::pipeline::source::SourceState;
    use crate::types::StreamMode;

    #[test]
    fn test_spawned_pipe_returns_both_ends() {
        let source = Source::from_items((1..=100).collect::<Vec<u32>>());
        let (sink, handle) = Sink::memory(StreamMode::Object);

        let pipe = spawn(source, vec![sink], ReadMode::Push, &PipeSettings::default()).unwrap();
        let outcome = pipe.join().unwrap();

        let report = outcome.result.unwrap();
        assert_eq!(report.chunks, 100);
        assert_eq!(outcome.source.state(), SourceState::Ended);
        assert_eq!(outcome.sinks[0].state(), SinkState::Closed);
        assert_eq!(handle.len(), 100);
    }

    #[test]
    fn test_cancel_emits_single_terminal_event() {
        let (source, mut pusher) = Source::channel(StreamMode::Object);
        let (sink, handle) = Sink::memory(StreamMode::Object);
        pusher.push(1u32).unwrap();

        let pipe = spawn(source, vec![sink], ReadMode::Pull, &PipeSettings::default()).unwrap();
        assert!(matches!(
            pipe.events().recv().unwrap(),
            PipeEvent::Started(_)
        ));

        pipe.cancel();
        let events = pipe.events().clone();
        let outcome = pipe.join().unwrap();

        assert!(outcome.result.unwrap_err().is_cancelled());
        let terminal: Vec<_> = events.try_iter().filter(PipeEvent::is_terminal).collect();
        assert_eq!(terminal, vec![PipeEvent::Cancelled]);
        assert_eq!(outcome.source.state(), SourceState::Errored);
        assert_eq!(handle.close_count(), 1);
        drop(pusher);
    }

    #[test]
    fn test_spawn_without_sinks_is_rejected() {
        let source = Source::from_items(vec![1u32]);
        let result = spawn(source, Vec::new(), ReadMode::Push, &PipeSettings::default());
        assert!(matches!(result, Err(StreamError::InvalidState(_))));
    }
}
