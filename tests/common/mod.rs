//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use std::time::Duration;
use tapstream::pipeline::{PipeEvent, ReadResult, Source, StreamResult};

/// Upper bound for waiting on a pipe thread in tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Words of a well-known pangram, used as object chunks
pub fn words() -> Vec<String> {
    "The quick brown fox jumps over the lazy dog"
        .split(' ')
        .map(str::to_string)
        .collect()
}

/// Drive an attached pull-mode source to its end, collecting every chunk
pub fn drain_pull<T: tapstream::pipeline::Chunk>(source: &mut Source<T>) -> StreamResult<Vec<T>> {
    let mut chunks = Vec::new();
    source.wait_readable()?;
    loop {
        match source.read_next()? {
            ReadResult::Chunk(chunk) => chunks.push(chunk),
            ReadResult::End => return Ok(chunks),
            ReadResult::WouldBlock => source.wait_readable()?,
        }
    }
}

/// Collect pipe events until the terminal one, failing the test on timeout
pub fn events_until_terminal(events: &Receiver<PipeEvent>) -> Vec<PipeEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(test_timeout())
            .expect("pipe did not reach a terminal event in time");
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}
