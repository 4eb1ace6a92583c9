//! Line-by-line producer over a buffered reader.

use crate::pipeline::error::{StreamError, StreamResult};
use crate::pipeline::producers::Producer;
use crate::pipeline::source::Source;
use crate::types::StreamMode;
use std::io::BufRead;

/// One `String` per line with the `\n` or `\r\n` terminator stripped.
///
/// A final line without terminator is still produced. Invalid UTF-8 fails
/// the producer.
pub struct LinesProducer<R> {
    reader: R,
    line_no: u64,
}

impl<R: BufRead + Send> LinesProducer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }

    /// Number of lines produced so far.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead + Send> Producer<String> for LinesProducer<R> {
    fn produce(&mut self) -> StreamResult<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(StreamError::producer)?;
        if n == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        self.line_no += 1;
        Ok(Some(line))
    }
}

impl Source<String> {
    /// Object-mode source emitting one chunk per line.
    pub fn lines<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Source::from_producer(LinesProducer::new(reader), StreamMode::Object)
    }
}
