//! Any `std::io::Write` as a destination (stdout, sockets, buffers).

use crate::pipeline::chunk::Chunk;
use crate::pipeline::sink::{Destination, Sink};
use crate::types::StreamMode;
use std::io::{self, Write};

pub struct WriterDestination<W> {
    writer: Option<W>,
}

impl<W: Write + Send> WriterDestination<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    fn writer(&mut self) -> io::Result<&mut W> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "writer already closed"))
    }
}

impl<T, W> Destination<T> for WriterDestination<W>
where
    T: AsRef<[u8]>,
    W: Write + Send,
{
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        self.writer()?.write_all(chunk.as_ref())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<T: Chunk + AsRef<[u8]>> Sink<T> {
    /// Byte-mode sink over a writer.
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Sink::new(WriterDestination::new(writer), StreamMode::Bytes).with_label("writer")
    }
}
