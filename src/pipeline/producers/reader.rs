//! Producers over `std::io::Read` handles (files, sockets, stdin).
//!
//! [`ReaderProducer`] yields raw byte chunks of at most `chunk_size` bytes.
//! [`Utf8ReaderProducer`] yields `String` chunks and carries incomplete
//! multi-byte sequences over to the next read, so a character is never
//! split across two chunks. Invalid sequences are replaced with U+FFFD.

use crate::config::SourceConfig;
use crate::pipeline::error::{StreamError, StreamResult};
use crate::pipeline::producers::Producer;
use crate::pipeline::source::Source;
use crate::types::StreamMode;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read into `buf`, retrying on `Interrupted`.
fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Byte chunks from a reader.
pub struct ReaderProducer<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read + Send> ReaderProducer<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl<R: Read + Send> Producer<Vec<u8>> for ReaderProducer<R> {
    fn produce(&mut self) -> StreamResult<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = read_retrying(&mut self.reader, &mut buf).map_err(StreamError::producer)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}

/// UTF-8 text chunks from a reader.
pub struct Utf8ReaderProducer<R> {
    reader: R,
    chunk_size: usize,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: Read + Send> Utf8ReaderProducer<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(4),
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Decode as much of `pending` as possible.
    fn decode_pending(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None if self.eof => {
                            // Truncated sequence at end of input.
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.clear();
                            return out;
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}

impl<R: Read + Send> Producer<String> for Utf8ReaderProducer<R> {
    fn produce(&mut self) -> StreamResult<Option<String>> {
        let mut buf = vec![0u8; self.chunk_size];
        while !self.eof {
            let n = read_retrying(&mut self.reader, &mut buf).map_err(StreamError::producer)?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.pending.extend_from_slice(&buf[..n]);
            let text = self.decode_pending();
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.decode_pending()))
    }
}

impl Source<Vec<u8>> {
    /// Byte-mode source reading `chunk_size` bytes at a time.
    pub fn from_reader<R>(reader: R, chunk_size: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        Source::from_producer(ReaderProducer::new(reader, chunk_size), StreamMode::Bytes)
    }

    /// Byte-mode source over a file.
    pub fn open(path: impl AsRef<Path>, config: &SourceConfig) -> StreamResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(StreamError::producer)?;
        tracing::debug!("Opened source file {:?}", path);

        let mut source = Source::from_reader(file, config.chunk_size)
            .with_label(path.display().to_string());
        if let Some(hwm) = config.high_water_mark {
            source = source.with_high_water_mark(hwm);
        }
        Ok(source)
    }
}

impl Source<String> {
    /// Byte-mode source decoding UTF-8 text.
    pub fn from_reader_utf8<R>(reader: R, chunk_size: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        Source::from_producer(Utf8ReaderProducer::new(reader, chunk_size), StreamMode::Bytes)
    }

    /// Byte-mode text source over a file.
    pub fn open_text(path: impl AsRef<Path>, config: &SourceConfig) -> StreamResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(StreamError::producer)?;
        tracing::debug!("Opened text source file {:?}", path);

        let mut source = Source::from_reader_utf8(file, config.chunk_size)
            .with_label(path.display().to_string());
        if let Some(hwm) = config.high_water_mark {
            source = source.with_high_water_mark(hwm);
        }
        Ok(source)
    }
}
