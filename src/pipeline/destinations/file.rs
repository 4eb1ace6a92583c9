//! Buffered file destination.

use crate::config::SinkConfig;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{StreamError, StreamResult};
use crate::pipeline::sink::{Destination, Sink};
use crate::types::StreamMode;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes chunks to a file through a `BufWriter`.
///
/// `discard` closes the handle and removes the file, so a failed copy does
/// not leave a truncated output behind.
pub struct FileDestination {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileDestination {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: AsRef<[u8]>> Destination<T> for FileDestination {
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(chunk.as_ref()),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} is already closed", self.path.display()),
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => {
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()
            }
            None => Ok(()),
        }
    }

    fn discard(&mut self) -> io::Result<()> {
        self.writer = None;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

impl<T: Chunk + AsRef<[u8]>> Sink<T> {
    /// Byte-mode sink writing to a new file at `path`.
    pub fn create(path: impl AsRef<Path>, config: &SinkConfig) -> StreamResult<Self> {
        let path = path.as_ref();
        let dest = FileDestination::create(path).map_err(StreamError::consumer)?;
        tracing::debug!("Created sink file {:?}", path);

        let mut sink = Sink::new(dest, StreamMode::Bytes)
            .with_label(path.display().to_string())
            .with_flush_batch(config.flush_batch)
            .discard_on_failure(config.discard_partial_on_failure);
        if let Some(hwm) = config.high_water_mark {
            sink = sink.with_high_water_mark(hwm);
        }
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_close_persists_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let mut sink: Sink<Vec<u8>> = Sink::create(&path, &SinkConfig::default()).unwrap();

        sink.write(b"hello ".to_vec()).unwrap();
        sink.write(b"world".to_vec()).unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn test_discard_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");
        let config = SinkConfig {
            discard_partial_on_failure: true,
            ..SinkConfig::default()
        };
        let mut sink: Sink<Vec<u8>> = Sink::create(&path, &config).unwrap();
        sink.write(vec![1, 2, 3]).unwrap();

        sink.abort();
        assert!(!path.exists());
        // A second abort finds nothing to remove.
        sink.abort();
    }
}
