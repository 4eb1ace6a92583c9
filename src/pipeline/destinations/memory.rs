//! In-memory destination, mostly useful for collecting results and in tests.

use crate::pipeline::chunk::Chunk;
use crate::pipeline::sink::{Destination, Sink};
use crate::types::StreamMode;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct Collected<T> {
    chunks: Vec<T>,
    flushes: usize,
    closes: usize,
}

fn lock<T>(shared: &Mutex<Collected<T>>) -> MutexGuard<'_, Collected<T>> {
    // A panicking writer leaves the list consistent; keep reading it.
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Appends every chunk to a shared list.
pub struct MemoryDestination<T> {
    shared: Arc<Mutex<Collected<T>>>,
}

/// Read side of a [`MemoryDestination`], usable after the sink is gone.
#[derive(Debug)]
pub struct MemoryHandle<T> {
    shared: Arc<Mutex<Collected<T>>>,
}

impl<T> Clone for MemoryHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> MemoryDestination<T> {
    pub fn new() -> (Self, MemoryHandle<T>) {
        let shared = Arc::new(Mutex::new(Collected {
            chunks: Vec::new(),
            flushes: 0,
            closes: 0,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryHandle { shared },
        )
    }
}

impl<T: Clone + Send> Destination<T> for MemoryDestination<T> {
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        lock(&self.shared).chunks.push(chunk.clone());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        lock(&self.shared).flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        lock(&self.shared).closes += 1;
        Ok(())
    }

    fn discard(&mut self) -> io::Result<()> {
        lock(&self.shared).chunks.clear();
        Ok(())
    }
}

impl<T: Clone> MemoryHandle<T> {
    /// Snapshot of the chunks written so far.
    pub fn chunks(&self) -> Vec<T> {
        lock(&self.shared).chunks.clone()
    }
}

impl<T> MemoryHandle<T> {
    pub fn len(&self) -> usize {
        lock(&self.shared).chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the destination was released.
    pub fn close_count(&self) -> usize {
        lock(&self.shared).closes
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.shared).flushes
    }

    /// Move the collected chunks out, leaving the list empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut lock(&self.shared).chunks)
    }
}

impl<T: Chunk + Clone> Sink<T> {
    /// Sink collecting into memory, with a handle to inspect the result.
    pub fn memory(mode: StreamMode) -> (Self, MemoryHandle<T>) {
        let (dest, handle) = MemoryDestination::new();
        (Sink::new(dest, mode).with_label("memory"), handle)
    }
}
