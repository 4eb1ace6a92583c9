//! Mock destinations and recording helpers

use mockall::mock;
use std::fmt::Debug;
use std::io;
use std::sync::{Arc, Mutex};
use tapstream::pipeline::Destination;

mock! {
    pub Dest {}

    impl Destination<String> for Dest {
        fn write_chunk(&mut self, chunk: &String) -> io::Result<()>;
        fn flush(&mut self) -> io::Result<()>;
        fn close(&mut self) -> io::Result<()>;
        fn discard(&mut self) -> io::Result<()>;
    }
}

/// Shared, ordered log of what every [`Recording`] destination saw
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn destination(&self, name: &'static str) -> Recording {
        Recording {
            name,
            log: self.clone(),
        }
    }
}

/// Destination that logs `name <- chunk` and `name closed` entries
pub struct Recording {
    name: &'static str,
    log: EventLog,
}

impl<T: Debug> Destination<T> for Recording {
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        self.log.push(format!("{} <- {:?}", self.name, chunk));
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.log.push(format!("{} closed", self.name));
        Ok(())
    }
}

/// Destination that refuses every write with `WouldBlock` until the gate
/// opens, then accepts everything
#[derive(Clone, Default)]
pub struct Gate(Arc<Mutex<bool>>);

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        *self.0.lock().unwrap() = true;
    }

    pub fn destination<T>(&self, written: Arc<Mutex<Vec<T>>>) -> GatedDestination<T> {
        GatedDestination {
            gate: self.clone(),
            written,
        }
    }
}

pub struct GatedDestination<T> {
    gate: Gate,
    written: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send> Destination<T> for GatedDestination<T> {
    fn write_chunk(&mut self, chunk: &T) -> io::Result<()> {
        if !*self.gate.0.lock().unwrap() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.written.lock().unwrap().push(chunk.clone());
        Ok(())
    }
}

/// Destination whose writes fail once `budget` chunks were accepted
pub struct Flaky {
    budget: usize,
}

impl Flaky {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }
}

impl<T> Destination<T> for Flaky {
    fn write_chunk(&mut self, _chunk: &T) -> io::Result<()> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        self.budget -= 1;
        Ok(())
    }
}
