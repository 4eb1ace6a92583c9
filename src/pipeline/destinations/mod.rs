//! Built-in destinations behind a [`Sink`](super::Sink).

pub mod callback;
pub mod file;
pub mod memory;
pub mod writer;

pub use callback::CallbackDestination;
pub use file::FileDestination;
pub use memory::{MemoryDestination, MemoryHandle};
pub use writer::WriterDestination;
