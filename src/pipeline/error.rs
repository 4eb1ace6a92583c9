//! Stream-level error types.

use thiserror::Error;

/// Boxed error carried by producer and consumer failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while streaming chunks between a source and its sinks.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Source already has an active consumer")]
    AlreadyConsumed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Sink '{0}' is closed after a failed write")]
    ResourceClosed(String),

    #[error("Producer error: {0}")]
    Producer(#[source] BoxError),

    #[error("Consumer error: {0}")]
    Consumer(#[source] BoxError),

    #[error("Pipe cancelled")]
    Cancelled,
}

impl StreamError {
    /// Wrap a failure of the resource behind a source.
    pub fn producer(err: impl Into<BoxError>) -> Self {
        StreamError::Producer(err.into())
    }

    /// Wrap a failure of the resource behind a sink.
    pub fn consumer(err: impl Into<BoxError>) -> Self {
        StreamError::Consumer(err.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        StreamError::InvalidState(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
