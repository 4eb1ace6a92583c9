//! Error handling for the tapstream application
//!
//! This module defines the application-level error type and a Result alias
//! used by configuration and the command line. Streaming failures are
//! carried as [`StreamError`] and wrapped here.

use crate::pipeline::StreamError;
use thiserror::Error;

/// Main error type for tapstream operations
#[derive(Error, Debug)]
pub enum TapError {
    /// Errors raised by a source, sink or pipe
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TapError>,
    },
}

impl TapError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TapError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the innermost cause is a cancelled pipe
    pub fn is_cancelled(&self) -> bool {
        match self {
            TapError::Stream(err) => err.is_cancelled(),
            TapError::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for TapError {
    fn from(err: serde_json::Error) -> Self {
        TapError::Serialization(err.to_string())
    }
}

/// Result type alias for tapstream operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, StreamError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TapError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TapError::from(e).with_context(f()))
    }
}

impl<T> ResultExt<T> for std::io::Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TapError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TapError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TapError::Config("Unknown read mode".to_string());
        assert_eq!(err.to_string(), "Configuration error: Unknown read mode");
    }

    #[test]
    fn test_error_with_context() {
        let err = TapError::Serialization("test".to_string());
        let with_ctx = err.with_context("Failed to write record");
        assert!(with_ctx.to_string().contains("Failed to write record"));
    }

    #[test]
    fn test_stream_error_context_keeps_cancellation() {
        let result: std::result::Result<(), StreamError> = Err(StreamError::Cancelled);
        let err = result.context("copy a.bin -> b.bin").unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().starts_with("copy a.bin -> b.bin"));
    }

    #[test]
    fn test_io_error_context() {
        let result: std::io::Result<()> = Err(std::io::ErrorKind::NotFound.into());
        let err = result.with_context(|| "Failed to open in.csv".to_string()).unwrap_err();
        assert!(matches!(
            &err,
            TapError::WithContext { source, .. } if matches!(**source, TapError::Io(_))
        ));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_serde_json_error_is_serialization() {
        let err: TapError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, TapError::Serialization(_)));
    }
}
