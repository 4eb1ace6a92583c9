//! Identity types for pipes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_PIPE_ID: AtomicU32 = AtomicU32::new(0);

/// Process-unique identifier of a pipe, used to correlate log lines and reports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeId(pub u32);

impl PipeId {
    pub const INVALID: PipeId = PipeId(u32::MAX);

    /// Allocate the next identifier.
    pub fn next() -> Self {
        PipeId(NEXT_PIPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "PipeId(INVALID)")
        } else {
            write!(f, "PipeId({})", self.0)
        }
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
