//! The unit of data moved through a pipe.
//!
//! A chunk is opaque to the pipeline. The only thing the pipeline asks of it
//! is its size, so buffers can be bounded by a high-water mark. Whether that
//! size is the byte length or a flat count of 1 depends on the
//! [`StreamMode`] of the stream carrying it.

use crate::types::StreamMode;

/// A value that can travel through a [`Source`](super::Source) and
/// [`Sink`](super::Sink).
///
/// Object-mode values can implement this with an empty body.
pub trait Chunk: Send + 'static {
    /// Length in bytes when carried by a byte-mode stream.
    fn byte_len(&self) -> usize {
        1
    }
}

impl Chunk for Vec<u8> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for Box<[u8]> {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for String {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for &'static str {
    fn byte_len(&self) -> usize {
        self.len()
    }
}

impl Chunk for serde_json::Value {}

macro_rules! object_chunk {
    ($($ty:ty),* $(,)?) => {
        $(impl Chunk for $ty {})*
    };
}

object_chunk!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, bool, char);

/// Buffer weight of `chunk` under `mode`.
#[inline]
pub fn weight_of<T: Chunk>(mode: StreamMode, chunk: &T) -> usize {
    match mode {
        StreamMode::Bytes => chunk.byte_len(),
        StreamMode::Object => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_mode_uses_length() {
        assert_eq!(weight_of(StreamMode::Bytes, &vec![0u8; 10]), 10);
        assert_eq!(weight_of(StreamMode::Bytes, &"héllo".to_string()), 6);
    }

    #[test]
    fn test_object_mode_counts_chunks() {
        assert_eq!(weight_of(StreamMode::Object, &vec![0u8; 10]), 1);
        assert_eq!(weight_of(StreamMode::Object, &serde_json::json!({"a": 1})), 1);
    }
}
