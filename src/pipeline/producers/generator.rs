//! Closure-driven producers for lazily computed, possibly infinite sequences.
//!
//! A generator is consumed as it runs; there is no way to restart it.

use crate::pipeline::error::{BoxError, StreamError, StreamResult};
use crate::pipeline::producers::Producer;

/// Infallible generator: `None` ends the sequence.
pub struct GeneratorProducer<F> {
    generate: F,
}

impl<F> GeneratorProducer<F> {
    pub fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<T, F> Producer<T> for GeneratorProducer<F>
where
    F: FnMut() -> Option<T> + Send,
{
    fn produce(&mut self) -> StreamResult<Option<T>> {
        Ok((self.generate)())
    }
}

/// Generator that can fail; an `Err` becomes a producer error.
pub struct FallibleGeneratorProducer<F> {
    generate: F,
}

impl<F> FallibleGeneratorProducer<F> {
    pub fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<T, E, F> Producer<T> for FallibleGeneratorProducer<F>
where
    F: FnMut() -> Option<Result<T, E>> + Send,
    E: Into<BoxError>,
{
    fn produce(&mut self) -> StreamResult<Option<T>> {
        (self.generate)()
            .transpose()
            .map_err(StreamError::producer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinite_generator_is_lazy() {
        let mut n = 0u64;
        let mut producer = GeneratorProducer::new(move || {
            n += 1;
            Some(n)
        });
        for expected in 1..=1000 {
            assert_eq!(producer.produce().unwrap(), Some(expected));
        }
    }

    #[test]
    fn test_fallible_generator_maps_errors() {
        let mut items = vec![Err("boom"), Ok("a")];
        let mut producer = FallibleGeneratorProducer::new(move || items.pop());
        assert_eq!(producer.produce().unwrap(), Some("a"));
        assert!(matches!(producer.produce(), Err(StreamError::Producer(_))));
    }
}
