//! Test data builders for sources

use std::io;
use tapstream::pipeline::Source;

/// Builder for object-mode sources that may fail part way through
pub struct ScriptedSource<T> {
    items: Vec<T>,
    fail_with: Option<String>,
    high_water_mark: Option<usize>,
}

impl<T: tapstream::pipeline::Chunk> ScriptedSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            fail_with: None,
            high_water_mark: None,
        }
    }

    /// Fail with `message` after the last item instead of ending
    pub fn then_fail(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn high_water_mark(mut self, hwm: usize) -> Self {
        self.high_water_mark = Some(hwm);
        self
    }

    pub fn build(self) -> Source<T> {
        let mut items = self.items.into_iter();
        let mut failure = self.fail_with;
        let source = Source::try_from_generator(move || match items.next() {
            Some(item) => Some(Ok(item)),
            None => failure
                .take()
                .map(|message| Err(io::Error::new(io::ErrorKind::ConnectionReset, message))),
        });
        match self.high_water_mark {
            Some(hwm) => source.with_high_water_mark(hwm),
            None => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapstream::pipeline::{fn_consumer, FlowStatus};
    use tapstream::types::ReadMode;

    #[test]
    fn test_scripted_source_fails_after_items() {
        let mut source = ScriptedSource::new(vec![1u32, 2]).then_fail("gone").build();
        source.attach(ReadMode::Push).unwrap();

        let mut seen = Vec::new();
        let status = source.flow(&mut fn_consumer(|n| seen.push(n))).unwrap();
        assert_eq!(status, FlowStatus::Errored);
        assert_eq!(seen, vec![1, 2]);
    }
}
