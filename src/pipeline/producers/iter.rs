//! Producer over an iterator (finite collections, ranges).

use crate::pipeline::error::StreamResult;
use crate::pipeline::producers::Producer;

pub struct IterProducer<I> {
    iter: I,
}

impl<I> IterProducer<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<T, I> Producer<T> for IterProducer<I>
where
    I: Iterator<Item = T> + Send,
{
    fn produce(&mut self) -> StreamResult<Option<T>> {
        Ok(self.iter.next())
    }
}
