use std::collections::BTreeMap;

use super::types::FetchRange;

/// Holds chunks that completed out of order and releases them strictly in
/// block order, keyed by chunk start block.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_start: u64,
    pending: BTreeMap<u64, (FetchRange, T)>,
}

impl<T> ReorderBuffer<T> {
    /// `first_block` is the start of the first chunk that will be released.
    pub fn new(first_block: u64) -> Self {
        Self {
            next_start: first_block,
            pending: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, range: FetchRange, item: T) {
        self.pending.insert(range.start, (range, item));
    }

    /// Release the chunk that continues the released prefix, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(FetchRange, T)> {
        let (range, item) = self.pending.remove(&self.next_start)?;
        self.next_start = range.end + 1;
        Some((range, item))
    }

    /// First block not yet released.
    pub fn next_block(&self) -> u64 {
        self.next_start
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_releases_in_block_order() {
        let mut buffer = ReorderBuffer::new(0);
        buffer.insert(FetchRange::new(2000, 3999), "b");
        buffer.insert(FetchRange::new(4000, 4999), "c");
        assert!(buffer.pop_ready().is_none());
        assert_eq!(buffer.buffered(), 2);

        buffer.insert(FetchRange::new(0, 1999), "a");
        let released: Vec<_> = std::iter::from_fn(|| buffer.pop_ready())
            .map(|(_, item)| item)
            .collect();

        assert_eq!(released, vec!["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_block(), 5000);
    }
}
