use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use std::fmt;

/// Canonical replay order: block number, then log index within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub block_number: u64,
    pub log_index: u64,
}

/// A decoded token Transfer event with its block timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

/// Sort events into canonical replay order.
pub fn sort_canonical(events: &mut [TransferEvent]) {
    events.sort_by_key(TransferEvent::key);
}

/// Inclusive block range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchRange {
    pub start: u64,
    pub end: u64,
}

impl FetchRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty range {start}..={end}");
        Self { start, end }
    }

    /// Number of blocks covered.
    pub fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block <= self.end
    }

    /// Halve the range. Returns `None` for a single block.
    pub fn split(&self) -> Option<(FetchRange, FetchRange)> {
        if self.start == self.end {
            return None;
        }
        let mid = self.start + (self.end - self.start) / 2;
        Some((
            FetchRange::new(self.start, mid),
            FetchRange::new(mid + 1, self.end),
        ))
    }
}

impl fmt::Display for FetchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A log record as returned by the node, before decoding.
#[derive(Debug, Clone, Default)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

impl From<alloy::rpc::types::Log> for RawLog {
    fn from(log: alloy::rpc::types::Log) -> Self {
        Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        }
    }
}

/// Events of one chunk, in canonical order, released by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchedChunk {
    pub range: FetchRange,
    pub events: Vec<TransferEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_split_covers_range() {
        let range = FetchRange::new(100, 199);
        let (left, right) = range.split().unwrap();
        assert_eq!(left, FetchRange::new(100, 149));
        assert_eq!(right, FetchRange::new(150, 199));
        assert_eq!(left.width() + right.width(), range.width());

        let odd = FetchRange::new(0, 2);
        assert_eq!(
            odd.split(),
            Some((FetchRange::new(0, 1), FetchRange::new(2, 2)))
        );
        assert_eq!(FetchRange::new(7, 7).split(), None);
    }

    #[test]
    fn test_event_key_orders_by_block_then_log() {
        let a = EventKey { block_number: 10, log_index: 5 };
        let b = EventKey { block_number: 10, log_index: 6 };
        let c = EventKey { block_number: 11, log_index: 0 };
        assert!(a < b && b < c);
    }
}
