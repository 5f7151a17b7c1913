use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::indexer::types::FetchRange;

/// Crate-level error returned by the pipeline and export layers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("ledger integrity violated: {0}")]
    Ledger(#[from] LedgerError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single call across the node boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// The node itself reported a timeout.
    #[error("node timed out: {0}")]
    NodeTimeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("response too large: {0}")]
    RangeTooLarge(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl NodeError {
    /// Map a provider error message onto the taxonomy. Nodes disagree on
    /// wording, so this matches the phrases the common providers use.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
        {
            Self::RateLimited(message)
        } else if lower.contains("more than")
            || lower.contains("too many results")
            || lower.contains("response size")
            || lower.contains("limit exceeded")
            || lower.contains("block range")
            || lower.contains("range too large")
        {
            Self::RangeTooLarge(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::NodeTimeout(message)
        } else if lower.contains("invalid params")
            || lower.contains("invalid argument")
            || lower.contains("method not found")
        {
            Self::Rejected(message)
        } else if lower.contains("deserialize") || lower.contains("invalid type") {
            Self::Malformed(message)
        } else {
            Self::Transport(message)
        }
    }

    /// Whether retrying the identical request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::NodeTimeout(_)
                | Self::RateLimited(_)
                | Self::Transport(_)
                | Self::Malformed(_)
        )
    }

    pub fn is_range_too_large(&self) -> bool {
        matches!(self, Self::RangeTooLarge(_))
    }
}

/// Unrecoverable failure of a range fetch. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("blocks {range}: gave up after {attempts} attempts: {source}")]
    Exhausted {
        range: FetchRange,
        attempts: u32,
        #[source]
        source: NodeError,
    },

    #[error("blocks {range}: cannot narrow below {min_width} blocks: {source}")]
    NarrowingExhausted {
        range: FetchRange,
        min_width: u64,
        #[source]
        source: NodeError,
    },

    #[error("blocks {range}: response too large and narrowing is disabled: {source}")]
    RangeTooLarge {
        range: FetchRange,
        #[source]
        source: NodeError,
    },

    #[error("blocks {range}: request rejected by node: {source}")]
    Rejected {
        range: FetchRange,
        #[source]
        source: NodeError,
    },

    #[error("block {block}: timestamp lookup failed after {attempts} attempts: {source}")]
    Timestamp {
        block: u64,
        attempts: u32,
        #[source]
        source: NodeError,
    },

    #[error("chain head lookup failed after {attempts} attempts: {source}")]
    ChainHead {
        attempts: u32,
        #[source]
        source: NodeError,
    },

    #[error("coverage gap: no chunk was released starting at block {next_block}")]
    CoverageGap { next_block: u64 },

    #[error("fetch cancelled")]
    Cancelled,
}

/// Ledger integrity violations. Always fatal; balances are never clamped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(
        "negative balance for {address}: holds {balance}, transfer of {amount} at block {block_number} log {log_index} (tx {tx_hash})"
    )]
    NegativeBalance {
        address: Address,
        balance: U256,
        amount: U256,
        block_number: u64,
        log_index: u64,
        tx_hash: B256,
    },

    #[error("balance overflow for {address} at block {block_number} log {log_index}")]
    Overflow {
        address: Address,
        block_number: u64,
        log_index: u64,
    },

    #[error("duplicate event at block {block_number} log {log_index} (tx {tx_hash})")]
    Duplicate {
        block_number: u64,
        log_index: u64,
        tx_hash: B256,
    },

    #[error(
        "out-of-order event at block {block_number} log {log_index}: already applied up to block {last_block} log {last_log_index}"
    )]
    OutOfOrder {
        block_number: u64,
        log_index: u64,
        last_block: u64,
        last_log_index: u64,
    },

    #[error("cannot snapshot at block {as_of_block}: events up to block {last_applied_block} already applied")]
    SnapshotBehindReplay {
        as_of_block: u64,
        last_applied_block: u64,
    },

    #[error("conservation violated: balances sum to {held}, minted {minted}, burned {burned}")]
    ConservationViolated {
        held: U256,
        minted: U256,
        burned: U256,
    },
}
