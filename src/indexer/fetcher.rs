use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::decoder::{self, DecodedTransfer};
use super::node::NodeClient;
use super::reorder::ReorderBuffer;
use super::retry::{Attempt, RetryFailure, RetryPolicy};
use super::types::{sort_canonical, FetchRange, FetchedChunk, TransferEvent};
use crate::error::{Error, FetchError, NodeError};
use crate::progress::{NoProgress, ProgressSink};

/// What to do with a sub-range that keeps failing after all retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Abort the whole fetch.
    #[default]
    Abort,
    /// Halve the sub-range and fetch both halves, down to the minimum width.
    Narrow,
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub max_chunk_width: u64,
    pub min_chunk_width: u64,
    pub concurrency: usize,
    pub on_exhausted: ExhaustionPolicy,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            max_chunk_width: 2000,
            min_chunk_width: 1,
            concurrency: 4,
            on_exhausted: ExhaustionPolicy::Abort,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Totals for a completed fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub chunks: u64,
    pub events: u64,
    pub blocks: u64,
}

/// Split `range` into consecutive sub-ranges of at most `max_width` blocks,
/// with no gaps and no overlaps.
pub fn plan_chunks(range: FetchRange, max_width: u64) -> Vec<FetchRange> {
    let max_width = max_width.max(1);
    let mut chunks = Vec::new();
    let mut current = range.start;

    loop {
        let chunk_end = current.saturating_add(max_width - 1).min(range.end);
        chunks.push(FetchRange::new(current, chunk_end));
        if chunk_end == range.end {
            break;
        }
        current = chunk_end + 1;
    }

    chunks
}

/// Fetches every Transfer event of one contract over a block range, chunk by
/// chunk, and hands the chunks downstream in ascending block order.
pub struct RangeFetcher<'a, N> {
    node: &'a N,
    contract: Address,
    settings: FetcherSettings,
    progress: &'a dyn ProgressSink,
    shutdown: CancellationToken,
}

impl<'a, N: NodeClient> RangeFetcher<'a, N> {
    pub fn new(node: &'a N, contract: Address, settings: FetcherSettings) -> Self {
        Self {
            node,
            contract,
            settings,
            progress: &NoProgress,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Current chain head, retried like any other node call.
    pub async fn chain_head(&self) -> Result<u64, FetchError> {
        self.settings
            .retry
            .run("eth_blockNumber", move |_| async move {
                Attempt::from(self.call(self.node.current_block_height()).await)
            })
            .await
            .map_err(|failure| FetchError::ChainHead {
                attempts: failure.attempts,
                source: failure.error,
            })
    }

    /// Fetch `range` and collect all events in canonical order.
    pub async fn fetch_all(&self, range: FetchRange) -> Result<Vec<TransferEvent>, Error> {
        let mut events = Vec::new();
        self.fetch_chunks(range, |chunk| {
            events.extend(chunk.events);
            Ok(())
        })
        .await?;
        Ok(events)
    }

    /// Fetch `range` with up to `concurrency` chunks in flight, calling
    /// `on_chunk` once per chunk in ascending block order.
    ///
    /// On the first fatal error, or when shutdown is signalled, the in-flight
    /// requests are dropped and the error is returned. Chunks already handed
    /// to `on_chunk` stay delivered; the caller must not treat them as a
    /// complete result.
    pub async fn fetch_chunks<F>(&self, range: FetchRange, mut on_chunk: F) -> Result<FetchSummary, Error>
    where
        F: FnMut(FetchedChunk) -> Result<(), Error>,
    {
        let chunks = plan_chunks(range, self.settings.max_chunk_width);
        let total_blocks = range.width();

        tracing::info!(
            contract = %self.contract,
            from = range.start,
            to = range.end,
            chunks = chunks.len(),
            concurrency = self.settings.concurrency,
            "Fetching transfer logs"
        );

        let in_flight = stream::iter(chunks)
            .map(move |chunk| async move { (chunk, self.fetch_chunk(chunk).await) })
            .buffer_unordered(self.settings.concurrency.max(1));
        let mut in_flight = std::pin::pin!(in_flight);

        let mut reorder = ReorderBuffer::new(range.start);
        let mut summary = FetchSummary::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!(next_block = reorder.next_block(), "Shutdown received, abandoning fetch");
                    return Err(FetchError::Cancelled.into());
                }
                next = in_flight.next() => next,
            };

            let Some((chunk, result)) = next else {
                break;
            };

            let events = match result {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!(range = %chunk, error = %e, "Chunk fetch failed, aborting");
                    return Err(e.into());
                }
            };

            reorder.insert(chunk, events);
            if reorder.buffered() > 1 {
                tracing::debug!(
                    waiting_for = reorder.next_block(),
                    buffered = reorder.buffered(),
                    "Chunk arrived out of order, buffering"
                );
            }

            while let Some((ready, events)) = reorder.pop_ready() {
                summary.chunks += 1;
                summary.events += events.len() as u64;
                summary.blocks += ready.width();

                on_chunk(FetchedChunk {
                    range: ready,
                    events,
                })?;
                self.progress.tick(summary.blocks, total_blocks);
            }
        }

        if !reorder.is_empty() || summary.blocks != total_blocks {
            return Err(FetchError::CoverageGap {
                next_block: reorder.next_block(),
            }
            .into());
        }

        tracing::info!(
            chunks = summary.chunks,
            events = summary.events,
            blocks = summary.blocks,
            "Fetch complete"
        );
        Ok(summary)
    }

    /// Fetch one planned chunk, narrowing it on repeated failure if allowed.
    async fn fetch_chunk(&self, chunk: FetchRange) -> Result<Vec<TransferEvent>, FetchError> {
        let mut pending = VecDeque::from([chunk]);
        let mut events = Vec::new();

        while let Some(range) = pending.pop_front() {
            match self.fetch_decoded(range).await {
                Ok(decoded) => events.extend(self.stamp(decoded).await?),
                Err(failure) => {
                    let (left, right) = self.narrow(range, failure)?;
                    pending.push_front(right);
                    pending.push_front(left);
                }
            }
        }

        sort_canonical(&mut events);
        Ok(events)
    }

    /// One log query for `range`, retried, decoded into transfers.
    async fn fetch_decoded(&self, range: FetchRange) -> Result<Vec<DecodedTransfer>, RetryFailure> {
        let signature = decoder::transfer_signature();
        let contract = self.contract;

        self.settings
            .retry
            .run("eth_getLogs", move |_| async move {
                let logs = match self
                    .call(self.node.fetch_logs(contract, signature, range.start, range.end))
                    .await
                {
                    Ok(logs) => logs,
                    Err(e) => return Attempt::from(Err(e)),
                };

                let decoded: Result<Vec<_>, NodeError> = logs
                    .iter()
                    .filter_map(|log| decoder::decode_transfer_log(log, contract, range).transpose())
                    .collect();
                Attempt::from(decoded)
            })
            .await
    }

    /// Decide what a failed sub-range turns into: two halves, or a fatal error.
    fn narrow(
        &self,
        range: FetchRange,
        failure: RetryFailure,
    ) -> Result<(FetchRange, FetchRange), FetchError> {
        let too_large = failure.error.is_range_too_large();

        if failure.fatal && !too_large {
            return Err(FetchError::Rejected {
                range,
                source: failure.error,
            });
        }

        if self.settings.on_exhausted == ExhaustionPolicy::Abort {
            return Err(if too_large {
                FetchError::RangeTooLarge {
                    range,
                    source: failure.error,
                }
            } else {
                FetchError::Exhausted {
                    range,
                    attempts: failure.attempts,
                    source: failure.error,
                }
            });
        }

        let halves = if range.width() > self.settings.min_chunk_width {
            range.split()
        } else {
            None
        };

        match halves {
            Some((left, right)) => {
                tracing::warn!(
                    range = %range,
                    left = %left,
                    right = %right,
                    error = %failure.error,
                    "Sub-range keeps failing, narrowing"
                );
                Ok((left, right))
            }
            None => Err(FetchError::NarrowingExhausted {
                range,
                min_width: self.settings.min_chunk_width,
                source: failure.error,
            }),
        }
    }

    /// Attach block timestamps, looking each distinct block up once.
    async fn stamp(&self, decoded: Vec<DecodedTransfer>) -> Result<Vec<TransferEvent>, FetchError> {
        let mut timestamps: HashMap<u64, DateTime<Utc>> = HashMap::new();
        let mut events = Vec::with_capacity(decoded.len());

        for transfer in decoded {
            let timestamp = match timestamps.get(&transfer.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = self.block_timestamp(transfer.block_number).await?;
                    timestamps.insert(transfer.block_number, ts);
                    ts
                }
            };
            events.push(transfer.into_event(timestamp));
        }

        Ok(events)
    }

    async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, FetchError> {
        let seconds = self
            .settings
            .retry
            .run("eth_getBlockByNumber", move |_| async move {
                Attempt::from(self.call(self.node.fetch_block_timestamp(block)).await)
            })
            .await
            .map_err(|failure| FetchError::Timestamp {
                block,
                attempts: failure.attempts,
                source: failure.error,
            })?;

        DateTime::from_timestamp(seconds as i64, 0).ok_or_else(|| FetchError::Timestamp {
            block,
            attempts: 1,
            source: NodeError::Malformed(format!("timestamp {} out of range", seconds)),
        })
    }

    /// Bound a node call by the request timeout.
    async fn call<T>(&self, request: impl Future<Output = Result<T, NodeError>>) -> Result<T, NodeError> {
        match tokio::time::timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout(
                self.settings.request_timeout.as_millis() as u64,
            )),
        }
    }
}
