use alloy::primitives::Address;
use tokio_util::sync::CancellationToken;

use crate::analytics::{
    daily_stats, flow_summary, history_point, holder_summary, holders::ranked_holders,
    trading_summary, DailyFill, DailyStat, FlowSummary, HistoryPoint, HolderRow, HolderSummary,
    TradingSummary,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::indexer::fetcher::{FetchSummary, RangeFetcher};
use crate::indexer::node::NodeClient;
use crate::indexer::types::{sort_canonical, FetchRange, FetchedChunk, TransferEvent};
use crate::ledger::{Applied, LedgerReplayer, LedgerSnapshot, ReplayStats, Sentinels};
use crate::progress::ProgressSink;

/// Everything a completed run produces.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub contract: Address,
    pub decimals: u8,
    pub range: FetchRange,
    pub snapshot: LedgerSnapshot,
    /// Every holder, ranked.
    pub holders: Vec<HolderRow>,
    pub summary: HolderSummary,
    pub daily: Vec<DailyStat>,
    pub flow: FlowSummary,
    /// Buy and sell activity against `pools`.
    pub trading: TradingSummary,
    pub pools: Vec<Address>,
    pub history: Vec<HistoryPoint>,
    pub replay: ReplayStats,
    /// Absent for offline reanalysis.
    pub fetch: Option<FetchSummary>,
    /// Applied events in canonical order.
    pub events: Vec<TransferEvent>,
}

/// Blocks at which a holder-history point is due: `start + k * interval - 1`,
/// strictly before the end block. The end block is recorded separately.
#[derive(Debug)]
struct Checkpoints {
    interval: Option<u64>,
    next: Option<u64>,
    end: u64,
}

impl Checkpoints {
    fn new(range: FetchRange, interval: Option<u64>) -> Self {
        let next = interval
            .filter(|i| *i > 0)
            .and_then(|i| range.start.checked_add(i - 1))
            .filter(|block| *block < range.end);
        Self {
            interval,
            next,
            end: range.end,
        }
    }

    /// Pop the next checkpoint if it lies before `block`.
    fn due_before(&mut self, block: u64) -> Option<u64> {
        let due = self.next.filter(|cp| *cp < block)?;
        self.next = self
            .interval
            .and_then(|i| due.checked_add(i))
            .filter(|cp| *cp < self.end);
        Some(due)
    }
}

/// Single-writer replay state shared by the online and offline paths.
struct Replay {
    ledger: LedgerReplayer,
    checkpoints: Checkpoints,
    history: Vec<HistoryPoint>,
    events: Vec<TransferEvent>,
    pools: Vec<Address>,
}

impl Replay {
    fn new(config: &Config, resolved: Resolved, range: FetchRange) -> Self {
        Self {
            ledger: LedgerReplayer::new(resolved.sentinels, config.ledger.duplicate_policy),
            checkpoints: Checkpoints::new(range, config.ledger.checkpoint_interval),
            history: Vec::new(),
            events: Vec::new(),
            pools: resolved.pools,
        }
    }

    fn record_checkpoints_before(&mut self, block: u64) -> Result<()> {
        while let Some(cp) = self.checkpoints.due_before(block) {
            let snapshot = self.ledger.snapshot(cp)?;
            tracing::debug!(
                block = cp,
                holders = snapshot.holder_count(),
                "Holder history checkpoint"
            );
            self.history.push(history_point(&snapshot));
        }
        Ok(())
    }

    fn apply(&mut self, event: TransferEvent) -> Result<()> {
        self.record_checkpoints_before(event.block_number)?;
        if self.ledger.apply(&event)? == Applied::Applied {
            self.events.push(event);
        }
        Ok(())
    }

    fn apply_chunk(&mut self, chunk: FetchedChunk) -> Result<()> {
        tracing::debug!(range = %chunk.range, events = chunk.events.len(), "Replaying chunk");
        for event in chunk.events {
            self.apply(event)?;
        }
        Ok(())
    }

    fn finish(
        mut self,
        config: &Config,
        contract: Address,
        range: FetchRange,
        fetch: Option<FetchSummary>,
    ) -> Result<AnalysisReport> {
        self.record_checkpoints_before(range.end.saturating_add(1))?;

        let snapshot = self.ledger.snapshot(range.end)?;
        self.ledger.verify_conservation()?;
        self.history.push(history_point(&snapshot));

        let holders = ranked_holders(&snapshot);
        let summary = holder_summary(&snapshot, config.output.top_n);
        let fill = if config.output.dense_daily {
            DailyFill::Dense
        } else {
            DailyFill::Sparse
        };
        let daily = daily_stats(&self.events, fill);
        let flow = flow_summary(&self.events, self.ledger.sentinels());
        let trading = trading_summary(&self.events, &self.pools, config.analysis.recent_hours);
        let replay = self.ledger.stats().clone();

        tracing::info!(
            as_of_block = range.end,
            holders = summary.holder_count,
            applied = replay.applied,
            skipped = replay.skipped,
            "Ledger replay complete"
        );
        tracing::debug!(
            pools = self.pools.len(),
            buys = trading.all_time.buys.transfers,
            sells = trading.all_time.sells.transfers,
            "Classified trades"
        );

        Ok(AnalysisReport {
            contract,
            decimals: config.decimals,
            range,
            snapshot,
            holders,
            summary,
            daily,
            flow,
            trading,
            pools: self.pools,
            history: self.history,
            replay,
            fetch,
            events: self.events,
        })
    }
}

/// Addresses parsed out of the config before any work starts.
struct Resolved {
    contract: Address,
    sentinels: Sentinels,
    pools: Vec<Address>,
}

fn resolve(config: &Config) -> Result<Resolved> {
    let config_err = |e: eyre::Report| Error::Config(e.to_string());
    Ok(Resolved {
        contract: config.contract().map_err(config_err)?,
        sentinels: config.sentinels().map_err(config_err)?,
        pools: config.pool_addresses().map_err(config_err)?,
    })
}

/// Fetch every Transfer of the configured contract over
/// `[start_block, end_block]` and replay it into a ledger.
///
/// Any fetch or integrity failure aborts the run; no partial report is
/// returned.
pub async fn run_backfill<N: NodeClient>(
    config: &Config,
    node: &N,
    shutdown: CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<AnalysisReport> {
    let resolved = resolve(config)?;
    let contract = resolved.contract;
    let fetcher = RangeFetcher::new(node, contract, config.fetcher_settings())
        .with_progress(progress)
        .with_shutdown(shutdown);

    let end = match config.end_block {
        Some(end) => end,
        None => {
            let head = fetcher.chain_head().await?;
            tracing::info!(head, "Resolved end block from chain head");
            head
        }
    };
    if end < config.start_block {
        return Err(Error::Config(format!(
            "end block {} is before start_block {}",
            end, config.start_block
        )));
    }

    let range = FetchRange::new(config.start_block, end);
    let mut replay = Replay::new(config, resolved, range);
    let fetch = fetcher
        .fetch_chunks(range, |chunk| replay.apply_chunk(chunk))
        .await?;

    replay.finish(config, contract, range, Some(fetch))
}

/// Replay a stored transfer list without touching the node.
///
/// Events are sorted canonically first. The range starts at the earlier of
/// `start_block` and the first event, and ends at `end_block` or the last
/// event; events past `end_block` are dropped.
pub fn analyze_events(config: &Config, mut events: Vec<TransferEvent>) -> Result<AnalysisReport> {
    let resolved = resolve(config)?;
    let contract = resolved.contract;
    sort_canonical(&mut events);

    let first = events.first().map(|e| e.block_number).unwrap_or(config.start_block);
    let last = events.last().map(|e| e.block_number).unwrap_or(config.start_block);
    let start = config.start_block.min(first);
    let end = config.end_block.unwrap_or(last).max(start);

    let before = events.len();
    events.retain(|e| e.block_number <= end);
    if events.len() < before {
        tracing::warn!(
            dropped = before - events.len(),
            end_block = end,
            "Ignoring stored transfers past end_block"
        );
    }

    let range = FetchRange::new(start, end);
    let mut replay = Replay::new(config, resolved, range);
    for event in events {
        replay.apply(event)?;
    }

    replay.finish(config, contract, range, None)
}
