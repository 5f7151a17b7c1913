use alloy::primitives::{Address, U256};

use crate::ledger::LedgerSnapshot;

/// One ranked holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderRow {
    pub rank: usize,
    pub address: Address,
    pub balance: U256,
}

/// Headline numbers for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderSummary {
    pub as_of_block: u64,
    pub holder_count: usize,
    pub total_supply: U256,
    pub average_balance: U256,
    /// Share of supply held by the top 10% of holders, in basis points.
    pub top_decile_share_bps: u64,
    pub top_holders: Vec<HolderRow>,
}

impl HolderSummary {
    pub fn top_decile_share_percent(&self) -> f64 {
        self.top_decile_share_bps as f64 / 100.0
    }
}

/// Holder count and supply at one point of the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPoint {
    pub block: u64,
    pub holder_count: usize,
    pub total_supply: U256,
}

/// Every holder ranked by balance descending, ties broken by address ascending.
pub fn ranked_holders(snapshot: &LedgerSnapshot) -> Vec<HolderRow> {
    let mut holders: Vec<(Address, U256)> = snapshot
        .balances()
        .map(|(address, balance)| (*address, *balance))
        .collect();
    holders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    holders
        .into_iter()
        .enumerate()
        .map(|(i, (address, balance))| HolderRow {
            rank: i + 1,
            address,
            balance,
        })
        .collect()
}

pub fn top_holders(snapshot: &LedgerSnapshot, n: usize) -> Vec<HolderRow> {
    let mut ranked = ranked_holders(snapshot);
    ranked.truncate(n);
    ranked
}

/// `total_supply / holder_count`, 0 when there are no holders.
pub fn average_balance(snapshot: &LedgerSnapshot) -> U256 {
    match snapshot.holder_count() {
        0 => U256::ZERO,
        n => snapshot.total_supply() / U256::from(n as u64),
    }
}

/// Share of supply held by the largest tenth of holders (at least one).
pub fn top_decile_share_bps(ranked: &[HolderRow], total_supply: U256) -> u64 {
    if ranked.is_empty() || total_supply.is_zero() {
        return 0;
    }

    let top = (ranked.len() / 10).max(1);
    let held = ranked[..top]
        .iter()
        .fold(U256::ZERO, |acc, row| acc.saturating_add(row.balance));
    let bps = held.saturating_mul(U256::from(10_000u64)) / total_supply;
    u64::try_from(bps).unwrap_or(10_000)
}

pub fn holder_summary(snapshot: &LedgerSnapshot, top_n: usize) -> HolderSummary {
    let ranked = ranked_holders(snapshot);
    let total_supply = snapshot.total_supply();
    let top_decile_share_bps = top_decile_share_bps(&ranked, total_supply);

    HolderSummary {
        as_of_block: snapshot.as_of_block(),
        holder_count: snapshot.holder_count(),
        total_supply,
        average_balance: average_balance(snapshot),
        top_decile_share_bps,
        top_holders: ranked.into_iter().take(top_n).collect(),
    }
}

pub fn history_point(snapshot: &LedgerSnapshot) -> HistoryPoint {
    HistoryPoint {
        block: snapshot.as_of_block(),
        holder_count: snapshot.holder_count(),
        total_supply: snapshot.total_supply(),
    }
}
