use alloy::primitives::{Address, B256, U256};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::indexer::types::TransferEvent;
use crate::ledger::Sentinels;

/// Volume of the stream, raw and with intra-transaction hops netted out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSummary {
    pub transfer_count: u64,
    /// Distinct non-sentinel addresses on either side of a transfer.
    pub unique_addresses: usize,
    pub minted: U256,
    pub burned: U256,
    /// Sum of all non-mint, non-burn transfer amounts.
    pub raw_volume: U256,
    /// Economic volume: per transaction, the sum of positive net inflows.
    pub net_volume: U256,
    /// Transactions that moved tokens on net.
    pub net_transactions: u64,
}

/// Net economic volume of one transaction's transfers. A router hop A->R->B
/// of 10 counts 10, not 20.
pub fn tx_net_volume<'e>(legs: impl IntoIterator<Item = &'e TransferEvent>) -> U256 {
    let mut flows: HashMap<Address, (U256, U256)> = HashMap::new();

    for leg in legs {
        if leg.amount.is_zero() {
            continue;
        }
        let out = flows.entry(leg.from).or_insert((U256::ZERO, U256::ZERO));
        out.1 = out.1.saturating_add(leg.amount);
        let inflow = flows.entry(leg.to).or_insert((U256::ZERO, U256::ZERO));
        inflow.0 = inflow.0.saturating_add(leg.amount);
    }

    flows
        .values()
        .filter(|(inflow, outflow)| inflow > outflow)
        .fold(U256::ZERO, |acc, (inflow, outflow)| {
            acc.saturating_add(*inflow - *outflow)
        })
}

pub fn flow_summary(events: &[TransferEvent], sentinels: &Sentinels) -> FlowSummary {
    let mut summary = FlowSummary {
        transfer_count: events.len() as u64,
        ..Default::default()
    };
    let mut addresses: HashSet<Address> = HashSet::new();
    let mut by_tx: BTreeMap<B256, Vec<&TransferEvent>> = BTreeMap::new();

    for event in events {
        for address in [event.from, event.to] {
            if !sentinels.is_sentinel(&address) {
                addresses.insert(address);
            }
        }

        if sentinels.is_mint(&event.from) {
            summary.minted = summary.minted.saturating_add(event.amount);
            continue;
        }
        if sentinels.is_burn(&event.to) {
            summary.burned = summary.burned.saturating_add(event.amount);
            continue;
        }

        summary.raw_volume = summary.raw_volume.saturating_add(event.amount);
        by_tx.entry(event.tx_hash).or_default().push(event);
    }

    for legs in by_tx.values() {
        let net = tx_net_volume(legs.iter().copied());
        if !net.is_zero() {
            summary.net_volume = summary.net_volume.saturating_add(net);
            summary.net_transactions += 1;
        }
    }

    summary.unique_addresses = addresses.len();
    summary
}
