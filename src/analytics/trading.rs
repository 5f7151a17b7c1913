use alloy::primitives::{Address, U256};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::indexer::types::TransferEvent;

/// One side of the market: transfers out of a pool (buys) or into one (sells).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideStats {
    pub volume: U256,
    pub transfers: u64,
    /// Distinct receivers for buys, distinct senders for sells.
    pub unique_addresses: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingStats {
    pub transfers: u64,
    pub buys: SideStats,
    pub sells: SideStats,
    /// Transfers touching no pool.
    pub other_transfers: u64,
    pub first_transfer: Option<DateTime<Utc>>,
    pub last_transfer: Option<DateTime<Utc>>,
}

impl TradingStats {
    pub fn trade_volume(&self) -> U256 {
        self.buys.volume.saturating_add(self.sells.volume)
    }

    pub fn trades(&self) -> u64 {
        self.buys.transfers + self.sells.transfers
    }
}

/// All-time figures plus the trailing window ending at the last transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingSummary {
    pub all_time: TradingStats,
    pub recent: TradingStats,
    pub recent_hours: u64,
    /// Inclusive lower bound of the recent window; None without transfers.
    pub window_start: Option<DateTime<Utc>>,
}

/// Classify transfers against known pool addresses. A transfer out of a pool
/// is a buy, even when the receiver is another pool; one into a pool is a sell.
pub fn trading_stats<'e>(
    events: impl IntoIterator<Item = &'e TransferEvent>,
    pools: &[Address],
) -> TradingStats {
    let mut stats = TradingStats::default();
    let mut buyers: HashSet<Address> = HashSet::new();
    let mut sellers: HashSet<Address> = HashSet::new();

    for event in events {
        stats.transfers += 1;
        stats.first_transfer = Some(match stats.first_transfer {
            Some(first) => first.min(event.timestamp),
            None => event.timestamp,
        });
        stats.last_transfer = Some(match stats.last_transfer {
            Some(last) => last.max(event.timestamp),
            None => event.timestamp,
        });

        if pools.contains(&event.from) {
            stats.buys.volume = stats.buys.volume.saturating_add(event.amount);
            stats.buys.transfers += 1;
            buyers.insert(event.to);
        } else if pools.contains(&event.to) {
            stats.sells.volume = stats.sells.volume.saturating_add(event.amount);
            stats.sells.transfers += 1;
            sellers.insert(event.from);
        } else {
            stats.other_transfers += 1;
        }
    }

    stats.buys.unique_addresses = buyers.len();
    stats.sells.unique_addresses = sellers.len();
    stats
}

/// The window is anchored on the newest transfer, not the wall clock, so a
/// stored transfer list always yields the same figures.
pub fn trading_summary(events: &[TransferEvent], pools: &[Address], recent_hours: u64) -> TradingSummary {
    let all_time = trading_stats(events, pools);
    let hours = i64::try_from(recent_hours).unwrap_or(i64::MAX);
    let window_start = all_time.last_transfer.map(|last| {
        Duration::try_hours(hours)
            .and_then(|span| last.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    });

    let recent = match window_start {
        Some(start) => trading_stats(events.iter().filter(|e| e.timestamp >= start), pools),
        None => TradingStats::default(),
    };

    TradingSummary {
        all_time,
        recent,
        recent_hours,
        window_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use chrono::TimeZone;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn pool() -> Address {
        addr(0x70)
    }

    fn at(hour: u32, from: Address, to: Address, amount: u64, block: u64) -> TransferEvent {
        TransferEvent {
            from,
            to,
            amount: U256::from(amount),
            block_number: block,
            log_index: 0,
            tx_hash: B256::with_last_byte(block as u8),
            timestamp: Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap()
                + Duration::hours(hour as i64),
        }
    }

    fn stream() -> Vec<TransferEvent> {
        vec![
            at(0, pool(), addr(1), 100, 1),
            at(10, pool(), addr(2), 50, 2),
            at(30, addr(1), pool(), 40, 3),
            at(40, addr(1), addr(3), 5, 4),
            at(45, pool(), addr(1), 20, 5),
            at(50, addr(2), pool(), 10, 6),
        ]
    }

    #[test]
    fn test_classifies_buys_sells_and_other() {
        let stats = trading_stats(&stream(), &[pool()]);

        assert_eq!(stats.transfers, 6);
        assert_eq!(
            stats.buys,
            SideStats { volume: U256::from(170u64), transfers: 3, unique_addresses: 2 }
        );
        assert_eq!(
            stats.sells,
            SideStats { volume: U256::from(50u64), transfers: 2, unique_addresses: 2 }
        );
        assert_eq!(stats.other_transfers, 1);
        assert_eq!(stats.trades(), 5);
        assert_eq!(stats.trade_volume(), U256::from(220u64));
    }

    #[test]
    fn test_recent_window_is_anchored_on_last_transfer() {
        let summary = trading_summary(&stream(), &[pool()], 24);

        let last = Utc.with_ymd_and_hms(2024, 11, 3, 2, 0, 0).unwrap();
        assert_eq!(summary.all_time.last_transfer, Some(last));
        assert_eq!(summary.window_start, Some(last - Duration::hours(24)));

        // Hours 30, 40, 45 and 50 fall inside [26, 50].
        assert_eq!(summary.recent.transfers, 4);
        assert_eq!(summary.recent.buys.volume, U256::from(20u64));
        assert_eq!(summary.recent.sells.volume, U256::from(50u64));
        assert_eq!(summary.recent.other_transfers, 1);
    }

    #[test]
    fn test_without_pools_everything_is_other() {
        let stats = trading_stats(&stream(), &[]);
        assert_eq!(stats.other_transfers, 6);
        assert_eq!(stats.trades(), 0);
    }

    #[test]
    fn test_empty_stream_is_neutral() {
        let summary = trading_summary(&[], &[pool()], 24);
        assert_eq!(summary.all_time, TradingStats::default());
        assert_eq!(summary.recent, TradingStats::default());
        assert_eq!(summary.window_start, None);
    }
}
