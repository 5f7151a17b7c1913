use alloy::primitives::U256;
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::indexer::types::TransferEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub transfer_count: u64,
    pub volume: U256,
}

/// Whether days without transfers appear in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DailyFill {
    /// Only days with at least one transfer.
    #[default]
    Sparse,
    /// Every day from the first to the last active day, zeros included.
    Dense,
}

/// Transfer count and volume per UTC calendar day, in date order.
pub fn daily_stats(events: &[TransferEvent], fill: DailyFill) -> Vec<DailyStat> {
    let mut days: BTreeMap<NaiveDate, (u64, U256)> = BTreeMap::new();

    for event in events {
        let entry = days
            .entry(event.timestamp.date_naive())
            .or_insert((0, U256::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(event.amount);
    }

    if fill == DailyFill::Dense {
        let bounds = days.keys().next().copied().zip(days.keys().next_back().copied());
        if let Some((first, last)) = bounds {
            let mut day = first;
            while day < last {
                day = match day.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
                days.entry(day).or_insert((0, U256::ZERO));
            }
        }
    }

    days.into_iter()
        .map(|(date, (transfer_count, volume))| DailyStat {
            date,
            transfer_count,
            volume,
        })
        .collect()
}
