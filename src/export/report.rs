use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::csv::{format_units, write_daily, write_history, write_holders, write_transfers};
use crate::config::OutputConfig;
use crate::analytics::{TradingStats, TradingSummary};
use crate::error::Result;
use crate::pipeline::AnalysisReport;

/// Prefix shared by every file of one run, e.g. `2024-11-02_1430`.
pub fn run_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H%M").to_string()
}

#[derive(Debug, Serialize)]
struct TopHolderJson {
    rank: usize,
    address: String,
    balance: String,
    balance_formatted: String,
}

#[derive(Debug, Serialize)]
struct TradingStatsJson {
    transfers: u64,
    buy_volume: String,
    buy_count: u64,
    unique_buyers: usize,
    sell_volume: String,
    sell_count: u64,
    unique_sellers: usize,
    other_transfers: u64,
    first_transfer: Option<DateTime<Utc>>,
    last_transfer: Option<DateTime<Utc>>,
}

impl From<&TradingStats> for TradingStatsJson {
    fn from(stats: &TradingStats) -> Self {
        Self {
            transfers: stats.transfers,
            buy_volume: stats.buys.volume.to_string(),
            buy_count: stats.buys.transfers,
            unique_buyers: stats.buys.unique_addresses,
            sell_volume: stats.sells.volume.to_string(),
            sell_count: stats.sells.transfers,
            unique_sellers: stats.sells.unique_addresses,
            other_transfers: stats.other_transfers,
            first_transfer: stats.first_transfer,
            last_transfer: stats.last_transfer,
        }
    }
}

#[derive(Debug, Serialize)]
struct TradingJson {
    pools: usize,
    recent_hours: u64,
    window_start: Option<DateTime<Utc>>,
    all_time: TradingStatsJson,
    recent: TradingStatsJson,
}

impl TradingJson {
    fn new(trading: &TradingSummary, pools: usize) -> Self {
        Self {
            pools,
            recent_hours: trading.recent_hours,
            window_start: trading.window_start,
            all_time: TradingStatsJson::from(&trading.all_time),
            recent: TradingStatsJson::from(&trading.recent),
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryJson {
    contract: String,
    decimals: u8,
    start_block: u64,
    as_of_block: u64,
    holder_count: usize,
    total_supply: String,
    total_supply_formatted: String,
    average_balance: String,
    top_decile_share_percent: f64,
    transfers_applied: u64,
    duplicates_skipped: u64,
    minted: String,
    burned: String,
    unique_addresses: usize,
    raw_volume: String,
    net_volume: String,
    net_transactions: u64,
    active_days: usize,
    trading: TradingJson,
    top_holders: Vec<TopHolderJson>,
}

impl From<&AnalysisReport> for SummaryJson {
    fn from(report: &AnalysisReport) -> Self {
        let summary = &report.summary;
        Self {
            contract: report.contract.to_string(),
            decimals: report.decimals,
            start_block: report.range.start,
            as_of_block: summary.as_of_block,
            holder_count: summary.holder_count,
            total_supply: summary.total_supply.to_string(),
            total_supply_formatted: format_units(summary.total_supply, report.decimals),
            average_balance: summary.average_balance.to_string(),
            top_decile_share_percent: summary.top_decile_share_percent(),
            transfers_applied: report.replay.applied,
            duplicates_skipped: report.replay.skipped,
            minted: report.replay.minted.to_string(),
            burned: report.replay.burned.to_string(),
            unique_addresses: report.flow.unique_addresses,
            raw_volume: report.flow.raw_volume.to_string(),
            net_volume: report.flow.net_volume.to_string(),
            net_transactions: report.flow.net_transactions,
            active_days: report.daily.iter().filter(|d| d.transfer_count > 0).count(),
            trading: TradingJson::new(&report.trading, report.pools.len()),
            top_holders: summary
                .top_holders
                .iter()
                .map(|row| TopHolderJson {
                    rank: row.rank,
                    address: row.address.to_string(),
                    balance: row.balance.to_string(),
                    balance_formatted: format_units(row.balance, report.decimals),
                })
                .collect(),
        }
    }
}

pub fn write_summary_json<W: Write>(writer: W, report: &AnalysisReport) -> Result<()> {
    serde_json::to_writer_pretty(writer, &SummaryJson::from(report))?;
    Ok(())
}

/// Create a fresh output file. An existing file is never overwritten.
fn create(dir: &Path, stamp: &str, name: &str) -> Result<(PathBuf, BufWriter<File>)> {
    let path = dir.join(format!("{}_{}", stamp, name));
    let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    Ok((path, BufWriter::new(file)))
}

/// Write the run's output set into `output.dir`, every file prefixed with
/// `stamp`. Returns the paths written.
pub fn write_report(output: &OutputConfig, report: &AnalysisReport, stamp: &str) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&output.dir)?;
    let mut written = Vec::new();

    let (path, file) = create(&output.dir, stamp, "holders.csv")?;
    write_holders(file, &report.holders, report.decimals)?;
    written.push(path);

    let (path, file) = create(&output.dir, stamp, "daily_stats.csv")?;
    write_daily(file, &report.daily)?;
    written.push(path);

    let (path, file) = create(&output.dir, stamp, "holder_history.csv")?;
    write_history(file, &report.history)?;
    written.push(path);

    if output.export_events {
        let (path, file) = create(&output.dir, stamp, "transfers.csv")?;
        write_transfers(file, &report.events)?;
        written.push(path);
    }

    let (path, mut file) = create(&output.dir, stamp, "summary.json")?;
    write_summary_json(&mut file, report)?;
    file.flush()?;
    written.push(path);

    for path in &written {
        tracing::info!(path = %path.display(), "Wrote output file");
    }
    Ok(written)
}

/// Human-oriented summary of a run through `tracing`.
pub fn log_report(report: &AnalysisReport) {
    let summary = &report.summary;
    let decimals = report.decimals;

    tracing::info!(
        contract = %report.contract,
        from_block = report.range.start,
        as_of_block = summary.as_of_block,
        holders = summary.holder_count,
        total_supply = %format_units(summary.total_supply, decimals),
        average_balance = %format_units(summary.average_balance, decimals),
        top_decile_share = %format!("{:.2}%", summary.top_decile_share_percent()),
        "Holder summary"
    );

    tracing::info!(
        transfers = report.replay.applied,
        skipped = report.replay.skipped,
        unique_addresses = report.flow.unique_addresses,
        minted = %format_units(report.flow.minted, decimals),
        burned = %format_units(report.flow.burned, decimals),
        raw_volume = %format_units(report.flow.raw_volume, decimals),
        net_volume = %format_units(report.flow.net_volume, decimals),
        net_transactions = report.flow.net_transactions,
        "Transfer activity"
    );

    let trading = &report.trading;
    if !report.pools.is_empty() {
        for (period, stats) in [("all_time", &trading.all_time), ("recent", &trading.recent)] {
            tracing::info!(
                period,
                recent_hours = trading.recent_hours,
                buys = stats.buys.transfers,
                buy_volume = %format_units(stats.buys.volume, decimals),
                unique_buyers = stats.buys.unique_addresses,
                sells = stats.sells.transfers,
                sell_volume = %format_units(stats.sells.volume, decimals),
                unique_sellers = stats.sells.unique_addresses,
                other = stats.other_transfers,
                "Trading activity"
            );
        }
    }

    if let Some(fetch) = &report.fetch {
        tracing::info!(
            chunks = fetch.chunks,
            events = fetch.events,
            blocks = fetch.blocks,
            "Fetch totals"
        );
    }

    for row in &summary.top_holders {
        tracing::info!(
            rank = row.rank,
            address = %row.address,
            balance = %format_units(row.balance, decimals),
            "Top holder"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::ledger::replayer::tests::{addr, scenario};
    use crate::pipeline::analyze_events;
    use chrono::TimeZone;

    #[test]
    fn test_run_stamp_format() {
        let now = Utc.with_ymd_and_hms(2024, 11, 2, 14, 30, 59).unwrap();
        assert_eq!(run_stamp(now), "2024-11-02_1430");
    }

    #[test]
    fn test_summary_json() {
        let report = analyze_events(&test_config(), scenario()).unwrap();
        let mut buf = Vec::new();
        write_summary_json(&mut buf, &report).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(json["holder_count"], 3);
        assert_eq!(json["total_supply"], "100");
        assert_eq!(json["as_of_block"], 30);
        assert_eq!(json["transfers_applied"], 3);
        assert_eq!(json["top_holders"][0]["balance"], "60");
        assert_eq!(json["top_holders"].as_array().unwrap().len(), 3);
        assert_eq!(json["trading"]["pools"], 0);
        assert_eq!(json["trading"]["all_time"]["other_transfers"], 3);
    }

    #[test]
    fn test_summary_json_trading_section() {
        let mut config = test_config();
        config.analysis.pool_addresses = vec![addr(0xb).to_string()];
        let report = analyze_events(&config, scenario()).unwrap();
        let mut buf = Vec::new();
        write_summary_json(&mut buf, &report).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let trading = &json["trading"];
        assert_eq!(trading["pools"], 1);
        assert_eq!(trading["recent_hours"], 24);
        assert_eq!(trading["all_time"]["sell_volume"], "40");
        assert_eq!(trading["all_time"]["unique_sellers"], 1);
        assert_eq!(trading["all_time"]["buy_volume"], "10");
        assert_eq!(trading["all_time"]["buy_count"], 1);
        assert_eq!(trading["recent"]["transfers"], 3);
        assert!(trading["window_start"].is_string());
    }

    #[test]
    fn test_write_report_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("holder-ledger-report-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut config = test_config();
        config.output.dir = dir.clone();
        let report = analyze_events(&config, scenario()).unwrap();

        let written = write_report(&config.output, &report, "2024-11-02_1430").unwrap();
        assert_eq!(written.len(), 5);
        assert!(written.iter().all(|p| p.exists()));
        assert!(dir.join("2024-11-02_1430_holders.csv").exists());

        let stored = std::fs::read(dir.join("2024-11-02_1430_transfers.csv")).unwrap();
        let events = crate::export::csv::read_transfers(stored.as_slice()).unwrap();
        assert_eq!(events, report.events);

        assert!(write_report(&config.output, &report, "2024-11-02_1430").is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
