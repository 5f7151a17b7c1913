use alloy::primitives::{Address, B256, U256};
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;

use crate::analytics::{DailyStat, HistoryPoint, HolderRow};
use crate::error::{Error, Result};
use crate::indexer::types::TransferEvent;

const HOLDER_HEADER: [&str; 4] = ["rank", "address", "balance", "balance_formatted"];
const DAILY_HEADER: [&str; 3] = ["date", "transfer_count", "volume"];
const HISTORY_HEADER: [&str; 3] = ["block", "holder_count", "total_supply"];
const TRANSFER_HEADER: [&str; 7] = [
    "block_number",
    "log_index",
    "tx_hash",
    "from",
    "to",
    "amount",
    "timestamp",
];

#[derive(Debug, Serialize)]
struct HolderCsvRow {
    rank: usize,
    address: String,
    balance: String,
    balance_formatted: String,
}

#[derive(Debug, Serialize)]
struct DailyCsvRow {
    date: NaiveDate,
    transfer_count: u64,
    volume: String,
}

#[derive(Debug, Serialize)]
struct HistoryCsvRow {
    block: u64,
    holder_count: usize,
    total_supply: String,
}

/// One transfer as stored on disk. Amounts are decimal base units,
/// timestamps unix seconds.
#[derive(Debug, Serialize, Deserialize)]
struct TransferCsvRow {
    block_number: u64,
    log_index: u64,
    tx_hash: String,
    from: String,
    to: String,
    amount: String,
    timestamp: i64,
}

impl From<&TransferEvent> for TransferCsvRow {
    fn from(event: &TransferEvent) -> Self {
        Self {
            block_number: event.block_number,
            log_index: event.log_index,
            tx_hash: format!("0x{}", hex::encode(event.tx_hash)),
            from: event.from.to_string(),
            to: event.to.to_string(),
            amount: event.amount.to_string(),
            timestamp: event.timestamp.timestamp(),
        }
    }
}

impl TryFrom<TransferCsvRow> for TransferEvent {
    type Error = Error;

    fn try_from(row: TransferCsvRow) -> Result<Self> {
        let at = format!("block {} log {}", row.block_number, row.log_index);
        let invalid = |field: &str, value: &str| {
            Error::InvalidRecord(format!("{}: bad {} '{}'", at, field, value))
        };

        let tx_hash = B256::from_str(&row.tx_hash).map_err(|_| invalid("tx_hash", &row.tx_hash))?;
        let from = Address::from_str(&row.from).map_err(|_| invalid("from", &row.from))?;
        let to = Address::from_str(&row.to).map_err(|_| invalid("to", &row.to))?;
        let amount =
            U256::from_str_radix(&row.amount, 10).map_err(|_| invalid("amount", &row.amount))?;
        let timestamp = DateTime::<Utc>::from_timestamp(row.timestamp, 0)
            .ok_or_else(|| invalid("timestamp", &row.timestamp.to_string()))?;

        Ok(TransferEvent {
            from,
            to,
            amount,
            block_number: row.block_number,
            log_index: row.log_index,
            tx_hash,
            timestamp,
        })
    }
}

/// Base units scaled down by `decimals`, as a BigDecimal.
pub fn to_decimal(amount: U256, decimals: u8) -> BigDecimal {
    let digits = BigInt::from_bytes_be(Sign::Plus, &amount.to_be_bytes::<32>());
    BigDecimal::new(digits, i64::from(decimals))
}

/// Human-readable amount in plain notation with trailing zeros dropped,
/// e.g. `1.5` or `0.000000000000000001`. Never scientific.
pub fn format_units(amount: U256, decimals: u8) -> String {
    to_decimal(amount, decimals).normalized().to_plain_string()
}

fn write_rows<W, T>(writer: W, header: &[&str], rows: impl IntoIterator<Item = T>) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_holders<W: Write>(writer: W, holders: &[HolderRow], decimals: u8) -> Result<()> {
    write_rows(
        writer,
        &HOLDER_HEADER,
        holders.iter().map(|row| HolderCsvRow {
            rank: row.rank,
            address: row.address.to_string(),
            balance: row.balance.to_string(),
            balance_formatted: format_units(row.balance, decimals),
        }),
    )
}

pub fn write_daily<W: Write>(writer: W, days: &[DailyStat]) -> Result<()> {
    write_rows(
        writer,
        &DAILY_HEADER,
        days.iter().map(|day| DailyCsvRow {
            date: day.date,
            transfer_count: day.transfer_count,
            volume: day.volume.to_string(),
        }),
    )
}

pub fn write_history<W: Write>(writer: W, history: &[HistoryPoint]) -> Result<()> {
    write_rows(
        writer,
        &HISTORY_HEADER,
        history.iter().map(|point| HistoryCsvRow {
            block: point.block,
            holder_count: point.holder_count,
            total_supply: point.total_supply.to_string(),
        }),
    )
}

pub fn write_transfers<W: Write>(writer: W, events: &[TransferEvent]) -> Result<()> {
    write_rows(writer, &TRANSFER_HEADER, events.iter().map(TransferCsvRow::from))
}

/// Read a transfer list written by [`write_transfers`]. Rows keep file order.
pub fn read_transfers<R: Read>(reader: R) -> Result<Vec<TransferEvent>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut events = Vec::new();
    for result in reader.deserialize::<TransferCsvRow>() {
        let row = result?;
        events.push(TransferEvent::try_from(row)?);
    }
    Ok(events)
}

pub fn read_transfers_file(path: &str) -> Result<Vec<TransferEvent>> {
    let file = std::fs::File::open(path)?;
    let events = read_transfers(std::io::BufReader::new(file))?;
    tracing::info!(path, events = events.len(), "Loaded stored transfer list");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::replayer::tests::{addr, scenario};

    fn output(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(
            to_decimal(U256::from(1_500_000u64), 6),
            BigDecimal::from_str("1.5").unwrap()
        );
    }

    #[test]
    fn test_format_units_dust_and_large_values_stay_plain() {
        assert_eq!(format_units(U256::from(1u64), 18), "0.000000000000000001");

        let big = U256::from(10u64).pow(U256::from(40u64));
        assert_eq!(format_units(big, 18), format!("1{}", "0".repeat(22)));

        let max = format_units(U256::MAX, 18);
        assert!(!max.contains(['e', 'E']));
        assert!(max.starts_with("115792089237316195423570985008687907853269984665640564039457.584"));
    }

    #[test]
    fn test_holders_csv() {
        let holders = vec![
            HolderRow { rank: 1, address: addr(0xa), balance: U256::from(2_500_000u64) },
            HolderRow { rank: 2, address: addr(0xb), balance: U256::from(500_000u64) },
        ];
        let mut buf = Vec::new();
        write_holders(&mut buf, &holders, 6).unwrap();

        let text = output(buf);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "rank,address,balance,balance_formatted");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",2500000,2.5"));
        assert!(lines[2].starts_with("2,"));
    }

    #[test]
    fn test_empty_outputs_still_have_headers() {
        let mut buf = Vec::new();
        write_daily(&mut buf, &[]).unwrap();
        assert_eq!(output(buf), "date,transfer_count,volume\n");

        let mut buf = Vec::new();
        write_history(&mut buf, &[]).unwrap();
        assert_eq!(output(buf), "block,holder_count,total_supply\n");
    }

    #[test]
    fn test_daily_csv_uses_iso_dates() {
        let days = vec![DailyStat {
            date: NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(),
            transfer_count: 3,
            volume: U256::from(70u64),
        }];
        let mut buf = Vec::new();
        write_daily(&mut buf, &days).unwrap();
        assert_eq!(output(buf), "date,transfer_count,volume\n2024-11-02,3,70\n");
    }

    #[test]
    fn test_transfer_list_reads_back() {
        let events = scenario();
        let mut buf = Vec::new();
        write_transfers(&mut buf, &events).unwrap();

        let read = read_transfers(buf.as_slice()).unwrap();
        assert_eq!(read, events);
    }

    #[test]
    fn test_bad_transfer_row_is_rejected() {
        let text = "block_number,log_index,tx_hash,from,to,amount,timestamp\n\
                    10,0,0x00,0x0000000000000000000000000000000000000000,\
                    0x000000000000000000000000000000000000000a,100,1700000120\n";
        let err = read_transfers(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));

        let text = "block_number,log_index,tx_hash,from,to,amount,timestamp\n\
                    ten,0,0x00,0x00,0x00,1,1\n";
        assert!(matches!(read_transfers(text.as_bytes()), Err(Error::Csv(_))));
    }
}
