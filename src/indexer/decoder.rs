use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use chrono::{DateTime, Utc};

use super::types::{FetchRange, RawLog, TransferEvent};
use crate::error::NodeError;

// Generate the Transfer event ABI using alloy's sol! macro.
// This gives us Transfer::SIGNATURE_HASH for the log filter and topic check.
sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// topic0 of `Transfer(address,address,uint256)`.
pub fn transfer_signature() -> B256 {
    Transfer::SIGNATURE_HASH
}

/// Decoded transfer data before being combined with the block timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: B256,
}

impl DecodedTransfer {
    pub fn into_event(self, timestamp: DateTime<Utc>) -> TransferEvent {
        TransferEvent {
            from: self.from,
            to: self.to,
            amount: self.amount,
            block_number: self.block_number,
            log_index: self.log_index,
            tx_hash: self.tx_hash,
            timestamp,
        }
    }
}

/// Attempt to decode a log as a fungible Transfer event of `contract`.
///
/// Returns `Ok(None)` for logs this ledger does not track:
/// - another contract's log
/// - a different event signature
/// - the non-fungible shape (token id as a fourth indexed topic)
///
/// Returns `Err` when the log claims to be a tracked transfer but cannot be
/// read, or lies outside the requested range. Both indicate a bad response.
pub fn decode_transfer_log(
    log: &RawLog,
    contract: Address,
    requested: FetchRange,
) -> Result<Option<DecodedTransfer>, NodeError> {
    if log.address != contract {
        return Ok(None);
    }

    if log.topics.first() != Some(&Transfer::SIGNATURE_HASH) {
        return Ok(None);
    }

    // We need exactly 3 topics (signature + from + to) and 32 bytes of data (value)
    if log.topics.len() != 3 {
        return Ok(None);
    }

    let data = log.data.as_ref();
    if data.len() < 32 {
        return Err(NodeError::Malformed(format!(
            "transfer log carries {} data bytes, expected 32",
            data.len()
        )));
    }

    let block_number = log
        .block_number
        .ok_or_else(|| NodeError::Malformed("transfer log without block number".into()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| NodeError::Malformed("transfer log without log index".into()))?;
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| NodeError::Malformed("transfer log without transaction hash".into()))?;

    if !requested.contains(block_number) {
        return Err(NodeError::Malformed(format!(
            "log at block {} outside requested range {}",
            block_number, requested
        )));
    }

    Ok(Some(DecodedTransfer {
        from: Address::from_word(log.topics[1]),
        to: Address::from_word(log.topics[2]),
        amount: U256::from_be_slice(&data[..32]),
        block_number,
        log_index,
        tx_hash,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    /// Build the raw log a node would return for a transfer.
    pub(crate) fn transfer_log(
        contract: Address,
        from: Address,
        to: Address,
        amount: u64,
        block_number: u64,
        log_index: u64,
    ) -> RawLog {
        RawLog {
            address: contract,
            topics: vec![Transfer::SIGNATURE_HASH, from.into_word(), to.into_word()],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
            block_number: Some(block_number),
            log_index: Some(log_index),
            transaction_hash: Some(B256::repeat_byte((block_number % 251) as u8)),
        }
    }

    #[test]
    fn test_decode_transfer() {
        let contract = Address::repeat_byte(0xcc);
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let log = transfer_log(contract, from, to, 40, 20, 3);

        let decoded = decode_transfer_log(&log, contract, FetchRange::new(0, 100))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.from, from);
        assert_eq!(decoded.to, to);
        assert_eq!(decoded.amount, U256::from(40u64));
        assert_eq!(decoded.block_number, 20);
        assert_eq!(decoded.log_index, 3);
    }

    #[test]
    fn test_skips_foreign_and_nft_logs() {
        let contract = Address::repeat_byte(0xcc);
        let mut log = transfer_log(contract, Address::ZERO, Address::repeat_byte(1), 1, 5, 0);
        let range = FetchRange::new(0, 10);

        assert_eq!(
            decode_transfer_log(&log, Address::repeat_byte(0xdd), range).unwrap(),
            None
        );

        log.topics.push(B256::with_last_byte(7));
        assert_eq!(decode_transfer_log(&log, contract, range).unwrap(), None);
    }

    #[test]
    fn test_malformed_logs_are_errors() {
        let contract = Address::repeat_byte(0xcc);
        let range = FetchRange::new(0, 10);

        let mut short = transfer_log(contract, Address::ZERO, Address::repeat_byte(1), 1, 5, 0);
        short.data = Bytes::from(vec![0u8; 4]);
        assert!(matches!(
            decode_transfer_log(&short, contract, range),
            Err(NodeError::Malformed(_))
        ));

        let mut pending = transfer_log(contract, Address::ZERO, Address::repeat_byte(1), 1, 5, 0);
        pending.log_index = None;
        assert!(decode_transfer_log(&pending, contract, range).is_err());

        let outside = transfer_log(contract, Address::ZERO, Address::repeat_byte(1), 1, 50, 0);
        assert!(decode_transfer_log(&outside, contract, range).is_err());
    }
}
