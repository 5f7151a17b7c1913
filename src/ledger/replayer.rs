use alloy::primitives::{Address, U256};
use serde::Deserialize;
use std::collections::HashMap;

use super::snapshot::LedgerSnapshot;
use crate::error::LedgerError;
use crate::indexer::types::{EventKey, TransferEvent};

/// How the replayer treats an event at or before the last applied key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Ignore it and count it. Absorbs overlapping chunk boundaries.
    #[default]
    Skip,
    /// Refuse it with an integrity error.
    Reject,
}

/// Addresses that create or destroy supply instead of holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub mint: Address,
    pub burn: Vec<Address>,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            mint: Address::ZERO,
            burn: vec![Address::ZERO],
        }
    }
}

impl Sentinels {
    pub fn is_mint(&self, address: &Address) -> bool {
        *address == self.mint
    }

    pub fn is_burn(&self, address: &Address) -> bool {
        self.burn.contains(address)
    }

    pub fn is_sentinel(&self, address: &Address) -> bool {
        self.is_mint(address) || self.is_burn(address)
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// At or before the last applied key; ignored under `DuplicatePolicy::Skip`.
    Skipped,
}

/// Replay counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: u64,
    pub skipped: u64,
    pub minted: U256,
    pub burned: U256,
    pub last_applied: Option<EventKey>,
}

/// Folds canonically ordered transfers into per-address balances.
///
/// The replayer is the only writer of the balance map. Readers get
/// [`LedgerSnapshot`] copies.
#[derive(Debug, Default)]
pub struct LedgerReplayer {
    balances: HashMap<Address, U256>,
    sentinels: Sentinels,
    policy: DuplicatePolicy,
    stats: ReplayStats,
}

impl LedgerReplayer {
    pub fn new(sentinels: Sentinels, policy: DuplicatePolicy) -> Self {
        Self {
            balances: HashMap::new(),
            sentinels,
            policy,
            stats: ReplayStats::default(),
        }
    }

    /// Apply one transfer. Either the whole transfer lands or nothing changes.
    pub fn apply(&mut self, event: &TransferEvent) -> Result<Applied, LedgerError> {
        let key = event.key();

        if let Some(last) = self.stats.last_applied {
            if key <= last {
                return match self.policy {
                    DuplicatePolicy::Skip => {
                        self.stats.skipped += 1;
                        tracing::debug!(
                            block = key.block_number,
                            log_index = key.log_index,
                            "Skipping already applied event"
                        );
                        Ok(Applied::Skipped)
                    }
                    DuplicatePolicy::Reject if key == last => Err(LedgerError::Duplicate {
                        block_number: key.block_number,
                        log_index: key.log_index,
                        tx_hash: event.tx_hash,
                    }),
                    DuplicatePolicy::Reject => Err(LedgerError::OutOfOrder {
                        block_number: key.block_number,
                        log_index: key.log_index,
                        last_block: last.block_number,
                        last_log_index: last.log_index,
                    }),
                };
            }
        }

        let mints = self.sentinels.is_mint(&event.from);
        let burns = self.sentinels.is_burn(&event.to);

        // Validate both legs before touching the map.
        let debited = if mints {
            None
        } else {
            let balance = self.balance_of(&event.from);
            let remaining = balance
                .checked_sub(event.amount)
                .ok_or(LedgerError::NegativeBalance {
                    address: event.from,
                    balance,
                    amount: event.amount,
                    block_number: event.block_number,
                    log_index: event.log_index,
                    tx_hash: event.tx_hash,
                })?;
            Some(remaining)
        };

        let credited = if burns {
            None
        } else {
            // A self-transfer credits the already debited balance.
            let base = match debited {
                Some(remaining) if event.from == event.to => remaining,
                _ => self.balance_of(&event.to),
            };
            let updated = base
                .checked_add(event.amount)
                .ok_or(LedgerError::Overflow {
                    address: event.to,
                    block_number: event.block_number,
                    log_index: event.log_index,
                })?;
            Some(updated)
        };

        let minted = if mints {
            self.stats.minted.checked_add(event.amount).ok_or(LedgerError::Overflow {
                address: event.from,
                block_number: event.block_number,
                log_index: event.log_index,
            })?
        } else {
            self.stats.minted
        };
        let burned = if burns {
            self.stats.burned.checked_add(event.amount).ok_or(LedgerError::Overflow {
                address: event.to,
                block_number: event.block_number,
                log_index: event.log_index,
            })?
        } else {
            self.stats.burned
        };

        if let Some(remaining) = debited {
            self.set_balance(event.from, remaining);
        }
        if let Some(updated) = credited {
            self.set_balance(event.to, updated);
        }

        self.stats.minted = minted;
        self.stats.burned = burned;
        self.stats.applied += 1;
        self.stats.last_applied = Some(key);
        Ok(Applied::Applied)
    }

    /// Apply a sequence, stopping at the first integrity error.
    pub fn apply_all<'e>(
        &mut self,
        events: impl IntoIterator<Item = &'e TransferEvent>,
    ) -> Result<u64, LedgerError> {
        let mut applied = 0;
        for event in events {
            if self.apply(event)? == Applied::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Snapshot of every applied event with `block_number <= as_of_block`.
    ///
    /// Fails if an event past `as_of_block` was already applied: the caller
    /// has to pause replay at the boundary, the ledger never rolls back.
    pub fn snapshot(&self, as_of_block: u64) -> Result<LedgerSnapshot, LedgerError> {
        if let Some(last) = self.stats.last_applied {
            if last.block_number > as_of_block {
                return Err(LedgerError::SnapshotBehindReplay {
                    as_of_block,
                    last_applied_block: last.block_number,
                });
            }
        }

        Ok(LedgerSnapshot::new(
            as_of_block,
            self.balances.iter().map(|(a, b)| (*a, *b)),
        ))
    }

    pub fn balance_of(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or(U256::ZERO)
    }

    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    pub fn total_supply(&self) -> U256 {
        self.balances
            .values()
            .fold(U256::ZERO, |acc, b| acc.saturating_add(*b))
    }

    /// Balances must add up to what was minted minus what was burned.
    pub fn verify_conservation(&self) -> Result<(), LedgerError> {
        let held = self.total_supply();
        let expected = self.stats.minted.checked_sub(self.stats.burned);
        if expected != Some(held) {
            return Err(LedgerError::ConservationViolated {
                held,
                minted: self.stats.minted,
                burned: self.stats.burned,
            });
        }
        Ok(())
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.sentinels
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        if balance.is_zero() {
            self.balances.remove(&address);
        } else {
            self.balances.insert(address, balance);
        }
    }
}
