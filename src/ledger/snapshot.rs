use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;

/// Immutable copy of the ledger as of a block. Holder count and supply are
/// derived from the balance map on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    as_of_block: u64,
    balances: BTreeMap<Address, U256>,
}

impl LedgerSnapshot {
    /// Zero balances are dropped so every stored entry is a holder.
    pub fn new(as_of_block: u64, balances: impl IntoIterator<Item = (Address, U256)>) -> Self {
        Self {
            as_of_block,
            balances: balances
                .into_iter()
                .filter(|(_, balance)| !balance.is_zero())
                .collect(),
        }
    }

    pub fn as_of_block(&self) -> u64 {
        self.as_of_block
    }

    pub fn balance_of(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or(U256::ZERO)
    }

    /// Holders in address order.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Sum of all positive balances.
    pub fn total_supply(&self) -> U256 {
        self.balances
            .values()
            .fold(U256::ZERO, |acc, balance| acc.saturating_add(*balance))
    }
}
