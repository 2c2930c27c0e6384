//! Immutable transaction records.

use serde::{Deserialize, Serialize};

/// Sentinel sender id for coinbase transactions.
pub const COINBASE: i64 = -1;

/// Fixed mining fee paid to the miner by the coinbase transaction of every
/// block it creates (source: `mining_fee = 50`).
pub const MINING_FEE: u64 = 50;

/// Kilobits occupied by a single transaction when computing transmission
/// delay for `FORWARD_TXN` (source: `size_of_transaction = 8`).
pub const TXN_SIZE_KBITS: u64 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub sender: i64,
    pub receiver: i64,
    pub amount: u64,
    /// Virtual simulation time (seconds) at which this transaction was created.
    pub created_at: f64,
}

impl Transaction {
    pub fn new(id: u64, sender: i64, receiver: i64, amount: u64, created_at: f64) -> Self {
        Transaction { id, sender, receiver, amount, created_at }
    }

    pub fn coinbase(id: u64, miner: i64, created_at: f64) -> Self {
        Transaction::new(id, COINBASE, miner, MINING_FEE, created_at)
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender == COINBASE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_pays_fixed_fee_to_miner() {
        let txn = Transaction::coinbase(3, 7, 100.0);
        assert!(txn.is_coinbase());
        assert_eq!(txn.receiver, 7);
        assert_eq!(txn.amount, MINING_FEE);
    }
}
