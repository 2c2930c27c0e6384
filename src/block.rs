//! Immutable block records.

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Block id reserved for genesis.
pub const GENESIS_ID: u64 = 0;
/// Peer id used as the genesis block's "miner" (nobody mined it).
pub const NO_MINER: i64 = -1;
/// Starting balance credited to every peer in the genesis block
/// (source: `BlockChain.__init__` seeds `peer_balances` with `[100] * N`).
pub const GENESIS_BALANCE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: u64,
    pub parent_id: u64,
    pub miner: i64,
    pub mined_at: f64,
    pub transactions: Vec<Transaction>,
    /// Peer balances after this block is applied on top of its parent.
    pub peer_balances: Vec<i64>,
}

impl Block {
    pub fn genesis(num_peers: usize) -> Self {
        Block {
            id: GENESIS_ID,
            parent_id: GENESIS_ID,
            miner: NO_MINER,
            mined_at: 0.0,
            transactions: Vec::new(),
            peer_balances: vec![GENESIS_BALANCE as i64; num_peers],
        }
    }

    pub fn new(
        id: u64,
        parent_id: u64,
        miner: i64,
        mined_at: f64,
        transactions: Vec<Transaction>,
        peer_balances: Vec<i64>,
    ) -> Self {
        Block { id, parent_id, miner, mined_at, transactions, peer_balances }
    }

    /// Size in kilobits: `8 * (1 + |transactions|)`.
    pub fn size_kbits(&self) -> u64 {
        8 * (1 + self.transactions.len() as u64)
    }

    pub fn is_genesis(&self) -> bool {
        self.id == GENESIS_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_transactions_and_seeded_balances() {
        let g = Block::genesis(4);
        assert_eq!(g.id, GENESIS_ID);
        assert!(g.is_genesis());
        assert_eq!(g.peer_balances, vec![100, 100, 100, 100]);
        assert_eq!(g.size_kbits(), 8);
    }

    #[test]
    fn coinbase_only_block_has_16_kbit_size() {
        let coinbase = Transaction::coinbase(0, 2, 1.0);
        let block = Block::new(1, 0, 2, 1.0, vec![coinbase], vec![100, 100]);
        assert_eq!(block.size_kbits(), 16);
    }
}
