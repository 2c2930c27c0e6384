//! Process-wide unique id allocation, centralized instead of global statics.

/// Mints strictly increasing transaction and block ids.
///
/// The Python source this was distilled from incremented global counters on
/// construction of each record. We keep the same "issue order" semantics but
/// own the counters on the `Simulation` struct and thread them through by
/// `&mut self` instead.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_txn_id: u64,
    next_block_id: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        // Block id 0 is reserved for genesis, so the first minted block is 1.
        IdAllocator { next_txn_id: 0, next_block_id: 1 }
    }

    pub fn next_txn_id(&mut self) -> u64 {
        let id = self.next_txn_id;
        self.next_txn_id += 1;
        id
    }

    pub fn next_block_id(&mut self) -> u64 {
        let id = self.next_block_id;
        self.next_block_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut alloc = IdAllocator::new();
        let a = alloc.next_txn_id();
        let b = alloc.next_txn_id();
        assert!(b > a);

        let first_block = alloc.next_block_id();
        assert_eq!(first_block, 1);
        assert_eq!(alloc.next_block_id(), 2);
    }
}
