//! Per-peer state and its event handlers: transaction/block creation,
//! forwarding, and reception, honest and selfish alike.
//!
//! Grounded on the dispatch style of `network/event_handling.rs` and the
//! block-assembly logic of `blockchain/chain.rs`, generalized from a single
//! file-backed chain per libp2p node to an in-memory `BlockTree` per
//! simulated peer, and from async channel sends to synchronous
//! `EventQueue::schedule` calls.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, trace};
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::block::Block;
use crate::blocktree::{BlockTree, InsertOutcome};
use crate::event::{EventKind, EventQueue};
use crate::ids::IdAllocator;
use crate::network::LinkConfig;
use crate::transaction::{Transaction, COINBASE};

/// Maximum non-coinbase transactions per block.
pub const MAX_TXN_PER_BLOCK: usize = 998;

pub struct Peer {
    pub id: usize,
    pub is_slow: bool,
    pub hashing_power: f64,
    pub is_selfish: bool,

    pub tree: BlockTree,
    pub neighbors: Vec<usize>,
    mempool: Vec<Transaction>,
    seen_txn_ids: HashSet<u64>,

    /// FIFO of privately withheld blocks, for selfish peers only.
    pub selfish_blocks: VecDeque<Arc<Block>>,

    pub blocks_mined: u64,
}

impl Peer {
    pub fn new(id: usize, is_slow: bool, hashing_power: f64, is_selfish: bool) -> Self {
        Peer {
            id,
            is_slow,
            hashing_power,
            is_selfish,
            tree: BlockTree::new(0), // re-sized by Simulation::new once N is known
            neighbors: Vec::new(),
            mempool: Vec::new(),
            seen_txn_ids: HashSet::new(),
            selfish_blocks: VecDeque::new(),
            blocks_mined: 0,
        }
    }

    pub fn resize_tree(&mut self, num_peers: usize) {
        self.tree = BlockTree::new(num_peers);
    }

    /// Depth difference between the adversary's private chain and the
    /// public chain, as seen locally — always exactly the length of the
    /// withheld FIFO, since every mined private block grows it by one and
    /// every release (partial or full) shrinks it by exactly what it hands
    /// over.
    pub fn lead(&self) -> u64 {
        self.selfish_blocks.len() as u64
    }

    fn schedule_forward_txn_to_all(
        &self,
        txn: &Transaction,
        time: f64,
        exclude: Option<usize>,
        links: &LinkConfig,
        rng: &mut impl Rng,
        queue: &mut EventQueue,
    ) {
        for &neighbor in &self.neighbors {
            if Some(neighbor) == exclude {
                continue;
            }
            let delay = links.sample_queuing_delay(self.id, neighbor, rng);
            queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardTxn(txn.clone()));
        }
    }

    /// CREATE_TXN(self, txn, t): gossip `txn` to every neighbor, then
    /// schedule the next transaction in this peer's Poisson stream.
    pub fn handle_create_txn(
        &mut self,
        txn: Transaction,
        time: f64,
        t_mean: f64,
        num_peers: usize,
        links: &LinkConfig,
        rng: &mut impl Rng,
        ids: &mut IdAllocator,
        queue: &mut EventQueue,
    ) {
        self.schedule_forward_txn_to_all(&txn, time, None, links, rng, queue);

        let next_time = time + Exp::new(1.0 / t_mean).unwrap().sample(rng);
        let mut receiver = rng.gen_range(0..num_peers);
        while receiver == self.id {
            receiver = rng.gen_range(0..num_peers);
        }
        let amount = rng.gen_range(1..=3u64);
        let next_txn = Transaction::new(ids.next_txn_id(), self.id as i64, receiver as i64, amount, next_time);
        queue.schedule(next_time, self.id, None, EventKind::CreateTxn(next_txn));
    }

    /// FORWARD_TXN(self, txn, to, t): no further queuing delay, just
    /// propagation + transmission.
    pub fn handle_forward_txn(
        &self,
        txn: Transaction,
        to: usize,
        time: f64,
        links: &LinkConfig,
        queue: &mut EventQueue,
    ) {
        let prop = links.propagation_delay(self.id, to);
        let transmission = crate::transaction::TXN_SIZE_KBITS as f64 / links.link_speed(self.id, to);
        queue.schedule(time + prop + transmission, self.id, Some(to), EventKind::ReceiveTxn(txn));
    }

    /// RECEIVE_TXN(self, txn, from, t): dedup, then re-gossip to everyone
    /// except the sender.
    pub fn handle_receive_txn(
        &mut self,
        txn: Transaction,
        from: usize,
        time: f64,
        links: &LinkConfig,
        rng: &mut impl Rng,
        queue: &mut EventQueue,
    ) {
        if !self.seen_txn_ids.insert(txn.id) {
            trace!("peer {} already saw txn {}", self.id, txn.id);
            return;
        }
        self.mempool.push(txn.clone());
        self.schedule_forward_txn_to_all(&txn, time, Some(from), links, rng, queue);
    }

    /// Honest transaction selection for block assembly: drop
    /// mempool transactions already included anywhere on the current
    /// longest chain, truncate to `MAX_TXN_PER_BLOCK`, append a coinbase.
    fn select_transactions_for_block(&self, time: f64, ids: &mut IdAllocator) -> Vec<Transaction> {
        let mut candidates = self.mempool.clone();
        let tip_id = self.tree.longest_chain_id();
        for block in self.tree.path_to_genesis(tip_id) {
            if block.is_genesis() {
                continue;
            }
            let included: HashSet<u64> = block.transactions.iter().map(|t| t.id).collect();
            candidates.retain(|t| !included.contains(&t.id));
        }
        candidates.truncate(MAX_TXN_PER_BLOCK);
        candidates.push(Transaction::coinbase(ids.next_txn_id(), self.id as i64, time));
        candidates
    }

    /// Apply transactions against `balances` in order, dropping any whose
    /// sender balance would go negative instead of including them.
    fn apply_dropping_insufficient(transactions: Vec<Transaction>, mut balances: Vec<i64>) -> (Vec<Transaction>, Vec<i64>) {
        let mut kept = Vec::with_capacity(transactions.len());
        for txn in transactions {
            if txn.sender == COINBASE {
                balances[txn.receiver as usize] += txn.amount as i64;
                kept.push(txn);
            } else if balances[txn.sender as usize] >= txn.amount as i64 {
                balances[txn.sender as usize] -= txn.amount as i64;
                balances[txn.receiver as usize] += txn.amount as i64;
                kept.push(txn);
            }
        }
        (kept, balances)
    }

    /// CREATE_BLOCK(self, t): assemble contents, sample mining time, and
    /// schedule SUCCESSFUL_MINING carrying the tip this was built on (used
    /// to detect a stale race at delivery time).
    pub fn handle_create_block(
        &mut self,
        time: f64,
        mean_block_time: f64,
        links: &LinkConfig,
        rng: &mut impl Rng,
        ids: &mut IdAllocator,
        queue: &mut EventQueue,
    ) {
        let _ = links;
        if self.hashing_power == 0.0 {
            return;
        }

        let tip_id = self.tree.longest_chain_id();
        let tip = self.tree.get(tip_id).expect("tip always present");

        let transactions = if self.is_selfish {
            // Deliberate simplification carried over from the source: a
            // selfish miner's own block contains only the coinbase.
            vec![Transaction::coinbase(ids.next_txn_id(), self.id as i64, time)]
        } else {
            self.select_transactions_for_block(time, ids)
        };

        let (transactions, peer_balances) =
            Self::apply_dropping_insufficient(transactions, tip.peer_balances.clone());

        let hashing_time = Exp::new(self.hashing_power / mean_block_time).unwrap().sample(rng);
        let new_block = Arc::new(Block::new(
            ids.next_block_id(),
            tip_id,
            self.id as i64,
            time + hashing_time,
            transactions,
            peer_balances,
        ));

        queue.schedule(
            time + hashing_time,
            self.id,
            None,
            EventKind::SuccessfulMining { block: new_block, assembled_tip_id: tip_id },
        );
    }

    /// SUCCESSFUL_MINING(self, block, t, assembled_tip_id): suppress if the
    /// tip moved since assembly (stale work), otherwise insert, gossip or
    /// withhold depending on `is_selfish`, and keep mining if the tip moved.
    ///
    /// Returns whether the block was actually minted (non-stale), so the
    /// caller can update analysis counters.
    pub fn handle_successful_mining(
        &mut self,
        block: Arc<Block>,
        assembled_tip_id: u64,
        time: f64,
        links: &LinkConfig,
        rng: &mut impl Rng,
        queue: &mut EventQueue,
    ) -> bool {
        if self.tree.longest_chain_id() != assembled_tip_id {
            debug!("peer {} discards stale block {} (tip moved during mining)", self.id, block.id);
            return false;
        }

        self.blocks_mined += 1;
        let outcome = self.tree.insert(block.clone());
        if let InsertOutcome::Accepted { tip_moved, .. } = outcome {
            if tip_moved {
                queue.schedule(time, self.id, None, EventKind::CreateBlock);
            }
        }

        if self.is_selfish {
            self.selfish_blocks.push_back(block);
        } else {
            for &neighbor in &self.neighbors {
                let delay = links.sample_queuing_delay(self.id, neighbor, rng);
                queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardBlock(block.clone()));
            }
        }
        true
    }

    /// FORWARD_BLOCK(self, block, to, t).
    pub fn handle_forward_block(&self, block: Arc<Block>, to: usize, time: f64, links: &LinkConfig, queue: &mut EventQueue) {
        let prop = links.propagation_delay(self.id, to);
        let transmission = block.size_kbits() as f64 / links.link_speed(self.id, to);
        queue.schedule(time + prop + transmission, self.id, Some(to), EventKind::ReceiveBlock(block));
    }

    /// RECEIVE_BLOCK for an honest peer: dedup, then forward regardless of
    /// whether the block validated, orphaned, or failed — only an exact
    /// duplicate is swallowed.
    pub fn handle_receive_block_honest(
        &mut self,
        block: Arc<Block>,
        from: usize,
        time: f64,
        links: &LinkConfig,
        rng: &mut impl Rng,
        queue: &mut EventQueue,
    ) {
        if self.tree.contains(block.id) {
            return;
        }
        let outcome = self.tree.insert(block.clone());
        if let InsertOutcome::Accepted { tip_moved, .. } = &outcome {
            if *tip_moved {
                queue.schedule(time, self.id, None, EventKind::CreateBlock);
            }
        }
        for &neighbor in &self.neighbors {
            if neighbor == from {
                continue;
            }
            let delay = links.sample_queuing_delay(self.id, neighbor, rng);
            queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardBlock(block.clone()));
        }
    }

    /// Depth of the longest chain ignoring any still-private selfish block.
    /// Used only for diagnostics, since the release decision below works
    /// directly off the private FIFO's length.
    fn honest_tip_depth(&self) -> u64 {
        let withheld: HashSet<u64> = self.selfish_blocks.iter().map(|b| b.id).collect();
        self.tree
            .seen_ids()
            .filter(|id| !withheld.contains(id))
            .filter_map(|id| self.tree.depth_of(id))
            .max()
            .unwrap_or(0)
    }

    /// Release policy applied once per newly-attached honest block that
    /// advances the public chain. `received_depth` is that block's depth in
    /// this peer's tree; the lead is `depth(last private block) −
    /// received_depth` (source: `lead_diff = self.selfish_blocks[-1].depth -
    /// block.depth`), not simply the FIFO length minus one — those only
    /// coincide when the honest chain has advanced by exactly one block
    /// since the private chain was last measured. Below a lead of two, the
    /// whole private branch is handed over (no point racing); at two or
    /// more, only the oldest withheld block is released, keeping the
    /// remaining lead intact.
    fn apply_release_policy(&mut self, received_depth: u64, time: f64, links: &LinkConfig, rng: &mut impl Rng, queue: &mut EventQueue) {
        if self.selfish_blocks.is_empty() {
            return;
        }
        let last_private_id = self.selfish_blocks.back().expect("checked non-empty above").id;
        let private_depth = self
            .tree
            .depth_of(last_private_id)
            .expect("selfish blocks are inserted into this peer's own tree at mining time");
        let lead_diff = private_depth as i64 - received_depth as i64;
        if lead_diff < 2 {
            self.release_all_selfish_blocks(time, links, rng, queue);
        } else if let Some(oldest) = self.selfish_blocks.pop_front() {
            for &neighbor in &self.neighbors {
                let delay = links.sample_queuing_delay(self.id, neighbor, rng);
                queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardBlock(oldest.clone()));
            }
        }
    }

    fn release_all_selfish_blocks(&mut self, time: f64, links: &LinkConfig, rng: &mut impl Rng, queue: &mut EventQueue) {
        for block in self.selfish_blocks.drain(..) {
            for &neighbor in &self.neighbors {
                let delay = links.sample_queuing_delay(self.id, neighbor, rng);
                queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardBlock(block.clone()));
            }
        }
    }

    /// RECEIVE_BLOCK for a selfish peer: same duplicate/orphan/invalid
    /// handling as the honest path (orphans and invalid blocks are still
    /// forwarded to every neighbor except `from`, to aid propagation), but
    /// the release policy replaces unconditional gossip of a successfully
    /// validated block.
    pub fn handle_receive_block_selfish(
        &mut self,
        block: Arc<Block>,
        from: usize,
        time: f64,
        links: &LinkConfig,
        rng: &mut impl Rng,
        queue: &mut EventQueue,
    ) {
        if self.tree.contains(block.id) {
            return;
        }
        let honest_before = self.honest_tip_depth();
        let outcome = self.tree.insert(block.clone());
        let newly_attached = match outcome {
            InsertOutcome::Accepted { tip_moved, newly_attached } => {
                if tip_moved {
                    queue.schedule(time, self.id, None, EventKind::CreateBlock);
                }
                newly_attached
            }
            InsertOutcome::Orphaned | InsertOutcome::Invalid => {
                for &neighbor in &self.neighbors {
                    if neighbor == from {
                        continue;
                    }
                    let delay = links.sample_queuing_delay(self.id, neighbor, rng);
                    queue.schedule(time + delay, self.id, Some(neighbor), EventKind::ForwardBlock(block.clone()));
                }
                return;
            }
            InsertOutcome::Duplicate => return,
        };

        let mut honest_high_water = honest_before;
        for attached_id in newly_attached {
            let depth = self.tree.depth_of(attached_id).unwrap_or(0);
            if depth > honest_high_water {
                self.apply_release_policy(depth, time, links, rng, queue);
                honest_high_water = depth;
            }
        }
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Topology;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn topo_for(n: usize) -> Topology {
        let mut rng = SmallRng::seed_from_u64(99);
        Topology::build(n, 0, 0, &mut rng)
    }

    #[test]
    fn create_block_on_zero_hashing_power_schedules_nothing() {
        let mut topo = topo_for(6);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut ids = IdAllocator::new();
        let mut queue = EventQueue::new();
        topo.peers[0].resize_tree(6);
        topo.peers[0].hashing_power = 0.0;
        let links = &topo.links;
        topo.peers[0].handle_create_block(0.0, 1.0, links, &mut rng, &mut ids, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_mempool_block_has_only_coinbase() {
        let mut topo = topo_for(6);
        let mut rng = SmallRng::seed_from_u64(2);
        let mut ids = IdAllocator::new();
        let mut queue = EventQueue::new();
        topo.peers[0].resize_tree(6);
        topo.peers[0].hashing_power = 0.5;
        let links = &topo.links;
        topo.peers[0].handle_create_block(0.0, 1.0, links, &mut rng, &mut ids, &mut queue);
        let event = queue.pop().unwrap();
        if let EventKind::SuccessfulMining { block, .. } = event.kind {
            assert_eq!(block.transactions.len(), 1);
            assert!(block.transactions[0].is_coinbase());
            assert_eq!(block.size_kbits(), 16);
        } else {
            panic!("expected SuccessfulMining event");
        }
    }

    #[test]
    fn selfish_peer_still_forwards_an_orphan_block_to_aid_propagation() {
        let mut topo = topo_for(6);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut queue = EventQueue::new();
        let selfish = 0;
        topo.peers[selfish].resize_tree(6);
        topo.peers[selfish].is_selfish = true;
        // Some other peer the selfish peer is connected to.
        let neighbor = topo.peers[selfish].neighbors[0];

        let genesis_balances = topo.peers[selfish].tree.get(0).unwrap().peer_balances.clone();
        let orphan = Arc::new(Block::new(7, 6, 1, 1.0, Vec::new(), genesis_balances)); // parent 6 unknown

        let links = &topo.links;
        topo.peers[selfish].handle_receive_block_selfish(orphan, neighbor, 1.0, links, &mut rng, &mut queue);

        assert!(!topo.peers[selfish].tree.contains(7));
        assert_eq!(topo.peers[selfish].tree.orphan_count(), 1);
        // Forwarded to every neighbor except the one it arrived from.
        let forwarded_count = topo.peers[selfish].neighbors.iter().filter(|&&n| n != neighbor).count();
        assert_eq!(queue.len(), forwarded_count);
    }
}
