//! The discrete-event queue: a stable min-heap keyed on virtual time.
//!
//! Grounded on the tagged-`match`-over-an-event-enum dispatch style in
//! `network/event_handling.rs`, generalized from libp2p gossipsub message
//! payloads to a typed, schedulable `Event` carrying a virtual timestamp —
//! a sum type reads better here than integer codes switched over by hand.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::block::Block;
use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub enum EventKind {
    CreateTxn(Transaction),
    ForwardTxn(Transaction),
    ReceiveTxn(Transaction),
    CreateBlock,
    /// Carries the block tip id the miner was building on when it started
    /// mining, so a stale race can be detected at delivery time.
    SuccessfulMining { block: Arc<Block>, assembled_tip_id: u64 },
    ForwardBlock(Arc<Block>),
    ReceiveBlock(Arc<Block>),
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::CreateTxn(_) => "CREATE_TXN",
            EventKind::ForwardTxn(_) => "FORWARD_TXN",
            EventKind::ReceiveTxn(_) => "RECEIVE_TXN",
            EventKind::CreateBlock => "CREATE_BLOCK",
            EventKind::SuccessfulMining { .. } => "SUCCESSFUL_MINING",
            EventKind::ForwardBlock(_) => "FORWARD_BLOCK",
            EventKind::ReceiveBlock(_) => "RECEIVE_BLOCK",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub scheduled_time: f64,
    pub sender: usize,
    pub receiver: Option<usize>,
    pub kind: EventKind,
    seq: u64,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_time == other.scheduled_time && self.seq == other.seq
    }
}
impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest time (and, on a
        // tie, the earliest insertion order) pops first.
        match other
            .scheduled_time
            .partial_cmp(&self.scheduled_time)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of future events, with a monotonically increasing insertion
/// sequence number so ties on `scheduled_time` break deterministically.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    pub fn schedule(&mut self, scheduled_time: f64, sender: usize, receiver: Option<usize>, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Event { scheduled_time, sender, receiver, kind, seq });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_nondecreasing_time_order() {
        let mut q = EventQueue::new();
        q.schedule(3.0, 0, None, EventKind::CreateBlock);
        q.schedule(1.0, 0, None, EventKind::CreateBlock);
        q.schedule(2.0, 0, None, EventKind::CreateBlock);

        let mut times = Vec::new();
        while let Some(e) = q.pop() {
            times.push(e.scheduled_time);
        }
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ties_break_on_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule(1.0, 1, None, EventKind::CreateBlock);
        q.schedule(1.0, 2, None, EventKind::CreateBlock);
        q.schedule(1.0, 3, None, EventKind::CreateBlock);

        let first = q.pop().unwrap();
        let second = q.pop().unwrap();
        let third = q.pop().unwrap();
        assert_eq!((first.sender, second.sender, third.sender), (1, 2, 3));
    }
}
