//! Network topology: peer roster, propagation-delay/link-speed matrices, and
//! the random 3–6-neighbor connected graph.
//!
//! Grounded on `network::behaviour`'s idea of a small struct owning
//! per-link configuration, generalized from a libp2p gossipsub topic set to
//! an explicit delay/speed matrix, since this simulator models link
//! characteristics directly rather than delegating to a real transport.
//!
//! `LinkConfig` is split out from the peer roster so a driver can hold
//! `peers: Vec<Peer>` and `links: LinkConfig` as two separate fields:
//! peer event handlers borrow `&LinkConfig` for delay lookups while the
//! driver mutably indexes `peers` at the same time, which a single
//! `Topology` owning both could never allow through the borrow checker.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::peer::Peer;

pub const QUEUING_DELAY_CONSTANT_KBITS: f64 = 96.0;
pub const FAST_LINK_KBPS: f64 = 100_000.0;
pub const SLOW_LINK_KBPS: f64 = 5_000.0;

/// Per-link delay/speed matrices plus the two adversary ids, independent of
/// the peer roster itself.
pub struct LinkConfig {
    propagation_delay: Vec<Vec<f64>>,
    link_speed_kbps: Vec<Vec<f64>>,
    pub adversary1_id: usize,
    pub adversary2_id: usize,
    num_peers: usize,
}

impl LinkConfig {
    pub fn link_speed(&self, from: usize, to: usize) -> f64 {
        self.link_speed_kbps[from][to]
    }

    pub fn propagation_delay(&self, from: usize, to: usize) -> f64 {
        self.propagation_delay[from][to]
    }

    /// Queuing delay, sampled fresh per send per neighbor: exponential with
    /// mean `96 / link_speed`.
    pub fn sample_queuing_delay(&self, from: usize, to: usize, rng: &mut impl Rng) -> f64 {
        let rate = self.link_speed(from, to) / QUEUING_DELAY_CONSTANT_KBITS;
        Exp::new(rate).expect("link speed is always positive").sample(rng)
    }

    pub fn num_peers(&self) -> usize {
        self.num_peers
    }
}

/// Peer roster plus its link configuration, as produced by [`Topology::build`].
pub struct Topology {
    pub peers: Vec<Peer>,
    pub links: LinkConfig,
}

impl Topology {
    /// Build the network: draw propagation delays, label slow/fast peers,
    /// pick two distinct fast adversaries, assign hashing power, derive link
    /// speeds, then sample a connected 3–6-neighbor graph.
    pub fn build(num_peers: usize, zeta1_pct: u32, zeta2_pct: u32, rng: &mut impl Rng) -> Topology {
        assert!(num_peers >= 6, "connectivity sampling requires at least 6 peers");
        assert!(zeta1_pct + zeta2_pct <= 100, "adversary hashing power cannot exceed 100%");

        let propagation_delay: Vec<Vec<f64>> = (0..num_peers)
            .map(|_| (0..num_peers).map(|_| rng.gen_range(0.010..=0.500)).collect())
            .collect();

        let num_slow = num_peers / 2;
        let mut is_slow = vec![false; num_peers];
        for flag in is_slow.iter_mut().take(num_slow) {
            *flag = true;
        }
        is_slow.shuffle(rng);

        let mut adversary_pick = (0..num_peers).collect::<Vec<_>>();
        adversary_pick.shuffle(rng);
        let (adversary1_id, adversary2_id) = (adversary_pick[0], adversary_pick[1]);

        // Adversaries must always be fast: swap a slow adversary with some
        // honest fast peer.
        for &adversary in &[adversary1_id, adversary2_id] {
            if is_slow[adversary] {
                is_slow[adversary] = false;
                if let Some(swap_with) =
                    (0..num_peers).find(|&i| !is_slow[i] && i != adversary1_id && i != adversary2_id)
                {
                    is_slow[swap_with] = true;
                }
            }
        }

        let honest_power = (100.0 - zeta1_pct as f64 - zeta2_pct as f64) / (100.0 * (num_peers - 2) as f64);

        let mut peers: Vec<Peer> = (0..num_peers)
            .map(|id| {
                let mut peer = if id == adversary1_id {
                    Peer::new(id, is_slow[id], zeta1_pct as f64 / 100.0, true)
                } else if id == adversary2_id {
                    Peer::new(id, is_slow[id], zeta2_pct as f64 / 100.0, true)
                } else {
                    Peer::new(id, is_slow[id], honest_power, false)
                };
                peer.resize_tree(num_peers);
                peer
            })
            .collect();

        let link_speed_kbps: Vec<Vec<f64>> = (0..num_peers)
            .map(|i| {
                (0..num_peers)
                    .map(|j| if is_slow[i] || is_slow[j] { SLOW_LINK_KBPS } else { FAST_LINK_KBPS })
                    .collect()
            })
            .collect();

        build_connected_neighbor_graph(&mut peers, rng);

        Topology {
            peers,
            links: LinkConfig { propagation_delay, link_speed_kbps, adversary1_id, adversary2_id, num_peers },
        }
    }

    pub fn is_connected(&self) -> bool {
        is_connected(&self.peers)
    }

    /// Splits into the two pieces a driver actually needs held separately.
    pub fn into_parts(self) -> (Vec<Peer>, LinkConfig) {
        (self.peers, self.links)
    }
}

/// Resample neighbor lists (biased toward 3–6 per peer) until the graph is
/// connected, verified by BFS from peer 0. Kept as the source's biased
/// sampler rather than a graph-theoretic construction that guarantees
/// connectivity up front, since resampling-until-connected is simple and the
/// peer counts this runs at make the retry loop cheap in practice.
fn build_connected_neighbor_graph(peers: &mut [Peer], rng: &mut impl Rng) {
    let n = peers.len();
    loop {
        for peer in peers.iter_mut() {
            peer.neighbors.clear();
        }
        let mut adjacency = vec![vec![false; n]; n];
        for i in 0..n {
            let existing = peers[i].neighbors.len();
            let lo = 3usize.saturating_sub(existing);
            let hi = 6usize.saturating_sub(existing).max(lo);
            let target_count = rng.gen_range(lo..=hi);
            let pool: Vec<usize> = (0..n).collect();
            let candidates: Vec<usize> = pool.choose_multiple(rng, target_count).copied().collect();
            for j in candidates {
                if i != j && !adjacency[i][j] {
                    adjacency[i][j] = true;
                    adjacency[j][i] = true;
                    peers[i].neighbors.push(j);
                    peers[j].neighbors.push(i);
                }
            }
        }
        if is_connected(peers) {
            break;
        }
    }
}

fn is_connected(peers: &[Peer]) -> bool {
    let n = peers.len();
    let mut visited = vec![false; n];
    let mut queue = std::collections::VecDeque::new();
    visited[0] = true;
    queue.push_back(0usize);
    while let Some(v) = queue.pop_front() {
        for &w in &peers[v].neighbors {
            if !visited[w] {
                visited[w] = true;
                queue.push_back(w);
            }
        }
    }
    visited.iter().all(|&v| v)
}
