//! Human-readable dump of a peer's local block tree, standing in for the
//! GraphViz/plot rendering that consumes this data outside the simulator.
//!
//! Grounded on `blockchain/chain.rs`'s `Chain::to_string` style of walking
//! its blocks for a debug print, generalized from a linear chain print to a
//! recursive tree walk since a peer's local view is a tree, not a list.

use crate::blocktree::BlockTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockColor {
    Adversary1,
    Adversary2,
    LongestChainTip,
    Other,
}

fn color_of(tree: &BlockTree, block_id: u64, adversary1_id: usize, adversary2_id: usize) -> BlockColor {
    if block_id == tree.longest_chain_id() {
        return BlockColor::LongestChainTip;
    }
    match tree.get(block_id).map(|b| b.miner) {
        Some(miner) if miner == adversary1_id as i64 => BlockColor::Adversary1,
        Some(miner) if miner == adversary2_id as i64 => BlockColor::Adversary2,
        _ => BlockColor::Other,
    }
}

fn color_tag(color: BlockColor) -> &'static str {
    match color {
        BlockColor::Adversary1 => "red",
        BlockColor::Adversary2 => "blue",
        BlockColor::LongestChainTip => "green",
        BlockColor::Other => "black",
    }
}

/// Indented, depth-first dump of `tree` starting from genesis, one line per
/// block: `<indent><id> (<miner>) [<color>]`.
pub fn tree_text(tree: &BlockTree, adversary1_id: usize, adversary2_id: usize) -> String {
    let mut out = String::new();
    write_node(tree, 0, 0, adversary1_id, adversary2_id, &mut out);
    out
}

fn write_node(tree: &BlockTree, block_id: u64, depth: usize, adversary1_id: usize, adversary2_id: usize, out: &mut String) {
    let Some(block) = tree.get(block_id) else { return };
    let color = color_of(tree, block_id, adversary1_id, adversary2_id);
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("{} (miner {}) [{}]\n", block_id, block.miner, color_tag(color)));
    let mut children: Vec<u64> = tree.children_of(block_id).to_vec();
    children.sort_unstable();
    for child in children {
        write_node(tree, child, depth + 1, adversary1_id, adversary2_id, out);
    }
}

/// Neighbor ids, for an external renderer to draw the peer-connectivity graph.
pub fn neighbor_list(neighbors: &[usize]) -> Vec<usize> {
    let mut sorted = neighbors.to_vec();
    sorted.sort_unstable();
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use std::sync::Arc;

    #[test]
    fn genesis_only_tree_renders_a_single_line() {
        let tree = BlockTree::new(3);
        let text = tree_text(&tree, 0, 1);
        assert_eq!(text.trim(), "0 (miner -1) [green]");
    }

    #[test]
    fn child_mined_by_adversary_one_is_colored_red() {
        let mut tree = BlockTree::new(3);
        let genesis = tree.get(0).unwrap();
        let balances = genesis.peer_balances.clone();
        let child = Arc::new(Block::new(1, 0, 0, 1.0, Vec::new(), balances));
        tree.insert(child);
        let text = tree_text(&tree, 0, 1);
        assert!(text.contains("1 (miner 0) [red]"));
    }

    #[test]
    fn neighbor_list_is_sorted() {
        assert_eq!(neighbor_list(&[5, 1, 3]), vec![1, 3, 5]);
    }
}
