//! Structural verification of an attached index.
//!
//! Three entry points with increasing strictness:
//!
//! - [`BTreeIndex::keys_in_order`]: the ordering oracle: every reachable
//!   node's keys strictly increase, and every key sits inside the bounds
//!   its ancestors' separators impose. Violations report `OutOfOrder`.
//! - [`BTreeIndex::fill_report`]: leaf occupancy statistics. The
//!   two-thirds split trigger intentionally leaves fresh halves around a
//!   third full, so low fill is reported rather than treated as damage.
//! - [`BTreeIndex::sanity_check`]: everything: ordering, node typing,
//!   uniform leaf depth, the tree-wide key counter, free-chain
//!   termination, and the rule that every block is the superblock, on the
//!   free chain, or reachable from the root, exactly one of the three.
//!
//! The bound discipline during the walk: a child under separator `k_i`
//! may hold keys `<= k_i` and must hold keys `> k_{i-1}`, matching the
//! descent predicate that sends keys equal to a separator leftward.

use crate::error::{Error, Result};
use crate::storage::BlockStore;

use super::node::{Node, NodeType};
use super::tree::BTreeIndex;

/// Leaf occupancy summary produced by [`BTreeIndex::fill_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillReport {
    pub leaves: usize,
    pub total_keys: usize,
    pub leaf_slots: usize,
    pub min_leaf_keys: usize,
}

impl FillReport {
    /// Mean leaf occupancy in `[0, 1]`; zero for an empty tree.
    pub fn average_fill(&self) -> f64 {
        if self.leaves == 0 {
            return 0.0;
        }
        self.total_keys as f64 / (self.leaves * self.leaf_slots) as f64
    }

    /// True when every leaf is at least half full and the mean occupancy
    /// exceeds one half.
    pub fn at_least_half_full(&self) -> bool {
        self.leaves > 0
            && self.min_leaf_keys >= self.leaf_slots.div_ceil(2)
            && self.total_keys * 2 > self.leaves * self.leaf_slots
    }
}

struct WalkState {
    seen: Vec<bool>,
    leaf_depth: Option<usize>,
    leaves: usize,
    leaf_keys: usize,
    min_leaf_keys: usize,
}

impl WalkState {
    fn new(num_blocks: usize) -> Self {
        Self {
            seen: vec![false; num_blocks],
            leaf_depth: None,
            leaves: 0,
            leaf_keys: 0,
            min_leaf_keys: usize::MAX,
        }
    }
}

impl<'a, S: BlockStore> BTreeIndex<'a, S> {
    /// Verify key ordering across the whole tree. `OutOfOrder` on the
    /// first violation; corruption errors if the walk hits damaged
    /// structure before it can compare keys.
    pub fn keys_in_order(&mut self) -> Result<()> {
        let mut state = WalkState::new(self.cache.num_blocks() as usize);
        self.verify_subtree(self.root_block(), 0, None, None, &mut state)
    }

    /// Collect leaf occupancy statistics without judging them.
    pub fn fill_report(&mut self) -> Result<FillReport> {
        let mut state = WalkState::new(self.cache.num_blocks() as usize);
        self.verify_subtree(self.root_block(), 0, None, None, &mut state)?;

        let leaf_slots = Node::new(
            NodeType::Leaf,
            self.key_size(),
            self.value_size(),
            self.cache.block_size(),
        )
        .leaf_slots();

        Ok(FillReport {
            leaves: state.leaves,
            total_keys: state.leaf_keys,
            leaf_slots,
            min_leaf_keys: if state.leaves == 0 { 0 } else { state.min_leaf_keys },
        })
    }

    /// Full structural audit; `Ok(())` means the index passed every check.
    pub fn sanity_check(&mut self) -> Result<()> {
        let num_blocks = self.cache.num_blocks() as usize;
        let mut state = WalkState::new(num_blocks);
        self.verify_subtree(self.root_block(), 0, None, None, &mut state)?;

        if state.leaf_keys as u64 != self.num_keys() {
            return Err(Error::Corrupt(format!(
                "superblock records {} keys, leaves hold {}",
                self.num_keys(),
                state.leaf_keys
            )));
        }

        // Free chain: typed free blocks, no cycle, terminates at 0.
        let mut free = vec![false; num_blocks];
        let mut head = self.free_list_head();
        while head != 0 {
            let slot = head as usize;
            if slot >= num_blocks {
                return Err(Error::Corrupt(format!(
                    "free chain points past the store at block {}",
                    head
                )));
            }
            if free[slot] {
                return Err(Error::Corrupt(format!(
                    "free chain revisits block {}",
                    head
                )));
            }
            if state.seen[slot] {
                return Err(Error::Corrupt(format!(
                    "block {} is both reachable and on the free chain",
                    head
                )));
            }
            let node = Node::read_from(self.cache, head)?;
            if node.node_type()? != NodeType::Unallocated {
                return Err(Error::Corrupt(format!(
                    "free chain block {} is not typed unallocated",
                    head
                )));
            }
            free[slot] = true;
            head = node.header().free_list();
        }

        // Every block is the superblock, reachable, or free, exactly one.
        for block_no in 1..num_blocks {
            if !state.seen[block_no] && !free[block_no] {
                return Err(Error::Corrupt(format!(
                    "block {} is neither reachable nor free",
                    block_no
                )));
            }
        }

        Ok(())
    }

    fn verify_subtree(
        &mut self,
        block_no: u32,
        depth: usize,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        state: &mut WalkState,
    ) -> Result<()> {
        let slot = block_no as usize;
        if slot >= state.seen.len() || block_no == 0 {
            return Err(Error::Corrupt(format!(
                "tree references invalid block {}",
                block_no
            )));
        }
        if state.seen[slot] {
            return Err(Error::Corrupt(format!(
                "block {} reached twice during traversal",
                block_no
            )));
        }
        state.seen[slot] = true;

        let node = Node::read_from(self.cache, block_no)?;
        let node_type = node.node_type()?;

        match (depth, node_type) {
            (0, NodeType::Root) => {}
            (0, t) => {
                return Err(Error::Corrupt(format!(
                    "root block {} has type {:?}",
                    block_no, t
                )))
            }
            (_, NodeType::Interior) | (_, NodeType::Leaf) => {}
            (_, t) => {
                return Err(Error::Corrupt(format!(
                    "block {} below the root has type {:?}",
                    block_no, t
                )))
            }
        }

        // Keys strictly increase within the node and respect the bounds
        // inherited from ancestor separators.
        for i in 0..node.num_keys() {
            let key = node.key_at(i)?;
            if i > 0 && node.key_at(i - 1)? >= key {
                return Err(Error::OutOfOrder);
            }
            if let Some(lo) = lower {
                if key <= lo {
                    return Err(Error::OutOfOrder);
                }
            }
            if let Some(hi) = upper {
                if key > hi {
                    return Err(Error::OutOfOrder);
                }
            }
        }

        if node_type == NodeType::Leaf {
            match state.leaf_depth {
                None => state.leaf_depth = Some(depth),
                Some(expected) if expected != depth => {
                    return Err(Error::Corrupt(format!(
                        "leaf at block {} sits at depth {}, others at {}",
                        block_no, depth, expected
                    )))
                }
                Some(_) => {}
            }
            state.leaves += 1;
            state.leaf_keys += node.num_keys();
            state.min_leaf_keys = state.min_leaf_keys.min(node.num_keys());
            return Ok(());
        }

        if node.num_keys() == 0 {
            // Legal only for a never-inserted root.
            if depth == 0 {
                return Ok(());
            }
            return Err(Error::Corrupt(format!(
                "interior block {} has no keys",
                block_no
            )));
        }

        for child_slot in 0..=node.num_keys() {
            let child = node.ptr_at(child_slot)?;
            let child_lower = if child_slot == 0 {
                lower
            } else {
                Some(node.key_at(child_slot - 1)?)
            };
            let child_upper = if child_slot == node.num_keys() {
                upper
            } else {
                Some(node.key_at(child_slot)?)
            };
            self.verify_subtree(child, depth + 1, child_lower, child_upper, state)?;
        }
        Ok(())
    }
}
