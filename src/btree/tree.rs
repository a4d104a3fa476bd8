//! # B+-Tree Index Engine
//!
//! The tree proper: attach/detach on a formatted store, the free-block
//! manager, key lookup and update, and the insert/split/promote machinery.
//!
//! ## Block Roles
//!
//! ```text
//! block 0    superblock: geometry, root location, free-list head,
//!            tree-wide key count
//! block 1    the root at creation time (the root moves when it splits)
//! others     root/interior/leaf nodes, or unallocated blocks threaded
//!            into the free chain
//! ```
//!
//! ## Descent
//!
//! Search follows the first separator `>=` the key, so keys equal to a
//! separator live in the left subtree. The descent records the blocks it
//! passes through; when a split needs the parent of a node, it pops the
//! recorded path instead of re-deriving ancestry from key ranges.
//!
//! ## Insert and Split
//!
//! Insertion goes to the located leaf in place. A node that reaches
//! two-thirds of its capacity afterwards is split: the upper half of its
//! slots moves to a freshly allocated sibling and a separator is promoted
//! into the parent. Leaves keep the promoted separator as their own last
//! key; interior nodes give it up entirely, keeping every child pointer
//! reachable from exactly one place. When the
//! root itself splits, a new root block is allocated, the old root is
//! retyped interior, and the superblock is pointed at the new root.
//!
//! The early (two-thirds) trigger buys post-split occupancy around one
//! third, so both halves absorb further inserts without immediately
//! splitting again.
//!
//! ## Failure Behavior
//!
//! Nothing here is transactional. A duplicate key fails before any write.
//! An exhausted free list mid-split leaves the in-place half of the work
//! persisted and the promotion undone; the tree stays searchable and in
//! key order, and the oversized node is split on a later insert once
//! space exists. Corruption (bad node type, a cycle, a pointer out of
//! range) is fatal and reported as such.

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::storage::{BlockStore, BufferCache};

use super::node::{Node, NodeType, SearchResult};

/// The block an index's superblock must occupy.
pub const SUPERBLOCK_BLOCK: u32 = 0;

/// A B+-tree index attached to a buffer cache.
///
/// All operations are synchronous and single-threaded; the index borrows
/// the cache exclusively for its lifetime.
pub struct BTreeIndex<'a, S: BlockStore> {
    pub(crate) cache: &'a mut BufferCache<S>,
    superblock_index: u32,
    superblock: Node,
}

impl<'a, S: BlockStore> BTreeIndex<'a, S> {
    /// Format the store and attach: superblock at block 0, an empty root
    /// at block 1, every remaining block threaded into the free chain.
    pub fn create(
        cache: &'a mut BufferCache<S>,
        initial_block: u32,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self> {
        if initial_block != SUPERBLOCK_BLOCK {
            return Err(Error::Corrupt(format!(
                "superblock must live at block {SUPERBLOCK_BLOCK}, not {initial_block}"
            )));
        }
        if key_size == 0 || value_size == 0 {
            return Err(Error::SizeMismatch {
                expected: 1,
                got: 0,
            });
        }

        let block_size = cache.block_size();
        let num_blocks = cache.num_blocks();
        if num_blocks < 2 {
            return Err(Error::NoSpace);
        }
        check_geometry(key_size, value_size, block_size)?;

        let root_block = initial_block + 1;
        let first_free = if num_blocks > 2 { initial_block + 2 } else { 0 };

        let mut superblock = Node::new(NodeType::Superblock, key_size, value_size, block_size);
        superblock.header_mut().set_root_block(root_block);
        superblock.header_mut().set_free_list(first_free);
        cache.notify_allocate_block(initial_block);
        superblock.write_to(cache, initial_block)?;

        let mut root = Node::new(NodeType::Root, key_size, value_size, block_size);
        root.header_mut().set_root_block(root_block);
        root.header_mut().set_free_list(first_free);
        cache.notify_allocate_block(root_block);
        root.write_to(cache, root_block)?;

        for block_no in initial_block + 2..num_blocks {
            let mut free = Node::new(NodeType::Unallocated, key_size, value_size, block_size);
            free.header_mut().set_root_block(root_block);
            let next = if block_no + 1 == num_blocks { 0 } else { block_no + 1 };
            free.header_mut().set_free_list(next);
            free.write_to(cache, block_no)?;
        }

        debug!(num_blocks, block_size, key_size, value_size, "formatted index store");

        Ok(Self {
            cache,
            superblock_index: initial_block,
            superblock,
        })
    }

    /// Attach to an already formatted store by reading its superblock.
    pub fn attach(cache: &'a mut BufferCache<S>, initial_block: u32) -> Result<Self> {
        if initial_block != SUPERBLOCK_BLOCK {
            return Err(Error::Corrupt(format!(
                "superblock must live at block {SUPERBLOCK_BLOCK}, not {initial_block}"
            )));
        }

        let superblock = Node::read_from(cache, initial_block)?;
        if superblock.node_type()? != NodeType::Superblock {
            return Err(Error::Corrupt(format!(
                "block {} does not hold a superblock",
                initial_block
            )));
        }

        let header = superblock.header();
        if header.block_size() != cache.block_size() {
            return Err(Error::Corrupt(format!(
                "superblock records block size {}, store uses {}",
                header.block_size(),
                cache.block_size()
            )));
        }
        check_geometry(header.key_size(), header.value_size(), header.block_size())?;

        debug!(
            root_block = header.root_block(),
            num_keys = header.num_keys(),
            "attached index"
        );

        Ok(Self {
            cache,
            superblock_index: initial_block,
            superblock,
        })
    }

    /// Persist the superblock and release the cache borrow. Flushing
    /// cached frames to the store stays the cache's responsibility.
    pub fn detach(self) -> Result<()> {
        self.superblock.write_to(self.cache, self.superblock_index)
    }

    pub fn key_size(&self) -> usize {
        self.superblock.header().key_size()
    }

    pub fn value_size(&self) -> usize {
        self.superblock.header().value_size()
    }

    /// Total keys stored in the tree.
    pub fn num_keys(&self) -> u64 {
        self.superblock.header().num_keys() as u64
    }

    pub fn root_block(&self) -> u32 {
        self.superblock.header().root_block()
    }

    pub(crate) fn free_list_head(&self) -> u32 {
        self.superblock.header().free_list()
    }

    fn write_superblock(&mut self) -> Result<()> {
        self.superblock.write_to(self.cache, self.superblock_index)
    }

    /// Pop the head of the free chain. The caller owns the block and must
    /// rewrite it with a proper node before anything traverses to it.
    pub fn allocate_node(&mut self) -> Result<u32> {
        let block_no = self.superblock.header().free_list();
        if block_no == 0 {
            warn!("free list exhausted");
            return Err(Error::NoSpace);
        }

        let node = Node::read_from(self.cache, block_no)?;
        if node.node_type()? != NodeType::Unallocated {
            return Err(Error::Corrupt(format!(
                "free-list head {} is not unallocated",
                block_no
            )));
        }

        self.superblock
            .header_mut()
            .set_free_list(node.header().free_list());
        self.write_superblock()?;
        self.cache.notify_allocate_block(block_no);
        trace!(block_no, "allocated node");
        Ok(block_no)
    }

    /// Return a block to the free chain. The block is rewritten as
    /// unallocated first, then the superblock adopts it as the new head,
    /// so a reader that sees the new head always finds a typed free block.
    pub fn deallocate_node(&mut self, block_no: u32) -> Result<()> {
        if block_no == self.superblock_index {
            return Err(Error::Corrupt("cannot deallocate the superblock".into()));
        }

        let mut node = Node::read_from(self.cache, block_no)?;
        if node.node_type()? == NodeType::Unallocated {
            return Err(Error::Corrupt(format!(
                "block {} deallocated twice",
                block_no
            )));
        }

        node.header_mut().set_node_type(NodeType::Unallocated);
        node.header_mut()
            .set_free_list(self.superblock.header().free_list());
        node.header_mut().set_num_keys(0);
        node.write_to(self.cache, block_no)?;

        self.superblock.header_mut().set_free_list(block_no);
        self.write_superblock()?;
        self.cache.notify_deallocate_block(block_no);
        trace!(block_no, "deallocated node");
        Ok(())
    }

    /// Fetch the value stored under `key`.
    pub fn lookup(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_key(key)?;
        let (_, leaf, _) = self.descend_to_leaf(key)?;
        match leaf.locate(key)? {
            SearchResult::Found(slot) => Ok(leaf.value_at(slot)?.to_vec()),
            SearchResult::NotFound(_) => Err(Error::NotFound),
        }
    }

    /// Overwrite the value stored under an existing `key`.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        self.check_value(value)?;

        let (leaf_block, mut leaf, _) = self.descend_to_leaf(key)?;
        match leaf.locate(key)? {
            SearchResult::Found(slot) => {
                leaf.set_value(slot, value)?;
                leaf.write_to(self.cache, leaf_block)
            }
            SearchResult::NotFound(_) => Err(Error::NotFound),
        }
    }

    /// Insert a new `(key, value)` pair. Duplicate keys are rejected.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        self.check_value(value)?;

        let root_block = self.root_block();
        let root = Node::read_from(self.cache, root_block)?;
        if !root.node_type()?.is_branch() {
            return Err(Error::Corrupt(format!(
                "root block {} is not a branch node",
                root_block
            )));
        }
        if root.num_keys() == 0 {
            return self.bootstrap_first_insert(root, root_block, key, value);
        }

        let (leaf_block, mut leaf, path) = self.descend_to_leaf(key)?;
        let slot = match leaf.locate(key)? {
            SearchResult::Found(_) => return Err(Error::Conflict),
            SearchResult::NotFound(slot) => slot,
        };

        // A leaf can sit at capacity when an earlier split ran out of
        // blocks; refuse rather than overflow the slot array.
        if leaf.num_keys() >= leaf.leaf_slots() {
            return Err(Error::NoSpace);
        }

        leaf.leaf_insert_slot(slot, key, value)?;
        leaf.write_to(self.cache, leaf_block)?;

        let total = self.superblock.header().num_keys() + 1;
        self.superblock.header_mut().set_num_keys(total);
        self.write_superblock()?;

        if leaf.num_keys() >= split_threshold(leaf.leaf_slots()) {
            self.split_and_promote(leaf_block, leaf, path)?;
        }
        Ok(())
    }

    /// Deletion is not supported by this format revision.
    pub fn delete(&mut self, _key: &[u8]) -> Result<()> {
        Err(Error::Unimplemented("delete"))
    }

    /// First insert into a fresh tree: fabricate a one-separator root over
    /// two new leaves and place the pair in the left one.
    fn bootstrap_first_insert(
        &mut self,
        mut root: Node,
        root_block: u32,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let left_block = self.allocate_node()?;
        let right_block = match self.allocate_node() {
            Ok(block_no) => block_no,
            Err(err) => {
                self.release_unused_block(left_block)?;
                return Err(err);
            }
        };

        let (key_size, value_size) = (self.key_size(), self.value_size());
        let block_size = self.cache.block_size();

        let mut left = Node::new(NodeType::Leaf, key_size, value_size, block_size);
        left.leaf_insert_slot(0, key, value)?;
        left.write_to(self.cache, left_block)?;

        let right = Node::new(NodeType::Leaf, key_size, value_size, block_size);
        right.write_to(self.cache, right_block)?;

        root.header_mut().set_num_keys(1);
        root.set_key(0, key)?;
        root.set_ptr(0, left_block)?;
        root.set_ptr(1, right_block)?;
        root.write_to(self.cache, root_block)?;

        let total = self.superblock.header().num_keys() + 1;
        self.superblock.header_mut().set_num_keys(total);
        self.write_superblock()?;

        debug!(left_block, right_block, "bootstrapped empty tree");
        Ok(())
    }

    /// Walk from the root to the leaf responsible for `key`, returning the
    /// leaf and the branch blocks passed on the way (root first).
    fn descend_to_leaf(&mut self, key: &[u8]) -> Result<(u32, Node, Vec<u32>)> {
        let mut path = Vec::new();
        let mut block_no = self.root_block();
        let num_blocks = self.cache.num_blocks();

        for _ in 0..num_blocks {
            let node = Node::read_from(self.cache, block_no)?;
            match node.node_type()? {
                NodeType::Leaf => return Ok((block_no, node, path)),
                t if t.is_branch() => {
                    if node.num_keys() == 0 {
                        // Only a never-inserted root is legally empty.
                        return Err(Error::NotFound);
                    }
                    let slot = node.child_slot_for(key)?;
                    let child = node.ptr_at(slot)?;
                    if child == 0 || child >= num_blocks {
                        return Err(Error::Corrupt(format!(
                            "branch block {} holds invalid child pointer {}",
                            block_no, child
                        )));
                    }
                    path.push(block_no);
                    block_no = child;
                }
                t => {
                    return Err(Error::Corrupt(format!(
                        "descent reached {:?} node at block {}",
                        t, block_no
                    )))
                }
            }
        }
        Err(Error::Corrupt(
            "descent did not terminate; tree contains a cycle".into(),
        ))
    }

    /// Split `node` (already persisted, at or past its threshold) and
    /// promote separators up the recorded path, splitting further as
    /// needed. Ends either in a parent with room or in a root promotion.
    ///
    /// Every fallible step (the parent-capacity check and the block
    /// allocations) runs before the level's first persistent mutation,
    /// so a failed insert leaves an intact over-threshold node pending a
    /// later split, never a half-promoted sibling holding live keys.
    fn split_and_promote(&mut self, block_no: u32, node: Node, mut path: Vec<u32>) -> Result<()> {
        let (key_size, value_size) = (self.key_size(), self.value_size());
        let block_size = self.cache.block_size();

        let mut block_no = block_no;
        let mut node = node;

        loop {
            let node_type = node.node_type()?;
            let is_root = node_type == NodeType::Root;
            let half = node.num_keys() / 2;
            let separator = node.key_at(half - 1)?.to_vec();

            let parent = if is_root {
                None
            } else {
                let parent_block = path.pop().ok_or_else(|| {
                    Error::Corrupt(format!("non-root block {} has no recorded parent", block_no))
                })?;
                let parent = Node::read_from(self.cache, parent_block)?;
                if matches!(parent.locate(&separator)?, SearchResult::NotFound(_))
                    && parent.num_keys() >= parent.interior_slots()
                {
                    // The parent sits at hard capacity from an earlier
                    // failed split; refuse before touching anything.
                    return Err(Error::NoSpace);
                }
                Some((parent_block, parent))
            };

            let sibling_block = self.allocate_node()?;
            let new_root_block = if is_root {
                match self.allocate_node() {
                    Ok(b) => Some(b),
                    Err(err) => {
                        self.release_unused_block(sibling_block)?;
                        return Err(err);
                    }
                }
            } else {
                None
            };

            let mut sibling = Node::new(
                if node_type == NodeType::Leaf {
                    NodeType::Leaf
                } else {
                    NodeType::Interior
                },
                key_size,
                value_size,
                block_size,
            );
            if node_type == NodeType::Leaf {
                node.split_leaf_into(&mut sibling)?;
            } else {
                node.split_branch_into(&mut sibling)?;
            }

            node.write_to(self.cache, block_no)?;
            sibling.write_to(self.cache, sibling_block)?;
            debug!(
                block_no,
                sibling_block,
                keys_left = node.num_keys(),
                keys_right = sibling.num_keys(),
                "split node"
            );

            let (parent_block, mut parent) = match parent {
                None => {
                    return self.promote_new_root(
                        block_no,
                        &separator,
                        sibling_block,
                        new_root_block.expect("root split reserves a root block"),
                        node,
                    )
                }
                Some(pair) => pair,
            };

            match parent.locate(&separator)? {
                SearchResult::Found(slot) => {
                    // The separator already exists; only the pointer to
                    // its right changes, and the block must still be
                    // rewritten.
                    parent.set_ptr(slot + 1, sibling_block)?;
                    parent.write_to(self.cache, parent_block)?;
                }
                SearchResult::NotFound(slot) => {
                    parent.branch_insert_slot(slot, &separator, sibling_block)?;
                    parent.write_to(self.cache, parent_block)?;
                }
            }

            if parent.num_keys() < split_threshold(parent.interior_slots()) {
                return Ok(());
            }
            block_no = parent_block;
            node = parent;
        }
    }

    /// Return a just-allocated, never-written block to the free chain.
    /// Unlike [`Self::deallocate_node`] this does not insist the block was
    /// typed first; it exists to roll back a reservation.
    fn release_unused_block(&mut self, block_no: u32) -> Result<()> {
        let mut node = Node::new(
            NodeType::Unallocated,
            self.key_size(),
            self.value_size(),
            self.cache.block_size(),
        );
        node.header_mut().set_root_block(self.root_block());
        node.header_mut()
            .set_free_list(self.superblock.header().free_list());
        node.write_to(self.cache, block_no)?;

        self.superblock.header_mut().set_free_list(block_no);
        self.write_superblock()?;
        self.cache.notify_deallocate_block(block_no);
        trace!(block_no, "released reserved block");
        Ok(())
    }

    /// The root just split: fill the reserved replacement root with the
    /// two halves, retype the old root interior, and repoint the
    /// superblock.
    fn promote_new_root(
        &mut self,
        old_root_block: u32,
        separator: &[u8],
        sibling_block: u32,
        new_root_block: u32,
        mut old_root: Node,
    ) -> Result<()> {
        old_root.header_mut().set_node_type(NodeType::Interior);
        old_root.write_to(self.cache, old_root_block)?;

        let mut new_root = Node::new(
            NodeType::Root,
            self.key_size(),
            self.value_size(),
            self.cache.block_size(),
        );
        new_root.header_mut().set_num_keys(1);
        new_root.set_key(0, separator)?;
        new_root.set_ptr(0, old_root_block)?;
        new_root.set_ptr(1, sibling_block)?;
        new_root.write_to(self.cache, new_root_block)?;

        self.superblock.header_mut().set_root_block(new_root_block);
        self.write_superblock()?;

        debug!(old_root_block, new_root_block, "promoted new root");
        Ok(())
    }

    pub(crate) fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size() {
            return Err(Error::SizeMismatch {
                expected: self.key_size(),
                got: key.len(),
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &[u8]) -> Result<()> {
        if value.len() != self.value_size() {
            return Err(Error::SizeMismatch {
                expected: self.value_size(),
                got: value.len(),
            });
        }
        Ok(())
    }
}

/// A node at or past this many keys must split. Two thirds of capacity,
/// rounded up, so both split halves land well under half full.
pub(crate) fn split_threshold(capacity: usize) -> usize {
    (capacity * 2).div_ceil(3)
}

fn check_geometry(key_size: usize, value_size: usize, block_size: usize) -> Result<()> {
    use super::node::{NODE_HEADER_SIZE, PTR_SIZE};
    use crate::config::{MIN_INTERIOR_SLOTS, MIN_LEAF_SLOTS};

    let leaf_needs = NODE_HEADER_SIZE + MIN_LEAF_SLOTS * (key_size + value_size);
    let interior_needs = NODE_HEADER_SIZE + PTR_SIZE + MIN_INTERIOR_SLOTS * (key_size + PTR_SIZE);
    let needed = leaf_needs.max(interior_needs);
    if block_size < needed {
        return Err(Error::SizeMismatch {
            expected: needed,
            got: block_size,
        });
    }
    Ok(())
}
