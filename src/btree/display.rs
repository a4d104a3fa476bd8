//! Depth-first rendering of a tree for diagnostics.
//!
//! Three formats share one preorder walk:
//!
//! - [`DisplayMode::Depth`]: one indented line per node, pointers and
//!   keys spelled out
//! - [`DisplayMode::DepthDot`]: a Graphviz digraph with an edge per
//!   child pointer, for `dot -Tsvg`
//! - [`DisplayMode::SortedKeyVal`]: leaves only, one `(key,value)` pair
//!   per line in key order; an in-order dump of the whole index
//!
//! Keys and values are rendered as lossy UTF-8; the tree itself treats
//! them as opaque bytes.

use std::io::Write;

use crate::error::{Error, Result};
use crate::storage::BlockStore;

use super::node::{Node, NodeType};
use super::tree::BTreeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Depth,
    DepthDot,
    SortedKeyVal,
}

impl<'a, S: BlockStore> BTreeIndex<'a, S> {
    /// Render the whole tree, depth first from the root.
    pub fn display<W: Write>(&mut self, out: &mut W, mode: DisplayMode) -> Result<()> {
        if mode == DisplayMode::DepthDot {
            writeln!(out, "digraph tree {{")?;
        }
        self.display_block(self.root_block(), out, mode, 0)?;
        if mode == DisplayMode::DepthDot {
            writeln!(out, "}}")?;
        }
        Ok(())
    }

    fn display_block<W: Write>(
        &mut self,
        block_no: u32,
        out: &mut W,
        mode: DisplayMode,
        depth: usize,
    ) -> Result<()> {
        if depth as u32 > self.cache.num_blocks() {
            return Err(Error::Corrupt(
                "display recursion exceeded block count; tree contains a cycle".into(),
            ));
        }

        let node = Node::read_from(self.cache, block_no)?;
        let node_type = node.node_type()?;

        match node_type {
            t if t.is_branch() => {
                self.print_branch(&node, block_no, out, mode, depth)?;
                if node.num_keys() > 0 {
                    for slot in 0..=node.num_keys() {
                        let child = node.ptr_at(slot)?;
                        if mode == DisplayMode::DepthDot {
                            writeln!(out, "  {} -> {};", block_no, child)?;
                        }
                        self.display_block(child, out, mode, depth + 1)?;
                    }
                }
                Ok(())
            }
            NodeType::Leaf => self.print_leaf(&node, block_no, out, mode, depth),
            t => Err(Error::Corrupt(format!(
                "display reached {:?} node at block {}",
                t, block_no
            ))),
        }
    }

    fn print_branch<W: Write>(
        &self,
        node: &Node,
        block_no: u32,
        out: &mut W,
        mode: DisplayMode,
        depth: usize,
    ) -> Result<()> {
        if mode == DisplayMode::SortedKeyVal {
            return Ok(());
        }

        let label = match node.node_type()? {
            NodeType::Root => "Root",
            _ => "Interior",
        };

        let mut slots = String::new();
        for slot in 0..node.num_keys() {
            slots.push_str(&format!(
                "*{} {} ",
                node.ptr_at(slot)?,
                render(node.key_at(slot)?)
            ));
        }
        if node.num_keys() > 0 {
            slots.push_str(&format!("*{}", node.ptr_at(node.num_keys())?));
        }

        match mode {
            DisplayMode::Depth => {
                writeln!(out, "{:indent$}{}: {}: {}", "", block_no, label, slots, indent = depth * 2)?;
            }
            DisplayMode::DepthDot => {
                writeln!(out, "  {} [ label=\"{}: {} {}\" ];", block_no, block_no, label, slots)?;
            }
            DisplayMode::SortedKeyVal => unreachable!(),
        }
        Ok(())
    }

    fn print_leaf<W: Write>(
        &self,
        node: &Node,
        block_no: u32,
        out: &mut W,
        mode: DisplayMode,
        depth: usize,
    ) -> Result<()> {
        match mode {
            DisplayMode::SortedKeyVal => {
                for slot in 0..node.num_keys() {
                    writeln!(
                        out,
                        "({},{})",
                        render(node.key_at(slot)?),
                        render(node.value_at(slot)?)
                    )?;
                }
            }
            DisplayMode::Depth => {
                let mut pairs = String::new();
                for slot in 0..node.num_keys() {
                    pairs.push_str(&format!(
                        "({},{}) ",
                        render(node.key_at(slot)?),
                        render(node.value_at(slot)?)
                    ));
                }
                writeln!(
                    out,
                    "{:indent$}{}: Leaf: {}",
                    "",
                    block_no,
                    pairs.trim_end(),
                    indent = depth * 2
                )?;
            }
            DisplayMode::DepthDot => {
                let mut pairs = String::new();
                for slot in 0..node.num_keys() {
                    pairs.push_str(&format!(
                        "({},{}) ",
                        render(node.key_at(slot)?),
                        render(node.value_at(slot)?)
                    ));
                }
                writeln!(
                    out,
                    "  {} [ label=\"{}: {}\" ];",
                    block_no,
                    block_no,
                    pairs.trim_end()
                )?;
            }
        }
        Ok(())
    }
}

fn render(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BufferCache, MemStore};

    fn small_index(cache: &mut BufferCache<MemStore>) -> BTreeIndex<'_, MemStore> {
        let mut index = BTreeIndex::create(cache, 0, 4, 4).unwrap();
        index.insert(b"bbbb", b"2222").unwrap();
        index.insert(b"aaaa", b"1111").unwrap();
        index.insert(b"cccc", b"3333").unwrap();
        index
    }

    #[test]
    fn sorted_dump_lists_pairs_in_key_order() {
        let mut cache = BufferCache::new(MemStore::new(96, 16), 16);
        let mut index = small_index(&mut cache);

        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::SortedKeyVal).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "(aaaa,1111)\n(bbbb,2222)\n(cccc,3333)\n");
    }

    #[test]
    fn depth_mode_names_every_node_once() {
        let mut cache = BufferCache::new(MemStore::new(96, 16), 16);
        let mut index = small_index(&mut cache);

        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::Depth).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Root"));
        assert_eq!(text.matches("Leaf").count(), 2);
        assert!(text.contains("(aaaa,1111)"));
    }

    #[test]
    fn dot_mode_produces_a_digraph_with_edges() {
        let mut cache = BufferCache::new(MemStore::new(96, 16), 16);
        let mut index = small_index(&mut cache);

        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::DepthDot).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph tree {\n"));
        assert!(text.trim_end().ends_with('}'));
        assert_eq!(text.matches("->").count(), 2);
    }

    #[test]
    fn empty_tree_sorted_dump_is_empty() {
        let mut cache = BufferCache::new(MemStore::new(96, 16), 16);
        let mut index = BTreeIndex::create(&mut cache, 0, 4, 4).unwrap();

        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::SortedKeyVal).unwrap();

        assert!(out.is_empty());
    }
}
