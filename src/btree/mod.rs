//! # B+-Tree Index
//!
//! A disk-backed B+-tree mapping fixed-width keys to fixed-width values,
//! stored as one node per block behind a buffer cache.
//!
//! ## Layering
//!
//! ```text
//! tree     attach/detach, free-block manager, descent, insert/split,
//!          root promotion
//! node     the codec: header layout, slot geometry, typed accessors
//! display  depth-first rendering (text, Graphviz, sorted dump)
//! check    ordering oracle, fill statistics, full structural audit
//! ```
//!
//! ## Shape of the Tree
//!
//! Leaves hold the `(key, value)` pairs; root and interior nodes hold
//! separator keys with one more child pointer than keys. All leaves sit
//! at the same depth. The descent predicate sends a key equal to a
//! separator into the left subtree, so a leaf's largest key may reappear
//! as the separator above it; promoted separators are copies at the
//! leaf level and move up outright from interior levels.
//!
//! ## What This Module Does Not Do
//!
//! Deletion (and the merge/redistribute machinery it drags in), duplicate
//! keys, variable-width records, concurrent writers, and crash recovery
//! are all out of scope. The failure model is: any I/O error aborts the
//! current operation and leaves previously persisted state in place.

mod check;
mod display;
mod node;
mod tree;

pub use check::FillReport;
pub use display::DisplayMode;
pub use node::{Node, NodeHeader, NodeType, SearchResult, NODE_HEADER_SIZE, PTR_SIZE};
pub use tree::{BTreeIndex, SUPERBLOCK_BLOCK};
