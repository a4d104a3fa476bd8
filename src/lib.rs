//! # blocktree: a block-addressed, disk-backed B+-tree index
//!
//! blocktree maps fixed-width keys to fixed-width values and stores the
//! whole structure as a sequence of equal-sized blocks: one node per
//! block, a superblock at block 0, and unused blocks threaded into an
//! intrusive free chain. All I/O flows through a write-back buffer cache.
//!
//! ## Quick Start
//!
//! ```
//! use blocktree::{BTreeIndex, BufferCache, MemStore};
//!
//! # fn main() -> blocktree::Result<()> {
//! let store = MemStore::new(4096, 64);
//! let mut cache = BufferCache::new(store, 16);
//!
//! let mut index = BTreeIndex::create(&mut cache, 0, 8, 8)?;
//! index.insert(b"key00001", b"value001")?;
//! assert_eq!(index.lookup(b"key00001")?, b"value001");
//!
//! index.detach()?;
//! cache.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   BTreeIndex (attach/lookup/insert) │
//! ├─────────────────────────────────────┤
//! │   Node codec + free-block manager   │
//! ├─────────────────────────────────────┤
//! │   BufferCache (SIEVE, write-back)   │
//! ├─────────────────────────────────────┤
//! │   BlockStore (MemStore / FileStore) │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## On-Disk Layout
//!
//! Every block starts with the same 28-byte little-endian header (node
//! type, geometry, root pointer, free-chain link, key count). Leaves pack
//! `(key, value)` pairs; root and interior nodes interleave child
//! pointers with separator keys, one more pointer than keys. Block 0 is
//! the superblock, header only, and is authoritative for the root
//! location, the free-chain head, and the tree-wide key count.
//!
//! ## Scope
//!
//! Single-threaded, synchronous, non-transactional. Deletion is not
//! implemented in this format revision; duplicate keys are rejected;
//! crash consistency is a layer above (there is no journal).
//!
//! ## Module Overview
//!
//! - [`storage`]: the block-store trait, heap and mmap stores, the cache
//! - [`btree`]: node codec, tree engine, rendering, structural checks
//! - [`config`]: geometry and cache constants
//! - [`error`]: the error enum every operation returns

pub mod btree;
pub mod config;
pub mod error;
pub mod storage;

pub use btree::{BTreeIndex, DisplayMode, FillReport, Node, NodeHeader, NodeType, SearchResult};
pub use error::{Error, Result};
pub use storage::{BlockStore, BufferCache, CacheStats, FileStore, MemStore};
