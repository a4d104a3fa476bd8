//! # Configuration Constants
//!
//! Centralized constants for blocktree. Interdependent values live together
//! so a change to one is visible next to the values that constrain it.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_BLOCK_SIZE (4096 bytes)
//!       │
//!       └─> NODE_HEADER_SIZE (28 bytes, fixed by the on-disk format)
//!             Slot capacities are derived per index from block size and
//!             key/value widths, not fixed here; see btree::node.
//!
//! MIN_LEAF_SLOTS (3) / MIN_INTERIOR_SLOTS (5)
//!       │
//!       └─> The split engine places floor(n/2) or floor(n/2)-1 slots in the
//!           left half of a split. Below these capacities a split can leave
//!           an empty node, so attach/create rejects the geometry outright.
//!
//! DEFAULT_CACHE_CAPACITY (64 frames)
//!       │
//!       └─> One frame per cached block. The tree never pins more than a
//!           handful of blocks per operation, so even tiny capacities are
//!           functionally safe; larger ones just avoid write-back churn.
//! ```

/// Block size used when callers have no reason to pick something else.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Number of block frames a [`crate::storage::BufferCache`] holds by default.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Smallest leaf capacity for which the split arithmetic is sound.
pub const MIN_LEAF_SLOTS: usize = 3;

/// Smallest interior capacity for which the split arithmetic is sound.
pub const MIN_INTERIOR_SLOTS: usize = 5;

const _: () = assert!(MIN_LEAF_SLOTS >= 3);
const _: () = assert!(MIN_INTERIOR_SLOTS >= 5);
const _: () = assert!(DEFAULT_CACHE_CAPACITY > 0);
