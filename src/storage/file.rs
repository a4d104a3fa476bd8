//! Memory-mapped file block store.
//!
//! A `FileStore` is a fixed-size file mapped into the address space and
//! addressed as whole blocks. The geometry never changes after creation:
//! the index layer manages growth internally through its free list, so the
//! store has no grow operation and the mapping stays valid for the life of
//! the value.
//!
//! ## File Format
//!
//! Blocks are concatenated with no file-level header or framing:
//!
//! ```text
//! offset 0:              block 0
//! offset block_size:     block 1
//! offset 2*block_size:   block 2
//! ...
//! ```
//!
//! The file length must be an exact multiple of the block size; `open`
//! rejects anything else.
//!
//! ## Durability
//!
//! Writes land in the mapping and reach the file through the OS page
//! cache. [`BlockStore::sync`] flushes the mapping before returning, which
//! is the only durability boundary this store offers.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{Error, Result};

use super::BlockStore;

#[derive(Debug)]
pub struct FileStore {
    mmap: MmapMut,
    block_size: usize,
    num_blocks: u32,
}

impl FileStore {
    /// Create a zero-filled store of `num_blocks` blocks at `path`,
    /// truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize, num_blocks: u32) -> Result<Self> {
        if block_size == 0 || num_blocks == 0 {
            return Err(Error::SizeMismatch {
                expected: 1,
                got: 0,
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let file_size = block_size as u64 * num_blocks as u64;
        file.set_len(file_size)?;

        // SAFETY: MmapMut::map_mut is unsafe because a mapped file can be
        // modified externally. This is safe because:
        // 1. The file was just created with truncate=true, so no other
        //    mapping of prior contents exists
        // 2. Store files are single-writer by contract; nothing else
        //    modifies them while the store is open
        // 3. The mapping's lifetime is tied to FileStore, preventing
        //    use-after-unmap
        // 4. All access goes through read_block/write_block, which
        //    bounds-check the block index
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            mmap,
            block_size,
            num_blocks,
        })
    }

    /// Open an existing store file, deriving the block count from the file
    /// length. The length must be a non-zero multiple of `block_size`.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_size = file.metadata()?.len();

        if file_size == 0 {
            return Err(Error::Corrupt(format!(
                "store file '{}' is empty",
                path.display()
            )));
        }
        if block_size == 0 || file_size % block_size as u64 != 0 {
            return Err(Error::Corrupt(format!(
                "store file '{}' length {} is not a multiple of block size {}",
                path.display(),
                file_size,
                block_size
            )));
        }

        let num_blocks = (file_size / block_size as u64) as u32;

        // SAFETY: MmapMut::map_mut is unsafe because a mapped file can be
        // modified externally. This is safe because:
        // 1. Store files are single-writer by contract; nothing else
        //    modifies them while the store is open
        // 2. The file length was validated as a whole number of blocks
        // 3. The mapping's lifetime is tied to FileStore, preventing
        //    use-after-unmap
        // 4. All access goes through read_block/write_block, which
        //    bounds-check the block index
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            mmap,
            block_size,
            num_blocks,
        })
    }

    fn block_range(&self, block_no: u32) -> Result<std::ops::Range<usize>> {
        if block_no >= self.num_blocks {
            return Err(Error::Corrupt(format!(
                "block {} out of bounds (num_blocks={})",
                block_no, self.num_blocks
            )));
        }
        let start = block_no as usize * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockStore for FileStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&self, block_no: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size {
            return Err(Error::SizeMismatch {
                expected: self.block_size,
                got: buf.len(),
            });
        }
        let range = self.block_range(block_no)?;
        buf.copy_from_slice(&self.mmap[range]);
        Ok(())
    }

    fn write_block(&mut self, block_no: u32, buf: &[u8]) -> Result<()> {
        if buf.len() != self.block_size {
            return Err(Error::SizeMismatch {
                expected: self.block_size,
                got: buf.len(),
            });
        }
        let range = self.block_range(block_no)?;
        self.mmap[range].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}
