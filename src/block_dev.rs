//! Raw block storage.
//! A volume talks to its blocks only through [`BlockDevice`]; [`BlockStore`] is the
//! in-memory device that also knows how to become a flat image and back.

use std::fs;
use std::path::Path;

use crate::config::*;
use crate::error::FsError;

pub type Block = [u8; BLOCK_SIZE];

pub trait BlockDevice {
    /// Returns the number of blocks in the block device.
    fn num_blocks(&self) -> usize;

    /// Reads a whole block into `buf`.
    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<(), FsError>;

    /// Replaces a whole block with `buf`.
    fn write_block(&mut self, block_id: usize, buf: &Block) -> Result<(), FsError>;

    /// Flushes any buffered data to the underlying storage.
    fn flush(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    /// Returns the size of each block in bytes.
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

/// A fixed array of `MAX_BLOCKS` blocks, stored block-major in one buffer.
#[derive(Clone)]
pub struct BlockStore {
    data: Vec<u8>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore {
            data: vec![0u8; IMAGE_SIZE],
        }
    }

    /// Wraps a persisted image. The image must be exactly `MAX_BLOCKS * BLOCK_SIZE` bytes.
    pub fn from_image(image: Vec<u8>) -> Result<Self, FsError> {
        if image.len() != IMAGE_SIZE {
            return Err(FsError::InvalidImage);
        }
        Ok(BlockStore { data: image })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FsError> {
        Self::from_image(fs::read(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FsError> {
        fs::write(path, &self.data)?;
        Ok(())
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }

    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, block_id: usize) -> Result<core::ops::Range<usize>, FsError> {
        if block_id >= MAX_BLOCKS {
            return Err(FsError::OutOfRange(block_id));
        }
        let start = block_id * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockStore")
            .field("num_blocks", &MAX_BLOCKS)
            .field("block_size", &BLOCK_SIZE)
            .finish()
    }
}

impl BlockDevice for BlockStore {
    fn num_blocks(&self) -> usize {
        MAX_BLOCKS
    }

    fn read_block(&self, block_id: usize, buf: &mut Block) -> Result<(), FsError> {
        let range = self.range(block_id)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_block(&mut self, block_id: usize, buf: &Block) -> Result<(), FsError> {
        let range = self.range(block_id)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounds() {
        let mut store = BlockStore::new();
        let mut buf = [0u8; BLOCK_SIZE];
        assert_eq!(store.read_block(MAX_BLOCKS, &mut buf), Err(FsError::OutOfRange(MAX_BLOCKS)));
        assert_eq!(store.write_block(MAX_BLOCKS + 7, &buf), Err(FsError::OutOfRange(MAX_BLOCKS + 7)));
        assert!(store.read_block(MAX_BLOCKS - 1, &mut buf).is_ok());
    }

    #[test]
    fn test_whole_block_replace() {
        let mut store = BlockStore::new();
        let mut buf = [0xAAu8; BLOCK_SIZE];
        store.write_block(5, &buf).unwrap();
        buf = [0u8; BLOCK_SIZE];
        buf[0] = 1;
        store.write_block(5, &buf).unwrap();

        let mut out = [0xFFu8; BLOCK_SIZE];
        store.read_block(5, &mut out).unwrap();
        assert_eq!(out[0], 1);
        assert!(out[1..].iter().all(|&b| b == 0));
        assert!(store.image()[4 * BLOCK_SIZE..5 * BLOCK_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_image_size() {
        assert_eq!(BlockStore::from_image(vec![0; 10]).unwrap_err(), FsError::InvalidImage);
        let store = BlockStore::from_image(vec![0; IMAGE_SIZE]).unwrap();
        assert_eq!(store.into_image().len(), IMAGE_SIZE);
    }
}
