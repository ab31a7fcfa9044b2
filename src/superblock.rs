//! Block 0: the volume label followed by the geometry the volume was formatted with.

use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::trim_zero;

const MAGIC_OFFSET: usize = LABEL_LEN;
const ROOT_OFFSET: usize = LABEL_LEN + 4;
const FAT_BLOCKS_OFFSET: usize = LABEL_LEN + 6;
const BLOCK_SIZE_OFFSET: usize = LABEL_LEN + 8;
const NUM_BLOCKS_OFFSET: usize = LABEL_LEN + 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub label: String,
    pub root_block: u16,
}

impl SuperBlock {
    pub fn new(label: &str) -> Result<Self> {
        if label.len() > LABEL_LEN {
            return Err(FsError::NameTooLong);
        }
        if label.contains('\0') {
            return Err(FsError::InvalidName);
        }
        Ok(Self {
            label: label.to_string(),
            root_block: ROOT_BLOCK,
        })
    }

    fn encode(&self) -> Block {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..self.label.len()].copy_from_slice(self.label.as_bytes());
        buf[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[ROOT_OFFSET..ROOT_OFFSET + 2].copy_from_slice(&self.root_block.to_le_bytes());
        buf[FAT_BLOCKS_OFFSET..FAT_BLOCKS_OFFSET + 2].copy_from_slice(&(FAT_BLOCKS as u16).to_le_bytes());
        buf[BLOCK_SIZE_OFFSET..BLOCK_SIZE_OFFSET + 4].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        buf[NUM_BLOCKS_OFFSET..NUM_BLOCKS_OFFSET + 4].copy_from_slice(&(MAX_BLOCKS as u32).to_le_bytes());
        buf
    }

    fn decode(buf: &Block) -> Result<Self> {
        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        // Only the geometry this build was compiled for can be mounted.
        if u32_at(MAGIC_OFFSET) != MAGIC
            || u16_at(FAT_BLOCKS_OFFSET) as usize != FAT_BLOCKS
            || u32_at(BLOCK_SIZE_OFFSET) as usize != BLOCK_SIZE
            || u32_at(NUM_BLOCKS_OFFSET) as usize != MAX_BLOCKS
        {
            return Err(FsError::InvalidImage);
        }
        let root_block = u16_at(ROOT_OFFSET);
        if root_block as usize <= FAT_BLOCKS || root_block as usize >= MAX_BLOCKS {
            return Err(FsError::InvalidImage);
        }
        let label = core::str::from_utf8(trim_zero(&buf[..LABEL_LEN]))
            .map_err(|_| FsError::InvalidImage)?
            .to_string();
        Ok(Self { label, root_block })
    }
}

pub fn read_superblock(device: &impl BlockDevice) -> Result<SuperBlock> {
    let mut buf = [0u8; BLOCK_SIZE];
    device.read_block(HEADER_BLOCK as usize, &mut buf)?;
    SuperBlock::decode(&buf)
}

pub fn write_superblock(device: &mut impl BlockDevice, superblock: &SuperBlock) -> Result<()> {
    device.write_block(HEADER_BLOCK as usize, &superblock.encode())?;
    device.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_dev::BlockStore;

    #[test]
    fn test_superblock() {
        let mut store = BlockStore::new();
        let superblock = SuperBlock::new("volume one").unwrap();
        write_superblock(&mut store, &superblock).unwrap();
        assert_eq!(&store.image()[..10], b"volume one");
        assert_eq!(store.image()[10], 0);
        assert_eq!(read_superblock(&store).unwrap(), superblock);
    }

    #[test]
    fn test_unformatted() {
        let store = BlockStore::new();
        assert_eq!(read_superblock(&store), Err(FsError::InvalidImage));
    }

    #[test]
    fn test_label_too_long() {
        assert_eq!(SuperBlock::new(&"l".repeat(LABEL_LEN + 1)), Err(FsError::NameTooLong));
    }
}
