//! On-disk layouts of directory blocks and their entries.
//! Every field is encoded explicitly in little-endian at a fixed offset, so decoding
//! never depends on struct layout or on a terminator byte.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::block_dev::Block;
use crate::config::*;
use crate::error::{FsError, Result};

/// The role a block currently plays on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Free,
    Label,
    Fat,
    Directory,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub mod_time: i64, // Seconds since the unix epoch
    pub length: u32,   // Content length in bytes, always 0 for directories
    pub first_block: u16,
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Checks that `name` can be stored in a single directory slot.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// Strips the zero padding off a fixed-size field.
pub fn trim_zero(name: &[u8]) -> &[u8] {
    let mut end = name.len();
    while end > 0 && name[end - 1] == 0 {
        end -= 1;
    }
    &name[..end]
}

const NAME_LEN_OFFSET: usize = 0;
const IS_DIR_OFFSET: usize = 1;
const FIRST_BLOCK_OFFSET: usize = 2;
const LENGTH_OFFSET: usize = 4;
const MOD_TIME_OFFSET: usize = 8;
const NAME_OFFSET: usize = 16;

impl DirEntry {
    pub fn new(name: &str, is_dir: bool, first_block: u16) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            is_dir,
            mod_time: now(),
            length: 0,
            first_block,
        })
    }

    /// The entry that stands for the root directory during path walks. Never stored on disk.
    pub(crate) fn root(root_block: u16) -> Self {
        Self {
            name: "/".to_string(),
            is_dir: true,
            mod_time: 0,
            length: 0,
            first_block: root_block,
        }
    }

    fn encode(&self, slot: &mut [u8]) {
        slot.fill(0);
        let name = self.name.as_bytes();
        slot[NAME_LEN_OFFSET] = name.len() as u8;
        slot[IS_DIR_OFFSET] = self.is_dir as u8;
        slot[FIRST_BLOCK_OFFSET..FIRST_BLOCK_OFFSET + 2].copy_from_slice(&self.first_block.to_le_bytes());
        slot[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&self.length.to_le_bytes());
        slot[MOD_TIME_OFFSET..MOD_TIME_OFFSET + 8].copy_from_slice(&self.mod_time.to_le_bytes());
        slot[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);
    }

    fn decode(slot: &[u8]) -> Option<Self> {
        let name_len = slot[NAME_LEN_OFFSET] as usize;
        if name_len == 0 || name_len > MAX_NAME_LEN || slot[IS_DIR_OFFSET] > 1 {
            return None;
        }
        let name = core::str::from_utf8(&slot[NAME_OFFSET..NAME_OFFSET + name_len]).ok()?;
        let first_block = u16::from_le_bytes(slot[FIRST_BLOCK_OFFSET..FIRST_BLOCK_OFFSET + 2].try_into().ok()?);
        if first_block as usize >= MAX_BLOCKS {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            is_dir: slot[IS_DIR_OFFSET] == 1,
            mod_time: i64::from_le_bytes(slot[MOD_TIME_OFFSET..MOD_TIME_OFFSET + 8].try_into().ok()?),
            length: u32::from_le_bytes(slot[LENGTH_OFFSET..LENGTH_OFFSET + 4].try_into().ok()?),
            first_block,
        })
    }
}

/// One block of a directory chain: a marker, a count and up to `NUM_ENTRY_PER_BLOCK` packed slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirBlock {
    pub entries: Vec<DirEntry>,
}

impl DirBlock {
    pub fn encode(&self) -> Block {
        debug_assert!(self.entries.len() <= NUM_ENTRY_PER_BLOCK);
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&DIR_MARKER.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (i, entry) in self.entries.iter().enumerate() {
            let start = DIR_HEADER_SIZE + i * DIR_ENTRY_SIZE;
            entry.encode(&mut buf[start..start + DIR_ENTRY_SIZE]);
        }
        buf
    }

    /// Decodes the directory block stored at `block_id`.
    pub fn decode(block_id: usize, buf: &Block) -> Result<Self> {
        let marker = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let count = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if marker != DIR_MARKER || count > NUM_ENTRY_PER_BLOCK {
            return Err(FsError::CorruptDirectory(block_id));
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let start = DIR_HEADER_SIZE + i * DIR_ENTRY_SIZE;
            let entry = DirEntry::decode(&buf[start..start + DIR_ENTRY_SIZE])
                .ok_or(FsError::CorruptDirectory(block_id))?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }
}
