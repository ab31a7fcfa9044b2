//! Directories: chains of directory blocks holding packed, insertion-ordered entries.
//! A directory is always rewritten as a whole. The chain grows a block when the last one
//! fills and gives surplus blocks back when entries are removed.

use log::trace;

use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::error::{FsError, Result};
use crate::fat::AllocationTable;
use crate::structs::*;

/// Number of blocks a directory with `num_entries` entries occupies. Never less than one.
pub fn dir_blocks_for(num_entries: usize) -> usize {
    num_entries.div_ceil(NUM_ENTRY_PER_BLOCK).max(1)
}

/// Writes an empty directory block at `block_id`.
pub fn init_dir_block(device: &mut impl BlockDevice, block_id: u16) -> Result<()> {
    device.write_block(block_id as usize, &DirBlock::default().encode())
}

/// Reads every entry of the directory whose chain starts at `head`, in stored order.
pub fn read_dir(device: &impl BlockDevice, fat: &AllocationTable, head: u16) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut buf: Block = [0u8; BLOCK_SIZE];
    for block_id in fat.chain(head)? {
        fat.expect_kind(block_id as usize, BlockKind::Directory)?;
        device.read_block(block_id as usize, &mut buf)?;
        entries.extend(DirBlock::decode(block_id as usize, &buf)?.entries);
    }
    Ok(entries)
}

/// Lays `entries` out over the directory chain at `head`, growing or shrinking the chain.
/// Callers make sure enough blocks are free before the directory has to grow.
fn write_dir(
    device: &mut impl BlockDevice,
    fat: &mut AllocationTable,
    head: u16,
    entries: &[DirEntry],
) -> Result<()> {
    let needed = dir_blocks_for(entries.len());
    let mut chain = fat.chain(head)?;
    while chain.len() < needed {
        let tail = chain[chain.len() - 1];
        let new_block = fat.allocate(device, BlockKind::Directory)?;
        fat.extend(device, tail, new_block)?;
        chain.push(new_block);
    }
    if chain.len() > needed {
        fat.truncate(device, chain[needed - 1])?;
        chain.truncate(needed);
    }

    for (i, &block_id) in chain.iter().enumerate() {
        let start = (i * NUM_ENTRY_PER_BLOCK).min(entries.len());
        let end = ((i + 1) * NUM_ENTRY_PER_BLOCK).min(entries.len());
        let block = DirBlock {
            entries: entries[start..end].to_vec(),
        };
        device.write_block(block_id as usize, &block.encode())?;
    }
    trace!("directory {} rewritten: {} entries in {} blocks", head, entries.len(), chain.len());
    Ok(())
}

/// Looks `name` up in the directory at `head`.
pub fn dir_lookup(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    head: u16,
    name: &str,
) -> Result<Option<DirEntry>> {
    Ok(read_dir(device, fat, head)?
        .into_iter()
        .find(|entry| entry.name == name))
}

/// Creates a new entry named `name` in the directory at `parent`, backed by a freshly
/// allocated one-block chain. Every failure is detected before anything is allocated.
pub fn create_entry(
    device: &mut impl BlockDevice,
    fat: &mut AllocationTable,
    parent: u16,
    name: &str,
    is_dir: bool,
) -> Result<DirEntry> {
    validate_name(name)?;
    let mut entries = read_dir(device, fat, parent)?;
    if entries.iter().any(|entry| entry.name == name) {
        return Err(FsError::DuplicateName);
    }

    let needed = dir_blocks_for(entries.len() + 1);
    if needed > MAX_DIR_BLOCKS {
        return Err(FsError::DirectoryFull);
    }
    let extra = needed.saturating_sub(fat.chain(parent)?.len());
    if fat.free_count() < 1 + extra {
        return Err(FsError::DiskFull);
    }

    let kind = if is_dir { BlockKind::Directory } else { BlockKind::Data };
    let first_block = fat.allocate(device, kind)?;
    if is_dir {
        init_dir_block(device, first_block)?;
    } else {
        device.write_block(first_block as usize, &[0u8; BLOCK_SIZE])?;
    }

    let entry = DirEntry::new(name, is_dir, first_block)?;
    entries.push(entry.clone());
    write_dir(device, fat, parent, &entries)?;
    Ok(entry)
}

/// Removes `name` from the directory at `parent` and frees its chain.
/// Returns the removed entry.
pub fn remove_entry(
    device: &mut impl BlockDevice,
    fat: &mut AllocationTable,
    parent: u16,
    name: &str,
) -> Result<DirEntry> {
    let mut entries = read_dir(device, fat, parent)?;
    let position = entries
        .iter()
        .position(|entry| entry.name == name)
        .ok_or(FsError::NoSuchName)?;
    let entry = entries[position].clone();
    if entry.is_dir && !read_dir(device, fat, entry.first_block)?.is_empty() {
        return Err(FsError::DirectoryNotEmpty);
    }
    // Surface a broken chain before the parent changes.
    fat.chain(entry.first_block)?;

    entries.remove(position);
    write_dir(device, fat, parent, &entries)?;
    fat.free_chain(device, entry.first_block)?;
    Ok(entry)
}

/// Replaces the stored entry carrying `entry.name` in the directory at `parent`.
pub(crate) fn update_entry(
    device: &mut impl BlockDevice,
    fat: &mut AllocationTable,
    parent: u16,
    entry: &DirEntry,
) -> Result<()> {
    let mut entries = read_dir(device, fat, parent)?;
    let slot = entries
        .iter_mut()
        .find(|e| e.name == entry.name)
        .ok_or(FsError::NoSuchName)?;
    *slot = entry.clone();
    write_dir(device, fat, parent, &entries)
}
