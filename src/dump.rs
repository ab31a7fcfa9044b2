//! Human readable renderings of blocks, the allocation table and the directory tree.

use core::fmt::Write;

use crate::block_dev::BlockDevice;
use crate::config::*;
use crate::directory::read_dir;
use crate::error::Result;
use crate::fat::{AllocationTable, FatEntry};
use crate::structs::{trim_zero, BlockKind, DirBlock};
use crate::superblock::read_superblock;

pub fn dump_block(device: &impl BlockDevice, fat: &AllocationTable, index: usize) -> Result<String> {
    let mut buf = [0u8; BLOCK_SIZE];
    device.read_block(index, &mut buf)?;
    let mut out = String::new();
    match fat.kind(index)? {
        BlockKind::Free => {
            let _ = write!(out, "block {}: free", index);
        }
        BlockKind::Label => {
            let superblock = read_superblock(device)?;
            let _ = write!(out, "block {}: label {:?}, root {}", index, superblock.label, superblock.root_block);
        }
        BlockKind::Fat => {
            let first = (index - FAT_START as usize) * FAT_ENTRIES_PER_BLOCK;
            let _ = write!(out, "block {}: fat entries from {}:", index, first);
            for raw in buf.chunks_exact(FAT_ENTRY_SIZE) {
                let _ = write!(out, " {}", i16::from_le_bytes([raw[0], raw[1]]));
            }
        }
        BlockKind::Directory => {
            let block = DirBlock::decode(index, &buf)?;
            let _ = write!(out, "block {}: directory, {} entries", index, block.entries.len());
            for entry in block.entries.iter() {
                let _ = write!(out, "\n  {} -> {}", entry.name, entry.first_block);
            }
        }
        BlockKind::Data => {
            let _ = write!(out, "block {}: data {:?}", index, String::from_utf8_lossy(trim_zero(&buf)));
        }
    }
    Ok(out)
}

/// The first `len` allocation table entries, in the on-disk encoding.
pub fn dump_fat(fat: &AllocationTable, len: usize) -> String {
    fat.entries()
        .iter()
        .take(len)
        .map(|entry| match entry {
            FatEntry::Free => FAT_FREE.to_string(),
            FatEntry::EndOfChain => FAT_END_OF_CHAIN.to_string(),
            FatEntry::Next(next) => next.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn dump_tree(device: &impl BlockDevice, fat: &AllocationTable, root: u16) -> Result<String> {
    let mut out = String::from("/\n");
    write_tree(device, fat, root, 1, &mut out)?;
    Ok(out)
}

fn write_tree(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    dir: u16,
    depth: usize,
    out: &mut String,
) -> Result<()> {
    for entry in read_dir(device, fat, dir)? {
        if entry.is_dir {
            let _ = writeln!(out, "{:indent$}{}/", "", entry.name, indent = depth * 2);
            write_tree(device, fat, entry.first_block, depth + 1, out)?;
        } else {
            let _ = writeln!(out, "{:indent$}{} ({} bytes)", "", entry.name, entry.length, indent = depth * 2);
        }
    }
    Ok(())
}
