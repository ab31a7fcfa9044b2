//! The volume: one block device with its allocation table, the current directory and
//! the channels still open on it. Public file and directory operations live here.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Weak;

use log::{debug, warn};

use crate::block_dev::{BlockDevice, BlockStore};
use crate::config::*;
use crate::directory::{create_entry, dir_lookup, init_dir_block, read_dir, remove_entry, update_entry};
use crate::error::{FsError, Result};
use crate::fat::{AllocationTable, FatEntry};
use crate::file::{FileChannel, OpenMode};
use crate::path::{resolve, split, stack_to_path, walk};
use crate::structs::{now, BlockKind, DirEntry};
use crate::superblock::{read_superblock, write_superblock, SuperBlock};

/// One simulated disk: blocks, allocation table, directory tree and the current directory.
/// Mutating operations run to completion on `&mut self`; wrap the volume in a lock to share it.
#[derive(Debug)]
pub struct Volume<D: BlockDevice = BlockStore> {
    device: D,
    fat: AllocationTable,
    superblock: SuperBlock,
    cwd: Vec<DirEntry>, // Walk stack from the root to the current directory
    open_files: Vec<OpenFile>,
}

/// A channel handed out by `open`, tracked until it is closed or dropped.
#[derive(Debug)]
struct OpenFile {
    first_block: u16,
    mode: OpenMode,
    token: Weak<()>,
}

impl<D: BlockDevice> Volume<D> {
    /// Lays a fresh volume over `device`: label block, allocation table, empty root.
    pub fn format(mut device: D, label: &str) -> Result<Self> {
        if device.num_blocks() != MAX_BLOCKS || device.block_size() != BLOCK_SIZE {
            return Err(FsError::InvalidImage);
        }
        let superblock = SuperBlock::new(label)?;
        write_superblock(&mut device, &superblock)?;
        let mut fat = AllocationTable::format(&mut device)?;
        let root = fat.allocate(&mut device, BlockKind::Directory)?;
        debug_assert_eq!(root, superblock.root_block);
        init_dir_block(&mut device, root)?;
        device.flush()?;
        debug!("formatted volume {:?}, root directory at block {}", label, root);

        Ok(Self {
            device,
            fat,
            cwd: vec![DirEntry::root(superblock.root_block)],
            superblock,
            open_files: Vec::new(),
        })
    }

    /// Opens a volume previously formatted on `device`.
    pub fn mount(device: D) -> Result<Self> {
        let superblock = read_superblock(&device)?;
        let mut fat = AllocationTable::load(&device)?;
        if fat.entry(superblock.root_block as usize)? == FatEntry::Free {
            return Err(FsError::InvalidImage);
        }
        classify(&device, &mut fat, superblock.root_block)?;
        debug!(
            "mounted volume {:?}: {} of {} blocks free",
            superblock.label,
            fat.free_count(),
            MAX_BLOCKS
        );
        Ok(Self {
            device,
            fat,
            cwd: vec![DirEntry::root(superblock.root_block)],
            superblock,
            open_files: Vec::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.superblock.label
    }

    pub fn root_block(&self) -> u16 {
        self.superblock.root_block
    }

    pub fn fat(&self) -> &AllocationTable {
        &self.fat
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn free_blocks(&self) -> usize {
        self.fat.free_count()
    }

    /// Resolves `path` to the entry it names. The root resolves to a synthetic entry named `/`.
    pub fn resolve(&self, path: &str) -> Result<DirEntry> {
        resolve(&self.device, &self.fat, self.superblock.root_block, &self.cwd, path)
    }

    /// Resolves the parent of `path` to a directory and returns its first block with the final name.
    fn resolve_parent(&self, path: &str) -> Result<(u16, String)> {
        let (parent_path, name) = split(path)?;
        let parent = self.resolve(&parent_path)?;
        if !parent.is_dir {
            return Err(FsError::NotADirectory);
        }
        Ok((parent.first_block, name))
    }

    /// Modes of the channels still open on the chain starting at `first_block`.
    fn channels_on(&mut self, first_block: u16) -> Vec<OpenMode> {
        self.open_files.retain(|f| f.token.strong_count() > 0);
        self.open_files
            .iter()
            .filter(|f| f.first_block == first_block)
            .map(|f| f.mode)
            .collect()
    }

    /// Opens a file. A file takes one write channel at a time, and cannot be truncated
    /// while any channel is open on it.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileChannel> {
        let (parent, name) = self.resolve_parent(path).map_err(|e| match (mode, e) {
            (OpenMode::Read | OpenMode::Append, FsError::NoSuchPath) => FsError::FileNotFound,
            (_, e) => e,
        })?;
        let existing = dir_lookup(&self.device, &self.fat, parent, &name)?;

        let entry = match (mode, existing) {
            (_, Some(entry)) if entry.is_dir => return Err(FsError::IsADirectory),
            (OpenMode::Read | OpenMode::Append, None) => return Err(FsError::FileNotFound),
            (OpenMode::Read, Some(entry)) => entry,
            (OpenMode::Append, Some(entry)) => {
                if self.channels_on(entry.first_block).iter().any(|m| m.is_write()) {
                    return Err(FsError::Busy);
                }
                entry
            }
            (OpenMode::Truncate, None) => create_entry(&mut self.device, &mut self.fat, parent, &name, false)?,
            (OpenMode::Truncate, Some(mut entry)) => {
                if !self.channels_on(entry.first_block).is_empty() {
                    return Err(FsError::Busy);
                }
                self.fat.free_chain(&mut self.device, entry.first_block)?;
                // Cannot fail: the chain just freed at least one block.
                let first_block = self.fat.allocate(&mut self.device, BlockKind::Data)?;
                self.device.write_block(first_block as usize, &[0u8; BLOCK_SIZE])?;
                entry.first_block = first_block;
                entry.length = 0;
                entry.mod_time = now();
                update_entry(&mut self.device, &mut self.fat, parent, &entry)?;
                entry
            }
        };
        let channel = FileChannel::open(&self.device, &self.fat, parent, entry, mode)?;
        self.open_files.push(OpenFile {
            first_block: channel.entry().first_block,
            mode,
            token: channel.watch(),
        });
        Ok(channel)
    }

    pub fn read(&self, channel: &mut FileChannel, n: usize) -> Result<Vec<u8>> {
        channel.read(&self.device, &self.fat, n)
    }

    pub fn read_byte(&self, channel: &mut FileChannel) -> Result<Option<u8>> {
        channel.read_byte(&self.device, &self.fat)
    }

    pub fn write(&mut self, channel: &mut FileChannel, bytes: &[u8]) -> Result<usize> {
        channel.write(&mut self.device, &mut self.fat, bytes)
    }

    pub fn write_byte(&mut self, channel: &mut FileChannel, byte: u8) -> Result<()> {
        channel.write_byte(&mut self.device, &mut self.fat, byte)
    }

    pub fn close(&mut self, channel: &mut FileChannel) -> Result<()> {
        channel.close(&mut self.device, &mut self.fat)?;
        self.device.flush()
    }

    /// Reads a whole file in one call.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut channel = self.open(path, OpenMode::Read)?;
        let data = self.read(&mut channel, usize::MAX)?;
        self.close(&mut channel)?;
        Ok(data)
    }

    pub fn make_directory(&mut self, path: &str) -> Result<DirEntry> {
        let (parent, name) = self.resolve_parent(path)?;
        create_entry(&mut self.device, &mut self.fat, parent, &name, true)
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(path)?;
        if !dir.is_dir {
            return Err(FsError::NotADirectory);
        }
        read_dir(&self.device, &self.fat, dir.first_block)
    }

    /// Removes a file. Fails `Busy` while a channel is open on it.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        match dir_lookup(&self.device, &self.fat, parent, &name)? {
            None => Err(FsError::NoSuchName),
            Some(entry) if entry.is_dir => Err(FsError::IsADirectory),
            Some(entry) if !self.channels_on(entry.first_block).is_empty() => Err(FsError::Busy),
            Some(_) => remove_entry(&mut self.device, &mut self.fat, parent, &name).map(|_| ()),
        }
    }

    /// Removes an empty directory. The current directory and its ancestors cannot be removed.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        match dir_lookup(&self.device, &self.fat, parent, &name)? {
            None => Err(FsError::NoSuchName),
            Some(entry) if !entry.is_dir => Err(FsError::NotADirectory),
            Some(entry) if self.cwd.iter().any(|d| d.first_block == entry.first_block) => Err(FsError::Busy),
            Some(_) => remove_entry(&mut self.device, &mut self.fat, parent, &name).map(|_| ()),
        }
    }

    pub fn change_current_directory(&mut self, path: &str) -> Result<()> {
        let stack = walk(&self.device, &self.fat, self.superblock.root_block, &self.cwd, path)?;
        if !stack[stack.len() - 1].is_dir {
            return Err(FsError::NotADirectory);
        }
        self.cwd = stack;
        Ok(())
    }

    pub fn current_directory(&self) -> String {
        stack_to_path(&self.cwd)
    }

    /// Human readable view of one block, interpreted by its recorded role.
    pub fn dump_block(&self, index: usize) -> Result<String> {
        crate::dump::dump_block(&self.device, &self.fat, index)
    }

    pub fn dump_fat(&self, len: usize) -> String {
        crate::dump::dump_fat(&self.fat, len)
    }

    pub fn dump_tree(&self) -> Result<String> {
        crate::dump::dump_tree(&self.device, &self.fat, self.superblock.root_block)
    }

    pub fn dump(&self) -> String {
        format!(
            "volume {:?}: {} blocks of {} bytes, {} free, root at {}, cwd {}",
            self.superblock.label,
            MAX_BLOCKS,
            BLOCK_SIZE,
            self.fat.free_count(),
            self.superblock.root_block,
            self.current_directory()
        )
    }
}

impl Volume<BlockStore> {
    pub fn load_image(image: Vec<u8>) -> Result<Self> {
        Self::mount(BlockStore::from_image(image)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::mount(BlockStore::load(path)?)
    }

    pub fn image(&self) -> &[u8] {
        self.device.image()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.device.save(path.as_ref())?;
        debug!("saved volume {:?} to {}", self.superblock.label, path.as_ref().display());
        Ok(())
    }
}

/// Rebuilds block roles by walking the tree from the root, checking that no directory
/// is reached twice and no chain head is shared between entries.
fn classify(device: &impl BlockDevice, fat: &mut AllocationTable, root: u16) -> Result<()> {
    let mut heads = HashSet::from([root]);
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        for block_id in fat.chain(dir)? {
            if fat.kind(block_id as usize)? != BlockKind::Data {
                warn!("directory block {} is claimed twice", block_id);
                return Err(FsError::CorruptDirectory(block_id as usize));
            }
            fat.set_kind(block_id as usize, BlockKind::Directory)?;
        }
        for entry in read_dir(device, fat, dir)? {
            if !heads.insert(entry.first_block) {
                warn!("entry {:?} shares chain head {}", entry.name, entry.first_block);
                return Err(FsError::CorruptDirectory(dir as usize));
            }
            if entry.is_dir {
                pending.push(entry.first_block);
            } else {
                fat.chain(entry.first_block)?;
            }
        }
    }
    Ok(())
}
