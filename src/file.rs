//! Open files: a cursor over the block chain of one directory entry.
//! Reads follow the chain from the first block; writes only ever append at the tail,
//! keeping the block under the cursor buffered until it fills or the channel closes.

use core::str::FromStr;
use std::sync::{Arc, Weak};

use log::{trace, warn};

use crate::block_dev::{Block, BlockDevice};
use crate::config::*;
use crate::directory::{dir_lookup, update_entry};
use crate::error::{FsError, Result};
use crate::fat::AllocationTable;
use crate::structs::{now, BlockKind, DirEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Sequential reads from the start of the file.
    Read,
    /// Writes appended after the existing content.
    Append,
    /// Creates the file, or empties it if it exists, then appends.
    Truncate,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::Truncate)
    }
}

impl FromStr for OpenMode {
    type Err = FsError;

    fn from_str(mode: &str) -> Result<Self> {
        match mode {
            "r" => Ok(OpenMode::Read),
            "a" => Ok(OpenMode::Append),
            "w" => Ok(OpenMode::Truncate),
            _ => Err(FsError::InvalidMode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open(OpenMode),
    Closed,
}

/// Blocks that must be allocated to append `len` bytes when the cursor sits at `pos`
/// inside the tail block.
fn blocks_needed(pos: usize, len: usize) -> usize {
    (pos + len).saturating_sub(BLOCK_SIZE).div_ceil(BLOCK_SIZE)
}

#[derive(Debug)]
pub struct FileChannel {
    state: ChannelState,
    parent: u16,       // First block of the directory holding the entry
    entry: DirEntry,   // Working copy, written back on close
    block: u16,        // Block currently buffered
    pos: usize,        // Byte offset within `block`
    offset: u32,       // Bytes consumed so far, for reads
    buffer: Box<Block>,
    dirty: bool,
    token: Option<Arc<()>>, // Held while open; the volume watches it to see live channels
}

impl FileChannel {
    /// Opens a channel on an existing file entry stored in the directory at `parent`.
    /// Read channels start at the first block; write channels at the end of the content.
    pub(crate) fn open(
        device: &impl BlockDevice,
        fat: &AllocationTable,
        parent: u16,
        entry: DirEntry,
        mode: OpenMode,
    ) -> Result<Self> {
        if entry.is_dir {
            return Err(FsError::IsADirectory);
        }
        let chain = fat.chain(entry.first_block)?;
        let (block, pos) = match mode {
            OpenMode::Read => (entry.first_block, 0),
            OpenMode::Append | OpenMode::Truncate => {
                let tail = chain[chain.len() - 1];
                // The content length must end inside the tail block.
                let pos = (entry.length as usize)
                    .checked_sub((chain.len() - 1) * BLOCK_SIZE)
                    .filter(|&pos| pos <= BLOCK_SIZE)
                    .ok_or(FsError::BrokenChain(tail as usize))?;
                (tail, pos)
            }
        };
        fat.expect_kind(block as usize, BlockKind::Data)?;
        let mut buffer = Box::new([0u8; BLOCK_SIZE]);
        device.read_block(block as usize, &mut buffer)?;
        trace!("opened {} ({:?}) at block {} pos {}", entry.name, mode, block, pos);

        Ok(Self {
            state: ChannelState::Open(mode),
            parent,
            entry,
            block,
            pos,
            offset: 0,
            buffer,
            dirty: false,
            token: Some(Arc::new(())),
        })
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != ChannelState::Closed
    }

    /// The channel's view of its directory entry, including unflushed length changes.
    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    /// Handle that stays upgradable until the channel is closed or dropped.
    pub(crate) fn watch(&self) -> Weak<()> {
        self.token.as_ref().map(Arc::downgrade).unwrap_or_default()
    }

    /// The chain this channel buffers must still belong to its entry before any of it
    /// reaches the device.
    fn check_owner(&self, device: &impl BlockDevice, fat: &AllocationTable) -> Result<()> {
        match dir_lookup(device, fat, self.parent, &self.entry.name)? {
            Some(stored) if !stored.is_dir && stored.first_block == self.entry.first_block => Ok(()),
            _ => Err(FsError::StaleChannel),
        }
    }

    fn mode(&self) -> Result<OpenMode> {
        match self.state {
            ChannelState::Open(mode) => Ok(mode),
            ChannelState::Closed => Err(FsError::ChannelClosed),
        }
    }

    /// Reads up to `n` bytes, never past the content length.
    pub(crate) fn read(&mut self, device: &impl BlockDevice, fat: &AllocationTable, n: usize) -> Result<Vec<u8>> {
        if self.mode()? != OpenMode::Read {
            return Err(FsError::WrongMode);
        }
        let remaining = (self.entry.length - self.offset) as usize;
        let n = n.min(remaining);
        let mut out = Vec::with_capacity(n);

        while out.len() < n {
            if self.pos == BLOCK_SIZE {
                let next = fat
                    .next(self.block as usize)?
                    .ok_or(FsError::BrokenChain(self.block as usize))?;
                fat.expect_kind(next as usize, BlockKind::Data)?;
                device.read_block(next as usize, &mut self.buffer)?;
                self.block = next;
                self.pos = 0;
            }
            let take = (BLOCK_SIZE - self.pos).min(n - out.len());
            out.extend_from_slice(&self.buffer[self.pos..self.pos + take]);
            self.pos += take;
        }
        self.offset += n as u32;
        Ok(out)
    }

    /// Reads one byte, or `None` at the end of the file.
    pub(crate) fn read_byte(&mut self, device: &impl BlockDevice, fat: &AllocationTable) -> Result<Option<u8>> {
        Ok(self.read(device, fat, 1)?.first().copied())
    }

    /// Appends `bytes`, allocating and linking blocks as the tail fills.
    /// Fails with `DiskFull` before writing anything if the blocks cannot all be allocated.
    pub(crate) fn write(
        &mut self,
        device: &mut impl BlockDevice,
        fat: &mut AllocationTable,
        bytes: &[u8],
    ) -> Result<usize> {
        if !self.mode()?.is_write() {
            return Err(FsError::WrongMode);
        }
        if self.entry.length as usize + bytes.len() > u32::MAX as usize {
            return Err(FsError::DiskFull);
        }
        if fat.free_count() < blocks_needed(self.pos, bytes.len()) {
            return Err(FsError::DiskFull);
        }
        if self.pos + bytes.len() > BLOCK_SIZE {
            self.check_owner(&*device, fat)?;
        }

        let mut written = 0;
        while written < bytes.len() {
            if self.pos == BLOCK_SIZE {
                device.write_block(self.block as usize, &self.buffer)?;
                let new_block = fat.allocate(device, BlockKind::Data)?;
                fat.extend(device, self.block, new_block)?;
                self.block = new_block;
                self.buffer.fill(0);
                self.pos = 0;
            }
            let take = (BLOCK_SIZE - self.pos).min(bytes.len() - written);
            self.buffer[self.pos..self.pos + take].copy_from_slice(&bytes[written..written + take]);
            self.pos += take;
            written += take;
            self.dirty = true;
        }

        self.entry.length += written as u32;
        self.entry.mod_time = now();
        Ok(written)
    }

    pub(crate) fn write_byte(
        &mut self,
        device: &mut impl BlockDevice,
        fat: &mut AllocationTable,
        byte: u8,
    ) -> Result<()> {
        self.write(device, fat, &[byte]).map(|_| ())
    }

    /// Flushes the buffered block and the updated entry. Closing twice is a no-op.
    /// A write channel whose entry was removed or replaced is closed without touching
    /// the device and reports `StaleChannel`.
    pub(crate) fn close(&mut self, device: &mut impl BlockDevice, fat: &mut AllocationTable) -> Result<()> {
        let mode = match self.state {
            ChannelState::Closed => return Ok(()),
            ChannelState::Open(mode) => mode,
        };
        if mode.is_write() {
            if let Err(err) = self.check_owner(&*device, fat) {
                warn!("dropping buffered writes to {}: {}", self.entry.name, err);
                self.state = ChannelState::Closed;
                self.token = None;
                return Err(err);
            }
            if self.dirty {
                device.write_block(self.block as usize, &self.buffer)?;
                self.dirty = false;
            }
            update_entry(device, fat, self.parent, &self.entry)?;
        }
        self.state = ChannelState::Closed;
        self.token = None;
        trace!("closed {} ({} bytes)", self.entry.name, self.entry.length);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_dev::BlockStore;
    use crate::directory::{create_entry, init_dir_block, read_dir, remove_entry};

    #[test]
    fn test_mode_parse() {
        assert_eq!("r".parse::<OpenMode>(), Ok(OpenMode::Read));
        assert_eq!("a".parse::<OpenMode>(), Ok(OpenMode::Append));
        assert_eq!("w".parse::<OpenMode>(), Ok(OpenMode::Truncate));
        assert_eq!("rw".parse::<OpenMode>(), Err(FsError::InvalidMode));
    }

    fn setup() -> (BlockStore, AllocationTable, u16) {
        let mut store = BlockStore::new();
        let mut fat = AllocationTable::format(&mut store).unwrap();
        let root = fat.allocate(&mut store, BlockKind::Directory).unwrap();
        init_dir_block(&mut store, root).unwrap();
        (store, fat, root)
    }

    #[test]
    fn test_stale_close_leaves_reused_block() {
        let (mut store, mut fat, root) = setup();
        let old = create_entry(&mut store, &mut fat, root, "old", false).unwrap();
        let mut channel = FileChannel::open(&store, &fat, root, old.clone(), OpenMode::Append).unwrap();
        channel.write(&mut store, &mut fat, b"STALE!!!").unwrap();
        let watch = channel.watch();

        remove_entry(&mut store, &mut fat, root, "old").unwrap();
        let victim = create_entry(&mut store, &mut fat, root, "victim", false).unwrap();
        assert_eq!(victim.first_block, old.first_block);

        assert_eq!(channel.close(&mut store, &mut fat), Err(FsError::StaleChannel));
        assert_eq!(channel.state(), ChannelState::Closed);
        assert_eq!(watch.strong_count(), 0);
        let mut block = [0xffu8; BLOCK_SIZE];
        store.read_block(victim.first_block as usize, &mut block).unwrap();
        assert!(block.iter().all(|&b| b == 0));
        assert_eq!(read_dir(&store, &fat, root).unwrap(), vec![victim]);
    }

    #[test]
    fn test_stale_write_touches_nothing() {
        let (mut store, mut fat, root) = setup();
        let old = create_entry(&mut store, &mut fat, root, "old", false).unwrap();
        let mut channel = FileChannel::open(&store, &fat, root, old, OpenMode::Append).unwrap();
        remove_entry(&mut store, &mut fat, root, "old").unwrap();
        create_entry(&mut store, &mut fat, root, "victim", false).unwrap();

        let free = fat.free_count();
        let spill = vec![9u8; BLOCK_SIZE + 1];
        assert_eq!(channel.write(&mut store, &mut fat, &spill), Err(FsError::StaleChannel));
        assert_eq!(fat.free_count(), free);
        assert_eq!(channel.entry().length, 0);
    }

    #[test]
    fn test_blocks_needed() {
        assert_eq!(blocks_needed(0, 0), 0);
        assert_eq!(blocks_needed(0, BLOCK_SIZE), 0);
        assert_eq!(blocks_needed(0, BLOCK_SIZE + 1), 1);
        assert_eq!(blocks_needed(BLOCK_SIZE, 1), 1);
        assert_eq!(blocks_needed(10, 3 * BLOCK_SIZE), 3);
    }
}
