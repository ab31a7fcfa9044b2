//! The File Allocation Table.
//! One entry per block links blocks into chains. The table lives in memory and is
//! written back to its reserved blocks after every structural change.
//! Alongside each entry the table records the block's current role, so a block can
//! only ever be decoded the way it was allocated.

use log::{trace, warn};

use crate::block_dev::BlockDevice;
use crate::config::*;
use crate::error::{FsError, Result};
use crate::structs::BlockKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    EndOfChain,
    Next(u16),
}

impl FatEntry {
    fn encode(self) -> i16 {
        match self {
            FatEntry::Free => FAT_FREE,
            FatEntry::EndOfChain => FAT_END_OF_CHAIN,
            FatEntry::Next(next) => next as i16,
        }
    }

    fn decode(raw: i16) -> Option<Self> {
        match raw {
            FAT_FREE => Some(FatEntry::Free),
            FAT_END_OF_CHAIN => Some(FatEntry::EndOfChain),
            next if next > 0 && (next as usize) < MAX_BLOCKS => Some(FatEntry::Next(next as u16)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries: Vec<FatEntry>,
    kinds: Vec<BlockKind>,
}

fn check_range(index: usize) -> Result<()> {
    if index >= MAX_BLOCKS {
        return Err(FsError::OutOfRange(index));
    }
    Ok(())
}

impl AllocationTable {
    /// A table with only the reserved region in use: the header block as a one-block
    /// chain and the FAT blocks chained together.
    pub fn new() -> Self {
        let mut entries = vec![FatEntry::Free; MAX_BLOCKS];
        let mut kinds = vec![BlockKind::Free; MAX_BLOCKS];
        entries[HEADER_BLOCK as usize] = FatEntry::EndOfChain;
        kinds[HEADER_BLOCK as usize] = BlockKind::Label;
        let fat_end = FAT_START as usize + FAT_BLOCKS;
        for i in FAT_START as usize..fat_end {
            entries[i] = if i + 1 < fat_end {
                FatEntry::Next(i as u16 + 1)
            } else {
                FatEntry::EndOfChain
            };
            kinds[i] = BlockKind::Fat;
        }
        Self { entries, kinds }
    }

    /// Fresh table, written through to the device.
    pub fn format(device: &mut impl BlockDevice) -> Result<Self> {
        let table = Self::new();
        table.sync(device)?;
        Ok(table)
    }

    /// Reads the table from its reserved blocks.
    /// Every allocated block is classified as data; the caller refines directory blocks.
    pub fn load(device: &impl BlockDevice) -> Result<Self> {
        let mut entries = Vec::with_capacity(MAX_BLOCKS);
        let mut buf = [0u8; BLOCK_SIZE];
        for i in 0..FAT_BLOCKS {
            device.read_block(FAT_START as usize + i, &mut buf)?;
            for raw in buf.chunks_exact(FAT_ENTRY_SIZE) {
                if entries.len() == MAX_BLOCKS {
                    break;
                }
                let entry = FatEntry::decode(i16::from_le_bytes([raw[0], raw[1]]))
                    .ok_or(FsError::InvalidImage)?;
                entries.push(entry);
            }
        }

        let reserved = Self::new();
        for i in 0..=FAT_BLOCKS {
            if entries[i] != reserved.entries[i] {
                warn!("reserved FAT entry {} is {:?}", i, entries[i]);
                return Err(FsError::InvalidImage);
            }
        }
        let kinds = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                _ if i <= FAT_BLOCKS => reserved.kinds[i],
                FatEntry::Free => BlockKind::Free,
                _ => BlockKind::Data,
            })
            .collect();
        Ok(Self { entries, kinds })
    }

    /// Writes the whole table to its reserved blocks.
    pub fn sync(&self, device: &mut impl BlockDevice) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        for (i, part) in self.entries.chunks(FAT_ENTRIES_PER_BLOCK).enumerate() {
            buf.fill(0);
            for (j, entry) in part.iter().enumerate() {
                buf[j * FAT_ENTRY_SIZE..(j + 1) * FAT_ENTRY_SIZE]
                    .copy_from_slice(&entry.encode().to_le_bytes());
            }
            device.write_block(FAT_START as usize + i, &buf)?;
        }
        device.flush()
    }

    /// Allocates the lowest-numbered free block as a one-block chain.
    pub fn allocate(&mut self, device: &mut impl BlockDevice, kind: BlockKind) -> Result<u16> {
        let index = self
            .entries
            .iter()
            .position(|&e| e == FatEntry::Free)
            .ok_or(FsError::DiskFull)?;
        self.entries[index] = FatEntry::EndOfChain;
        self.kinds[index] = kind;
        trace!("allocated block {} as {:?}", index, kind);
        self.sync(device)?;
        Ok(index as u16)
    }

    /// Links a freshly allocated block behind the tail of a chain.
    pub fn extend(&mut self, device: &mut impl BlockDevice, tail: u16, new: u16) -> Result<()> {
        check_range(tail as usize)?;
        check_range(new as usize)?;
        if tail == new || self.entries[tail as usize] != FatEntry::EndOfChain {
            return Err(FsError::InvalidChainState(tail as usize));
        }
        // `new` must not be the tail of some other chain.
        if self.entries[new as usize] != FatEntry::EndOfChain
            || self.entries.contains(&FatEntry::Next(new))
        {
            return Err(FsError::InvalidChainState(new as usize));
        }
        self.entries[tail as usize] = FatEntry::Next(new);
        trace!("linked block {} -> {}", tail, new);
        self.sync(device)
    }

    /// Frees every block of the chain starting at `head`.
    /// The chain is validated before any entry changes.
    pub fn free_chain(&mut self, device: &mut impl BlockDevice, head: u16) -> Result<()> {
        let chain = self.chain(head)?;
        for &index in chain.iter() {
            self.entries[index as usize] = FatEntry::Free;
            self.kinds[index as usize] = BlockKind::Free;
        }
        trace!("freed chain at {} ({} blocks)", head, chain.len());
        self.sync(device)
    }

    /// Frees every block after `keep_tail`, which becomes the end of its chain.
    pub fn truncate(&mut self, device: &mut impl BlockDevice, keep_tail: u16) -> Result<()> {
        let Some(next) = self.next(keep_tail as usize)? else {
            return Ok(());
        };
        let rest = self.chain(next)?;
        for &index in rest.iter() {
            self.entries[index as usize] = FatEntry::Free;
            self.kinds[index as usize] = BlockKind::Free;
        }
        self.entries[keep_tail as usize] = FatEntry::EndOfChain;
        trace!("truncated chain after {} ({} blocks freed)", keep_tail, rest.len());
        self.sync(device)
    }

    /// The block following `index` in its chain, or `None` at the end of the chain.
    pub fn next(&self, index: usize) -> Result<Option<u16>> {
        check_range(index)?;
        match self.entries[index] {
            FatEntry::Next(next) => Ok(Some(next)),
            FatEntry::EndOfChain => Ok(None),
            FatEntry::Free => Err(FsError::BrokenChain(index)),
        }
    }

    /// Collects the chain starting at `head`, failing on a free link or a cycle.
    pub fn chain(&self, head: u16) -> Result<Vec<u16>> {
        let mut chain = Vec::new();
        let mut current = head;
        loop {
            if chain.len() >= MAX_BLOCKS {
                warn!("chain at {} does not terminate", head);
                return Err(FsError::BrokenChain(current as usize));
            }
            chain.push(current);
            match self.next(current as usize) {
                Ok(Some(next)) => current = next,
                Ok(None) => return Ok(chain),
                Err(FsError::BrokenChain(at)) => {
                    warn!("chain at {} reaches free block {}", head, at);
                    return Err(FsError::BrokenChain(at));
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn tail(&self, head: u16) -> Result<u16> {
        let chain = self.chain(head)?;
        Ok(chain[chain.len() - 1])
    }

    pub fn entry(&self, index: usize) -> Result<FatEntry> {
        check_range(index)?;
        Ok(self.entries[index])
    }

    pub fn entries(&self) -> &[FatEntry] {
        &self.entries
    }

    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e == FatEntry::Free).count()
    }

    pub fn kind(&self, index: usize) -> Result<BlockKind> {
        check_range(index)?;
        Ok(self.kinds[index])
    }

    pub(crate) fn set_kind(&mut self, index: usize, kind: BlockKind) -> Result<()> {
        check_range(index)?;
        self.kinds[index] = kind;
        Ok(())
    }

    /// Fails unless `index` is currently classified as `expected`.
    pub fn expect_kind(&self, index: usize, expected: BlockKind) -> Result<()> {
        let found = self.kind(index)?;
        if found != expected {
            return Err(FsError::BlockKindMismatch { index, expected, found });
        }
        Ok(())
    }
}

impl Default for AllocationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_dev::BlockStore;

    #[test]
    fn test_reserved_region() {
        let table = AllocationTable::new();
        assert_eq!(table.entry(0).unwrap(), FatEntry::EndOfChain);
        assert_eq!(table.chain(FAT_START).unwrap(), (1..=FAT_BLOCKS as u16).collect::<Vec<_>>());
        assert_eq!(table.free_count(), MAX_BLOCKS - 1 - FAT_BLOCKS);
        assert_eq!(table.kind(0).unwrap(), BlockKind::Label);
        assert_eq!(table.kind(FAT_START as usize).unwrap(), BlockKind::Fat);
    }

    #[test]
    fn test_entry_encoding() {
        assert_eq!(FatEntry::decode(-1), Some(FatEntry::Free));
        assert_eq!(FatEntry::decode(0), Some(FatEntry::EndOfChain));
        assert_eq!(FatEntry::decode(17), Some(FatEntry::Next(17)));
        assert_eq!(FatEntry::decode(MAX_BLOCKS as i16), None);
        assert_eq!(FatEntry::decode(-2), None);
    }

    #[test]
    fn test_sync_load() {
        let mut store = BlockStore::new();
        let mut table = AllocationTable::format(&mut store).unwrap();
        let a = table.allocate(&mut store, BlockKind::Data).unwrap();
        let b = table.allocate(&mut store, BlockKind::Data).unwrap();
        table.extend(&mut store, a, b).unwrap();

        // First FAT block holds entry `a` as a little-endian i16.
        let at = FAT_START as usize * BLOCK_SIZE + a as usize * FAT_ENTRY_SIZE;
        assert_eq!(&store.image()[at..at + 2], &(b as i16).to_le_bytes());

        let loaded = AllocationTable::load(&store).unwrap();
        assert_eq!(loaded.entries(), table.entries());
        assert_eq!(loaded.kind(a as usize).unwrap(), BlockKind::Data);
    }

    #[test]
    fn test_truncate() {
        let mut store = BlockStore::new();
        let mut table = AllocationTable::format(&mut store).unwrap();
        let head = table.allocate(&mut store, BlockKind::Data).unwrap();
        let mut tail = head;
        for _ in 0..3 {
            let next = table.allocate(&mut store, BlockKind::Data).unwrap();
            table.extend(&mut store, tail, next).unwrap();
            tail = next;
        }
        let before = table.free_count();
        table.truncate(&mut store, head).unwrap();
        assert_eq!(table.chain(head).unwrap(), vec![head]);
        assert_eq!(table.free_count(), before + 3);
        // Nothing to cut after a tail.
        table.truncate(&mut store, head).unwrap();
        assert_eq!(table.free_count(), before + 3);
    }
}
