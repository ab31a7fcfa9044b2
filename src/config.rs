pub const MAGIC: u32 = 0x4641_5456; // "FATV" in ASCII

pub const BLOCK_SIZE: usize = 1024;
pub const MAX_BLOCKS: usize = 1024;
pub const HEADER_BLOCK: u16 = 0; // Block holding the volume label and geometry

pub const FAT_ENTRY_SIZE: usize = 2; // Signed 16-bit entries on disk
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / FAT_ENTRY_SIZE;
pub const FAT_BLOCKS: usize = (MAX_BLOCKS * FAT_ENTRY_SIZE).div_ceil(BLOCK_SIZE);
pub const FAT_START: u16 = 1; // FAT immediately follows the header block
pub const ROOT_BLOCK: u16 = FAT_BLOCKS as u16 + 1;

pub const FAT_FREE: i16 = -1;
pub const FAT_END_OF_CHAIN: i16 = 0;

pub const LABEL_LEN: usize = 64;
pub const MAX_NAME_LEN: usize = 112;
pub const MAX_PATH_LEN: usize = 1024;

pub const DIR_MARKER: u32 = 1;
pub const DIR_HEADER_SIZE: usize = 8; // is_dir marker + entry count
pub const DIR_ENTRY_SIZE: usize = 128;
pub const NUM_ENTRY_PER_BLOCK: usize = (BLOCK_SIZE - DIR_HEADER_SIZE) / DIR_ENTRY_SIZE;
pub const MAX_DIR_BLOCKS: usize = 16; // Longest chain a single directory may grow to

pub const IMAGE_SIZE: usize = MAX_BLOCKS * BLOCK_SIZE;
