//! Fatvol is an in-memory FAT-style volume: a fixed array of equally sized blocks,
//! a File Allocation Table linking blocks into chains, and a directory tree mapping
//! slash-separated names onto those chains. A volume can be persisted as a flat image.
//!
//! Fatvol's linear layout:
//! - Header block (label and geometry)
//! - File Allocation Table
//! - Root directory
//! - Directory and data chains
//!
//! Fatvol's layers (from bottom to top):
//! 1. Block Device: whole-block reads and writes, bounds checked.
//! 2. Allocation Table: chain links plus the role of every block, written through on each change.
//! 3. Directory/Path: packed entry lists over directory chains, name resolution.
//! 4. File: channels that read or append over a file's chain.
//! 5. Volume: the owning context and the public operations.

mod config;
mod block_dev;
mod structs;
mod superblock;
mod fat;
mod directory;
mod path;
mod file;
mod dump;
mod fs;
mod error;

pub use block_dev::{Block, BlockDevice, BlockStore};
pub use config::*;
pub use superblock::*;
pub use structs::*;
pub use fat::*;
pub use directory::*;
pub use path::*;
pub use file::*;
pub use dump::*;
pub use fs::*;
pub use error::FsError as Error;
pub use error::Result;
