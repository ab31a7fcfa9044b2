//! Common utilities for tests

#![allow(unused)]

use fatvol::{BlockStore, OpenMode, Volume};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

pub fn fresh_volume() -> Volume {
    Volume::format(BlockStore::new(), "test volume").unwrap()
}

/// Creates (or truncates) `path` and writes `data` into it.
pub fn write_file(fs: &mut Volume, path: &str, data: &[u8]) {
    let mut file = fs.open(path, OpenMode::Truncate).unwrap();
    assert_eq!(fs.write(&mut file, data).unwrap(), data.len());
    fs.close(&mut file).unwrap();
}
