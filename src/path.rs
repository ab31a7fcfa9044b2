//! Path resolution and manipulation utilities.

use crate::block_dev::BlockDevice;
use crate::config::MAX_PATH_LEN;
use crate::directory::dir_lookup;
use crate::error::{FsError, Result};
use crate::fat::AllocationTable;
use crate::structs::DirEntry;

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FsError::InvalidPath);
    }
    if path.len() > MAX_PATH_LEN {
        return Err(FsError::PathTooLong);
    }
    Ok(())
}

/// Splits a path into its parent path and final component.
/// `"/a/b.txt"` gives `("/a", "b.txt")`, `"b.txt"` gives `(".", "b.txt")`.
pub fn split(path: &str) -> Result<(String, String)> {
    check_path(path)?;
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        // The root has no parent to create or remove it from.
        return Err(FsError::InvalidPath);
    }
    let (parent, name) = match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => (".", trimmed),
    };
    Ok((parent.to_string(), name.to_string()))
}

/// Walks `path` and returns every directory entry visited, starting from the root
/// (absolute paths) or from the `cwd` stack (relative paths).
/// The first element is always the root; the last is the entry `path` names.
pub fn walk(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    root_block: u16,
    cwd: &[DirEntry],
    path: &str,
) -> Result<Vec<DirEntry>> {
    check_path(path)?;
    let mut stack = if path.starts_with('/') || cwd.is_empty() {
        vec![DirEntry::root(root_block)]
    } else {
        cwd.to_vec()
    };

    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for component in components {
        let current = &stack[stack.len() - 1];
        if !current.is_dir {
            return Err(FsError::NotADirectory);
        }
        match component {
            "." => {}
            ".." => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            name => {
                let entry = dir_lookup(device, fat, current.first_block, name)?
                    .ok_or(FsError::NoSuchPath)?;
                stack.push(entry);
            }
        }
    }
    Ok(stack)
}

/// Resolves `path` to the entry it names.
pub fn resolve(
    device: &impl BlockDevice,
    fat: &AllocationTable,
    root_block: u16,
    cwd: &[DirEntry],
    path: &str,
) -> Result<DirEntry> {
    let mut stack = walk(device, fat, root_block, cwd, path)?;
    stack.pop().ok_or(FsError::InvalidPath)
}

/// Formats a walk stack back into an absolute path.
pub fn stack_to_path(stack: &[DirEntry]) -> String {
    if stack.len() <= 1 {
        return "/".to_string();
    }
    stack[1..].iter().fold(String::new(), |mut path, entry| {
        path.push('/');
        path.push_str(&entry.name);
        path
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split() {
        assert_eq!(split("/a/b.txt").unwrap(), ("/a".to_string(), "b.txt".to_string()));
        assert_eq!(split("/a").unwrap(), ("/".to_string(), "a".to_string()));
        assert_eq!(split("b").unwrap(), (".".to_string(), "b".to_string()));
        assert_eq!(split("x/y/").unwrap(), ("x".to_string(), "y".to_string()));
        assert_eq!(split("/"), Err(FsError::InvalidPath));
        assert_eq!(split(""), Err(FsError::InvalidPath));
        assert_eq!(split(&"a".repeat(MAX_PATH_LEN + 1)), Err(FsError::PathTooLong));
    }

    #[test]
    fn test_stack_to_path() {
        let root = DirEntry::root(3);
        assert_eq!(stack_to_path(&[root.clone()]), "/");
        let a = DirEntry::new("a", true, 5).unwrap();
        let b = DirEntry::new("b", true, 6).unwrap();
        assert_eq!(stack_to_path(&[root, a, b]), "/a/b");
    }
}
