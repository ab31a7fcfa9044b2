mod common;

use common::{fresh_volume, write_file};
use fatvol::*;

#[test]
fn test_image_round_trip() {
    let mut fs = fresh_volume();
    fs.make_directory("/a").unwrap();
    fs.make_directory("/a/b").unwrap();
    write_file(&mut fs, "/a/b/deep.txt", b"deep contents");
    write_file(&mut fs, "/big", &vec![9u8; BLOCK_SIZE * 2 + 5]);
    for i in 0..NUM_ENTRY_PER_BLOCK + 1 {
        write_file(&mut fs, &format!("/a/f{}", i), b"f");
    }

    let image = fs.image().to_vec();
    assert_eq!(image.len(), MAX_BLOCKS * BLOCK_SIZE);

    let mut loaded = Volume::load_image(image).unwrap();
    log!("{}", loaded.dump());
    assert_eq!(loaded.label(), "test volume");
    assert_eq!(loaded.root_block(), fs.root_block());
    assert_eq!(loaded.free_blocks(), fs.free_blocks());
    assert_eq!(loaded.fat().entries(), fs.fat().entries());
    assert_eq!(loaded.list_directory("/a").unwrap(), fs.list_directory("/a").unwrap());
    assert_eq!(loaded.read_file("/a/b/deep.txt").unwrap(), b"deep contents");
    assert_eq!(loaded.read_file("/big").unwrap().len(), BLOCK_SIZE * 2 + 5);

    for (i, kind) in (0..MAX_BLOCKS).map(|i| (i, fs.fat().kind(i).unwrap())) {
        assert_eq!(loaded.fat().kind(i).unwrap(), kind, "block {}", i);
    }

    // The loaded volume keeps working.
    write_file(&mut loaded, "/a/b/more", b"more");
    loaded.remove("/a/b/deep.txt").unwrap();
    assert_eq!(loaded.list_directory("/a/b").unwrap().len(), 1);
}

#[test]
fn test_save_load_file() {
    let mut fs = fresh_volume();
    write_file(&mut fs, "/persisted", b"last write wins");

    let path = std::env::temp_dir().join(format!("fatvol-{}.img", std::process::id()));
    fs.save(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, MAX_BLOCKS * BLOCK_SIZE);

    let loaded = Volume::load(&path);
    std::fs::remove_file(&path).unwrap();
    let mut loaded = loaded.unwrap();
    assert_eq!(loaded.read_file("/persisted").unwrap(), b"last write wins");
}

#[test]
fn test_invalid_images() {
    assert_eq!(Volume::load_image(vec![0; 100]).unwrap_err(), Error::InvalidImage);
    assert_eq!(Volume::load_image(vec![0; MAX_BLOCKS * BLOCK_SIZE]).unwrap_err(), Error::InvalidImage);
    assert!(matches!(
        Volume::load(std::env::temp_dir().join("fatvol-does-not-exist.img")),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_aliased_entry_rejected() {
    let mut fs = fresh_volume();
    write_file(&mut fs, "/victim", b"x");
    let mut image = fs.image().to_vec();

    // Point the first root entry at the root directory itself.
    let slot = ROOT_BLOCK as usize * BLOCK_SIZE + DIR_HEADER_SIZE;
    image[slot + 2..slot + 4].copy_from_slice(&ROOT_BLOCK.to_le_bytes());
    assert_eq!(
        Volume::load_image(image).unwrap_err(),
        Error::CorruptDirectory(ROOT_BLOCK as usize)
    );
}

#[test]
fn test_reformat() {
    let mut fs = fresh_volume();
    write_file(&mut fs, "/old", b"old");
    let store = fs.into_device();
    let fs = Volume::format(store, "second").unwrap();
    assert_eq!(fs.label(), "second");
    assert!(fs.list_directory("/").unwrap().is_empty());
    assert_eq!(fs.free_blocks(), MAX_BLOCKS - FAT_BLOCKS - 2);
}
