//! Mappings are released when a load fails after the image was mapped.
//!
//! Kept in its own test binary so no other test maps memory while the
//! address-space snapshot is taken.

#![cfg(target_os = "linux")]

mod common;

use sce_elf::{LoadError, LoadOptions, SelfLibrary};

fn mapping_count() -> usize {
    std::fs::read_to_string("/proc/self/maps")
        .expect("read /proc/self/maps")
        .lines()
        .count()
}

#[test]
fn failed_loads_release_their_mappings() {
    let mut seg0 = common::module_segment("libfoo", &["libc", "libkernel"]);
    common::patch_import_name(&mut seg0, 1, 0x9000_0000);
    let file = common::module_with_segment0(seg0).write_temp();
    let path = file.path().to_path_buf();
    let load = || SelfLibrary::load(&path, &LoadOptions::default());

    // Warm up allocator and file-system state before the snapshot.
    assert!(matches!(load(), Err(LoadError::InvalidImportDescriptor(1))));
    let before = mapping_count();

    for _ in 0..50 {
        assert!(matches!(load(), Err(LoadError::InvalidImportDescriptor(1))));
    }

    let after = mapping_count();
    assert!(after <= before, "mappings grew from {before} to {after}");

    let maps = std::fs::read_to_string("/proc/self/maps").expect("read /proc/self/maps");
    let name = path.to_string_lossy();
    assert!(!maps.contains(name.as_ref()), "{name} is still mapped");
}
