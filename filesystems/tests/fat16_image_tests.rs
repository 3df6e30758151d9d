// FAT16 engine against real image files
// Formats a temporary file, then exercises copy-in/out, rename and delete through a reopened volume.

use fatkit_core::{FatError, FormatOptions, VolumeConfig};
use fatkit_filesystems::fat16::{collect_chain, Fat16FileOps, Fat16Volume, FatNext, FatTable};
use fatkit_filesystems::create_image;
use std::io::Cursor;
use tempfile::NamedTempFile;

const IMAGE_SIZE: u64 = 16 * 1024 * 1024;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A formatted 16 MiB image in a temporary file
fn create_test_image(label: Option<&str>) -> NamedTempFile {
    init_logging();
    let temp_file = NamedTempFile::new().unwrap();
    let options = FormatOptions {
        label: label.map(|s| s.to_string()),
        ..FormatOptions::default()
    };
    create_image(temp_file.path(), IMAGE_SIZE, &options).expect("Format failed");
    temp_file
}

fn open(image: &NamedTempFile) -> Fat16FileOps<std::fs::File> {
    Fat16FileOps::open(image.path(), VolumeConfig::default()).expect("Open failed")
}

fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_format_produces_fat16_volume() {
    let image = create_test_image(Some("FATKIT"));
    assert_eq!(std::fs::metadata(image.path()).unwrap().len(), IMAGE_SIZE);

    let mut ops = open(&image);
    let info = ops.info().unwrap();

    assert_eq!(info.filesystem_type, "FAT16");
    assert_eq!(info.label.as_deref(), Some("FATKIT"));
    assert_eq!(info.bytes_per_sector, 512);
    assert_eq!(info.cluster_size, 1024);
    assert!(info.cluster_count >= 4085);
    assert_eq!(info.free_clusters, info.cluster_count);
    assert!(ops.list().unwrap().is_empty());
}

#[test]
fn test_files_survive_reopening() {
    let image = create_test_image(None);
    let small = content(100, 1);
    let large = content(200_000, 7);

    {
        let mut ops = open(&image);
        ops.copy_in("SMALL.TXT", &mut Cursor::new(&small), small.len() as u64).unwrap();
        ops.copy_in("LARGE.BIN", &mut Cursor::new(&large), large.len() as u64).unwrap();
    }

    let mut ops = open(&image);
    let names: Vec<String> = ops.list().unwrap().into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["SMALL.TXT", "LARGE.BIN"]);
    assert_eq!(ops.read_file("SMALL.TXT").unwrap(), small);
    assert_eq!(ops.read_file("LARGE.BIN").unwrap(), large);
}

#[test]
fn test_copy_out_to_host_file() {
    let image = create_test_image(None);
    let data = content(5000, 3);
    let mut ops = open(&image);
    ops.copy_in("REPORT.DAT", &mut Cursor::new(&data), data.len() as u64).unwrap();

    let dest = NamedTempFile::new().unwrap();
    let mut file = dest.reopen().unwrap();
    let copied = ops.copy_out("REPORT.DAT", &mut file).unwrap();

    assert_eq!(copied, 5000);
    assert_eq!(std::fs::read(dest.path()).unwrap(), data);
}

#[test]
fn test_copy_out_to_path_writes_host_file() {
    let image = create_test_image(None);
    let data = content(3000, 5);
    let mut ops = open(&image);
    ops.copy_in("EXPORT.BIN", &mut Cursor::new(&data), data.len() as u64).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("export.bin");
    assert_eq!(ops.copy_out_to_path("EXPORT.BIN", &dest).unwrap(), 3000);
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[test]
fn test_copy_out_of_missing_name_leaves_host_file_alone() {
    let image = create_test_image(None);
    let mut ops = open(&image);

    let dest = NamedTempFile::new().unwrap();
    std::fs::write(dest.path(), b"precious host data").unwrap();
    let err = ops.copy_out_to_path("MISSING.TXT", dest.path()).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(std::fs::read(dest.path()).unwrap(), b"precious host data");

    let dir = tempfile::tempdir().unwrap();
    let fresh = dir.path().join("never.txt");
    assert!(ops.copy_out_to_path("MISSING.TXT", &fresh).is_err());
    assert!(!fresh.exists());
}

#[test]
fn test_delete_releases_space_and_wipes_data() {
    let image = create_test_image(None);
    let data = vec![0x5Au8; 10_000];

    let (start, free_before) = {
        let mut ops = open(&image);
        let free_before = ops.info().unwrap().free_clusters;
        let info = ops.copy_in("SECRET.TXT", &mut Cursor::new(&data), data.len() as u64).unwrap();
        assert_eq!(ops.info().unwrap().free_clusters, free_before - 10);

        ops.delete("SECRET.TXT").unwrap();
        assert!(ops.find("SECRET.TXT").unwrap_err().is_not_found());
        assert_eq!(ops.info().unwrap().free_clusters, free_before);
        (info.starting_cluster, free_before)
    };

    let raw = std::fs::read(image.path()).unwrap();
    assert!(!raw.windows(16).any(|w| w.iter().all(|&b| b == 0x5A)));

    let mut volume = Fat16Volume::open(image.path(), VolumeConfig::default()).unwrap();
    assert_eq!(volume.next(start).unwrap(), FatNext::Free);
    assert!(free_before > 0);
}

#[test]
fn test_rename_keeps_content() {
    let image = create_test_image(None);
    let data = content(3000, 9);
    let mut ops = open(&image);
    let before = ops.copy_in("DRAFT.TXT", &mut Cursor::new(&data), data.len() as u64).unwrap();

    ops.rename("DRAFT.TXT", "FINAL.TXT").unwrap();
    assert!(matches!(
        ops.rename("FINAL.TXT", "FINAL.TXT"),
        Err(FatError::NameInUse(_))
    ));

    let listing = ops.list().unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "FINAL.TXT");
    assert_eq!(listing[0].starting_cluster, before.starting_cluster);
    assert_eq!(listing[0].slot, before.slot);
    assert_eq!(ops.read_file("FINAL.TXT").unwrap(), data);
}

#[test]
fn test_new_files_get_contiguous_chains_on_fresh_volume() {
    let image = create_test_image(None);
    let data = content(4096, 2);
    let mut ops = open(&image);
    let info = ops.copy_in("CHAIN.BIN", &mut Cursor::new(&data), 4096).unwrap();

    let mut volume = ops.into_volume();
    let geometry = *volume.geometry();
    let chain = collect_chain(&mut volume, &geometry, info.starting_cluster).unwrap();
    assert_eq!(chain, vec![2, 3, 4, 5]);
}

#[test]
fn test_read_only_open_protects_image() {
    let image = create_test_image(None);
    {
        let mut ops = open(&image);
        ops.copy_in("KEEP.TXT", &mut Cursor::new(b"keep me"), 7).unwrap();
    }
    let before = std::fs::read(image.path()).unwrap();

    let config = VolumeConfig {
        read_only: true,
        ..VolumeConfig::default()
    };
    let mut ops = Fat16FileOps::open(image.path(), config).unwrap();
    assert!(matches!(ops.delete("KEEP.TXT"), Err(FatError::ReadOnly)));
    assert_eq!(ops.read_file("KEEP.TXT").unwrap(), b"keep me");
    drop(ops);

    assert_eq!(std::fs::read(image.path()).unwrap(), before);
}

#[test]
fn test_config_loaded_from_json() {
    let image = create_test_image(None);
    let config_file = NamedTempFile::new().unwrap();
    std::fs::write(config_file.path(), r#"{ "zero_on_delete": false }"#).unwrap();
    let config = VolumeConfig::load(config_file.path()).unwrap();
    assert!(!config.zero_on_delete);
    assert!(config.free_clusters_on_delete);

    let mut ops = Fat16FileOps::open(image.path(), config).unwrap();
    let data = vec![0x77u8; 2048];
    ops.copy_in("LEFT.BIN", &mut Cursor::new(&data), 2048).unwrap();
    ops.delete("LEFT.BIN").unwrap();
    drop(ops);

    // Data stays behind, the clusters do not
    let raw = std::fs::read(image.path()).unwrap();
    assert!(raw.windows(2048).any(|w| w.iter().all(|&b| b == 0x77)));
    let mut ops = open(&image);
    let info = ops.info().unwrap();
    assert_eq!(info.free_clusters, info.cluster_count);
}
