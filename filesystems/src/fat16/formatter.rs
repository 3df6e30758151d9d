// FAT16 formatter
// Lays down a blank volume: boot sector, initialised FAT copies and an empty root directory.

use super::boot_sector::{Bpb, MEDIA_FIXED_DISK};
use super::dir_entry::DirEntry;
use super::geometry::{FAT16_MAX_CLUSTERS, FAT16_MIN_CLUSTERS};
use fatkit_core::{FatError, FatResult, FormatOptions};
use log::{debug, info};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

const MAX_FAT16_VOLUME: u64 = 4 * 1024 * 1024 * 1024;

/// Layout chosen for a volume before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat16Layout {
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    pub sectors_per_fat: u16,
    pub cluster_count: u32,
}

/// Microsoft's recommended FAT16 cluster sizes by volume size
fn default_cluster_size(size_bytes: u64) -> u32 {
    const MB: u64 = 1024 * 1024;
    match size_bytes {
        s if s <= 16 * MB => 1024,
        s if s <= 128 * MB => 2048,
        s if s <= 256 * MB => 4096,
        s if s <= 512 * MB => 8192,
        s if s <= 1024 * MB => 16384,
        s if s <= 2048 * MB => 32768,
        _ => 65536,
    }
}

pub fn calculate_layout(size_bytes: u64, options: &FormatOptions) -> FatResult<Fat16Layout> {
    options.validate()?;
    if size_bytes > MAX_FAT16_VOLUME {
        return Err(FatError::Configuration("Volume too large for FAT16 (max 4GB)".to_string()));
    }

    let bytes_per_sector = options.bytes_per_sector as u64;
    let total_sectors = size_bytes / bytes_per_sector;
    let cluster_size = options
        .cluster_size
        .unwrap_or_else(|| default_cluster_size(size_bytes).max(options.bytes_per_sector as u32));
    let sectors_per_cluster = (cluster_size as u64 / bytes_per_sector).clamp(1, 128);

    let reserved = options.reserved_sectors as u64;
    let fat_copies = options.fat_copies as u64;
    let root_dir_sectors = (options.root_entries as u64 * 32).div_ceil(bytes_per_sector);

    // Size the FAT for the clusters that would exist without it, which over-allocates slightly
    let usable = total_sectors.saturating_sub(reserved + root_dir_sectors);
    let estimate = usable / sectors_per_cluster;
    let sectors_per_fat = ((estimate + 2) * 2).div_ceil(bytes_per_sector).max(1);

    let data_start = reserved + fat_copies * sectors_per_fat + root_dir_sectors;
    if total_sectors <= data_start {
        return Err(FatError::Configuration(format!(
            "Volume of {} bytes is too small to hold the FAT16 metadata",
            size_bytes
        )));
    }

    let cluster_count = (total_sectors - data_start) / sectors_per_cluster;
    if cluster_count == 0 || cluster_count > FAT16_MAX_CLUSTERS as u64 || sectors_per_fat > u16::MAX as u64 {
        return Err(FatError::Configuration(format!(
            "Cluster size {} bytes produces {} clusters, which FAT16 cannot address",
            cluster_size, cluster_count
        )));
    }
    if options.enforce_cluster_range && cluster_count < FAT16_MIN_CLUSTERS as u64 {
        return Err(FatError::Configuration(format!(
            "Cluster size {} bytes produces too few clusters ({}) for FAT16. Minimum is {}.",
            cluster_size, cluster_count, FAT16_MIN_CLUSTERS
        )));
    }

    Ok(Fat16Layout {
        total_sectors: total_sectors as u32,
        sectors_per_cluster: sectors_per_cluster as u8,
        sectors_per_fat: sectors_per_fat as u16,
        cluster_count: cluster_count as u32,
    })
}

fn volume_serial() -> u32 {
    let now = chrono::Local::now();
    (now.timestamp() as u32) ^ now.timestamp_subsec_nanos()
}

fn padded_label(label: Option<&str>) -> [u8; 11] {
    let mut raw = *b"NO NAME    ";
    if let Some(label) = label {
        raw = [b' '; 11];
        for (slot, byte) in raw.iter_mut().zip(label.to_ascii_uppercase().bytes()) {
            *slot = byte;
        }
    }
    raw
}

/// Write a blank FAT16 filesystem of `size_bytes` into `storage`.
pub fn format_image<S: Write + Seek>(storage: &mut S, size_bytes: u64, options: &FormatOptions) -> FatResult<Bpb> {
    let layout = calculate_layout(size_bytes, options)?;
    info!(
        "FAT16 parameters: {} sectors, {} sectors/cluster, {} sectors/FAT, {} root entries, {} clusters",
        layout.total_sectors,
        layout.sectors_per_cluster,
        layout.sectors_per_fat,
        options.root_entries,
        layout.cluster_count
    );

    let mut bpb = Bpb {
        bytes_per_sector: options.bytes_per_sector,
        sectors_per_cluster: layout.sectors_per_cluster,
        reserved_sectors: options.reserved_sectors,
        fat_copies: options.fat_copies,
        root_entries: options.root_entries,
        media_descriptor: MEDIA_FIXED_DISK,
        sectors_per_fat: layout.sectors_per_fat,
        volume_id: volume_serial(),
        volume_label: padded_label(options.label.as_deref()),
        ..Bpb::default()
    };
    bpb.set_total_sectors(layout.total_sectors);

    let bytes_per_sector = options.bytes_per_sector as usize;

    // Boot sector followed by the rest of the reserved area
    let mut reserved = vec![0u8; options.reserved_sectors as usize * bytes_per_sector];
    reserved[..512].copy_from_slice(&bpb.to_boot_sector());
    if bytes_per_sector > 512 {
        // The signature also sits at the end of a larger first sector
        reserved[bytes_per_sector - 2] = 0x55;
        reserved[bytes_per_sector - 1] = 0xAA;
    }
    storage.seek(SeekFrom::Start(0))?;
    storage.write_all(&reserved)?;

    // Every FAT copy: media byte in entry 0, end-of-chain in entry 1, the rest free
    let mut fat = vec![0u8; layout.sectors_per_fat as usize * bytes_per_sector];
    fat[0..2].copy_from_slice(&(0xFF00 | MEDIA_FIXED_DISK as u16).to_le_bytes());
    fat[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes());
    for copy in 0..options.fat_copies {
        debug!("Writing FAT copy {}", copy);
        storage.write_all(&fat)?;
    }

    let mut root = vec![0u8; (options.root_entries as usize * 32).div_ceil(bytes_per_sector) * bytes_per_sector];
    if let Some(label) = options.label.as_deref() {
        root[..32].copy_from_slice(&DirEntry::volume_label(label).encode());
    }
    storage.write_all(&root)?;

    // Make sure the image covers the whole data region
    let end = layout.total_sectors as u64 * options.bytes_per_sector as u64;
    storage.seek(SeekFrom::Start(end - 1))?;
    storage.write_all(&[0])?;
    storage.flush()?;

    info!("FAT16 format completed successfully");
    Ok(bpb)
}

/// Create (or truncate) an image file of `size_bytes` and format it.
pub fn create_image(path: &Path, size_bytes: u64, options: &FormatOptions) -> FatResult<Bpb> {
    info!("Creating FAT16 image {} ({} bytes)", path.display(), size_bytes);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(size_bytes)?;
    let bpb = format_image(&mut file, size_bytes, options)?;
    file.sync_all()?;
    Ok(bpb)
}
