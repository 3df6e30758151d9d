// Test helpers for FAT16 engine testing

use crate::fat16::dir_entry::DirEntry;
use crate::fat16::fat_table::{FatNext, FatTable};
use crate::fat16::formatter::format_image;
use crate::fat16::geometry::Geometry;
use crate::fat16::short_name::ShortName;
use crate::fat16::volume::Fat16Volume;
use fatkit_core::{FatError, FatResult, FormatOptions, VolumeConfig};
use std::io::Cursor;

pub const TINY_IMAGE_SIZE: u64 = 64 * 1024;

/// 512-byte sectors, one sector per cluster, two FATs, 16 root entries
pub fn tiny_options() -> FormatOptions {
    FormatOptions {
        cluster_size: Some(512),
        root_entries: 16,
        enforce_cluster_range: false,
        ..FormatOptions::default()
    }
}

pub fn tiny_volume() -> Fat16Volume<Cursor<Vec<u8>>> {
    let mut image = Cursor::new(vec![0u8; TINY_IMAGE_SIZE as usize]);
    format_image(&mut image, TINY_IMAGE_SIZE, &tiny_options()).expect("format tiny image");
    Fat16Volume::new(image, VolumeConfig::default()).expect("open tiny image")
}

pub fn tiny_geometry() -> Geometry {
    *tiny_volume().geometry()
}

/// Deterministic, non-repeating-per-cluster content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Lay a file down by hand: link `chain`, write `content` across it and add a root entry.
pub fn place_file(
    volume: &mut Fat16Volume<Cursor<Vec<u8>>>,
    name: &str,
    chain: &[u16],
    content: &[u8],
) -> DirEntry {
    let geometry = *volume.geometry();
    for (i, &cluster) in chain.iter().enumerate() {
        let next = chain.get(i + 1).map_or(FatNext::EndOfChain, |&n| FatNext::Cluster(n));
        volume.set(cluster, next).unwrap();
    }

    let cluster_size = geometry.cluster_size() as usize;
    for (&cluster, piece) in chain.iter().zip(content.chunks(cluster_size)) {
        volume.write_at(geometry.cluster_offset(cluster).unwrap(), piece).unwrap();
    }

    let short = ShortName::parse(name).unwrap();
    let entry = DirEntry::new_file(&short, chain.first().copied().unwrap_or(0), content.len() as u32);
    let mut dir = volume.directory();
    let slot = dir.find_free_slot().unwrap();
    dir.write(slot, &short, &entry).unwrap()
}

/// In-memory FAT for chain logic tests
pub struct MemoryFat {
    entries: Vec<u16>,
}

impl MemoryFat {
    pub fn new(geometry: &Geometry) -> Self {
        let mut entries = vec![0u16; geometry.cluster_limit() as usize];
        entries[0] = 0xFFF8;
        entries[1] = 0xFFFF;
        Self { entries }
    }

    pub fn link(&mut self, chain: &[u16]) {
        for (i, &cluster) in chain.iter().enumerate() {
            let next = chain.get(i + 1).map_or(FatNext::EndOfChain, |&n| FatNext::Cluster(n));
            self.entries[cluster as usize] = next.encode();
        }
    }

    pub fn raw(&self, cluster: u16) -> u16 {
        self.entries[cluster as usize]
    }

    pub fn set_raw(&mut self, cluster: u16, value: u16) {
        self.entries[cluster as usize] = value;
    }
}

impl FatTable for MemoryFat {
    fn next(&mut self, cluster: u16) -> FatResult<FatNext> {
        self.entries
            .get(cluster as usize)
            .map(|&raw| FatNext::decode(raw))
            .ok_or_else(|| FatError::corrupt_chain(cluster, cluster, "beyond the table"))
    }

    fn set(&mut self, cluster: u16, value: FatNext) -> FatResult<()> {
        let slot = self
            .entries
            .get_mut(cluster as usize)
            .ok_or_else(|| FatError::corrupt_chain(cluster, cluster, "beyond the table"))?;
        *slot = value.encode();
        Ok(())
    }
}
