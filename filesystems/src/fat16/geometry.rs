// FAT16 on-disk geometry
// Every absolute byte position in the image is derived here from the BPB.

use super::boot_sector::Bpb;
use fatkit_core::{FatError, FatResult};
use log::warn;
use std::fmt;
use std::ops::Add;

/// Size of one directory entry record in bytes
pub const DIR_ENTRY_SIZE: u32 = 32;

/// First cluster index of the data region
pub const FIRST_DATA_CLUSTER: u16 = 2;

/// Highest cluster count that keeps every index below the FAT16 bad/EOC markers
pub const FAT16_MAX_CLUSTERS: u32 = 0xFFF6 - 2;

/// Cluster counts below this are FAT12 by definition
pub const FAT16_MIN_CLUSTERS: u32 = 4085;

/// Absolute byte position from the start of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteOffset(pub u64);

impl ByteOffset {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Add<u64> for ByteOffset {
    type Output = ByteOffset;

    fn add(self, bytes: u64) -> ByteOffset {
        ByteOffset(self.0 + bytes)
    }
}

impl fmt::Display for ByteOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Position of a record inside the root directory table, counted in entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub u16);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Number of directory entries. Never a byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryCount(pub u16);

impl EntryCount {
    pub fn slots(self) -> impl Iterator<Item = SlotIndex> {
        (0..self.0).map(SlotIndex)
    }

    pub fn contains(self, slot: SlotIndex) -> bool {
        slot.0 < self.0
    }

    pub fn byte_len(self) -> u64 {
        self.0 as u64 * DIR_ENTRY_SIZE as u64
    }
}

/// Layout of a FAT16 volume, validated once when the volume is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    bytes_per_sector: u32,
    sectors_per_cluster: u32,
    reserved_sectors: u32,
    sectors_per_fat: u32,
    fat_copies: u32,
    root_entries: EntryCount,
    cluster_count: u32,
}

impl Geometry {
    pub fn from_bpb(bpb: &Bpb) -> FatResult<Self> {
        let fields = [
            ("bytes per sector", bpb.bytes_per_sector as u32),
            ("sectors per cluster", bpb.sectors_per_cluster as u32),
            ("reserved sectors", bpb.reserved_sectors as u32),
            ("sectors per FAT", bpb.sectors_per_fat as u32),
            ("FAT copies", bpb.fat_copies as u32),
            ("root entries", bpb.root_entries as u32),
            ("total sectors", bpb.total_sectors()),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(FatError::MalformedGeometry(format!("{} is 0", field)));
            }
        }
        if (bpb.bytes_per_sector as u32) < DIR_ENTRY_SIZE {
            return Err(FatError::MalformedGeometry(format!(
                "bytes per sector {} is smaller than a directory entry",
                bpb.bytes_per_sector
            )));
        }

        let mut geometry = Self {
            bytes_per_sector: bpb.bytes_per_sector as u32,
            sectors_per_cluster: bpb.sectors_per_cluster as u32,
            reserved_sectors: bpb.reserved_sectors as u32,
            sectors_per_fat: bpb.sectors_per_fat as u32,
            fat_copies: bpb.fat_copies as u32,
            root_entries: EntryCount(bpb.root_entries),
            cluster_count: 0,
        };

        let image_bytes = bpb.total_sectors() as u64 * geometry.bytes_per_sector as u64;
        let data_start = geometry.data_region_offset().get();
        if image_bytes <= data_start {
            return Err(FatError::MalformedGeometry(format!(
                "data region starts at {:#x} but the volume is only {} bytes",
                data_start, image_bytes
            )));
        }

        let mut cluster_count = ((image_bytes - data_start) / geometry.cluster_size() as u64) as u32;
        if cluster_count == 0 {
            return Err(FatError::MalformedGeometry("volume has no data clusters".to_string()));
        }
        if cluster_count > FAT16_MAX_CLUSTERS {
            return Err(FatError::MalformedGeometry(format!(
                "{} clusters do not fit FAT16 indices",
                cluster_count
            )));
        }

        // The FAT can only describe as many clusters as it has 16-bit slots for
        let fat_capacity = geometry.fat_len() / 2;
        if (cluster_count as u64 + 2) > fat_capacity {
            warn!(
                "FAT holds {} entries, limiting {} clusters to {}",
                fat_capacity,
                cluster_count,
                fat_capacity.saturating_sub(2)
            );
            cluster_count = fat_capacity.saturating_sub(2) as u32;
            if cluster_count == 0 {
                return Err(FatError::MalformedGeometry("FAT is too small to hold any cluster".to_string()));
            }
        }
        geometry.cluster_count = cluster_count;

        Ok(geometry)
    }

    pub fn bytes_per_sector(&self) -> u32 {
        self.bytes_per_sector
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        self.sectors_per_cluster
    }

    pub fn fat_copies(&self) -> u32 {
        self.fat_copies
    }

    pub fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    pub fn root_entries(&self) -> EntryCount {
        self.root_entries
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Bytes in one cluster
    pub fn cluster_size(&self) -> u32 {
        self.sectors_per_cluster * self.bytes_per_sector
    }

    /// Bytes in one FAT copy
    pub fn fat_len(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    /// Start of the given FAT copy
    pub fn fat_offset(&self, copy: u32) -> ByteOffset {
        ByteOffset(self.reserved_sectors as u64 * self.bytes_per_sector as u64 + copy as u64 * self.fat_len())
    }

    /// Position of a cluster's 16-bit entry inside the given FAT copy
    pub fn fat_entry_offset(&self, copy: u32, cluster: u16) -> ByteOffset {
        self.fat_offset(copy) + cluster as u64 * 2
    }

    /// Start of the root directory table, after every FAT copy
    pub fn root_dir_offset(&self) -> ByteOffset {
        self.fat_offset(self.fat_copies)
    }

    pub fn slot_offset(&self, slot: SlotIndex) -> ByteOffset {
        self.root_dir_offset() + slot.0 as u64 * DIR_ENTRY_SIZE as u64
    }

    pub fn data_region_offset(&self) -> ByteOffset {
        self.root_dir_offset() + self.root_entries.byte_len()
    }

    /// One past the highest valid cluster index
    pub fn cluster_limit(&self) -> u32 {
        self.cluster_count + FIRST_DATA_CLUSTER as u32
    }

    pub fn is_data_cluster(&self, cluster: u16) -> bool {
        cluster >= FIRST_DATA_CLUSTER && (cluster as u32) < self.cluster_limit()
    }

    pub fn data_clusters(&self) -> impl Iterator<Item = u16> {
        FIRST_DATA_CLUSTER..self.cluster_limit() as u16
    }

    pub fn cluster_offset(&self, cluster: u16) -> FatResult<ByteOffset> {
        if !self.is_data_cluster(cluster) {
            return Err(FatError::corrupt_chain(
                cluster,
                cluster,
                format!("outside the data region (2..{})", self.cluster_limit()),
            ));
        }
        Ok(self.data_region_offset()
            + (cluster - FIRST_DATA_CLUSTER) as u64 * self.cluster_size() as u64)
    }

    /// Number of clusters needed to hold `bytes`
    pub fn clusters_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.cluster_size() as u64)
    }
}
