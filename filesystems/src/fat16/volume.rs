// FAT16 volume handle
// Owns the open image and its validated geometry. All image I/O goes through here.

use super::boot_sector::{Bpb, BOOT_SECTOR_SIZE};
use super::directory::RootDirectory;
use super::fat_table::{FatNext, FatTable};
use super::geometry::{ByteOffset, Geometry, FAT16_MIN_CLUSTERS};
use fatkit_core::{FatError, FatResult, VolumeConfig};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct Fat16Volume<S: Read + Write + Seek> {
    storage: S,
    bpb: Bpb,
    geometry: Geometry,
    config: VolumeConfig,
}

impl Fat16Volume<File> {
    /// Open an image file. The file is opened read-only when the config asks for it.
    pub fn open(path: &Path, config: VolumeConfig) -> FatResult<Self> {
        info!("Opening FAT16 image: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(!config.read_only)
            .open(path)?;
        Self::new(file, config)
    }
}

impl<S: Read + Write + Seek> Fat16Volume<S> {
    pub fn new(mut storage: S, config: VolumeConfig) -> FatResult<Self> {
        let mut sector = [0u8; BOOT_SECTOR_SIZE];
        storage.seek(SeekFrom::Start(0))?;
        storage.read_exact(&mut sector)?;

        let bpb = Bpb::parse(&sector, config.verify_signature)?;
        let geometry = Geometry::from_bpb(&bpb)?;

        if bpb.fs_type() != "FAT16" {
            warn!("Filesystem type field is {:?}, treating volume as FAT16", bpb.fs_type());
        }
        if geometry.cluster_count() < FAT16_MIN_CLUSTERS {
            warn!(
                "Volume has {} clusters, below the FAT16 minimum of {}",
                geometry.cluster_count(),
                FAT16_MIN_CLUSTERS
            );
        }

        debug!("FAT16 volume details:");
        debug!("  Bytes per sector: {}", geometry.bytes_per_sector());
        debug!("  Sectors per cluster: {}", geometry.sectors_per_cluster());
        debug!("  FAT copies: {}", geometry.fat_copies());
        debug!("  Root entries: {}", geometry.root_entries().0);
        debug!("  Root directory at: {}", geometry.root_dir_offset());
        debug!("  Data region at: {}", geometry.data_region_offset());
        debug!("  Clusters: {}", geometry.cluster_count());

        Ok(Self {
            storage,
            bpb,
            geometry,
            config,
        })
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn directory(&mut self) -> RootDirectory<'_, S> {
        RootDirectory::new(self)
    }

    pub fn read_at(&mut self, offset: ByteOffset, buf: &mut [u8]) -> FatResult<()> {
        self.storage.seek(SeekFrom::Start(offset.get()))?;
        self.storage.read_exact(buf)?;
        Ok(())
    }

    pub fn write_at(&mut self, offset: ByteOffset, data: &[u8]) -> FatResult<()> {
        self.ensure_writable()?;
        self.storage.seek(SeekFrom::Start(offset.get()))?;
        self.storage.write_all(data)?;
        Ok(())
    }

    pub fn ensure_writable(&self) -> FatResult<()> {
        if self.config.read_only {
            return Err(FatError::ReadOnly);
        }
        Ok(())
    }

    pub fn flush(&mut self) -> FatResult<()> {
        self.storage.flush()?;
        Ok(())
    }
}

impl<S: Read + Write + Seek> FatTable for Fat16Volume<S> {
    fn next(&mut self, cluster: u16) -> FatResult<FatNext> {
        let mut raw = [0u8; 2];
        self.read_at(self.geometry.fat_entry_offset(0, cluster), &mut raw)?;
        Ok(FatNext::decode(u16::from_le_bytes(raw)))
    }

    fn set(&mut self, cluster: u16, value: FatNext) -> FatResult<()> {
        if !self.geometry.is_data_cluster(cluster) {
            return Err(FatError::corrupt_chain(
                cluster,
                cluster,
                "cannot update FAT entry outside the data region",
            ));
        }
        let raw = value.encode().to_le_bytes();
        for copy in 0..self.geometry.fat_copies() {
            self.write_at(self.geometry.fat_entry_offset(copy, cluster), &raw)?;
        }
        Ok(())
    }
}

impl<S: Read + Write + Seek> Drop for Fat16Volume<S> {
    fn drop(&mut self) {
        if !self.config.read_only {
            // Best effort to flush on drop
            let _ = self.storage.flush();
        }
    }
}
