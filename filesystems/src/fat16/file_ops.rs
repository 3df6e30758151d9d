// FAT16 File Operations
// Copy, rename and delete over the root directory, keeping entries and chains consistent.

use super::dir_entry::DirEntry;
use super::fat_table::{count_free, free_chain};
use super::file_io;
use super::geometry::SlotIndex;
use super::short_name::ShortName;
use super::volume::Fat16Volume;
use chrono::NaiveDateTime;
use fatkit_core::{FatError, FatResult, VolumeConfig};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

/// One occupied root directory entry, as shown by `ls`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub slot: u16,
    pub size: u32,
    pub starting_cluster: u16,
    pub attributes: u8,
    pub is_directory: bool,
    pub modified: Option<NaiveDateTime>,
}

impl FileInfo {
    fn from_entry(slot: SlotIndex, entry: &DirEntry) -> Self {
        Self {
            name: entry.display_name(),
            slot: slot.0,
            size: entry.file_size,
            starting_cluster: entry.starting_cluster,
            attributes: entry.attributes,
            is_directory: entry.is_directory(),
            modified: entry.modified(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub label: Option<String>,
    pub oem_name: String,
    pub filesystem_type: String,
    pub volume_id: u32,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_size: u32,
    pub fat_copies: u32,
    pub sectors_per_fat: u32,
    pub root_entries: u16,
    pub used_entries: u16,
    pub cluster_count: u32,
    pub free_clusters: u32,
    pub total_space: u64,
    pub free_space: u64,
    pub is_readonly: bool,
}

pub struct Fat16FileOps<S: Read + Write + Seek> {
    volume: Fat16Volume<S>,
}

impl Fat16FileOps<File> {
    pub fn open(path: &Path, config: VolumeConfig) -> FatResult<Self> {
        Ok(Self::new(Fat16Volume::open(path, config)?))
    }
}

impl<S: Read + Write + Seek> Fat16FileOps<S> {
    pub fn new(volume: Fat16Volume<S>) -> Self {
        Self { volume }
    }

    pub fn volume(&self) -> &Fat16Volume<S> {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut Fat16Volume<S> {
        &mut self.volume
    }

    pub fn into_volume(self) -> Fat16Volume<S> {
        self.volume
    }

    /// Locate a file by its `NAME.EXT` short name. The volume label is never a match.
    pub fn find(&mut self, name: &str) -> FatResult<(SlotIndex, DirEntry)> {
        let short = ShortName::parse(name)?;
        self.volume.directory().find_file(&short)
    }

    /// Occupied entries in slot order, volume label excluded
    pub fn list(&mut self) -> FatResult<Vec<FileInfo>> {
        let entries = self.volume.directory().list_occupied()?;
        debug!("Listing {} root directory entries", entries.len());
        Ok(entries
            .iter()
            .map(|(slot, entry)| FileInfo::from_entry(*slot, entry))
            .collect())
    }

    /// Stream a file's content into `dest`. Returns the number of bytes copied.
    pub fn copy_out<W: Write>(&mut self, name: &str, dest: &mut W) -> FatResult<u64> {
        let result = self.copy_out_inner(name, dest);
        report("copy-out", name, result)
    }

    fn copy_out_inner<W: Write>(&mut self, name: &str, dest: &mut W) -> FatResult<u64> {
        let (_, entry) = self.find(name)?;
        info!("Copying {} ({} bytes) out of the image", name, entry.file_size);
        file_io::copy_to(&mut self.volume, &entry, dest)
    }

    /// Copy a file out to a host path. The path is only created once the file is found.
    pub fn copy_out_to_path(&mut self, name: &str, dest: &Path) -> FatResult<u64> {
        let result = self.copy_out_to_path_inner(name, dest);
        report("copy-out", name, result)
    }

    fn copy_out_to_path_inner(&mut self, name: &str, dest: &Path) -> FatResult<u64> {
        let (_, entry) = self.find(name)?;
        info!("Copying {} ({} bytes) to {}", name, entry.file_size, dest.display());
        let mut writer = BufWriter::new(File::create(dest)?);
        let copied = file_io::copy_to(&mut self.volume, &entry, &mut writer)?;
        writer.flush()?;
        Ok(copied)
    }

    pub fn read_file(&mut self, name: &str) -> FatResult<Vec<u8>> {
        let mut data = Vec::new();
        self.copy_out(name, &mut data)?;
        Ok(data)
    }

    /// Remove a file: wipe its data, erase its slot, then release its clusters.
    ///
    /// A failure between steps leaves either a named entry over zeroed clusters or a free
    /// slot with leaked clusters, never an entry pointing at data it does not own.
    pub fn delete(&mut self, name: &str) -> FatResult<()> {
        let result = self.delete_inner(name);
        report("delete", name, result)
    }

    fn delete_inner(&mut self, name: &str) -> FatResult<()> {
        self.volume.ensure_writable()?;
        let short = ShortName::parse(name)?;
        let (slot, entry) = self.volume.directory().find_file(&short)?;
        info!("Deleting {} from {}", short, slot);

        let config = self.volume.config().clone();
        if config.zero_on_delete {
            file_io::zero_data(&mut self.volume, &entry)?;
        } else {
            warn!("zero_on_delete is off: data of {} stays readable in the image", short);
        }

        self.volume.directory().erase_slot(slot)?;

        if entry.starting_cluster != 0 {
            if config.free_clusters_on_delete {
                let geometry = *self.volume.geometry();
                let freed = free_chain(&mut self.volume, &geometry, entry.starting_cluster)?;
                debug!("Released {} clusters of {}", freed, short);
            } else {
                warn!(
                    "free_clusters_on_delete is off: clusters of {} from {} stay allocated",
                    short, entry.starting_cluster
                );
            }
        }

        self.volume.flush()?;
        info!("File {} deleted successfully", short);
        Ok(())
    }

    /// Give a file a new short name in place. Cluster, size and timestamps are kept.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> FatResult<()> {
        let result = self.rename_inner(old_name, new_name);
        report("rename", old_name, result)
    }

    fn rename_inner(&mut self, old_name: &str, new_name: &str) -> FatResult<()> {
        self.volume.ensure_writable()?;
        let old = ShortName::parse(old_name)?;
        let (slot, entry) = self.volume.directory().find_file(&old)?;
        let new = ShortName::parse(new_name)?;

        // Renaming onto its own name counts as a collision too
        match self.volume.directory().find_file(&new) {
            Ok(_) => return Err(FatError::NameInUse(new.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.volume.directory().write(slot, &new, &entry)?;
        self.volume.flush()?;
        info!("Renamed {} to {} at {}", old, new, slot);
        Ok(())
    }

    /// Create `name` from `len` bytes of `source`.
    ///
    /// Data goes to disk before the entry, so an interrupted copy leaks clusters rather
    /// than publishing a name over unwritten data.
    pub fn copy_in<R: Read>(&mut self, name: &str, source: &mut R, len: u64) -> FatResult<FileInfo> {
        let result = self.copy_in_inner(name, source, len);
        report("copy-in", name, result)
    }

    fn copy_in_inner<R: Read>(&mut self, name: &str, source: &mut R, len: u64) -> FatResult<FileInfo> {
        self.volume.ensure_writable()?;
        let short = ShortName::parse(name)?;
        let size = u32::try_from(len).map_err(|_| {
            FatError::Configuration(format!("{} bytes exceeds the FAT16 maximum file size", len))
        })?;

        match self.volume.directory().find_file(&short) {
            Ok(_) => return Err(FatError::NameInUse(short.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let slot = self.volume.directory().find_free_slot()?;
        info!("Copying {} bytes into {} at {}", size, short, slot);

        let start = file_io::write_new(&mut self.volume, source, size)?;
        let entry = DirEntry::new_file(&short, start, size);

        let written = match self.volume.directory().write(slot, &short, &entry) {
            Ok(written) => written,
            Err(e) => {
                if start != 0 {
                    let geometry = *self.volume.geometry();
                    if let Err(release) = free_chain(&mut self.volume, &geometry, start) {
                        warn!("Could not release clusters of {}: {}", short, release);
                    }
                }
                return Err(e);
            }
        };

        self.volume.flush()?;
        Ok(FileInfo::from_entry(slot, &written))
    }

    pub fn info(&mut self) -> FatResult<VolumeInfo> {
        let geometry = *self.volume.geometry();
        let bpb = self.volume.bpb().clone();

        let slots = self.volume.directory().list()?;
        let label = slots
            .iter()
            .find(|(_, entry)| !entry.is_free() && entry.is_volume_label())
            .map(|(_, entry)| String::from_utf8_lossy(&entry.name).trim_end().to_string())
            .or_else(|| Some(bpb.label()).filter(|l| !l.is_empty() && l != "NO NAME"));
        let used_entries = slots.iter().filter(|(_, entry)| entry.is_file_entry()).count() as u16;

        let free_clusters = count_free(&mut self.volume, &geometry)?;
        let cluster_size = geometry.cluster_size();

        Ok(VolumeInfo {
            label,
            oem_name: String::from_utf8_lossy(&bpb.oem_name).trim_end().to_string(),
            filesystem_type: bpb.fs_type(),
            volume_id: bpb.volume_id,
            bytes_per_sector: geometry.bytes_per_sector(),
            sectors_per_cluster: geometry.sectors_per_cluster(),
            cluster_size,
            fat_copies: geometry.fat_copies(),
            sectors_per_fat: geometry.sectors_per_fat(),
            root_entries: geometry.root_entries().0,
            used_entries,
            cluster_count: geometry.cluster_count(),
            free_clusters,
            total_space: geometry.cluster_count() as u64 * cluster_size as u64,
            free_space: free_clusters as u64 * cluster_size as u64,
            is_readonly: self.volume.config().read_only,
        })
    }
}

/// Log a failed operation with the file it concerned and hand the result back.
fn report<T>(op: &str, name: &str, result: FatResult<T>) -> FatResult<T> {
    if let Err(e) = &result {
        if e.is_not_found() {
            warn!("{} {}: {}", op, name, e);
        } else {
            error!("{} {} failed: {}", op, name, e);
        }
    }
    result
}
