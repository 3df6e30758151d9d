// FAT16 root directory table
// The root directory is a fixed array of 32-byte slots between the FATs and the data region.

use super::dir_entry::{DirEntry, DELETED_MARKER};
use super::geometry::{SlotIndex, DIR_ENTRY_SIZE};
use super::short_name::ShortName;
use super::volume::Fat16Volume;
use fatkit_core::{FatError, FatResult};
use log::{debug, trace};
use std::io::{Read, Seek, Write};

const ENTRY_SIZE: usize = DIR_ENTRY_SIZE as usize;

/// Scanner and mutator over the root directory of one volume.
///
/// Nothing is cached: every call reads the table from the image again.
pub struct RootDirectory<'v, S: Read + Write + Seek> {
    volume: &'v mut Fat16Volume<S>,
}

impl<'v, S: Read + Write + Seek> RootDirectory<'v, S> {
    pub fn new(volume: &'v mut Fat16Volume<S>) -> Self {
        Self { volume }
    }

    /// Visit slots in order, one sector-sized chunk at a time, until `visit` returns true.
    fn scan<F>(&mut self, mut visit: F) -> FatResult<Option<(SlotIndex, DirEntry)>>
    where
        F: FnMut(SlotIndex, &DirEntry) -> bool,
    {
        let geometry = *self.volume.geometry();
        let slots = geometry.root_entries();
        let per_chunk = (geometry.bytes_per_sector() / DIR_ENTRY_SIZE) as u16;
        let mut chunk = vec![0u8; per_chunk as usize * ENTRY_SIZE];

        let mut first = 0u16;
        while first < slots.0 {
            // The last chunk is short when the entry count is not sector aligned
            let in_chunk = per_chunk.min(slots.0 - first);
            let bytes = &mut chunk[..in_chunk as usize * ENTRY_SIZE];
            self.volume.read_at(geometry.slot_offset(SlotIndex(first)), bytes)?;

            for (i, raw) in bytes.chunks_exact(ENTRY_SIZE).enumerate() {
                let slot = SlotIndex(first + i as u16);
                let entry = DirEntry::decode(raw);
                if visit(slot, &entry) {
                    return Ok(Some((slot, entry)));
                }
            }
            first += in_chunk;
        }

        Ok(None)
    }

    /// First slot, in slot order, whose padded name matches exactly.
    pub fn find(&mut self, name: &ShortName) -> FatResult<(SlotIndex, DirEntry)> {
        let found = self.scan(|_, entry| entry.matches(name))?;
        match found {
            Some((slot, entry)) => {
                trace!("Found {} at {}", name, slot);
                Ok((slot, entry))
            }
            None => Err(FatError::NotFound(name.to_string())),
        }
    }

    /// Like `find`, but only regular file and subdirectory entries can match.
    ///
    /// The volume label and long-name fragments share the 11-byte name field and are skipped.
    pub fn find_file(&mut self, name: &ShortName) -> FatResult<(SlotIndex, DirEntry)> {
        self.scan(|_, entry| entry.is_file_entry() && entry.matches(name))?
            .ok_or_else(|| FatError::NotFound(name.to_string()))
    }

    /// Every slot, free ones included, in slot order.
    pub fn list(&mut self) -> FatResult<Vec<(SlotIndex, DirEntry)>> {
        let mut entries = Vec::with_capacity(self.volume.geometry().root_entries().0 as usize);
        self.scan(|slot, entry| {
            entries.push((slot, *entry));
            false
        })?;
        Ok(entries)
    }

    pub fn list_occupied(&mut self) -> FatResult<Vec<(SlotIndex, DirEntry)>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|(_, entry)| entry.is_file_entry())
            .collect())
    }

    pub fn read_slot(&mut self, slot: SlotIndex) -> FatResult<DirEntry> {
        self.check_slot(slot)?;
        let mut raw = [0u8; ENTRY_SIZE];
        let offset = self.volume.geometry().slot_offset(slot);
        self.volume.read_at(offset, &mut raw)?;
        Ok(DirEntry::decode(&raw))
    }

    /// Persist `entry` under `name` at `slot`. Returns the record as written.
    pub fn write(&mut self, slot: SlotIndex, name: &ShortName, entry: &DirEntry) -> FatResult<DirEntry> {
        self.check_slot(slot)?;
        let mut record = *entry;
        record.name = *name.as_bytes();

        let offset = self.volume.geometry().slot_offset(slot);
        self.volume.write_at(offset, &record.encode())?;
        debug!("Wrote directory entry {} at {} ({})", name, slot, offset);
        Ok(record)
    }

    /// Zero the first slot matching `name`.
    pub fn erase(&mut self, name: &ShortName) -> FatResult<SlotIndex> {
        self.volume.ensure_writable()?;
        let (slot, _) = self
            .scan(|_, entry| entry.matches(name))?
            .ok_or_else(|| FatError::NotFound(name.to_string()))?;

        self.erase_slot(slot)?;
        debug!("Erased directory entry {} at {}", name, slot);
        Ok(slot)
    }

    /// Zero the record at `slot`, whatever it holds.
    pub fn erase_slot(&mut self, slot: SlotIndex) -> FatResult<()> {
        self.volume.ensure_writable()?;
        self.check_slot(slot)?;
        let offset = self.volume.geometry().slot_offset(slot);
        self.volume.write_at(offset, &[0u8; ENTRY_SIZE])
    }

    /// First slot that was never used or has been deleted.
    pub fn find_free_slot(&mut self) -> FatResult<SlotIndex> {
        self.scan(|_, entry| entry.name[0] == 0x00 || entry.name[0] == DELETED_MARKER)?
            .map(|(slot, _)| slot)
            .ok_or(FatError::DirectoryFull)
    }

    fn check_slot(&self, slot: SlotIndex) -> FatResult<()> {
        let slots = self.volume.geometry().root_entries();
        if !slots.contains(slot) {
            return Err(FatError::MalformedGeometry(format!(
                "{} is beyond the {} root directory entries",
                slot, slots.0
            )));
        }
        Ok(())
    }
}
