// 32-byte FAT directory entry record

use super::short_name::{display_83_name, ShortName, SHORT_NAME_LEN};
use byteorder::{ByteOrder, LittleEndian};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

pub const DELETED_MARKER: u8 = 0xE5;

/// Directory entry attribute bits
pub struct FatAttributes;

impl FatAttributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const LONG_NAME: u8 = 0x0F;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirEntry {
    pub name: [u8; SHORT_NAME_LEN], // 0x00
    pub attributes: u8,             // 0x0B
    pub nt_reserved: u8,            // 0x0C
    pub creation_time_tenth: u8,    // 0x0D
    pub creation_time: u16,         // 0x0E
    pub creation_date: u16,         // 0x10
    pub last_access_date: u16,      // 0x12
    pub first_cluster_high: u16,    // 0x14, always 0 on FAT16
    pub write_time: u16,            // 0x16
    pub write_date: u16,            // 0x18
    pub starting_cluster: u16,      // 0x1A
    pub file_size: u32,             // 0x1C
}

impl DirEntry {
    pub const SIZE: usize = 32;

    /// A fresh archive entry for a regular file, stamped with the current local time.
    pub fn new_file(name: &ShortName, starting_cluster: u16, file_size: u32) -> Self {
        let mut entry = Self {
            name: *name.as_bytes(),
            attributes: FatAttributes::ARCHIVE,
            starting_cluster,
            file_size,
            ..Self::default()
        };
        entry.stamp(&chrono::Local::now().naive_local());
        entry
    }

    /// A volume label entry. Labels carry no data.
    pub fn volume_label(label: &str) -> Self {
        let mut name = [b' '; SHORT_NAME_LEN];
        for (slot, byte) in name.iter_mut().zip(label.to_ascii_uppercase().bytes()) {
            *slot = byte;
        }
        let mut entry = Self {
            name,
            attributes: FatAttributes::VOLUME_ID,
            ..Self::default()
        };
        entry.stamp(&chrono::Local::now().naive_local());
        entry
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; SHORT_NAME_LEN];
        name.copy_from_slice(&raw[0..SHORT_NAME_LEN]);

        Self {
            name,
            attributes: raw[0x0B],
            nt_reserved: raw[0x0C],
            creation_time_tenth: raw[0x0D],
            creation_time: LittleEndian::read_u16(&raw[0x0E..]),
            creation_date: LittleEndian::read_u16(&raw[0x10..]),
            last_access_date: LittleEndian::read_u16(&raw[0x12..]),
            first_cluster_high: LittleEndian::read_u16(&raw[0x14..]),
            write_time: LittleEndian::read_u16(&raw[0x16..]),
            write_date: LittleEndian::read_u16(&raw[0x18..]),
            starting_cluster: LittleEndian::read_u16(&raw[0x1A..]),
            file_size: LittleEndian::read_u32(&raw[0x1C..]),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        raw[0..SHORT_NAME_LEN].copy_from_slice(&self.name);
        raw[0x0B] = self.attributes;
        raw[0x0C] = self.nt_reserved;
        raw[0x0D] = self.creation_time_tenth;
        LittleEndian::write_u16(&mut raw[0x0E..], self.creation_time);
        LittleEndian::write_u16(&mut raw[0x10..], self.creation_date);
        LittleEndian::write_u16(&mut raw[0x12..], self.last_access_date);
        LittleEndian::write_u16(&mut raw[0x14..], self.first_cluster_high);
        LittleEndian::write_u16(&mut raw[0x16..], self.write_time);
        LittleEndian::write_u16(&mut raw[0x18..], self.write_date);
        LittleEndian::write_u16(&mut raw[0x1A..], self.starting_cluster);
        LittleEndian::write_u32(&mut raw[0x1C..], self.file_size);
        raw
    }

    /// Never used, or released by delete
    pub fn is_free(&self) -> bool {
        self.name[0] == 0x00 || self.name[0] == DELETED_MARKER
    }

    pub fn is_zeroed(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes & FatAttributes::LONG_NAME != FatAttributes::LONG_NAME
            && self.attributes & FatAttributes::VOLUME_ID != 0
    }

    pub fn is_long_name(&self) -> bool {
        self.attributes & FatAttributes::LONG_NAME == FatAttributes::LONG_NAME
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & FatAttributes::DIRECTORY != 0
    }

    /// An occupied entry that names a regular file or subdirectory
    pub fn is_file_entry(&self) -> bool {
        !self.is_free() && !self.is_volume_label() && !self.is_long_name()
    }

    pub fn matches(&self, name: &ShortName) -> bool {
        &self.name == name.as_bytes()
    }

    pub fn display_name(&self) -> String {
        display_83_name(&self.name)
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        decode_datetime(self.write_date, self.write_time)
    }

    /// Set creation, write and access stamps
    pub fn stamp(&mut self, now: &NaiveDateTime) {
        let (date, time) = encode_datetime(now);
        self.creation_date = date;
        self.creation_time = time;
        self.creation_time_tenth = ((now.second() % 2) * 100 + now.nanosecond() / 10_000_000) as u8;
        self.write_date = date;
        self.write_time = time;
        self.last_access_date = date;
    }
}

/// Encode a timestamp into FAT date and time words (2-second resolution)
pub fn encode_datetime(dt: &NaiveDateTime) -> (u16, u16) {
    let year = dt.year().clamp(1980, 2107);
    let date = ((year - 1980) as u16) << 9 | (dt.month() as u16) << 5 | dt.day() as u16;
    let time = (dt.hour() as u16) << 11 | (dt.minute() as u16) << 5 | (dt.second() as u16 / 2);
    (date, time)
}

pub fn decode_datetime(date: u16, time: u16) -> Option<NaiveDateTime> {
    if date == 0 {
        return None;
    }
    let year = 1980 + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
