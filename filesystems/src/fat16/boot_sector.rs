// FAT16 boot sector and BIOS Parameter Block
// Fields are read and written little-endian at their standard offsets.

use byteorder::{ByteOrder, LittleEndian};
use fatkit_core::{FatError, FatResult};

pub const BOOT_SECTOR_SIZE: usize = 512;
pub const BOOT_SIGNATURE: u16 = 0xAA55;
pub const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;
pub const MEDIA_FIXED_DISK: u8 = 0xF8;

/// BIOS Parameter Block plus the FAT16 extended fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bpb {
    pub jump_boot: [u8; 3],        // 0x00
    pub oem_name: [u8; 8],         // 0x03
    pub bytes_per_sector: u16,     // 0x0B
    pub sectors_per_cluster: u8,   // 0x0D
    pub reserved_sectors: u16,     // 0x0E
    pub fat_copies: u8,            // 0x10
    pub root_entries: u16,         // 0x11
    pub total_sectors_16: u16,     // 0x13
    pub media_descriptor: u8,      // 0x15
    pub sectors_per_fat: u16,      // 0x16
    pub sectors_per_track: u16,    // 0x18
    pub num_heads: u16,            // 0x1A
    pub hidden_sectors: u32,       // 0x1C
    pub total_sectors_32: u32,     // 0x20
    pub drive_number: u8,          // 0x24
    pub boot_signature: u8,        // 0x26
    pub volume_id: u32,            // 0x27
    pub volume_label: [u8; 11],    // 0x2B
    pub fs_type: [u8; 8],          // 0x36
}

impl Default for Bpb {
    fn default() -> Self {
        Self {
            jump_boot: [0xEB, 0x3C, 0x90],
            oem_name: *b"FATKIT  ",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            fat_copies: 2,
            root_entries: 512,
            total_sectors_16: 0,
            media_descriptor: MEDIA_FIXED_DISK,
            sectors_per_fat: 0,
            sectors_per_track: 63,
            num_heads: 255,
            hidden_sectors: 0,
            total_sectors_32: 0,
            drive_number: 0x80,
            boot_signature: EXTENDED_BOOT_SIGNATURE,
            volume_id: 0,
            volume_label: *b"NO NAME    ",
            fs_type: *b"FAT16   ",
        }
    }
}

impl Bpb {
    /// Parse the BPB out of the first sector of the image.
    pub fn parse(sector: &[u8], verify_signature: bool) -> FatResult<Self> {
        if sector.len() < BOOT_SECTOR_SIZE {
            return Err(FatError::MalformedGeometry(format!(
                "boot sector is {} bytes, need {}",
                sector.len(),
                BOOT_SECTOR_SIZE
            )));
        }

        if verify_signature {
            let signature = LittleEndian::read_u16(&sector[510..512]);
            if signature != BOOT_SIGNATURE {
                return Err(FatError::MalformedGeometry(format!(
                    "invalid boot signature {:#06x}",
                    signature
                )));
            }
        }

        let mut bpb = Self {
            jump_boot: [sector[0], sector[1], sector[2]],
            oem_name: [0; 8],
            bytes_per_sector: LittleEndian::read_u16(&sector[0x0B..]),
            sectors_per_cluster: sector[0x0D],
            reserved_sectors: LittleEndian::read_u16(&sector[0x0E..]),
            fat_copies: sector[0x10],
            root_entries: LittleEndian::read_u16(&sector[0x11..]),
            total_sectors_16: LittleEndian::read_u16(&sector[0x13..]),
            media_descriptor: sector[0x15],
            sectors_per_fat: LittleEndian::read_u16(&sector[0x16..]),
            sectors_per_track: LittleEndian::read_u16(&sector[0x18..]),
            num_heads: LittleEndian::read_u16(&sector[0x1A..]),
            hidden_sectors: LittleEndian::read_u32(&sector[0x1C..]),
            total_sectors_32: LittleEndian::read_u32(&sector[0x20..]),
            drive_number: sector[0x24],
            boot_signature: sector[0x26],
            volume_id: LittleEndian::read_u32(&sector[0x27..]),
            volume_label: [0; 11],
            fs_type: [0; 8],
        };
        bpb.oem_name.copy_from_slice(&sector[0x03..0x0B]);
        bpb.volume_label.copy_from_slice(&sector[0x2B..0x36]);
        bpb.fs_type.copy_from_slice(&sector[0x36..0x3E]);

        Ok(bpb)
    }

    /// Encode a complete boot sector, signature included.
    pub fn to_boot_sector(&self) -> [u8; BOOT_SECTOR_SIZE] {
        let mut sector = [0u8; BOOT_SECTOR_SIZE];

        sector[0..3].copy_from_slice(&self.jump_boot);
        sector[0x03..0x0B].copy_from_slice(&self.oem_name);
        LittleEndian::write_u16(&mut sector[0x0B..], self.bytes_per_sector);
        sector[0x0D] = self.sectors_per_cluster;
        LittleEndian::write_u16(&mut sector[0x0E..], self.reserved_sectors);
        sector[0x10] = self.fat_copies;
        LittleEndian::write_u16(&mut sector[0x11..], self.root_entries);
        LittleEndian::write_u16(&mut sector[0x13..], self.total_sectors_16);
        sector[0x15] = self.media_descriptor;
        LittleEndian::write_u16(&mut sector[0x16..], self.sectors_per_fat);
        LittleEndian::write_u16(&mut sector[0x18..], self.sectors_per_track);
        LittleEndian::write_u16(&mut sector[0x1A..], self.num_heads);
        LittleEndian::write_u32(&mut sector[0x1C..], self.hidden_sectors);
        LittleEndian::write_u32(&mut sector[0x20..], self.total_sectors_32);
        sector[0x24] = self.drive_number;
        sector[0x26] = self.boot_signature;
        LittleEndian::write_u32(&mut sector[0x27..], self.volume_id);
        sector[0x2B..0x36].copy_from_slice(&self.volume_label);
        sector[0x36..0x3E].copy_from_slice(&self.fs_type);

        // Boot code area: "int 0x18" so a non-bootable volume falls through to the next device
        sector[0x3E] = 0xCD;
        sector[0x3F] = 0x18;

        LittleEndian::write_u16(&mut sector[510..512], BOOT_SIGNATURE);
        sector
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    pub fn set_total_sectors(&mut self, total: u32) {
        if total < 0x10000 {
            self.total_sectors_16 = total as u16;
            self.total_sectors_32 = 0;
        } else {
            self.total_sectors_16 = 0;
            self.total_sectors_32 = total;
        }
    }

    pub fn label(&self) -> String {
        String::from_utf8_lossy(&self.volume_label).trim_end().to_string()
    }

    pub fn fs_type(&self) -> String {
        String::from_utf8_lossy(&self.fs_type).trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bpb {
        let mut bpb = Bpb {
            sectors_per_cluster: 4,
            reserved_sectors: 4,
            sectors_per_fat: 64,
            volume_id: 0x1234_5678,
            volume_label: *b"SCRATCH    ",
            ..Bpb::default()
        };
        bpb.set_total_sectors(131_072);
        bpb
    }

    #[test]
    fn fields_land_at_standard_offsets() {
        let sector = sample().to_boot_sector();

        assert_eq!(&sector[0x0B..0x0D], &512u16.to_le_bytes());
        assert_eq!(sector[0x0D], 4);
        assert_eq!(&sector[0x0E..0x10], &4u16.to_le_bytes());
        assert_eq!(sector[0x10], 2);
        assert_eq!(&sector[0x11..0x13], &512u16.to_le_bytes());
        assert_eq!(&sector[0x16..0x18], &64u16.to_le_bytes());
        assert_eq!(&sector[0x20..0x24], &131_072u32.to_le_bytes());
        assert_eq!(&sector[0x36..0x3E], b"FAT16   ");
        assert_eq!(sector[510], 0x55);
        assert_eq!(sector[511], 0xAA);
    }

    #[test]
    fn parse_reads_back_encoded_sector() {
        let bpb = sample();
        let parsed = Bpb::parse(&bpb.to_boot_sector(), true).unwrap();

        assert_eq!(parsed, bpb);
        assert_eq!(parsed.total_sectors(), 131_072);
        assert_eq!(parsed.label(), "SCRATCH");
        assert_eq!(parsed.fs_type(), "FAT16");
    }

    #[test]
    fn missing_signature_is_rejected_unless_disabled() {
        let mut sector = sample().to_boot_sector();
        sector[510] = 0;
        sector[511] = 0;

        assert!(matches!(Bpb::parse(&sector, true), Err(FatError::MalformedGeometry(_))));
        assert!(Bpb::parse(&sector, false).is_ok());
    }

    #[test]
    fn short_boot_sector_is_rejected() {
        assert!(Bpb::parse(&[0u8; 100], false).is_err());
    }

    #[test]
    fn small_volumes_use_the_16_bit_count() {
        let mut bpb = Bpb::default();
        bpb.set_total_sectors(20_000);
        assert_eq!(bpb.total_sectors_16, 20_000);
        assert_eq!(bpb.total_sectors_32, 0);
        assert_eq!(bpb.total_sectors(), 20_000);
    }
}
