// FAT16 module - geometry, root directory, cluster chains, file operations and formatter

pub mod boot_sector;
pub mod cluster_chain;
pub mod dir_entry;
pub mod directory;
pub mod fat_table;
pub mod file_io;
pub mod file_ops;
pub mod formatter;
pub mod geometry;
pub mod short_name;
pub mod volume;


pub use boot_sector::Bpb;
pub use cluster_chain::{collect_chain, walk, ChainWalker};
pub use dir_entry::{DirEntry, FatAttributes};
pub use directory::RootDirectory;
pub use fat_table::{FatNext, FatTable};
pub use file_ops::{Fat16FileOps, FileInfo, VolumeInfo};
pub use formatter::{create_image, format_image};
pub use geometry::{ByteOffset, EntryCount, Geometry, SlotIndex};
pub use short_name::ShortName;
pub use volume::Fat16Volume;
