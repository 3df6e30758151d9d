// FAT16 image engine
pub mod fat16;

#[cfg(test)]
pub mod test_helpers;

pub use fat16::{create_image, format_image, Fat16FileOps, Fat16Volume, FileInfo, VolumeInfo};
