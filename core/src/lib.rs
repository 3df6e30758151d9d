pub mod config;
pub mod error;

pub use config::{FormatOptions, VolumeConfig};
pub use error::{FatError, FatResult};
