use crate::{FatError, FatResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options applied when a volume is opened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Refuse every mutating operation.
    pub read_only: bool,
    /// Require the 0x55AA boot signature at the end of sector 0.
    pub verify_signature: bool,
    /// Zero a file's data clusters before its entry is erased.
    ///
    /// Turning this off leaves the deleted content readable in the image; delete then
    /// still erases the entry and logs a warning.
    pub zero_on_delete: bool,
    /// Return a deleted file's clusters to the free pool.
    ///
    /// Turning this off leaks the clusters of every deleted file until the image is
    /// reformatted; delete logs a warning each time.
    pub free_clusters_on_delete: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            verify_signature: true,
            zero_on_delete: true,
            free_clusters_on_delete: true,
        }
    }
}

impl VolumeConfig {
    pub fn from_json(text: &str) -> FatResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> FatResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded volume config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

/// Parameters for laying down a blank FAT16 volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormatOptions {
    pub label: Option<String>,
    pub bytes_per_sector: u16,
    /// Cluster size in bytes. Picked from the volume size when absent.
    pub cluster_size: Option<u32>,
    pub reserved_sectors: u16,
    pub fat_copies: u8,
    pub root_entries: u16,
    /// Reject layouts whose cluster count falls outside the FAT16 range (4085..=65524).
    /// Test images and tiny scratch volumes turn this off.
    pub enforce_cluster_range: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            label: None,
            bytes_per_sector: 512,
            cluster_size: None,
            reserved_sectors: 1,
            fat_copies: 2,
            root_entries: 512,
            enforce_cluster_range: true,
        }
    }
}

impl FormatOptions {
    pub fn validate(&self) -> FatResult<()> {
        if ![512, 1024, 2048, 4096].contains(&self.bytes_per_sector) {
            return Err(FatError::Configuration(format!(
                "Invalid bytes per sector: {}",
                self.bytes_per_sector
            )));
        }
        if let Some(cluster_size) = self.cluster_size {
            let bytes_per_sector = self.bytes_per_sector as u32;
            if cluster_size < bytes_per_sector
                || cluster_size % bytes_per_sector != 0
                || !(cluster_size / bytes_per_sector).is_power_of_two()
                || cluster_size / bytes_per_sector > 128
            {
                return Err(FatError::Configuration(format!(
                    "Invalid cluster size: {} bytes",
                    cluster_size
                )));
            }
        }
        if self.reserved_sectors == 0 {
            return Err(FatError::Configuration("Reserved sector count cannot be 0".to_string()));
        }
        if self.fat_copies == 0 {
            return Err(FatError::Configuration("Number of FATs cannot be 0".to_string()));
        }
        if self.root_entries == 0 || (self.root_entries as u32 * 32) % self.bytes_per_sector as u32 != 0 {
            return Err(FatError::Configuration(format!(
                "Root entry count {} must fill whole sectors",
                self.root_entries
            )));
        }
        if let Some(label) = &self.label {
            if label.len() > 11 || !label.is_ascii() {
                return Err(FatError::Configuration(format!("Invalid volume label: {}", label)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = VolumeConfig::from_json(r#"{ "read_only": true }"#).unwrap();
        assert!(config.read_only);
        assert!(config.verify_signature);
        assert!(config.zero_on_delete);
    }

    #[test]
    fn load_reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "zero_on_delete": false, "free_clusters_on_delete": false }}"#).unwrap();

        let config = VolumeConfig::load(file.path()).unwrap();
        assert!(!config.zero_on_delete);
        assert!(!config.free_clusters_on_delete);
        assert!(!config.read_only);
    }

    #[test]
    fn bad_json_is_a_serialization_error() {
        let err = VolumeConfig::from_json("{ read_only").unwrap_err();
        assert!(matches!(err, FatError::Serialization(_)));
    }

    #[test]
    fn format_options_reject_odd_cluster_sizes() {
        let options = FormatOptions {
            cluster_size: Some(1536),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = FormatOptions {
            cluster_size: Some(4096),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn format_options_reject_partial_root_sectors() {
        let options = FormatOptions {
            root_entries: 20,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
