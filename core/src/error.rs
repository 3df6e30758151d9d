use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Name already in use: {0}")]
    NameInUse(String),

    #[error("Corrupt cluster chain starting at {start}: cluster {cluster}: {reason}")]
    CorruptChain {
        start: u16,
        cluster: u16,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("Invalid short name: {0}")]
    InvalidName(String),

    #[error("Root directory is full")]
    DirectoryFull,

    #[error("Not enough free clusters: need {needed}, {available} available")]
    NoSpace { needed: u32, available: u32 },

    #[error("Volume is opened read-only")]
    ReadOnly,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FatError {
    /// A lookup miss is an expected outcome, not a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FatError::NotFound(_))
    }

    pub fn corrupt_chain(start: u16, cluster: u16, reason: impl Into<String>) -> Self {
        FatError::CorruptChain {
            start,
            cluster,
            reason: reason.into(),
        }
    }
}

pub type FatResult<T> = Result<T, FatError>;
