use std::{error::Error as StdError, io, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyStatsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Signal handling error")]
    SignalHandling {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create file {path}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write file {path}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to replace {to} with {from}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid key event on row {row}: {reason}")]
    InvalidEvent { row: usize, reason: String },

    #[error("Corrupt statistics file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[cfg(windows)]
    #[error(transparent)]
    Ctrlc(#[from] ctrlc::Error),
}

impl KeyStatsError {
    /// True for failures caused by unreadable or invalid file contents, as
    /// opposed to the file system refusing an operation.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Json(_) | Self::Zip(_))
    }
}

pub type Result<T> = std::result::Result<T, KeyStatsError>;
