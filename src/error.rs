use std::path::PathBuf;

use burn::record::RecorderError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Invalid IDX file '{name}': {reason}")]
    InvalidIdx { name: String, reason: String },

    #[error("No checkpoint found at '{}'", .0.display())]
    CheckpointNotFound(PathBuf),

    #[error("Parameter '{name}' shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_idx(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidIdx {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
